//! HTTP API for lyrics generation
//!
//! ## Endpoints
//!
//! - `GET /` - Greeting
//! - `GET /seed=<sentence>&length=<length>` - Generate lyrics continuing
//!   `<sentence>`
//!
//! Every response is HTTP 200 with a `{"STATUS": .., "BODY": ..}` JSON
//! envelope carrying the application status.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cantopop::api::{create_router, AppState};
//!
//! let state = AppState::new(Arc::new(generator));
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

use std::{num::IntErrorKind, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::{
    error::{CantopopError, Result},
    generate::Generator,
};

mod types;

pub use types::{LyricsQuery, LyricsResponse, ERROR_PREFIX, GREETING};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    generator: Arc<Generator>,
}

impl AppState {
    /// Create state around a loaded generator
    #[must_use]
    pub fn new(generator: Arc<Generator>) -> Self {
        Self { generator }
    }

    /// Shared generator
    #[must_use]
    pub fn generator(&self) -> &Arc<Generator> {
        &self.generator
    }
}

/// Create the API router with permissive CORS and request tracing
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(hello_handler))
        .route("/:query", get(lyrics_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn hello_handler() -> Json<LyricsResponse> {
    Json(LyricsResponse::ok(GREETING))
}

async fn lyrics_handler(State(state): State<AppState>, Path(segment): Path<String>) -> Response {
    let Some(query) = LyricsQuery::parse(&segment) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let response = match generate_lyrics(&state, query).await {
        Ok(body) => LyricsResponse::ok(body),
        Err(e) => {
            warn!(error = %e, "lyrics request failed");
            LyricsResponse::error(e)
        },
    };
    Json(response).into_response()
}

async fn generate_lyrics(state: &AppState, query: LyricsQuery) -> Result<String> {
    let length = parse_length(&query.length)?;
    debug!(seed = %query.seed, length, "lyrics request");

    let generator = Arc::clone(state.generator());
    let seed = query.seed;
    let outcome = tokio::task::spawn_blocking(move || generator.generate(&seed, length))
        .await
        .map_err(|e| CantopopError::Generation {
            reason: e.to_string(),
        })??;

    Ok(outcome.into_body())
}

/// Parse a decimal length
///
/// Surrounding whitespace and a leading sign are accepted, as are single
/// underscores between digits (`1_000`). Only ASCII digits count, so
/// full-width digits such as `２０` are rejected. Values past the range of
/// `i64` saturate, which the generation clamp then folds into range.
///
/// # Errors
///
/// Returns `InvalidLength` if the input is not an integer.
pub fn parse_length(input: &str) -> Result<i64> {
    let trimmed = input.trim();
    let (sign, digits) = match trimmed.strip_prefix(['+', '-']) {
        Some(rest) => (&trimmed[..1], rest),
        None => ("", trimmed),
    };
    if digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(CantopopError::InvalidLength {
            input: input.to_string(),
            reason: "invalid digit separator".to_string(),
        });
    }

    match format!("{sign}{}", digits.replace('_', "")).parse::<i64>() {
        Ok(n) => Ok(n),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(CantopopError::InvalidLength {
                input: input.to_string(),
                reason: e.to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests;

//! # Cantopop
//!
//! Character-level lyrics generation served over HTTP.
//!
//! A single-layer GRU trained on Cantonese pop lyrics continues a short seed
//! sentence one character at a time. The crate loads the network from a
//! safetensors file, rebuilds the character vocabulary from the training
//! corpus, and exposes generation through a small axum server.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use cantopop::{CharRnn, GenerationOutcome, Generator, RnnConfig, StepSampler, Vocabulary};
//!
//! let vocab = Vocabulary::from_corpus("月光光照地堂").unwrap();
//! let model = CharRnn::seeded(
//!     RnnConfig { vocab_size: vocab.size(), embed_dim: 8, units: 16 },
//!     42,
//! ).unwrap();
//! let sampler = StepSampler::new(Arc::new(model), Arc::new(vocab), 1.0).unwrap();
//! let generator = Generator::new(sampler);
//!
//! match generator.generate("月光", 20).unwrap() {
//!     GenerationOutcome::Generated { text, steps } => {
//!         assert!(text.starts_with("月光"));
//!         assert_eq!(steps, 20);
//!     },
//!     GenerationOutcome::NoSeed => unreachable!(),
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::doc_markdown)] // Allow technical terms without backticks
#![allow(clippy::float_cmp)] // Allow float comparisons in tests

/// HTTP API
pub mod api;
/// Server configuration and startup loading
pub mod config;
/// Error types
pub mod error;
/// Generation loop
pub mod generate;
/// Embedding, GRU and dense layers
pub mod model;
/// Safetensors weight files
pub mod safetensors;
/// Single-step sampling
pub mod sampler;
/// Tensor type
pub mod tensor;
/// Character vocabulary
pub mod vocab;

pub use error::{CantopopError, Result};
pub use generate::{GenerationOutcome, GenerationRequest, Generator};
pub use model::{CharRnn, HiddenState, RnnConfig};
pub use sampler::StepSampler;
pub use tensor::Tensor;
pub use vocab::Vocabulary;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

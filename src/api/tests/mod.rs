//! API tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::util::ServiceExt;

use super::*;
use crate::{
    generate::{MAX_STEPS, MIN_STEPS, NO_SEED_MESSAGE},
    model::{CharRnn, RnnConfig},
    sampler::StepSampler,
    vocab::Vocabulary,
};

const CORPUS: &str = "你好世界\n我愛香港\nhello world";

fn create_test_app() -> Router {
    let vocab = Vocabulary::from_corpus(CORPUS).expect("test");
    let model = CharRnn::seeded(
        RnnConfig {
            vocab_size: vocab.size(),
            embed_dim: 8,
            units: 16,
        },
        11,
    )
    .expect("test");
    let sampler = StepSampler::new(Arc::new(model), Arc::new(vocab), 1.0).expect("test");
    create_router(AppState::new(Arc::new(Generator::new(sampler))))
}

async fn send_get(uri: &str) -> (StatusCode, Vec<u8>) {
    let response = create_test_app()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("test"))
        .await
        .expect("test");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("test");
    (status, body.to_vec())
}

async fn get_json(uri: &str) -> LyricsResponse {
    let (status, body) = send_get(uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).expect("test")
}

#[tokio::test]
async fn test_root_greeting() {
    let (status, body) = send_get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, br#"{"STATUS":200,"BODY":"Why hello there"}"#);
}

#[tokio::test]
async fn test_generate_cjk_seed() {
    // "/seed=你好&length=20"
    let resp = get_json("/seed=%E4%BD%A0%E5%A5%BD&length=20").await;
    assert_eq!(resp.status, 200);
    assert!(resp.body.starts_with("你好"));
    assert_eq!(resp.body.chars().count(), 2 + 20);
}

#[tokio::test]
async fn test_empty_seed() {
    let resp = get_json("/seed=&length=5").await;
    assert_eq!(resp, LyricsResponse::ok(NO_SEED_MESSAGE));
}

#[tokio::test]
async fn test_non_integer_length() {
    let resp = get_json("/seed=test&length=abc").await;
    assert_eq!(resp.status, 400);
    assert!(resp.body.starts_with(ERROR_PREFIX));
    assert!(resp.body.contains("abc"));
}

#[tokio::test]
async fn test_empty_length_is_error() {
    let resp = get_json("/seed=test&length=").await;
    assert_eq!(resp.status, 400);
}

#[tokio::test]
async fn test_short_length_clamped() {
    let resp = get_json("/seed=hello&length=3").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.chars().count(), 5 + MIN_STEPS);
}

#[tokio::test]
async fn test_huge_length_clamped() {
    let resp = get_json("/seed=hello&length=99999999999999999999").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.chars().count(), 5 + MAX_STEPS);
}

#[tokio::test]
async fn test_long_seed_truncated() {
    let resp = get_json("/seed=hello%20world%20again&length=12").await;
    assert_eq!(resp.status, 200);
    assert!(resp.body.starts_with("hello world "));
    assert_eq!(resp.body.chars().count(), 12 + 12);
}

#[tokio::test]
async fn test_length_with_whitespace_and_sign() {
    let resp = get_json("/seed=hi&length=%20+15%20").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.chars().count(), 2 + 15);
}

#[tokio::test]
async fn test_length_with_digit_separator() {
    let resp = get_json("/seed=hi&length=1_5").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.chars().count(), 2 + 15);
}

#[tokio::test]
async fn test_unknown_segment_not_found() {
    let (status, _) = send_get("/favicon.ico").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_get("/seed=a/length=5").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let response = create_test_app()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("origin", "http://example.com")
                .body(Body::empty())
                .expect("test"),
        )
        .await
        .expect("test");

    let allow = response
        .headers()
        .get("access-control-allow-origin")
        .expect("test");
    assert_eq!(allow.to_str().expect("test"), "*");
}

#[test]
fn test_parse_length() {
    assert_eq!(parse_length("20").expect("test"), 20);
    assert_eq!(parse_length(" 7 ").expect("test"), 7);
    assert_eq!(parse_length("+3").expect("test"), 3);
    assert_eq!(parse_length("-3").expect("test"), -3);
    assert_eq!(
        parse_length("123456789012345678901234").expect("test"),
        i64::MAX
    );
    assert_eq!(
        parse_length("-123456789012345678901234").expect("test"),
        i64::MIN
    );
}

#[test]
fn test_parse_length_rejects_garbage() {
    for input in ["abc", "", "1.5", "12abc", "0x10"] {
        let err = parse_length(input).unwrap_err();
        assert!(
            matches!(err, CantopopError::InvalidLength { .. }),
            "{input:?}"
        );
    }
}

#[test]
fn test_parse_length_digit_separators() {
    assert_eq!(parse_length("1_0").expect("test"), 10);
    assert_eq!(parse_length("-1_000").expect("test"), -1000);
    assert_eq!(parse_length("+7_2_0").expect("test"), 720);

    for input in ["1__0", "_1", "1_", "+_1", "-", "_"] {
        let err = parse_length(input).unwrap_err();
        assert!(
            matches!(err, CantopopError::InvalidLength { .. }),
            "{input:?}"
        );
    }
}

#[test]
fn test_parse_length_rejects_full_width_digits() {
    let err = parse_length("２０").unwrap_err();
    match err {
        CantopopError::InvalidLength { input, .. } => assert_eq!(input, "２０"),
        other => panic!("unexpected error: {other}"),
    }
}

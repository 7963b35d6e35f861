use std::time::Duration;

use httpmock::prelude::*;
use w3b_runtime::{ErrorKind, HttpPriceSource, PipelineError, PriceSource, PriceSourceError};

fn source(server: &MockServer, pointer: &str, scale: u64) -> HttpPriceSource {
    HttpPriceSource::new(&server.url("/rate"), pointer, scale, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn numeric_rate_is_scaled_and_rounded() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rate");
        then.status(200).json_body(serde_json::json!({"data": {"usd": 12.3456}}));
    });

    let price = source(&server, "/data/usd", 1_000).candidate_price().await.unwrap();
    assert_eq!(price, 12_346);
}

#[tokio::test]
async fn string_rate_is_accepted() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rate");
        then.status(200).json_body(serde_json::json!({"price": " 1005 "}));
    });

    assert_eq!(source(&server, "/price", 1).candidate_price().await.unwrap(), 1005);
}

#[tokio::test]
async fn non_positive_rate_is_a_price_rejection() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rate");
        then.status(200).json_body(serde_json::json!({"price": -4.0}));
    });

    let err = source(&server, "/price", 1).candidate_price().await.unwrap_err();
    assert!(matches!(err, PriceSourceError::NonPositive(_)));
    assert_eq!(PipelineError::PriceSource(err).kind(), ErrorKind::PriceRejected);
}

#[tokio::test]
async fn missing_pointer_is_a_decode_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rate");
        then.status(200).json_body(serde_json::json!({"other": 1}));
    });

    let err = source(&server, "/price", 1).candidate_price().await.unwrap_err();
    assert!(matches!(err, PriceSourceError::Decode(_)));
}

#[tokio::test]
async fn upstream_error_status_is_transport() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rate");
        then.status(503);
    });

    let err = source(&server, "/price", 1).candidate_price().await.unwrap_err();
    assert!(matches!(err, PriceSourceError::Transport(_)));
    assert_eq!(PipelineError::PriceSource(err).kind(), ErrorKind::PriceSource);
}

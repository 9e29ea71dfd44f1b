//! End-to-end runs of the ingestion driver against a mock streaming API.

use std::sync::Arc;

use rfid_auth::testutil::fixture_key;
use rfid_auth::TokenIssuer;
use rfid_core::{BadgeEventGenerator, GeneratorConfig};
use rfid_streaming::{
    ChannelPhase, DriverConfig, IngestionDriver, RunLimit, StreamingClient, StreamingConfig,
    StreamingError,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHANNEL_PATH: &str = "/v2/streaming/databases/SNOWFLAKE_EXAMPLE/schemas/STAGE_BADGE_TRACKING/pipes/BADGE_EVENTS_PIPE/channels/driver_ch";

async fn mock_streaming_api(server: &MockServer, appends: u64) {
    Mock::given(method("GET"))
        .and(path("/v2/streaming/hostname"))
        .respond_with(ResponseTemplate::new(200).set_body_string(server.address().to_string()))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("scoped"))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CHANNEL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"next_continuation_token": "ct-0"})),
        )
        .mount(server)
        .await;
    for i in 0..appends {
        Mock::given(method("POST"))
            .and(path_regex(r"/channels/driver_ch/rows$"))
            .and(query_param("continuationToken", format!("ct-{i}")))
            .and(query_param("offsetToken", ((i + 1) * 10).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"next_continuation_token": format!("ct-{}", i + 1)}),
            ))
            .expect(1)
            .mount(server)
            .await;
    }
}

fn client(server: &MockServer) -> Arc<StreamingClient> {
    let config = StreamingConfig::local_mock(&server.uri()).unwrap();
    let issuer = TokenIssuer::new(
        fixture_key(),
        &config.account,
        &config.user,
        chrono::Duration::minutes(59),
    )
    .unwrap();
    Arc::new(StreamingClient::new(config, Arc::new(issuer)).unwrap())
}

#[tokio::test]
async fn fixed_batch_run_chains_every_append() {
    let server = MockServer::start().await;
    mock_streaming_api(&server, 3).await;

    let mut session = client(&server).channel("driver_ch").unwrap();
    session.open().await.unwrap();

    let driver = IngestionDriver::new(DriverConfig {
        batch_size: 10,
        events_per_second: 1000.0,
        strict_validation: false,
        limit: RunLimit::Batches(3),
    })
    .unwrap();
    let mut source = BadgeEventGenerator::seeded(GeneratorConfig::default(), 11).unwrap();
    let validator = driver.default_validator();

    let summary = driver
        .run(&mut source, &validator, &mut session, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.events_sent, 30);
    assert_eq!(summary.events_rejected, 0);
    assert_eq!(summary.batches_sent, 3);
    assert!(!summary.cancelled);
    assert_eq!(session.continuation_token(), Some("ct-3"));
    assert_eq!(session.offset_token(), 30);
}

#[tokio::test]
async fn backfilled_window_is_accepted_by_validation() {
    let server = MockServer::start().await;
    mock_streaming_api(&server, 2).await;

    let mut session = client(&server).channel("driver_ch").unwrap();
    session.open().await.unwrap();

    // 20 events over a 20ms window: two batches stamped in the past.
    let driver = IngestionDriver::new(DriverConfig {
        batch_size: 10,
        events_per_second: 1000.0,
        strict_validation: true,
        limit: RunLimit::Duration(std::time::Duration::from_millis(20)),
    })
    .unwrap();
    let mut source = BadgeEventGenerator::seeded(GeneratorConfig::default(), 5).unwrap();
    let validator = driver.default_validator();

    let summary = driver
        .run(&mut source, &validator, &mut session, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.batches_sent, 2);
    assert_eq!(summary.events_sent, 20);
    assert_eq!(summary.events_rejected, 0);
}

#[tokio::test]
async fn rejected_append_stops_the_run() {
    let server = MockServer::start().await;
    mock_streaming_api(&server, 1).await;
    Mock::given(method("POST"))
        .and(path_regex(r"/channels/driver_ch/rows$"))
        .and(query_param("continuationToken", "ct-1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid continuation token"))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = client(&server).channel("driver_ch").unwrap();
    session.open().await.unwrap();

    let driver = IngestionDriver::new(DriverConfig {
        batch_size: 10,
        events_per_second: 1000.0,
        strict_validation: false,
        limit: RunLimit::Batches(5),
    })
    .unwrap();
    let mut source = BadgeEventGenerator::seeded(GeneratorConfig::default(), 3).unwrap();
    let validator = driver.default_validator();

    let err = driver
        .run(&mut source, &validator, &mut session, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err.error, StreamingError::AppendFailed { status: 400, .. }));
    assert_eq!(err.summary.batches_sent, 1);
    assert_eq!(err.summary.events_sent, 10);
    assert_eq!(session.continuation_token(), Some("ct-1"));
    assert_eq!(session.phase(), ChannelPhase::Open);
}

#[tokio::test]
async fn driver_on_unopened_session_fails_without_requests() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = client(&server).channel("driver_ch").unwrap();
    let driver = IngestionDriver::new(DriverConfig {
        batch_size: 10,
        events_per_second: 1000.0,
        strict_validation: false,
        limit: RunLimit::Batches(2),
    })
    .unwrap();
    let mut source = BadgeEventGenerator::seeded(GeneratorConfig::default(), 1).unwrap();
    let validator = driver.default_validator();

    let err = driver
        .run(&mut source, &validator, &mut session, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err.error,
        StreamingError::ChannelNotOpen {
            state: ChannelPhase::Unopened,
            ..
        }
    ));
    assert_eq!(err.summary.batches_sent, 0);
}

//! Request pipeline tests: header decoration, monotonic timestamps, and
//! the 401/429 recovery paths.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use voicelink_client::api::CallApi;
use voicelink_client::device::DeviceIdentityProvider;
use voicelink_client::error::ApiError;
use voicelink_client::pipeline::RequestPipeline;
use voicelink_client::session::{SessionConfig, SessionManager};
use voicelink_client::vault::keys;
use voicelink_harness::{MemVault, MockTransport, make_token};

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

struct Rig {
    vault: Arc<MemVault>,
    transport: Arc<MockTransport>,
    session: Arc<SessionManager<MemVault, MockTransport>>,
    pipeline: Arc<RequestPipeline<MemVault, MockTransport>>,
}

fn rig() -> Rig {
    let vault = Arc::new(MemVault::new());
    let transport = Arc::new(MockTransport::new());
    let session = Arc::new(SessionManager::new(
        Arc::clone(&vault),
        Arc::clone(&transport),
        SessionConfig::default(),
    ));
    let device = Arc::new(DeviceIdentityProvider::new(Arc::clone(&vault)));
    let pipeline =
        Arc::new(RequestPipeline::new(Arc::clone(&session), device, Arc::clone(&transport)));
    Rig { vault, transport, session, pipeline }
}

async fn login(rig: &Rig) -> String {
    let token = make_token(now_secs() + 3600, now_secs());
    rig.session.store_tokens(&token, Some("refresh-1"), Some("42")).await.unwrap();
    token
}

#[tokio::test]
async fn requests_carry_bearer_device_and_timestamp() {
    let rig = rig();
    let token = login(&rig).await;
    rig.transport.push_json(200, json!({}));

    rig.pipeline.get("/users/me").await.unwrap();

    let requests = rig.transport.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.header("authorization"), Some(format!("Bearer {token}").as_str()));
    assert_eq!(
        request.header("x-device-id"),
        rig.vault.peek(keys::DEVICE_ID).as_deref()
    );
    assert!(request.header("x-request-timestamp").is_some());
}

#[tokio::test]
async fn timestamps_are_strictly_increasing() {
    let rig = rig();
    login(&rig).await;
    for _ in 0..5 {
        rig.transport.push_json(200, json!({}));
    }

    for _ in 0..5 {
        rig.pipeline.get("/users/me").await.unwrap();
    }

    let timestamps: Vec<i64> = rig
        .transport
        .requests()
        .iter()
        .map(|request| request.header("x-request-timestamp").unwrap().parse().unwrap())
        .collect();
    for pair in timestamps.windows(2) {
        assert!(pair[1] > pair[0], "timestamps must strictly increase: {timestamps:?}");
    }
}

#[tokio::test]
async fn unauthenticated_requests_omit_the_bearer() {
    let rig = rig();
    rig.transport.push_json(200, json!({}));

    rig.pipeline.get("/health").await.unwrap();

    let requests = rig.transport.requests();
    assert_eq!(requests[0].header("authorization"), None);
    assert!(requests[0].header("x-device-id").is_some());
}

#[tokio::test]
async fn a_401_triggers_one_refresh_and_replay() {
    let rig = rig();
    login(&rig).await;
    let fresh = make_token(now_secs() + 3600, now_secs());
    rig.transport.push_json(401, json!({ "detail": "token revoked" }));
    rig.transport.push_json(200, json!({ "access_token": fresh }));
    rig.transport.push_json(200, json!({ "ok": true }));

    let response = rig.pipeline.get("/users/me").await.unwrap();
    assert_eq!(response.body, json!({ "ok": true }));

    assert_eq!(rig.transport.requests_to("/users/me"), 2);
    assert_eq!(rig.transport.requests_to("/auth/refresh"), 1);

    // The replay used the refreshed token.
    let requests = rig.transport.requests();
    let replay = requests.last().unwrap();
    assert_eq!(replay.header("authorization"), Some(format!("Bearer {fresh}").as_str()));
}

#[tokio::test]
async fn a_second_401_ends_the_session() {
    let rig = rig();
    login(&rig).await;
    let fresh = make_token(now_secs() + 3600, now_secs());
    rig.transport.push_json(401, json!({ "detail": "token revoked" }));
    rig.transport.push_json(200, json!({ "access_token": fresh }));
    rig.transport.push_json(401, json!({ "detail": "still revoked" }));

    let got = rig.pipeline.get("/users/me").await;
    assert!(matches!(got, Err(ApiError::AuthenticationFailed)));

    for key in keys::CREDENTIAL_KEYS {
        assert_eq!(rig.vault.peek(key), None, "{key} should be cleared");
    }
}

#[tokio::test]
async fn a_failed_refresh_after_401_ends_the_session() {
    let rig = rig();
    login(&rig).await;
    rig.transport.push_json(401, json!({ "detail": "token revoked" }));
    rig.transport.push_json(401, json!({ "detail": "refresh revoked" }));

    let got = rig.pipeline.get("/users/me").await;
    assert!(matches!(got, Err(ApiError::AuthenticationFailed)));
    assert_eq!(rig.transport.requests_to("/users/me"), 1);
    assert!(rig.vault.peek(keys::ACCESS_TOKEN).is_none());
}

#[tokio::test]
async fn rate_limiting_surfaces_the_backend_hint() {
    let rig = rig();
    login(&rig).await;
    rig.transport.push_json_with_headers(429, json!({}), &[("retry-after", "17")]);

    let got = rig.pipeline.get("/users/me").await;
    assert!(matches!(got, Err(ApiError::RateLimited { retry_after_secs: 17 })));
}

#[tokio::test]
async fn rate_limiting_falls_back_to_a_default_wait() {
    let rig = rig();
    login(&rig).await;
    rig.transport.push_json(429, json!({}));

    let got = rig.pipeline.get("/users/me").await;
    assert!(matches!(got, Err(ApiError::RateLimited { retry_after_secs: 60 })));
}

#[tokio::test]
async fn backend_errors_carry_status_and_detail() {
    let rig = rig();
    login(&rig).await;
    rig.transport.push_json(404, json!({ "detail": "call not found" }));

    let got = rig.pipeline.get("/calls/nope").await;
    match got {
        Err(ApiError::Backend { status, detail }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "call not found");
        },
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn report_sends_reason_and_description() {
    let rig = rig();
    login(&rig).await;
    rig.transport.push_json(200, json!({ "status": "reported" }));

    let calls = CallApi::new(Arc::clone(&rig.pipeline));
    calls.report("c-9", "abuse", Some("persistent harassment")).await.unwrap();

    let requests = rig.transport.requests();
    let report = requests.last().unwrap();
    assert_eq!(report.path, "/calls/c-9/report");
    assert_eq!(
        report.body,
        Some(json!({ "reason": "abuse", "description": "persistent harassment" }))
    );
}

#[tokio::test]
async fn report_omits_an_absent_description() {
    let rig = rig();
    login(&rig).await;
    rig.transport.push_json(200, json!({ "status": "reported" }));

    let calls = CallApi::new(Arc::clone(&rig.pipeline));
    calls.report("c-9", "abuse", None).await.unwrap();

    let requests = rig.transport.requests();
    assert_eq!(requests.last().unwrap().body, Some(json!({ "reason": "abuse" })));
}

#[tokio::test]
async fn device_identity_is_stable_across_provider_instances() {
    let rig = rig();
    rig.transport.push_json(200, json!({}));
    rig.transport.push_json(200, json!({}));

    rig.pipeline.get("/health").await.unwrap();
    let first = rig.vault.peek(keys::DEVICE_ID).unwrap();

    // A new provider over the same vault resolves the same identity.
    let device = DeviceIdentityProvider::new(Arc::clone(&rig.vault));
    assert_eq!(device.device_id().await.unwrap(), first);
}

use super::*;

#[tokio::test]
async fn fake_backend_echoes_prompt_by_default() {
    let backend = FakeBackend::new(true);
    let response = backend.invoke(InvokeRequest::new("hello", "/tmp", 1_000)).await.unwrap();
    assert_eq!(response.response, "ok: hello");
}

#[tokio::test]
async fn fake_backend_replays_queued_responses_in_order() {
    let backend = FakeBackend::new(true);
    backend.push_response(InvokeResponse {
        prompt: "a".into(),
        response: "first".into(),
        duration_ms: 1,
        session_id: "s1".into(),
        duration_api_ms: None,
        cost_usd: None,
        slot_wait_ms: None,
    });
    backend.push_error(BackendError::Timeout { timeout_ms: 500 });

    let first = backend.invoke(InvokeRequest::new("a", "/tmp", 1_000)).await.unwrap();
    assert_eq!(first.response, "first");

    let second = backend.invoke(InvokeRequest::new("b", "/tmp", 1_000)).await;
    assert_eq!(second, Err(BackendError::Timeout { timeout_ms: 500 }));
}

#[tokio::test]
async fn check_available_reflects_configured_value() {
    assert!(FakeBackend::new(true).check_available().await);
    assert!(!FakeBackend::new(false).check_available().await);
}

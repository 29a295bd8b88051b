use super::*;

#[test]
fn display_includes_category_and_message() {
    let err = CoreError::not_found("task-abc missing");
    assert_eq!(err.to_string(), "not_found: task-abc missing");
}

#[test]
fn lock_contention_and_backend_failure_are_locally_retryable() {
    assert!(CoreError::lock_contention("x").is_locally_retryable());
    assert!(CoreError::backend_failure("x").is_locally_retryable());
}

#[test]
fn other_categories_are_not_locally_retryable() {
    assert!(!CoreError::not_found("x").is_locally_retryable());
    assert!(!CoreError::precondition_failed("x").is_locally_retryable());
    assert!(!CoreError::corrupt("x").is_locally_retryable());
    assert!(!CoreError::internal("x").is_locally_retryable());
}

#[test]
fn serde_round_trips() {
    let err = CoreError::corrupt("bad json");
    let json = serde_json::to_string(&err).unwrap();
    let back: CoreError = serde_json::from_str(&json).unwrap();
    assert_eq!(back.category, ErrorCategory::Corrupt);
    assert_eq!(back.message, "bad json");
}

use oj_core::ErrorCategory;
use oj_storage::StorageError;

use super::*;

#[test]
fn category_matches_variant() {
    assert_eq!(EngineError::NotFound("x".into()).category(), ErrorCategory::NotFound);
    assert_eq!(EngineError::LockContention("x".into()).category(), ErrorCategory::LockContention);
}

#[test]
fn storage_error_converts_preserving_category() {
    let storage_err = StorageError::NotFound("task-abc".into());
    let engine_err: EngineError = storage_err.into();
    assert_eq!(engine_err.category(), ErrorCategory::NotFound);
}

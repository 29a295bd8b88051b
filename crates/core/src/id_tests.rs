use super::*;

crate::define_id! {
    pub struct ScratchId("scr-");
}

#[test]
fn new_ids_carry_the_prefix() {
    let id = ScratchId::new();
    assert!(id.as_str().starts_with("scr-"));
    assert_eq!(id.as_str().len(), "scr-".len() + 21);
}

#[test]
fn new_ids_are_unique() {
    assert_ne!(ScratchId::new(), ScratchId::new());
}

#[test]
fn from_string_round_trips() {
    let id = ScratchId::from_string("scr-abc123");
    assert_eq!(id.as_str(), "scr-abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn serde_round_trips() {
    let id = ScratchId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: ScratchId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}

#[test]
fn short_truncates_without_panicking_on_short_input() {
    assert_eq!(short("abc", 10), "abc");
    assert_eq!(short("abcdefgh", 3), "abc");
}

#[test]
fn idbuf_hash_matches_str_hash_for_borrow_lookup() {
    use std::collections::HashMap;
    let mut map: HashMap<IdBuf, u32> = HashMap::new();
    map.insert(IdBuf::new("task-xyz"), 1);
    assert_eq!(map.get("task-xyz"), Some(&1));
}

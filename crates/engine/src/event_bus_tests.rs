use std::sync::Arc;

use oj_core::{EventName, EventPayload, TaskId};
use parking_lot::Mutex;

use super::*;

fn task_event() -> EventPayload {
    EventPayload::TaskCreated { task_id: TaskId::new() }
}

#[tokio::test]
async fn handlers_fire_in_registration_order() {
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let a = Arc::clone(&order);
    bus.subscribe(EventName::TaskCreated, Arc::new(move |_: &EventPayload| a.lock().push(1)));
    let b = Arc::clone(&order);
    bus.subscribe(EventName::TaskCreated, Arc::new(move |_: &EventPayload| b.lock().push(2)));

    bus.emit(task_event()).await;
    assert_eq!(*order.lock(), vec![1, 2]);
}

#[tokio::test]
async fn once_fires_exactly_once() {
    let bus = EventBus::new();
    let count = Arc::new(Mutex::new(0));
    let c = Arc::clone(&count);
    bus.once(EventName::TaskCreated, Arc::new(move |_: &EventPayload| *c.lock() += 1));

    bus.emit(task_event()).await;
    bus.emit(task_event()).await;
    assert_eq!(*count.lock(), 1);
}

#[tokio::test]
async fn clear_one_event_leaves_others() {
    let bus = EventBus::new();
    let count = Arc::new(Mutex::new(0));
    let c = Arc::clone(&count);
    bus.subscribe(EventName::TaskCreated, Arc::new(move |_: &EventPayload| *c.lock() += 1));
    bus.subscribe(EventName::TaskStarted, Arc::new(|_: &EventPayload| {}));

    bus.clear(Some(EventName::TaskCreated));
    bus.emit(task_event()).await;
    assert_eq!(*count.lock(), 0);
}

#[tokio::test]
async fn a_panicking_handler_does_not_block_others() {
    let bus = EventBus::new();
    bus.subscribe(EventName::TaskCreated, Arc::new(|_: &EventPayload| panic!("boom")));

    let ran = Arc::new(Mutex::new(false));
    let r = Arc::clone(&ran);
    bus.subscribe(EventName::TaskCreated, Arc::new(move |_: &EventPayload| *r.lock() = true));

    bus.emit(task_event()).await;
    assert!(*ran.lock());
}

#[tokio::test]
async fn emit_with_no_subscribers_is_a_no_op() {
    let bus = EventBus::new();
    bus.emit(task_event()).await;
}

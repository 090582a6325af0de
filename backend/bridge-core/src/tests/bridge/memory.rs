use crate::bridge::{Bridge, HookCallback, MemoryBridge};
use crate::error::BridgeError;
use crate::ipc::CorrelationId;

use std::sync::Arc;

use parking_lot::Mutex;

fn recording_hook() -> (Arc<Mutex<Vec<(CorrelationId, String)>>>, HookCallback) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let hook: HookCallback = Arc::new(move |id, raw| sink.lock().push((id, raw)));
    (calls, hook)
}

/// **VALUE**: Triggering a bound hook hands it the correlation id and raw request.
#[test]
fn given_bound_hook_when_triggered_then_callback_receives_id_and_request() {
    let (bridge, _scripts) = MemoryBridge::new();
    let (calls, hook) = recording_hook();
    bridge.bind("invoke", hook).expect("bind");

    assert!(bridge.trigger("invoke", "req-1", r#"{"cmd":"a:b"}"#));
    assert!(!bridge.trigger("other", "req-2", "{}"));

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, CorrelationId::from("req-1"));
    assert_eq!(calls[0].1, r#"{"cmd":"a:b"}"#);
}

/// **VALUE**: A hook name can be bound only once.
#[test]
fn given_bound_hook_when_bound_again_then_bind_error() {
    let (bridge, _scripts) = MemoryBridge::new();
    let (_calls, hook) = recording_hook();
    bridge.bind("invoke", Arc::clone(&hook)).expect("first bind");

    let error = bridge.bind("invoke", hook).expect_err("second bind");

    assert!(matches!(error, BridgeError::Bind { .. }));
    assert!(bridge.is_bound("invoke"));
}

/// **VALUE**: Evaluated scripts reach the receiver in order; a dropped receiver is an eval error.
#[tokio::test]
async fn given_scripts_when_evaluated_then_delivered_in_order_until_receiver_drops() {
    let (bridge, mut scripts) = MemoryBridge::new();

    bridge.eval("first()").expect("eval");
    bridge.eval("second()").expect("eval");

    assert_eq!(scripts.recv().await.as_deref(), Some("first()"));
    assert_eq!(scripts.recv().await.as_deref(), Some("second()"));

    drop(scripts);
    assert!(matches!(bridge.eval("third()"), Err(BridgeError::Eval { .. })));
}

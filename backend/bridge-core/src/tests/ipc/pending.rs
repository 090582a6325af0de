use crate::error::IpcError;
use crate::ipc::{CorrelationId, PendingRequests, RequestPhase};

/// **VALUE**: A correlation id can be in flight only once.
///
/// **WHY THIS MATTERS**: Two live requests under one id would make the UI
/// unable to tell which response belongs to which call.
#[test]
fn given_pending_id_when_begun_again_then_duplicate_correlation() {
    let pending = PendingRequests::new();
    let id = CorrelationId::from("a");
    pending.begin(&id).expect("first begin");

    let error = pending.begin(&id).expect_err("second begin");

    assert!(matches!(error, IpcError::DuplicateCorrelation { ref correlation_id, .. } if correlation_id == "a"));
    assert_eq!(pending.len(), 1);
}

/// **VALUE**: Completion succeeds once; every later attempt is rejected.
///
/// **BUG THIS CATCHES**: Would catch a double completion delivering two
/// responses for one request.
#[test]
fn given_completed_id_when_completed_again_then_rejected() {
    let pending = PendingRequests::new();
    let id = CorrelationId::from(1_u64);
    pending.begin(&id).expect("begin");

    pending.complete(&id).expect("first completion wins");
    let error = pending.complete(&id).expect_err("second completion");

    assert!(matches!(error, IpcError::CompletionRejected { .. }));
    assert!(pending.is_empty());
}

/// **VALUE**: Phases only move forward, and `Completed` is reached only through `complete`.
#[test]
fn given_pending_request_when_advancing_then_phases_are_monotonic() {
    let pending = PendingRequests::new();
    let id = CorrelationId::from("p");
    pending.begin(&id).expect("begin");
    assert_eq!(pending.phase(&id), Some(RequestPhase::Received));

    assert!(pending.advance(&id, RequestPhase::Resolving));
    assert!(pending.advance(&id, RequestPhase::Invoking));
    assert!(!pending.advance(&id, RequestPhase::Resolving), "no going back");
    assert!(!pending.advance(&id, RequestPhase::Completed), "completion is claimed, not advanced to");
    assert_eq!(pending.phase(&id), Some(RequestPhase::Invoking));

    pending.complete(&id).expect("complete");
    assert_eq!(pending.phase(&id), None);
}

/// **VALUE**: Cancelling raises the flag the handler was given.
#[test]
fn given_pending_request_when_cancelled_then_its_flag_is_raised() {
    let pending = PendingRequests::new();
    let id = CorrelationId::from("slow");
    let flag = pending.begin(&id).expect("begin");

    assert!(!flag.is_cancelled());
    assert!(pending.cancel(&id));
    assert!(flag.is_cancelled());
    assert!(pending
        .cancellation_flag(&id)
        .is_some_and(|flag| flag.is_cancelled()));
    assert!(!pending.cancel(&CorrelationId::from("other")));
}

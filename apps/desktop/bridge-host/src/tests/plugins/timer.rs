use crate::plugins::TimerPlugin;
use crate::plugins::timer::ELAPSED_EVENT;
use crate::tests::fixtures::load;

use bridge_core::command::CancellationFlag;

use serde_json::json;
use tempfile::TempDir;
use tokio::time::{Duration, sleep};

/// **VALUE**: A finished timer returns its duration and announces it.
#[tokio::test]
async fn given_timer_when_sleep_finishes_then_elapsed_event_is_emitted() {
    // GIVEN: Timer plugin with an event recorder
    let dir = TempDir::new().expect("temp dir");
    let loaded = load(Box::new(TimerPlugin::new()), "", dir.path());
    let events = loaded.record_events();

    // WHEN: Sleeping briefly
    let result = loaded
        .call("timer:sleep", json!({ "ms": 20, "label": "tea" }))
        .await;

    // THEN: Duration returned and one event emitted
    assert_eq!(result, Ok(json!(20)));
    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name(), ELAPSED_EVENT);
    assert_eq!(events[0].payload(), &json!({ "label": "tea", "ms": 20 }));
}

/// **VALUE**: A raised cancellation flag ends the timer early without an event.
///
/// **BUG THIS CATCHES**: Would catch the handler ignoring the flag and
/// holding the request open for its full duration.
#[tokio::test]
async fn given_running_timer_when_cancelled_then_returns_early() {
    // GIVEN: A long timer with a cancellation flag
    let dir = TempDir::new().expect("temp dir");
    let loaded = load(Box::new(TimerPlugin::new()), "", dir.path());
    let events = loaded.record_events();
    let invoker = loaded.registry.resolve("timer:sleep").expect("command");
    let cancellation = CancellationFlag::new();

    // WHEN: Cancelling shortly after it starts
    let canceller = cancellation.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        invoker.invoke_with(&json!({ "ms": 30_000 }), cancellation),
    )
    .await
    .expect("timer should stop well before its deadline");

    // THEN: Handler error, no event
    assert_eq!(result.map_err(|e| e.message().to_string()), Err(String::from("timer cancelled")));
    assert!(events.lock().is_empty());
}

/// **VALUE**: Durations above `max_ms` are refused up front.
#[tokio::test]
async fn given_max_ms_setting_when_sleep_exceeds_it_then_handler_error() {
    // GIVEN: A 100 ms limit
    let dir = TempDir::new().expect("temp dir");
    let loaded = load(Box::new(TimerPlugin::new()), "[timer]\nmax_ms = 100\n", dir.path());

    // WHEN: Asking for longer
    let result = loaded.call("timer:sleep", json!({ "ms": 500 })).await;

    // THEN: Refused with the limit in the message
    assert_eq!(result, Err(String::from("500 ms exceeds the 100 ms limit")));
}

/// **VALUE**: An invalid setting fails the plugin's init instead of the host.
#[test]
fn given_zero_max_ms_when_loading_then_plugin_fails_init() {
    // GIVEN / WHEN: A zero limit
    let dir = TempDir::new().expect("temp dir");
    let loaded = load(Box::new(TimerPlugin::new()), "[timer]\nmax_ms = 0\n", dir.path());

    // THEN: Failed, and no command was merged
    assert_eq!(loaded.report.failed.len(), 1);
    assert!(!loaded.registry.contains("timer:sleep"));
}

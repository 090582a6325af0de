use crate::plugins::MathPlugin;
use crate::tests::fixtures::load;

use serde_json::json;
use tempfile::TempDir;

/// **VALUE**: Arithmetic commands answer, and division by zero is a handler error.
#[tokio::test]
async fn given_math_plugin_when_called_then_results_and_errors() {
    // GIVEN: Math plugin loaded without settings
    let dir = TempDir::new().expect("temp dir");
    let loaded = load(Box::new(MathPlugin::new()), "", dir.path());

    // WHEN / THEN: Each command
    assert_eq!(
        loaded.call("math:add", json!({ "a": 1.5, "b": 2 })).await,
        Ok(json!(3.5))
    );
    assert_eq!(
        loaded.call("math:multiply", json!([3, 4])).await,
        Ok(json!(12.0))
    );
    assert_eq!(
        loaded.call("math:sum", json!({ "values": [1, 2, 3.5] })).await,
        Ok(json!(6.5))
    );
    assert_eq!(
        loaded.call("math:divide", json!({ "a": 1, "b": 0 })).await,
        Err(String::from("division by zero"))
    );
}

/// **VALUE**: The `precision` setting rounds results.
#[tokio::test]
async fn given_precision_setting_when_dividing_then_result_is_rounded() {
    // GIVEN: Two digits of precision
    let dir = TempDir::new().expect("temp dir");
    let loaded = load(
        Box::new(MathPlugin::new()),
        "[math]\nprecision = 2\n",
        dir.path(),
    );

    // WHEN: Dividing into a repeating fraction
    let result = loaded.call("math:divide", json!({ "a": 1, "b": 3 })).await;

    // THEN: Rounded to two digits
    assert_eq!(result, Ok(json!(0.33)));
}

//! Page-side scripts the worker injects into the view.

use std::time::Duration;

/// Binding the heartbeat timer calls.
pub const HEARTBEAT_BINDING: &str = "__wvpipe_heartbeat";

/// Binding an `eval_value` wrapper reports through, with
/// `(status, id, value_or_message)`.
pub const EVAL_RESULT_BINDING: &str = "__wvpipe_eval_result";

const EVAL_WRAPPER_HEAD: &str = r#"(function (id, source) {
  var report = function (status, value) {
    window.__wvpipe_eval_result(status, id, value === undefined ? null : value);
  };
  try {
    Promise.resolve((0, eval)(source)).then(
      function (value) { report("success", value); },
      function (err) { report("error", String(err)); }
    );
  } catch (err) {
    report("error", String(err));
  }
"#;

const EVAL_WRAPPER_TAIL_PREFIX: &str = "})(";
const EVAL_WRAPPER_TAIL_SUFFIX: &str = ");";

/// Page-side timer calling [`HEARTBEAT_BINDING`] every `interval`.
///
/// Installing it twice in the same page is harmless.
pub fn heartbeat_script(interval: Duration) -> String {
    let millis = interval.as_millis().max(1);
    format!(
        "if (!window.__wvpipe_heartbeat_timer) {{\n  \
         window.__wvpipe_heartbeat_timer = setInterval(function () {{ window.{HEARTBEAT_BINDING}(); }}, {millis});\n}}"
    )
}

/// Wrap `source` so its outcome is reported through [`EVAL_RESULT_BINDING`].
///
/// Thrown errors and rejected promises report `"error"` with the stringified
/// error. The last line of the wrapper always carries the id and source as
/// JSON string literals; [`parse_eval_value_script`] reads them back.
pub fn eval_value_script(source: &str, id: &str) -> String {
    let id = serde_json::Value::from(id);
    let source = serde_json::Value::from(source);
    format!("{EVAL_WRAPPER_HEAD}{EVAL_WRAPPER_TAIL_PREFIX}{id}, {source}{EVAL_WRAPPER_TAIL_SUFFIX}")
}

/// Recover `(id, source)` from a script built by [`eval_value_script`].
pub fn parse_eval_value_script(script: &str) -> Option<(String, String)> {
    if !script.starts_with(EVAL_WRAPPER_HEAD) {
        return None;
    }
    let last = script.lines().last()?;
    let inner = last
        .strip_prefix(EVAL_WRAPPER_TAIL_PREFIX)?
        .strip_suffix(EVAL_WRAPPER_TAIL_SUFFIX)?;
    let [id, source]: [String; 2] = serde_json::from_str(&format!("[{inner}]")).ok()?;
    Some((id, source))
}

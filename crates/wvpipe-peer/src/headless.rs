//! A [`NativeView`] without a window.
//!
//! Records every operation, drives the heartbeat from a native timer and
//! answers `eval_value` wrappers itself. It understands JSON literals and
//! integer sums such as `1+1`; anything else resolves as an error.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use crate::script::{self, EVAL_RESULT_BINDING, HEARTBEAT_BINDING};
use crate::view::{Binding, NativeView, ResizeHint, ViewError};

const IDLE_TICK: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct HeadlessView {
    url: Option<String>,
    title: Option<String>,
    size: Option<(u32, u32, ResizeHint)>,
    init_scripts: Vec<String>,
    evaluated: Vec<String>,
    bindings: HashMap<String, Binding>,
    heartbeat_interval: Option<Duration>,
    running: bool,
    stop_requested: bool,
    destroyed: bool,
}

impl HeadlessView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn size(&self) -> Option<(u32, u32, ResizeHint)> {
        self.size
    }

    /// Scripts registered with `init`, in order.
    pub fn init_scripts(&self) -> &[String] {
        &self.init_scripts
    }

    /// Scripts passed to `eval`, in order, including `eval_value` wrappers.
    pub fn evaluated(&self) -> &[String] {
        &self.evaluated
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Call the binding registered under `name` as page script would.
    ///
    /// Returns `false` when nothing is bound under that name.
    pub fn invoke(&mut self, name: &str, args: Vec<Value>) -> Result<bool, ViewError> {
        self.check_live()?;
        let Some(mut binding) = self.bindings.remove(name) else {
            return Ok(false);
        };
        let view: &mut dyn NativeView = self;
        binding(view, args);
        // A binding may have destroyed the view; only restore into a live one.
        if !self.destroyed {
            self.bindings.entry(name.to_string()).or_insert(binding);
        }
        Ok(true)
    }

    fn check_live(&self) -> Result<(), ViewError> {
        if self.destroyed {
            Err(ViewError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn resolve_eval_value(&mut self, id: String, source: &str) -> Result<(), ViewError> {
        let (status, value) = match evaluate(source) {
            Ok(value) => ("success", value),
            Err(message) => ("error", Value::String(message)),
        };
        debug!(%id, status, "resolved eval_value");
        let invoked = self.invoke(
            EVAL_RESULT_BINDING,
            vec![Value::from(status), Value::String(id), value],
        )?;
        if !invoked {
            trace!("eval_value resolved with no result binding installed");
        }
        Ok(())
    }
}

fn evaluate(source: &str) -> Result<Value, String> {
    let source = source.trim();
    if let Ok(value) = serde_json::from_str::<Value>(source) {
        return Ok(value);
    }

    let mut total: i64 = 0;
    for term in source.split('+') {
        let term = term
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("EvalError: headless view cannot evaluate {source:?}"))?;
        total = total
            .checked_add(term)
            .ok_or_else(|| format!("RangeError: {source:?} overflows"))?;
    }
    Ok(Value::from(total))
}

impl NativeView for HeadlessView {
    fn navigate(&mut self, url: &str) -> Result<(), ViewError> {
        self.check_live()?;
        self.url = Some(url.to_string());
        Ok(())
    }

    fn set_title(&mut self, title: &str) -> Result<(), ViewError> {
        self.check_live()?;
        self.title = Some(title.to_string());
        Ok(())
    }

    fn set_size(&mut self, width: u32, height: u32, hint: ResizeHint) -> Result<(), ViewError> {
        self.check_live()?;
        self.size = Some((width, height, hint));
        Ok(())
    }

    fn init(&mut self, source: &str) -> Result<(), ViewError> {
        self.check_live()?;
        self.init_scripts.push(source.to_string());
        Ok(())
    }

    fn eval(&mut self, source: &str) -> Result<(), ViewError> {
        self.check_live()?;
        self.evaluated.push(source.to_string());
        if let Some((id, inner)) = script::parse_eval_value_script(source) {
            self.resolve_eval_value(id, &inner)?;
        }
        Ok(())
    }

    fn bind(&mut self, name: &str, binding: Binding) -> Result<(), ViewError> {
        self.check_live()?;
        if name.is_empty() {
            return Err(ViewError::Bind {
                name: name.to_string(),
                reason: "empty name".to_string(),
            });
        }
        if self.bindings.contains_key(name) {
            return Err(ViewError::Bind {
                name: name.to_string(),
                reason: "already bound".to_string(),
            });
        }
        self.bindings.insert(name.to_string(), binding);
        Ok(())
    }

    fn run(&mut self) -> Result<(), ViewError> {
        self.check_live()?;
        self.running = true;
        self.stop_requested = false;
        debug!("headless event loop started");

        while !self.stop_requested && !self.destroyed {
            thread::sleep(self.heartbeat_interval.unwrap_or(IDLE_TICK));
            if self.heartbeat_interval.is_some() {
                self.invoke(HEARTBEAT_BINDING, Vec::new())?;
            }
        }

        self.running = false;
        self.stop_requested = false;
        debug!("headless event loop returned");
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), ViewError> {
        self.check_live()?;
        if self.running {
            self.stop_requested = true;
        }
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), ViewError> {
        self.check_live()?;
        self.destroyed = true;
        self.bindings.clear();
        Ok(())
    }

    fn install_heartbeat(&mut self, interval: Duration, binding: Binding) -> Result<(), ViewError> {
        self.check_live()?;
        self.bindings.insert(HEARTBEAT_BINDING.to_string(), binding);
        self.heartbeat_interval = Some(interval.max(Duration::from_millis(1)));
        Ok(())
    }
}

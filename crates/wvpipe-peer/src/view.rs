//! The native webview seam.
//!
//! The worker never talks to a GUI toolkit directly; it drives anything that
//! implements [`NativeView`]. Bindings receive the view back as
//! `&mut dyn NativeView` so a callback fired from inside [`NativeView::run`]
//! can issue further view operations without holding a second borrow.

use std::time::Duration;

use serde_json::Value;

use crate::script;

/// Callback registered under a JS-visible name.
pub type Binding = Box<dyn FnMut(&mut dyn NativeView, Vec<Value>)>;

/// Window resize behaviour passed to `set_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeHint {
    /// Freely resizable.
    #[default]
    None,
    /// Width and height are a minimum.
    Min,
    /// Width and height are a maximum.
    Max,
    /// Not resizable.
    Fixed,
}

impl ResizeHint {
    /// Hint for a boolean "resizable" option.
    pub fn from_resizable(resizable: bool) -> Self {
        if resizable {
            ResizeHint::None
        } else {
            ResizeHint::Fixed
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ResizeHint::None => 0,
            ResizeHint::Min => 1,
            ResizeHint::Max => 2,
            ResizeHint::Fixed => 3,
        }
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ResizeHint::None),
            1 => Some(ResizeHint::Min),
            2 => Some(ResizeHint::Max),
            3 => Some(ResizeHint::Fixed),
            _ => None,
        }
    }
}

/// Errors reported by a native view backend.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// An operation reached a view that has already been destroyed.
    #[error("native view has been destroyed")]
    Destroyed,

    /// A binding name is empty or already taken.
    #[error("cannot bind {name:?}: {reason}")]
    Bind { name: String, reason: String },

    /// The backend failed to carry out an operation.
    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
}

/// Operations a native webview must support.
pub trait NativeView {
    fn navigate(&mut self, url: &str) -> Result<(), ViewError>;
    fn set_title(&mut self, title: &str) -> Result<(), ViewError>;
    fn set_size(&mut self, width: u32, height: u32, hint: ResizeHint) -> Result<(), ViewError>;

    /// Inject `source` so it runs before `window.onload` of every later page.
    fn init(&mut self, source: &str) -> Result<(), ViewError>;

    /// Evaluate `source` in the current page, discarding the result.
    fn eval(&mut self, source: &str) -> Result<(), ViewError>;

    /// Expose `binding` to page scripts as `window[name]`.
    fn bind(&mut self, name: &str, binding: Binding) -> Result<(), ViewError>;

    /// Block in the native event loop until [`NativeView::terminate`] is called.
    fn run(&mut self) -> Result<(), ViewError>;

    /// Ask a running event loop to return. Safe to call when not running.
    fn terminate(&mut self) -> Result<(), ViewError>;

    /// Release native resources. Every later operation fails with
    /// [`ViewError::Destroyed`].
    fn destroy(&mut self) -> Result<(), ViewError>;

    /// Arrange for `binding` to be called roughly every `interval` while the
    /// event loop runs.
    ///
    /// The default binds a native function and installs a page-side
    /// `setInterval` that calls it, both for the current page and for every
    /// page loaded later. Backends with a native timer may override this.
    fn install_heartbeat(&mut self, interval: Duration, binding: Binding) -> Result<(), ViewError> {
        self.bind(script::HEARTBEAT_BINDING, binding)?;
        let source = script::heartbeat_script(interval);
        self.init(&source)?;
        self.eval(&source)
    }
}

/// Creates native views on demand.
pub trait ViewFactory {
    type View: NativeView;

    fn create(&mut self) -> Result<Self::View, ViewError>;
}

impl<V, F> ViewFactory for F
where
    V: NativeView,
    F: FnMut() -> Result<V, ViewError>,
{
    type View = V;

    fn create(&mut self) -> Result<V, ViewError> {
        self()
    }
}

//! # Application action callbacks.
//!
//! [`ActionCallback`] is implemented by application code; [`CallbackFn`] adapts a closure.
//!
//! Callbacks never run on an engine-internal shared thread: each interactive widget with
//! a callback gets a dedicated bounded queue and worker task (see the action router), so a
//! slow or panicking callback only stalls its own widget.
//!
//! ## Example
//! ```rust
//! use livedash::{ActionEvent, CallbackError, CallbackFn, CallbackRef};
//!
//! let cb: CallbackRef = CallbackFn::arc("speed", |ev: ActionEvent| async move {
//!     if ev.action.is_none() {
//!         return Ok(()); // activity notice
//!     }
//!     Ok::<_, CallbackError>(())
//! });
//! assert_eq!(cb.name(), "speed");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::ActionEvent;
use crate::error::CallbackError;

/// Shared callback handle.
pub type CallbackRef = Arc<dyn ActionCallback>;

/// Handler for actions on one interactive widget.
#[async_trait]
pub trait ActionCallback: Send + Sync + 'static {
    /// Handles one action delivery or activity notice.
    ///
    /// Errors and panics are reported as `CallbackFailed` events;
    /// the worker keeps serving subsequent deliveries.
    async fn on_action(&self, event: ActionEvent) -> Result<(), CallbackError>;

    /// Name used in logs and events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity; `None` uses `EngineConfig::action_queue_capacity`.
    fn queue_capacity(&self) -> Option<usize> {
        None
    }
}

/// Closure-backed callback.
#[derive(Debug)]
pub struct CallbackFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> CallbackFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the callback and returns it as a shared handle.
    pub fn arc<Fut>(name: impl Into<Cow<'static, str>>, f: F) -> CallbackRef
    where
        F: Fn(ActionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> ActionCallback for CallbackFn<F>
where
    F: Fn(ActionEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    async fn on_action(&self, event: ActionEvent) -> Result<(), CallbackError> {
        (self.f)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

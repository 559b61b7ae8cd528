//! # Process-level convenience slot.
//!
//! Engines are ordinary values; nothing requires a global. For host bindings that expect
//! module-level `install()` / `uninstall()` calls, this module keeps at most one engine in
//! a process-wide slot.
//!
//! ```rust
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), livedash::EngineError> {
//!     let engine = livedash::install(livedash::EngineConfig::default())?;
//!     assert!(livedash::installed().is_some());
//!     engine.register("up", livedash::WidgetDescriptor::of(livedash::WidgetKind::Switch))?;
//!
//!     assert!(livedash::uninstall().await);
//!     assert!(engine.is_shut_down());
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};

use crate::core::{Engine, EngineBuilder, EngineConfig, lock};
use crate::error::Result;

static INSTALLED: Mutex<Option<Arc<Engine>>> = Mutex::new(None);

/// Builds and installs an engine, or returns the one already installed (`cfg` is then
/// ignored).
pub fn install(cfg: EngineConfig) -> Result<Arc<Engine>> {
    let mut slot = lock::lock(&INSTALLED);
    if let Some(engine) = slot.as_ref().filter(|e| !e.is_shut_down()) {
        return Ok(Arc::clone(engine));
    }
    let engine = EngineBuilder::new(cfg).build()?;
    *slot = Some(Arc::clone(&engine));
    tracing::debug!("engine installed");
    Ok(engine)
}

/// The installed engine, if any.
pub fn installed() -> Option<Arc<Engine>> {
    lock::lock(&INSTALLED).clone()
}

/// Shuts the installed engine down and clears the slot. Returns `false` if none was
/// installed.
pub async fn uninstall() -> bool {
    let engine = lock::lock(&INSTALLED).take();
    match engine {
        Some(engine) => {
            engine.shutdown().await;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_is_idempotent_until_uninstall() {
        let a = install(EngineConfig::default()).unwrap();
        let b = install(EngineConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        assert!(uninstall().await);
        assert!(a.is_shut_down());
        assert!(!uninstall().await);
        assert!(installed().is_none());

        let c = install(EngineConfig::default()).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(uninstall().await);
    }
}

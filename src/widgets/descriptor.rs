use std::fmt;

use crate::actions::CallbackRef;
use crate::error::EngineError;
use crate::widgets::{Options, WidgetConfig, WidgetKind};

/// What to register at a path: a typed config and, for interactive kinds, a callback.
///
/// Registering a descriptor whose kind differs from the registered one fails with
/// `DuplicatePath`; same kind with another config is a config update.
#[derive(Clone)]
pub struct WidgetDescriptor {
    pub config: WidgetConfig,
    pub callback: Option<CallbackRef>,
}

impl WidgetDescriptor {
    pub fn new(config: WidgetConfig) -> Self {
        Self {
            config,
            callback: None,
        }
    }

    /// Default config for `kind`.
    pub fn of(kind: WidgetKind) -> Self {
        Self::new(WidgetConfig::default_for(kind))
    }

    /// Parses loose options into a descriptor (see [`WidgetConfig::from_options`]).
    pub fn from_options(kind: WidgetKind, opts: &Options) -> Result<Self, EngineError> {
        WidgetConfig::from_options(kind, opts).map(Self::new)
    }

    /// Attaches an action callback.
    #[must_use]
    pub fn with_callback(mut self, callback: CallbackRef) -> Self {
        self.callback = Some(callback);
        self
    }

    #[inline]
    pub fn kind(&self) -> WidgetKind {
        self.config.kind()
    }

    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        self.config.validate()?;
        if self.callback.is_some() && !self.kind().is_interactive() {
            return Err(EngineError::invalid_config(
                self.kind(),
                "only interactive widgets accept an action callback",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for WidgetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetDescriptor")
            .field("config", &self.config)
            .field("callback", &self.callback.as_ref().map(|c| c.name()))
            .finish()
    }
}

#![forbid(unsafe_code)]

//! Observer configuration.
//!
//! # Environment overrides
//!
//! [`DirtyCheckSettings::from_env`] applies these on top of the defaults:
//!
//! | Variable | Values |
//! |----------|--------|
//! | `FTUI_DIRTY_CHECK_MODE` | `warn`, `throw`, `silent` |
//! | `FTUI_DIRTY_CHECK_DISABLED` | `1` / `true` |
//! | `FTUI_DIRTY_CHECK_FRAMES` | frames between checks (minimum 1) |
//!
//! Unparseable values are ignored.

use std::env;
use std::str::FromStr;

/// What happens when a property falls back to dirty checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyCheckMode {
    /// Log a warning once per property.
    #[default]
    Warn,
    /// Refuse with [`ObserveError::DirtyCheckEngaged`](crate::ObserveError::DirtyCheckEngaged).
    Throw,
    /// Poll without logging.
    Silent,
}

impl FromStr for DirtyCheckMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "throw" => Ok(Self::Throw),
            "silent" => Ok(Self::Silent),
            _ => Err(()),
        }
    }
}

/// Polling fallback settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyCheckSettings {
    /// Refuse to poll; unobservable properties become errors.
    ///
    /// Default: false.
    pub disabled: bool,

    /// Default: [`DirtyCheckMode::Warn`].
    pub mode: DirtyCheckMode,

    /// Rendered frames between two polls.
    ///
    /// Default: 6.
    pub frames_per_check: u32,
}

impl Default for DirtyCheckSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            mode: DirtyCheckMode::Warn,
            frames_per_check: 6,
        }
    }
}

impl DirtyCheckSettings {
    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(val) = env::var("FTUI_DIRTY_CHECK_MODE")
            && let Ok(mode) = val.parse()
        {
            settings.mode = mode;
        }
        if let Ok(val) = env::var("FTUI_DIRTY_CHECK_DISABLED") {
            settings.disabled = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = env::var("FTUI_DIRTY_CHECK_FRAMES")
            && let Ok(n) = val.parse::<u32>()
        {
            settings.frames_per_check = n.max(1);
        }
        settings
    }

    #[must_use]
    pub fn with_mode(mut self, mode: DirtyCheckMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    #[must_use]
    pub fn with_frames_per_check(mut self, frames: u32) -> Self {
        self.frames_per_check = frames.max(1);
        self
    }
}

/// Configuration for an [`ObserverLocator`](crate::ObserverLocator).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserverConfig {
    pub dirty_check: DirtyCheckSettings,
}

impl ObserverConfig {
    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            dirty_check: DirtyCheckSettings::from_env(),
        }
    }

    #[must_use]
    pub fn with_dirty_check(mut self, settings: DirtyCheckSettings) -> Self {
        self.dirty_check = settings;
        self
    }
}

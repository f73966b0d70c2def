//! Log setup for hosts and the `discon-wrapper` binary.
//!
//! Debug levels: `0` logs only warnings and errors, `1` adds load/unload
//! activity, `2` adds every call with the payload before and after.
//! `RUST_LOG` overrides the level when set.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DebugLevel {
    #[default]
    Disabled,
    Basic,
    Verbose,
}

impl DebugLevel {
    /// `tracing` filter directive for this crate at this level.
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Disabled => "warn",
            Self::Basic => "debug",
            Self::Verbose => "trace",
        }
    }
}

impl TryFrom<u8> for DebugLevel {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Basic),
            2 => Ok(Self::Verbose),
            other => Err(format!("debug level {other} is not one of 0, 1, 2")),
        }
    }
}

impl From<DebugLevel> for u8 {
    fn from(level: DebugLevel) -> Self {
        level as u8
    }
}

/// Build the filter for `level`, preferring `RUST_LOG` when it is set.
#[must_use]
pub fn filter(level: DebugLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,discon_wrapper={}", level.directive())))
}

/// Install a global subscriber writing to stderr.
///
/// Fails if a global subscriber is already installed.
pub fn init(level: DebugLevel) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_from_numbers() {
        assert_eq!(DebugLevel::try_from(0), Ok(DebugLevel::Disabled));
        assert_eq!(DebugLevel::try_from(1), Ok(DebugLevel::Basic));
        assert_eq!(DebugLevel::try_from(2), Ok(DebugLevel::Verbose));
        assert!(DebugLevel::try_from(3).is_err());
        assert_eq!(u8::from(DebugLevel::Verbose), 2);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(DebugLevel::Verbose > DebugLevel::Basic);
        assert_eq!(DebugLevel::Basic.directive(), "debug");
    }
}

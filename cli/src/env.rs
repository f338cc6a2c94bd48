//! Runtime environment detection.
//!
//! Single source of truth for the runtime environment, read from the
//! `TMS_ENV` environment variable.
//!
//! Set `TMS_ENV` to one of:
//! - `test` - Test mode (config in the repo's `tmp/`, no interactive prompts)
//! - `development` or `dev` - Development mode (localhost defaults)
//! - (anything else or unset) - Production mode

/// Runtime environment for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment - never prompts, keeps state under `tmp/`.
    Test,
}

impl Environment {
    /// Detect current environment from `TMS_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::var("TMS_ENV").ok().as_deref())
    }

    /// Map a raw `TMS_ENV` value to an environment.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Returns `true` if this is the development environment.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Convenience check for `TMS_ENV=test`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}

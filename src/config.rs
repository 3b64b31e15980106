//! Pool, session and appender options
//!
//! Plain values with defaults and builder-style setters. Nothing here is read
//! from files or the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection pool sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of connections the pool holds
    pub size: usize,
    /// Give up waiting for an idle connection after this long; `None` blocks
    pub acquire_timeout: Option<Duration>,
    /// Options every pooled session is opened with
    pub session: SessionOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 4,
            acquire_timeout: None,
            session: SessionOptions::default(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }
}

/// Session toggles handed to the connection opener as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub compress: bool,
    pub pickle: bool,
    pub enable_high_availability: bool,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn pickled(mut self) -> Self {
        self.pickle = true;
        self
    }

    pub fn high_availability(mut self) -> Self {
        self.enable_high_availability = true;
        self
    }
}

/// Appender behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppenderConfig {
    /// Dispatch partition sub-tables concurrently
    pub parallel_dispatch: bool,
    /// Prefix of the server variables frames are uploaded to
    pub upload_variable_prefix: String,
}

impl Default for AppenderConfig {
    fn default() -> Self {
        Self {
            parallel_dispatch: true,
            upload_variable_prefix: "colwire_append".to_string(),
        }
    }
}

impl AppenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequential(mut self) -> Self {
        self.parallel_dispatch = false;
        self
    }

    pub fn with_variable_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.upload_variable_prefix = prefix.into();
        self
    }
}

//! Project configuration, validation, and error types.
//!
//! [`ProjectConfig`] is the builder-input for [`Project::new`](crate::Project::new).
//! [`validate()`](ProjectConfig::validate) checks it against the bound
//! simulation package before any thread is spawned.

use braid_core::StepProfile;
use thiserror::Error;

// ── CruncherKind ─────────────────────────────────────────────────

/// The two worker flavours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CruncherKind {
    /// Worker thread sharing the tree; reads history through a browser.
    /// Required for history-dependent simulation packages.
    Thread,
    /// Worker thread that owns a private copy of its starting state and
    /// talks to the controller only through channels.
    Isolated,
}

// ── ConfigError ──────────────────────────────────────────────────

/// Errors detected during [`ProjectConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// History-dependent steps need to read the shared tree.
    #[error("simpack '{simpack}' is history-dependent and cannot use isolated crunchers")]
    HistoryNeedsThread {
        /// Simpack name.
        simpack: String,
    },
    /// Worker threads need a name prefix.
    #[error("thread_name_prefix must not be empty")]
    EmptyThreadNamePrefix,
    /// Shutdown needs a non-zero grace period.
    #[error("shutdown_grace_ms must be at least 1")]
    ZeroShutdownGrace,
}

// ── ProjectConfig ────────────────────────────────────────────────

/// Configuration for a [`Project`](crate::Project).
#[derive(Clone, Debug)]
pub struct ProjectConfig {
    /// Cruncher flavour. `None` picks [`CruncherKind::Thread`] for
    /// history-dependent packages and [`CruncherKind::Isolated`]
    /// otherwise.
    pub preferred_cruncher: Option<CruncherKind>,
    /// Step profile used when neither the caller nor the frontier node
    /// names one. `None` falls back to the simpack's default.
    pub default_step_profile: Option<StepProfile>,
    /// Prefix for worker thread names. Default: `"braid-cruncher"`.
    pub thread_name_prefix: String,
    /// Milliseconds shutdown waits for retired workers before detaching
    /// them. Default: 500.
    pub shutdown_grace_ms: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            preferred_cruncher: None,
            default_step_profile: None,
            thread_name_prefix: "braid-cruncher".to_string(),
            shutdown_grace_ms: 500,
        }
    }
}

impl ProjectConfig {
    /// Validate against a simulation package.
    pub fn validate(&self, simpack_name: &str, history_dependent: bool) -> Result<(), ConfigError> {
        if history_dependent && self.preferred_cruncher == Some(CruncherKind::Isolated) {
            return Err(ConfigError::HistoryNeedsThread {
                simpack: simpack_name.to_string(),
            });
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::EmptyThreadNamePrefix);
        }
        if self.shutdown_grace_ms == 0 {
            return Err(ConfigError::ZeroShutdownGrace);
        }
        Ok(())
    }

    /// The cruncher flavour to use for a package.
    pub fn resolved_cruncher(&self, history_dependent: bool) -> CruncherKind {
        match (self.preferred_cruncher, history_dependent) {
            (_, true) => CruncherKind::Thread,
            (Some(kind), false) => kind,
            (None, false) => CruncherKind::Isolated,
        }
    }
}

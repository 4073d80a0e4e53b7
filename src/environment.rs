//! Host environment probes consumed opportunistically by the handler.
//!
//! The handler asks the host four questions (production mode, interactive
//! session, current location, user agent) and, for critical errors, may ask
//! it to surface a message on its default error channel. Any answer may be
//! "not available"; nothing in the handler depends on one being present.
//!
//! - [`ProcessEnvironment`]: the default for native processes
//! - [`FixedEnvironment`]: explicitly configured by an embedding host or a test

use crate::HandledError;
use std::io::IsTerminal;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Environment variable selecting production mode (`production`, any case).
pub const ENV_MODE_VAR: &str = "QUOTEFAST_ENV";

/// Environment variable carrying the current location in interactive sessions.
pub const ENV_URL_VAR: &str = "QUOTEFAST_CURRENT_URL";

/// Probes into the host the handler runs in.
pub trait Environment: Send + Sync {
    /// Whether critical errors should be forwarded to the reporter.
    fn is_production(&self) -> bool;

    /// Whether a human is attached to this host.
    fn is_interactive(&self) -> bool;

    /// Current location, when the host has one.
    fn current_url(&self) -> Option<String>;

    /// Host user agent, when the host has one.
    fn user_agent(&self) -> Option<String>;

    /// Write `message` to the host's default error channel.
    fn surface_error(&self, message: &str, error: &HandledError);
}

// ============================================================================
// Process Environment
// ============================================================================

/// Environment of a native process.
///
/// Mode is read once at construction from [`ENV_MODE_VAR`]. The process
/// counts as interactive when stderr is a terminal; only then are a user
/// agent (`quotefast_errors/<version> (<os>)`) and the URL from
/// [`ENV_URL_VAR`] reported.
#[derive(Debug, Clone)]
pub struct ProcessEnvironment {
    production: bool,
    interactive: bool,
    url: Option<String>,
}

impl ProcessEnvironment {
    /// Probe the current process.
    pub fn detect() -> Self {
        let production = std::env::var(ENV_MODE_VAR)
            .map(|mode| mode.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let interactive = std::io::stderr().is_terminal();
        let url = if interactive {
            std::env::var(ENV_URL_VAR).ok().filter(|u| !u.is_empty())
        } else {
            None
        };
        Self {
            production,
            interactive,
            url,
        }
    }

    /// Process-wide instance, probed on first use.
    pub fn shared() -> &'static ProcessEnvironment {
        static SHARED: OnceLock<ProcessEnvironment> = OnceLock::new();
        SHARED.get_or_init(Self::detect)
    }
}

impl Default for ProcessEnvironment {
    fn default() -> Self {
        Self::detect()
    }
}

impl Environment for ProcessEnvironment {
    fn is_production(&self) -> bool {
        self.production
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn current_url(&self) -> Option<String> {
        self.url.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.interactive.then(|| {
            format!(
                "{}/{} ({})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS
            )
        })
    }

    fn surface_error(&self, message: &str, _error: &HandledError) {
        eprintln!("{message}");
    }
}

// ============================================================================
// Fixed Environment
// ============================================================================

/// Environment whose answers are set up front.
///
/// Useful for hosts that know their own request URL or user agent (an
/// embedding web server) and for tests. Surfaced messages are recorded and
/// can be read back with [`surfaced`](Self::surfaced).
///
/// ```rust
/// use quotefast_errors::{Environment, FixedEnvironment};
///
/// let env = FixedEnvironment::new()
///     .production(true)
///     .interactive("Mozilla/5.0", "https://app.example/quotes");
///
/// assert!(env.is_production());
/// assert_eq!(env.user_agent().as_deref(), Some("Mozilla/5.0"));
/// ```
#[derive(Debug, Default)]
pub struct FixedEnvironment {
    production: bool,
    interactive: bool,
    user_agent: Option<String>,
    url: Option<String>,
    surfaced: Mutex<Vec<String>>,
}

impl FixedEnvironment {
    /// Non-production, non-interactive host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set production mode.
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Mark the host interactive with the given user agent and location.
    pub fn interactive(mut self, user_agent: impl Into<String>, url: impl Into<String>) -> Self {
        self.interactive = true;
        self.user_agent = Some(user_agent.into());
        self.url = Some(url.into());
        self
    }

    /// Messages passed to [`Environment::surface_error`] so far.
    pub fn surfaced(&self) -> Vec<String> {
        self.lock_surfaced().clone()
    }

    fn lock_surfaced(&self) -> MutexGuard<'_, Vec<String>> {
        match self.surfaced.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Environment for FixedEnvironment {
    fn is_production(&self) -> bool {
        self.production
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn current_url(&self) -> Option<String> {
        self.url.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn surface_error(&self, message: &str, _error: &HandledError) {
        self.lock_surfaced().push(message.to_owned());
    }
}

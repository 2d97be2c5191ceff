//! Server/client environment detection.
//!
//! The probe runs once per process. On the server path there is no activation
//! machinery at all: wrapped content renders inside its static container.

use std::sync::OnceLock;

static CLIENT_ENVIRONMENT: OnceLock<bool> = OnceLock::new();

/// The execution context picked by [`Environment::current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
	/// Rendering on the server (or any context without a browser window).
	Server,
	/// Running in a browser with a DOM.
	Client,
}

impl Environment {
	/// Returns the environment of the running process.
	pub fn current() -> Self {
		if is_client_environment() {
			Self::Client
		} else {
			Self::Server
		}
	}

	/// Returns true for [`Environment::Client`].
	pub fn is_client(self) -> bool {
		matches!(self, Self::Client)
	}
}

/// Returns true when a browser window is available.
///
/// Evaluated on first call and cached for the lifetime of the process.
pub fn is_client_environment() -> bool {
	*CLIENT_ENVIRONMENT.get_or_init(probe)
}

#[cfg(target_arch = "wasm32")]
fn probe() -> bool {
	web_sys::window().is_some()
}

#[cfg(not(target_arch = "wasm32"))]
fn probe() -> bool {
	false
}

//! Error types for deferred hydration.
//!
//! The scheduler itself never fails: a missing browser capability is routed to
//! its documented fallback. Errors only come from configuration parsing and
//! from a rejected `on_before` precondition.

use thiserror::Error;

/// Errors produced while configuring or activating a deferred unit.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HydrationError {
	/// The options failed validation or could not be deserialized.
	#[error("invalid hydration options: {0}")]
	InvalidOptions(String),
	/// A trigger specification could not be parsed.
	#[error("invalid trigger '{trigger}': {reason}")]
	InvalidTrigger {
		/// The offending trigger as written.
		trigger: String,
		/// Why it was rejected.
		reason: String,
	},
	/// The `on_before` precondition rejected.
	#[error("hydration precondition failed: {0}")]
	PreconditionFailed(String),
}

impl HydrationError {
	/// Creates a [`HydrationError::PreconditionFailed`] from any displayable value.
	pub fn precondition(reason: impl std::fmt::Display) -> Self {
		Self::PreconditionFailed(reason.to_string())
	}

	pub(crate) fn invalid_trigger(trigger: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidTrigger {
			trigger: trigger.into(),
			reason: reason.into(),
		}
	}
}

impl From<serde_json::Error> for HydrationError {
	fn from(error: serde_json::Error) -> Self {
		Self::InvalidOptions(error.to_string())
	}
}

/// Outcome of rendering a content unit that did not produce markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
	/// The content is not ready yet. A surrounding [`Suspense`](crate::Suspense)
	/// shows its fallback instead.
	#[error("content is not ready yet")]
	Pending,
	/// Rendering failed and the failure must reach the enclosing renderer.
	#[error(transparent)]
	Failed(#[from] HydrationError),
}

impl RenderError {
	/// Returns true for the "not yet ready" signal.
	pub fn is_pending(&self) -> bool {
		matches!(self, Self::Pending)
	}
}

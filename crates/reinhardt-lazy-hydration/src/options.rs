//! Per-unit configuration.
//!
//! Options are either built in code:
//!
//! ```ignore
//! let options = HydrationOptions::new("comments")
//!     .trigger(TriggerSpec::visible())
//!     .trigger(TriggerSpec::event("pointerenter"))
//!     .wrapper_attribute("class", "comments");
//! ```
//!
//! or loaded from JSON, where the short aliases are accepted as well:
//!
//! ```ignore
//! let options = HydrationOptions::from_json(r#"{"id": "a", "on": [["delay", 1000]]}"#)?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::Deserialize;

use crate::error::HydrationError;
use crate::trigger::TriggerSpec;

/// Attributes forwarded verbatim to the container element.
pub type WrapperAttributes = BTreeMap<String, String>;

/// Asynchronous precondition awaited before activation.
pub type BeforeHydrate = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<(), HydrationError>>>;

/// Configuration of one deferred unit. Immutable once the unit is created.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationOptions {
	/// Id shared by the server container and the client placeholder.
	pub id: String,
	/// Triggers, started in order.
	#[serde(default, alias = "on")]
	pub triggers: Vec<TriggerSpec>,
	/// Awaited after a trigger fires and before the unit becomes active.
	#[serde(skip)]
	pub on_before: Option<BeforeHydrate>,
	/// Activate eagerly when no user input is pending.
	#[serde(default, alias = "whenInputPending")]
	pub input_pending_aware: bool,
	/// Input-pending answer assumed when the probe is unavailable. The default
	/// `true` means "assume input is pending", which blocks eager activation.
	#[serde(default = "default_true", alias = "isInputPendingFallbackValue")]
	pub input_pending_fallback: bool,
	/// Drop the captured markup from the fallback shown while active content
	/// is still pending.
	#[serde(default)]
	pub disable_fallback: bool,
	/// Forwarded to the container element.
	#[serde(default, alias = "wrapperProps")]
	pub wrapper_attributes: WrapperAttributes,
}

fn default_true() -> bool {
	true
}

impl HydrationOptions {
	/// Options for the container with `id` and no triggers.
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			triggers: Vec::new(),
			on_before: None,
			input_pending_aware: false,
			input_pending_fallback: true,
			disable_fallback: false,
			wrapper_attributes: WrapperAttributes::new(),
		}
	}

	/// Parses and validates options from JSON.
	pub fn from_json(json: &str) -> Result<Self, HydrationError> {
		let options: Self = serde_json::from_str(json)?;
		options.validate()?;
		Ok(options)
	}

	/// Appends a trigger.
	pub fn trigger(mut self, trigger: TriggerSpec) -> Self {
		self.triggers.push(trigger);
		self
	}

	/// Appends several triggers.
	pub fn triggers(mut self, triggers: impl IntoIterator<Item = TriggerSpec>) -> Self {
		self.triggers.extend(triggers);
		self
	}

	/// Sets the precondition awaited before activation.
	pub fn on_before<F, Fut>(mut self, before: F) -> Self
	where
		F: Fn() -> Fut + 'static,
		Fut: Future<Output = Result<(), HydrationError>> + 'static,
	{
		self.on_before = Some(Rc::new(move || before().boxed_local()));
		self
	}

	/// Enables eager activation when no user input is pending.
	pub fn input_pending_aware(mut self, aware: bool) -> Self {
		self.input_pending_aware = aware;
		self
	}

	/// Sets the answer assumed when the input-pending probe is unavailable.
	pub fn input_pending_fallback(mut self, fallback: bool) -> Self {
		self.input_pending_fallback = fallback;
		self
	}

	/// Drops the captured markup from the active fallback.
	pub fn disable_fallback(mut self, disable: bool) -> Self {
		self.disable_fallback = disable;
		self
	}

	/// Adds a container attribute.
	pub fn wrapper_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.wrapper_attributes.insert(name.into(), value.into());
		self
	}

	/// Checks the id and every trigger.
	pub fn validate(&self) -> Result<(), HydrationError> {
		if self.id.trim().is_empty() {
			return Err(HydrationError::InvalidOptions("id must not be empty".to_string()));
		}
		if self.id.chars().any(char::is_whitespace) {
			return Err(HydrationError::InvalidOptions(format!(
				"id '{}' must not contain whitespace",
				self.id
			)));
		}
		for trigger in &self.triggers {
			trigger.validate()?;
		}
		Ok(())
	}
}

impl fmt::Debug for HydrationOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HydrationOptions")
			.field("id", &self.id)
			.field("triggers", &self.triggers)
			.field("on_before", &self.on_before.is_some())
			.field("input_pending_aware", &self.input_pending_aware)
			.field("input_pending_fallback", &self.input_pending_fallback)
			.field("disable_fallback", &self.disable_fallback)
			.field("wrapper_attributes", &self.wrapper_attributes)
			.finish()
	}
}

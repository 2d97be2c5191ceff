//! Trigger specifications.
//!
//! A [`TriggerSpec`] names a condition that may request activation. Specs are
//! consumed once when the unit mounts; [`registry::TriggerRegistry`] turns
//! them into live [`source::TriggerSource`]s.
//!
//! ## JSON forms
//!
//! | JSON | Spec |
//! |------|------|
//! | `"delay"` | `Delay(2000ms)` |
//! | `["delay", 500]` | `Delay(500ms)` |
//! | `"visible"` | `Visible(default options)` |
//! | `["visible", {"rootMargin": "200px"}]` | `Visible(options)` |
//! | `"idle"` | `Idle` |
//! | `"click"` | `DomEvent("click", Container)` |
//! | `["click", "window"]` | `DomEvent("click", Window)` |

pub mod registry;
pub mod source;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::HydrationError;
use crate::host::{Host, ResolvedTarget};

pub use crate::host::ObserverOptions;

pub use registry::{ActivationGuard, RegistryHandle, TriggerRegistry};
pub use source::{DelayTrigger, DomEventTrigger, IdleTrigger, TriggerSource, VisibleTrigger};

/// Delay used by a bare `"delay"` trigger and by the idle fallback.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);

/// Upper bound handed to `requestIdleCallback`.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// A condition that may request activation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "TriggerRepr")]
pub enum TriggerSpec {
	/// Fires once the delay elapses. A zero delay never fires.
	Delay(Duration),
	/// Fires when the container becomes visible.
	Visible(ObserverOptions),
	/// Fires when the browser is idle.
	Idle,
	/// Fires on the first occurrence of a DOM event.
	DomEvent {
		/// Event name, e.g. `"click"`.
		event: String,
		/// Where to listen.
		target: EventTarget,
	},
}

impl TriggerSpec {
	/// `Delay` from milliseconds.
	pub fn delay_ms(ms: u64) -> Self {
		Self::Delay(Duration::from_millis(ms))
	}

	/// `Visible` with default observer options.
	pub fn visible() -> Self {
		Self::Visible(ObserverOptions::default())
	}

	/// `DomEvent` on the unit's own container.
	pub fn event(event: impl Into<String>) -> Self {
		Self::DomEvent {
			event: event.into(),
			target: EventTarget::Container,
		}
	}

	/// `DomEvent` on a specific target.
	pub fn event_on(event: impl Into<String>, target: EventTarget) -> Self {
		Self::DomEvent {
			event: event.into(),
			target,
		}
	}

	/// Short name used in logs.
	pub fn kind(&self) -> &str {
		match self {
			TriggerSpec::Delay(_) => "delay",
			TriggerSpec::Visible(_) => "visible",
			TriggerSpec::Idle => "idle",
			TriggerSpec::DomEvent { event, .. } => event,
		}
	}

	pub(crate) fn validate(&self) -> Result<(), HydrationError> {
		if let TriggerSpec::DomEvent { event, .. } = self {
			validate_event_name(event)?;
		}
		Ok(())
	}
}

impl fmt::Display for TriggerSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TriggerSpec::Delay(delay) => write!(f, "delay({}ms)", delay.as_millis()),
			TriggerSpec::Visible(_) => f.write_str("visible"),
			TriggerSpec::Idle => f.write_str("idle"),
			TriggerSpec::DomEvent { event, target } => write!(f, "{}@{}", event, target),
		}
	}
}

impl FromStr for TriggerSpec {
	type Err = HydrationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"delay" => Ok(TriggerSpec::Delay(DEFAULT_DELAY)),
			"visible" => Ok(TriggerSpec::visible()),
			"idle" => Ok(TriggerSpec::Idle),
			event => {
				validate_event_name(event)?;
				Ok(TriggerSpec::event(event))
			}
		}
	}
}

fn validate_event_name(event: &str) -> Result<(), HydrationError> {
	if event.is_empty() {
		return Err(HydrationError::invalid_trigger(event, "event name is empty"));
	}
	if event.chars().any(char::is_whitespace) {
		return Err(HydrationError::invalid_trigger(
			event,
			"event names cannot contain whitespace",
		));
	}
	Ok(())
}

/// Where a [`TriggerSpec::DomEvent`] listener is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum EventTarget {
	/// The unit's own container.
	#[default]
	Container,
	/// The global `window`.
	Window,
	/// The `document`.
	Document,
	/// Another element, by id.
	Element(String),
}

impl EventTarget {
	/// Resolves against the host. `None` when the element does not exist.
	pub fn resolve(&self, container_id: &str, host: &dyn Host) -> Option<ResolvedTarget> {
		let element = |id: &str| host.has_element(id).then(|| ResolvedTarget::Element(id.to_string()));
		match self {
			EventTarget::Container => element(container_id),
			EventTarget::Window => Some(ResolvedTarget::Window),
			EventTarget::Document => Some(ResolvedTarget::Document),
			EventTarget::Element(id) => element(id),
		}
	}
}

impl fmt::Display for EventTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EventTarget::Container => f.write_str("container"),
			EventTarget::Window => f.write_str("window"),
			EventTarget::Document => f.write_str("document"),
			EventTarget::Element(id) => write!(f, "#{}", id),
		}
	}
}

impl FromStr for EventTarget {
	type Err = HydrationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"" | "container" => Ok(EventTarget::Container),
			"window" => Ok(EventTarget::Window),
			"document" => Ok(EventTarget::Document),
			other => match other.strip_prefix('#') {
				Some(id) if !id.is_empty() => Ok(EventTarget::Element(id.to_string())),
				_ => Err(HydrationError::invalid_trigger(
					other,
					"expected 'container', 'window', 'document' or '#element-id'",
				)),
			},
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriggerRepr {
	Name(String),
	WithArgument(String, serde_json::Value),
}

impl TryFrom<TriggerRepr> for TriggerSpec {
	type Error = HydrationError;

	fn try_from(repr: TriggerRepr) -> Result<Self, Self::Error> {
		let (name, argument) = match repr {
			TriggerRepr::Name(name) => return name.parse(),
			TriggerRepr::WithArgument(name, argument) => (name, argument),
		};

		match name.as_str() {
			"delay" => {
				let ms = match &argument {
					serde_json::Value::Null => return Ok(TriggerSpec::Delay(DEFAULT_DELAY)),
					serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
						HydrationError::invalid_trigger(&name, "delay is not a finite number")
					})?,
					_ => {
						return Err(HydrationError::invalid_trigger(
							&name,
							"delay expects milliseconds",
						));
					}
				};
				// Negative delays never fire, same as zero. Fractions are kept.
				let delay = Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX);
				Ok(TriggerSpec::Delay(delay))
			}
			"visible" => {
				if argument.is_null() {
					return Ok(TriggerSpec::visible());
				}
				let options = ObserverOptions::deserialize(argument)
					.map_err(|e| HydrationError::invalid_trigger(&name, e.to_string()))?;
				Ok(TriggerSpec::Visible(options))
			}
			"idle" => Ok(TriggerSpec::Idle),
			event => {
				validate_event_name(event)?;
				let target = match &argument {
					serde_json::Value::Null => EventTarget::Container,
					serde_json::Value::String(target) => target.parse()?,
					_ => {
						return Err(HydrationError::invalid_trigger(
							event,
							"event target must be a string",
						));
					}
				};
				Ok(TriggerSpec::event_on(event, target))
			}
		}
	}
}

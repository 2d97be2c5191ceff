//! Host capabilities consumed by trigger sources.
//!
//! Every browser API the scheduler touches goes through the [`Host`] trait, so
//! trigger sources never probe globals themselves. Each capability is optional
//! and has exactly one fallback, listed here and returned by
//! [`Capability::fallback`]:
//!
//! | Capability | Used by | Fallback when absent |
//! |------------|---------|----------------------|
//! | `requestIdleCallback` | `Idle` | behave as `Delay(2000ms)` |
//! | `cancelIdleCallback` | `Idle` dispose | release is a no-op, the source ignores a late grant |
//! | `requestAnimationFrame` | `Idle` | fire right after the idle grant |
//! | `IntersectionObserver` | `Visible` | fire immediately |
//! | `navigator.scheduling.isInputPending` | eager activation | `input_pending_fallback` option |
//!
//! Timers, event listeners and task spawning are always available.
//!
//! Two implementations ship with the crate: `BrowserHost` (wasm32, backed by
//! `web-sys`) and `MockHost` (feature `testing`, a virtual clock).

#[cfg(target_arch = "wasm32")]
pub mod browser;

use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserHost;

/// Opaque handle to a resource acquired from a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostHandle(pub(crate) u64);

impl HostHandle {
	/// Wraps a raw handle value allocated by a host implementation.
	pub fn new(raw: u64) -> Self {
		Self(raw)
	}

	/// Returns the raw handle value.
	pub fn as_u64(self) -> u64 {
		self.0
	}
}

/// An optional host capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
	/// `requestIdleCallback`
	IdleCallback,
	/// `cancelIdleCallback`
	CancelIdleCallback,
	/// `requestAnimationFrame`
	AnimationFrame,
	/// `IntersectionObserver`
	IntersectionObserver,
	/// `navigator.scheduling.isInputPending`
	InputPending,
}

impl Capability {
	/// All capabilities, in table order.
	pub const ALL: [Capability; 5] = [
		Capability::IdleCallback,
		Capability::CancelIdleCallback,
		Capability::AnimationFrame,
		Capability::IntersectionObserver,
		Capability::InputPending,
	];

	/// Describes what the scheduler does when this capability is missing.
	pub fn fallback(self) -> &'static str {
		match self {
			Capability::IdleCallback => "schedule a 2000ms delay instead",
			Capability::CancelIdleCallback => "leave the request pending and ignore its grant",
			Capability::AnimationFrame => "fire directly after the idle grant",
			Capability::IntersectionObserver => "activate immediately",
			Capability::InputPending => "use the configured input-pending fallback value",
		}
	}
}

/// The set of optional capabilities a host supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
	/// `requestIdleCallback` is available.
	pub idle_callback: bool,
	/// `cancelIdleCallback` is available.
	pub cancel_idle_callback: bool,
	/// `requestAnimationFrame` is available.
	pub animation_frame: bool,
	/// `IntersectionObserver` is available.
	pub intersection_observer: bool,
	/// The input-pending probe is available.
	pub input_pending: bool,
}

impl Capabilities {
	/// Every capability present.
	pub const fn all() -> Self {
		Self {
			idle_callback: true,
			cancel_idle_callback: true,
			animation_frame: true,
			intersection_observer: true,
			input_pending: true,
		}
	}

	/// No optional capability present.
	pub const fn none() -> Self {
		Self {
			idle_callback: false,
			cancel_idle_callback: false,
			animation_frame: false,
			intersection_observer: false,
			input_pending: false,
		}
	}

	/// Returns whether `capability` is supported.
	pub fn supports(&self, capability: Capability) -> bool {
		match capability {
			Capability::IdleCallback => self.idle_callback,
			Capability::CancelIdleCallback => self.cancel_idle_callback,
			Capability::AnimationFrame => self.animation_frame,
			Capability::IntersectionObserver => self.intersection_observer,
			Capability::InputPending => self.input_pending,
		}
	}

	/// Returns a copy with `capability` switched on or off.
	pub fn with(mut self, capability: Capability, enabled: bool) -> Self {
		let slot = match capability {
			Capability::IdleCallback => &mut self.idle_callback,
			Capability::CancelIdleCallback => &mut self.cancel_idle_callback,
			Capability::AnimationFrame => &mut self.animation_frame,
			Capability::IntersectionObserver => &mut self.intersection_observer,
			Capability::InputPending => &mut self.input_pending,
		};
		*slot = enabled;
		self
	}
}

impl Default for Capabilities {
	fn default() -> Self {
		Self::all()
	}
}

/// A concrete listener target, after the container id has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedTarget {
	/// The global `window`.
	Window,
	/// The `document`.
	Document,
	/// The element with this id.
	Element(String),
}

/// Listener configuration passed to [`Host::add_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerOptions {
	/// Remove the listener after the first event.
	pub once: bool,
	/// Listen during the capture phase.
	pub capture: bool,
	/// Never block the default action.
	pub passive: bool,
}

impl ListenerOptions {
	/// The configuration used by DOM event triggers: single-fire, capture
	/// phase, passive. Capture makes the trigger immune to `stopPropagation`
	/// in handlers below the target.
	pub const ACTIVATION: Self = Self {
		once: true,
		capture: true,
		passive: true,
	};
}

/// One intersection observation delivered to a [`Host::observe_intersection`] callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
	/// Whether the element intersects the root.
	pub is_intersecting: bool,
	/// Visible fraction of the element.
	pub intersection_ratio: f64,
}

impl IntersectionEntry {
	/// Returns true when the element is actually visible.
	pub fn is_visible(&self) -> bool {
		self.is_intersecting && self.intersection_ratio > 0.0
	}
}

/// Options forwarded to the intersection observer.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObserverOptions {
	/// CSS margin around the root, e.g. `"200px 0px"`.
	pub root_margin: Option<String>,
	/// Ratios at which the callback fires.
	pub threshold: Vec<f64>,
}

/// One-shot host callback.
pub type HostCallback = Box<dyn FnOnce() + 'static>;

/// Access to the host environment.
///
/// Implementations must never invoke a callback synchronously from inside the
/// method that registered it, and must never invoke a callback whose handle
/// has been passed to [`Host::release`].
pub trait Host: 'static {
	/// Returns the optional capabilities available.
	fn capabilities(&self) -> Capabilities;

	/// Schedules `callback` after `delay`.
	fn set_timeout(&self, delay: Duration, callback: HostCallback) -> HostHandle;

	/// Requests an idle callback bounded by `timeout`.
	///
	/// Returns `None` when idle callbacks are unsupported.
	fn request_idle_callback(&self, timeout: Duration, callback: HostCallback)
	-> Option<HostHandle>;

	/// Requests an animation frame. Returns `None` when unsupported.
	fn request_animation_frame(&self, callback: HostCallback) -> Option<HostHandle>;

	/// Observes the element with `element_id`.
	///
	/// Returns `None` when the observer is unsupported, the element does not
	/// exist, or the observer could not be constructed.
	fn observe_intersection(
		&self,
		element_id: &str,
		options: &ObserverOptions,
		callback: Rc<dyn Fn(IntersectionEntry)>,
	) -> Option<HostHandle>;

	/// Attaches a listener. Returns `None` when the target does not exist.
	fn add_event_listener(
		&self,
		target: &ResolvedTarget,
		event: &str,
		options: ListenerOptions,
		callback: Rc<dyn Fn()>,
	) -> Option<HostHandle>;

	/// Releases a resource: clears the timer, cancels the idle or frame
	/// request, disconnects the observer, or removes the listener.
	///
	/// Releasing an unknown or already released handle is a no-op.
	fn release(&self, handle: HostHandle);

	/// Probes for pending user input. `None` when the probe is unavailable.
	fn input_pending(&self) -> Option<bool>;

	/// Returns the inner HTML of the element with `element_id`.
	fn container_markup(&self, element_id: &str) -> Option<String>;

	/// Returns whether an element with `element_id` exists.
	fn has_element(&self, element_id: &str) -> bool;

	/// Runs `future` to completion on the host's local executor.
	fn spawn_local(&self, future: LocalBoxFuture<'static, ()>);
}

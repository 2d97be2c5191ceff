//! Trigger registry: fan-in of many trigger sources into one activation.
//!
//! ```text
//! DelayTrigger ─┐
//! VisibleTrigger├─▶ ActivationRequest ─▶ RegistryInner ─▶ dispose_all() ─▶ ActivationGuard::request()
//! IdleTrigger ──┤                        (first caller only)                 (runs the action once)
//! DomEventTrigger┘
//! ```
//!
//! Every source is disposed before the guarded action runs, so no source can
//! call back into a unit that is already activating.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::TriggerSpec;
use super::source::{self, TriggerSource};
use crate::host::Host;
use crate::{debug_log, info_log};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
	Open,
	Fired,
	Revoked,
}

struct GuardInner {
	state: Cell<GuardState>,
	action: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// One-shot activation latch shared by a unit and its registry.
///
/// The first [`request`](Self::request) runs the action; every later request
/// is a no-op. A revoked guard never runs its action.
#[derive(Clone)]
pub struct ActivationGuard {
	inner: Rc<GuardInner>,
}

impl ActivationGuard {
	/// Creates an open guard that runs `action` on the first request.
	pub fn new<F>(action: F) -> Self
	where
		F: FnOnce() + 'static,
	{
		Self::with_state(GuardState::Open, Some(Box::new(action)))
	}

	/// Creates a guard that has already fired. Used for eager activation.
	pub fn spent() -> Self {
		Self::with_state(GuardState::Fired, None)
	}

	fn with_state(state: GuardState, action: Option<Box<dyn FnOnce()>>) -> Self {
		Self {
			inner: Rc::new(GuardInner {
				state: Cell::new(state),
				action: RefCell::new(action),
			}),
		}
	}

	/// Returns true while no request has been made and the guard is not revoked.
	pub fn is_open(&self) -> bool {
		self.inner.state.get() == GuardState::Open
	}

	/// Returns true once a request has won.
	pub fn has_fired(&self) -> bool {
		self.inner.state.get() == GuardState::Fired
	}

	/// Runs the action if this is the first request. Returns whether it ran.
	pub fn request(&self) -> bool {
		if !self.is_open() {
			return false;
		}
		self.inner.state.set(GuardState::Fired);
		let action = self.inner.action.borrow_mut().take();
		if let Some(action) = action {
			action();
		}
		true
	}

	/// Closes the guard without running the action.
	pub fn revoke(&self) {
		if self.is_open() {
			self.inner.state.set(GuardState::Revoked);
		}
		let action = self.inner.action.borrow_mut().take();
		drop(action);
	}
}

impl fmt::Debug for ActivationGuard {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActivationGuard")
			.field("state", &self.inner.state.get())
			.finish()
	}
}

/// What a trigger source needs from its unit: the host and the container id.
#[derive(Clone)]
pub struct TriggerContext {
	pub(crate) host: Rc<dyn Host>,
	pub(crate) container_id: Rc<str>,
}

impl TriggerContext {
	/// Creates a context for the container with `container_id`.
	pub fn new(host: Rc<dyn Host>, container_id: impl Into<Rc<str>>) -> Self {
		Self {
			host,
			container_id: container_id.into(),
		}
	}

	/// Returns the container id.
	pub fn container_id(&self) -> &str {
		&self.container_id
	}
}

impl fmt::Debug for TriggerContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TriggerContext")
			.field("container_id", &self.container_id)
			.finish_non_exhaustive()
	}
}

struct RegistryInner {
	container_id: Rc<str>,
	guard: ActivationGuard,
	sources: RefCell<Vec<Box<dyn TriggerSource>>>,
	disposed: Cell<bool>,
}

impl RegistryInner {
	fn dispose_all(&self) {
		if self.disposed.replace(true) {
			return;
		}
		let sources = self.sources.take();
		for mut source in sources {
			debug_log!("disposing '{}' trigger of '{}'", source.kind(), self.container_id);
			source.dispose();
		}
	}
}

/// Handed to each trigger source; calling [`fire`](Self::fire) asks for activation.
#[derive(Clone)]
pub struct ActivationRequest {
	registry: Weak<RegistryInner>,
}

impl ActivationRequest {
	/// Requests activation on behalf of the `trigger` source.
	///
	/// Only the first request across the registry has any effect: it disposes
	/// every source, then runs the guarded activation.
	pub fn fire(&self, trigger: &str) {
		let Some(registry) = self.registry.upgrade() else {
			return;
		};
		if !registry.guard.is_open() {
			return;
		}
		info_log!(
			"'{}' trigger requested activation of '{}'",
			trigger,
			registry.container_id
		);
		registry.dispose_all();
		registry.guard.request();
	}
}

impl fmt::Debug for ActivationRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActivationRequest")
			.field("live", &(self.registry.strong_count() > 0))
			.finish()
	}
}

/// Starts trigger sources for one unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerRegistry;

impl TriggerRegistry {
	/// Starts one source per spec, in order.
	///
	/// If a source fires while the registry is still starting (for example a
	/// `Visible` trigger without observer support), the remaining specs are
	/// never started.
	pub fn start(context: &TriggerContext, specs: &[TriggerSpec], guard: ActivationGuard) -> RegistryHandle {
		let inner = Rc::new(RegistryInner {
			container_id: Rc::clone(&context.container_id),
			disposed: Cell::new(!guard.is_open()),
			guard,
			sources: RefCell::new(Vec::with_capacity(specs.len())),
		});

		for spec in specs {
			if inner.disposed.get() {
				break;
			}
			debug_log!("starting '{}' trigger of '{}'", spec, context.container_id);
			let request = ActivationRequest {
				registry: Rc::downgrade(&inner),
			};
			let mut source = source::start(context, spec, request);
			if inner.disposed.get() {
				source.dispose();
				break;
			}
			inner.sources.borrow_mut().push(source);
		}

		RegistryHandle { inner }
	}
}

/// Owns the started sources. Dropping the handle disposes them.
pub struct RegistryHandle {
	inner: Rc<RegistryInner>,
}

impl RegistryHandle {
	/// Disposes every source once, in registration order. Idempotent.
	pub fn dispose_all(&self) {
		self.inner.dispose_all();
	}

	/// Returns true once the sources have been disposed.
	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.get()
	}

	/// Number of live sources.
	pub fn len(&self) -> usize {
		self.inner.sources.borrow().len()
	}

	/// Returns true when no source is live.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Drop for RegistryHandle {
	fn drop(&mut self) {
		self.inner.dispose_all();
	}
}

impl fmt::Debug for RegistryHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegistryHandle")
			.field("container_id", &self.inner.container_id)
			.field("sources", &self.len())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MockHost;
	use rstest::{fixture, rstest};
	use std::time::Duration;

	#[fixture]
	fn host() -> Rc<MockHost> {
		let host = Rc::new(MockHost::new());
		host.insert_element("unit", "<p>static</p>");
		host
	}

	fn counting_guard() -> (ActivationGuard, Rc<Cell<u32>>) {
		let count = Rc::new(Cell::new(0));
		let guard = ActivationGuard::new({
			let count = Rc::clone(&count);
			move || count.set(count.get() + 1)
		});
		(guard, count)
	}

	#[rstest]
	fn test_guard_runs_action_once() {
		let (guard, count) = counting_guard();
		assert!(guard.request());
		assert!(!guard.request());
		assert_eq!(count.get(), 1);
		assert!(guard.has_fired());
	}

	#[rstest]
	fn test_revoked_guard_never_runs() {
		let (guard, count) = counting_guard();
		guard.revoke();
		assert!(!guard.request());
		assert_eq!(count.get(), 0);
		assert!(!guard.has_fired());
	}

	#[rstest]
	fn test_spent_guard_starts_nothing(host: Rc<MockHost>) {
		let context = TriggerContext::new(host.clone(), "unit");
		let handle = TriggerRegistry::start(&context, &[TriggerSpec::Idle], ActivationGuard::spent());
		assert!(handle.is_disposed());
		assert_eq!(host.stats().acquired, 0);
	}

	#[rstest]
	fn test_first_trigger_wins_and_disposes_the_rest(host: Rc<MockHost>) {
		let (guard, count) = counting_guard();
		let context = TriggerContext::new(host.clone(), "unit");
		let specs = [
			TriggerSpec::delay_ms(100),
			TriggerSpec::delay_ms(100),
			TriggerSpec::event("click"),
		];
		let handle = TriggerRegistry::start(&context, &specs, guard);
		assert_eq!(handle.len(), 3);

		// Both timers cross their threshold in the same tick.
		host.advance(Duration::from_millis(100));

		assert_eq!(count.get(), 1);
		assert!(handle.is_disposed());
		assert_eq!(host.stats().live, 0);
	}

	#[rstest]
	fn test_synchronous_fire_stops_starting_remaining_specs(host: Rc<MockHost>) {
		host.set_capabilities(host.capabilities().with(crate::host::Capability::IntersectionObserver, false));
		let (guard, count) = counting_guard();
		let context = TriggerContext::new(host.clone(), "unit");
		let specs = [TriggerSpec::delay_ms(500), TriggerSpec::visible(), TriggerSpec::Idle];

		let handle = TriggerRegistry::start(&context, &specs, guard);

		assert_eq!(count.get(), 1);
		assert!(handle.is_disposed());
		// Only the delay timer was ever acquired, and it was released.
		assert_eq!(host.stats().acquired, 1);
		assert_eq!(host.stats().live, 0);
	}

	#[rstest]
	fn test_dispose_all_is_idempotent_and_ordered(host: Rc<MockHost>) {
		let (guard, count) = counting_guard();
		let context = TriggerContext::new(host.clone(), "unit");
		let specs = [
			TriggerSpec::delay_ms(10),
			TriggerSpec::event("click"),
			TriggerSpec::Idle,
		];
		let handle = TriggerRegistry::start(&context, &specs, guard);
		let acquired = host.acquired_handles();

		handle.dispose_all();
		handle.dispose_all();

		assert_eq!(host.released_handles(), acquired);
		assert_eq!(host.stats().live, 0);
		assert_eq!(count.get(), 0);
	}

	#[rstest]
	fn test_dropping_handle_releases_everything(host: Rc<MockHost>) {
		let (guard, _count) = counting_guard();
		let context = TriggerContext::new(host.clone(), "unit");
		let handle = TriggerRegistry::start(&context, &[TriggerSpec::visible(), TriggerSpec::Idle], guard);
		assert_eq!(host.stats().live, 2);

		drop(handle);

		assert_eq!(host.stats().live, 0);
	}
}

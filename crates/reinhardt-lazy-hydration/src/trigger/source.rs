//! Trigger sources.
//!
//! Each source owns the host resources it acquired and a liveness flag that
//! its callbacks check before firing. `dispose` clears the flag and releases
//! the resources, so a disposed source never calls back even if the host
//! delivers a late callback.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::registry::{ActivationRequest, TriggerContext};
use super::{DEFAULT_DELAY, EventTarget, IDLE_TIMEOUT, TriggerSpec};
use crate::host::{Host, HostHandle, IntersectionEntry, ListenerOptions, ObserverOptions};
use crate::{debug_log, warn_log};

/// A started trigger.
pub trait TriggerSource {
	/// Short name used in logs.
	fn kind(&self) -> &str;

	/// Releases every host resource. Safe to call any number of times.
	fn dispose(&mut self);
}

/// Starts the source matching `spec`.
pub(crate) fn start(
	context: &TriggerContext,
	spec: &TriggerSpec,
	request: ActivationRequest,
) -> Box<dyn TriggerSource> {
	match spec {
		TriggerSpec::Delay(delay) => Box::new(DelayTrigger::start(context, *delay, request)),
		TriggerSpec::Visible(options) => Box::new(VisibleTrigger::start(context, options, request)),
		TriggerSpec::Idle => Box::new(IdleTrigger::start(context, request)),
		TriggerSpec::DomEvent { event, target } => {
			Box::new(DomEventTrigger::start(context, event, target, request))
		}
	}
}

/// Host resources held by one source.
struct Lease {
	host: Rc<dyn Host>,
	alive: Rc<Cell<bool>>,
	handles: Rc<RefCell<Vec<HostHandle>>>,
}

impl Lease {
	fn new(host: &Rc<dyn Host>) -> Self {
		Self {
			host: Rc::clone(host),
			alive: Rc::new(Cell::new(true)),
			handles: Rc::new(RefCell::new(Vec::new())),
		}
	}

	fn hold(&self, handle: HostHandle) {
		self.handles.borrow_mut().push(handle);
	}

	/// Wraps `request` so it only fires while the lease is alive.
	fn guarded(&self, request: ActivationRequest, kind: &'static str) -> impl Fn() + 'static {
		let alive = Rc::clone(&self.alive);
		move || {
			if alive.get() {
				request.fire(kind);
			}
		}
	}

	fn release(&mut self) {
		self.alive.set(false);
		let handles = std::mem::take(&mut *self.handles.borrow_mut());
		for handle in handles {
			self.host.release(handle);
		}
	}
}

/// Fires once a delay elapses.
pub struct DelayTrigger {
	lease: Lease,
}

impl DelayTrigger {
	/// Arms a one-shot timer. A zero delay arms nothing and never fires;
	/// use eager activation instead.
	pub fn start(context: &TriggerContext, delay: Duration, request: ActivationRequest) -> Self {
		let lease = Lease::new(&context.host);
		if delay.is_zero() {
			debug_log!("zero delay on '{}' never fires", context.container_id);
			return Self { lease };
		}
		let fire = lease.guarded(request, "delay");
		let timer = context.host.set_timeout(delay, Box::new(fire));
		lease.hold(timer);
		Self { lease }
	}
}

impl TriggerSource for DelayTrigger {
	fn kind(&self) -> &str {
		"delay"
	}

	fn dispose(&mut self) {
		self.lease.release();
	}
}

/// Fires when the container becomes visible.
pub struct VisibleTrigger {
	lease: Lease,
}

impl VisibleTrigger {
	/// Observes the container. Fires immediately when the observer is
	/// unsupported or there is no container to observe.
	pub fn start(context: &TriggerContext, options: &ObserverOptions, request: ActivationRequest) -> Self {
		let lease = Lease::new(&context.host);
		let host = &context.host;

		if !host.capabilities().intersection_observer {
			debug_log!("no IntersectionObserver, activating '{}'", context.container_id);
			request.fire("visible");
			return Self { lease };
		}
		if !host.has_element(&context.container_id) {
			debug_log!("no element to observe for '{}'", context.container_id);
			request.fire("visible");
			return Self { lease };
		}

		let fire = lease.guarded(request.clone(), "visible");
		let observed = host.observe_intersection(
			&context.container_id,
			options,
			Rc::new(move |entry: IntersectionEntry| {
				if entry.is_visible() {
					fire();
				}
			}),
		);
		match observed {
			Some(observer) => lease.hold(observer),
			None => {
				warn_log!(
					"could not observe '{}', activating immediately",
					context.container_id
				);
				request.fire("visible");
			}
		}
		Self { lease }
	}
}

impl TriggerSource for VisibleTrigger {
	fn kind(&self) -> &str {
		"visible"
	}

	fn dispose(&mut self) {
		self.lease.release();
	}
}

/// Fires once the browser is idle, one animation frame after the idle grant.
pub struct IdleTrigger {
	lease: Lease,
	fallback: Option<DelayTrigger>,
}

impl IdleTrigger {
	/// Requests an idle callback bounded by [`IDLE_TIMEOUT`]. Without idle
	/// callback support this behaves as a [`DEFAULT_DELAY`] delay.
	pub fn start(context: &TriggerContext, request: ActivationRequest) -> Self {
		let lease = Lease::new(&context.host);
		let host = &context.host;

		if !host.capabilities().idle_callback {
			debug_log!("no requestIdleCallback, '{}' falls back to a delay", context.container_id);
			return Self {
				lease,
				fallback: Some(DelayTrigger::start(context, DEFAULT_DELAY, request)),
			};
		}

		let fire: Rc<dyn Fn()> = Rc::new(lease.guarded(request.clone(), "idle"));
		let on_idle = {
			let weak_host: Weak<dyn Host> = Rc::downgrade(host);
			let alive = Rc::clone(&lease.alive);
			let handles = Rc::clone(&lease.handles);
			move || {
				let Some(host) = weak_host.upgrade() else {
					return;
				};
				if !alive.get() {
					return;
				}
				let frame = host.request_animation_frame(Box::new({
					let fire = Rc::clone(&fire);
					move || fire()
				}));
				match frame {
					Some(frame) => handles.borrow_mut().push(frame),
					None => fire(),
				}
			}
		};

		match host.request_idle_callback(IDLE_TIMEOUT, Box::new(on_idle)) {
			Some(idle) => {
				lease.hold(idle);
				Self {
					lease,
					fallback: None,
				}
			}
			None => Self {
				lease,
				fallback: Some(DelayTrigger::start(context, DEFAULT_DELAY, request)),
			},
		}
	}
}

impl TriggerSource for IdleTrigger {
	fn kind(&self) -> &str {
		"idle"
	}

	fn dispose(&mut self) {
		self.lease.release();
		if let Some(fallback) = self.fallback.as_mut() {
			fallback.dispose();
		}
	}
}

/// Fires on the first occurrence of a DOM event.
pub struct DomEventTrigger {
	event: String,
	lease: Lease,
}

impl DomEventTrigger {
	/// Attaches a single-fire, capture-phase, passive listener. An
	/// unresolvable target attaches nothing.
	pub fn start(
		context: &TriggerContext,
		event: &str,
		target: &EventTarget,
		request: ActivationRequest,
	) -> Self {
		let lease = Lease::new(&context.host);
		let host = &context.host;

		let Some(resolved) = target.resolve(&context.container_id, host.as_ref()) else {
			warn_log!(
				"'{}' trigger of '{}' has no target ({}), it will never fire",
				event,
				context.container_id,
				target
			);
			return Self {
				event: event.to_string(),
				lease,
			};
		};

		let alive = Rc::clone(&lease.alive);
		let kind = event.to_string();
		let listener = host.add_event_listener(
			&resolved,
			event,
			ListenerOptions::ACTIVATION,
			Rc::new(move || {
				if alive.get() {
					request.fire(&kind);
				}
			}),
		);
		match listener {
			Some(listener) => lease.hold(listener),
			None => warn_log!("could not listen for '{}' on {}", event, target),
		}
		Self {
			event: event.to_string(),
			lease,
		}
	}
}

impl TriggerSource for DomEventTrigger {
	fn kind(&self) -> &str {
		&self.event
	}

	fn dispose(&mut self) {
		self.lease.release();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::host::{Capability, ResolvedTarget};
	use crate::testing::MockHost;
	use crate::trigger::registry::{ActivationGuard, RegistryHandle, TriggerRegistry};
	use rstest::{fixture, rstest};

	#[fixture]
	fn host() -> Rc<MockHost> {
		let host = Rc::new(MockHost::new());
		host.insert_element("unit", "");
		host
	}

	fn start_one(host: &Rc<MockHost>, spec: TriggerSpec) -> (RegistryHandle, Rc<Cell<u32>>) {
		let count = Rc::new(Cell::new(0));
		let guard = ActivationGuard::new({
			let count = Rc::clone(&count);
			move || count.set(count.get() + 1)
		});
		let context = TriggerContext::new(host.clone(), "unit");
		(TriggerRegistry::start(&context, &[spec], guard), count)
	}

	#[rstest]
	fn test_delay_fires_when_elapsed(host: Rc<MockHost>) {
		let (_handle, count) = start_one(&host, TriggerSpec::delay_ms(1000));

		host.advance(Duration::from_millis(999));
		assert_eq!(count.get(), 0);

		host.advance(Duration::from_millis(1));
		assert_eq!(count.get(), 1);
	}

	#[rstest]
	fn test_zero_delay_never_fires(host: Rc<MockHost>) {
		let (_handle, count) = start_one(&host, TriggerSpec::Delay(Duration::ZERO));

		host.advance(Duration::from_secs(60));

		assert_eq!(count.get(), 0);
		assert_eq!(host.stats().acquired, 0);
	}

	#[rstest]
	fn test_visible_requires_positive_ratio(host: Rc<MockHost>) {
		let (_handle, count) = start_one(&host, TriggerSpec::visible());

		host.intersect("unit", true, 0.0);
		host.intersect("unit", false, 0.4);
		assert_eq!(count.get(), 0);

		host.intersect("unit", true, 0.1);
		assert_eq!(count.get(), 1);
	}

	#[rstest]
	fn test_visible_without_element_fires_immediately() {
		let host = Rc::new(MockHost::new());
		let (handle, count) = start_one(&host, TriggerSpec::visible());

		assert_eq!(count.get(), 1);
		assert!(handle.is_disposed());
	}

	#[rstest]
	fn test_idle_waits_one_frame_after_grant(host: Rc<MockHost>) {
		let (_handle, count) = start_one(&host, TriggerSpec::Idle);

		host.grant_idle();
		assert_eq!(count.get(), 0);
		assert_eq!(host.pending_frames(), 1);

		host.flush_frames();
		assert_eq!(count.get(), 1);
		assert_eq!(host.stats().live, 0);
	}

	#[rstest]
	fn test_idle_timeout_counts_as_grant(host: Rc<MockHost>) {
		let (_handle, count) = start_one(&host, TriggerSpec::Idle);

		host.advance(IDLE_TIMEOUT);
		host.flush_frames();

		assert_eq!(count.get(), 1);
	}

	#[rstest]
	fn test_idle_without_support_behaves_as_default_delay(host: Rc<MockHost>) {
		host.set_capabilities(host.capabilities().with(Capability::IdleCallback, false));
		let (_handle, count) = start_one(&host, TriggerSpec::Idle);

		host.advance(DEFAULT_DELAY - Duration::from_millis(1));
		assert_eq!(count.get(), 0);
		host.advance(Duration::from_millis(1));
		assert_eq!(count.get(), 1);
	}

	#[rstest]
	fn test_idle_without_animation_frame_fires_on_grant(host: Rc<MockHost>) {
		host.set_capabilities(host.capabilities().with(Capability::AnimationFrame, false));
		let (_handle, count) = start_one(&host, TriggerSpec::Idle);

		host.grant_idle();

		assert_eq!(count.get(), 1);
	}

	#[rstest]
	fn test_disposed_idle_ignores_late_grant_without_cancel_support(host: Rc<MockHost>) {
		host.set_capabilities(host.capabilities().with(Capability::CancelIdleCallback, false));
		let (handle, count) = start_one(&host, TriggerSpec::Idle);

		handle.dispose_all();
		host.grant_idle();
		host.flush_frames();

		assert_eq!(count.get(), 0);
	}

	#[rstest]
	fn test_dispose_between_grant_and_frame_cancels_frame(host: Rc<MockHost>) {
		let (handle, count) = start_one(&host, TriggerSpec::Idle);

		host.grant_idle();
		handle.dispose_all();
		host.flush_frames();

		assert_eq!(count.get(), 0);
		assert_eq!(host.stats().live, 0);
	}

	#[rstest]
	fn test_dom_event_listener_configuration(host: Rc<MockHost>) {
		let (_handle, count) = start_one(&host, TriggerSpec::event("mouseenter"));

		let listeners = host.listeners();
		assert_eq!(listeners.len(), 1);
		let (target, event, options) = &listeners[0];
		assert_eq!(target, &ResolvedTarget::Element("unit".to_string()));
		assert_eq!(event, "mouseenter");
		assert_eq!(*options, ListenerOptions::ACTIVATION);

		host.dispatch_event(&ResolvedTarget::Element("unit".to_string()), "mouseenter");
		assert_eq!(count.get(), 1);
	}

	#[rstest]
	fn test_dom_event_on_window(host: Rc<MockHost>) {
		let (_handle, count) = start_one(&host, TriggerSpec::event_on("scroll", EventTarget::Window));

		host.dispatch_event(&ResolvedTarget::Element("unit".to_string()), "scroll");
		assert_eq!(count.get(), 0);

		host.dispatch_event(&ResolvedTarget::Window, "scroll");
		assert_eq!(count.get(), 1);
	}

	#[rstest]
	fn test_dom_event_with_missing_target_attaches_nothing(host: Rc<MockHost>) {
		let spec = TriggerSpec::event_on("click", EventTarget::Element("missing".to_string()));
		let (handle, count) = start_one(&host, spec);

		assert_eq!(host.stats().acquired, 0);
		handle.dispose_all();
		assert_eq!(count.get(), 0);
	}

	#[rstest]
	fn test_dispose_after_once_listener_fired_is_safe(host: Rc<MockHost>) {
		let (handle, count) = start_one(&host, TriggerSpec::event("click"));

		host.dispatch_event(&ResolvedTarget::Element("unit".to_string()), "click");
		handle.dispose_all();
		handle.dispose_all();

		assert_eq!(count.get(), 1);
		assert_eq!(host.stats().live, 0);
	}
}

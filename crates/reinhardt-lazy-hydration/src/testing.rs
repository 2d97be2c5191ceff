//! Deterministic host for tests.
//!
//! [`MockHost`] implements [`Host`] with a virtual clock. Nothing happens
//! until the test drives it: [`advance`](MockHost::advance) fires timers and
//! idle timeouts, [`grant_idle`](MockHost::grant_idle) and
//! [`flush_frames`](MockHost::flush_frames) run idle and frame callbacks,
//! [`intersect`](MockHost::intersect) and
//! [`dispatch_event`](MockHost::dispatch_event) simulate the DOM, and
//! [`run_until_stalled`](MockHost::run_until_stalled) drives spawned futures.
//!
//! Every acquired resource is accounted for in [`ResourceStats`], which is
//! how tests prove that nothing outlives a unit.
//!
//! ```ignore
//! let host = Rc::new(MockHost::new());
//! host.insert_element("hero", "<h1>Hello</h1>");
//!
//! let unit = HydrationOnDemand::client(host.clone(), options).wrap(Hero).create(());
//! unit.mount();
//! host.advance(Duration::from_millis(1000));
//! assert_eq!(host.stats().live, 0);
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;

use crate::error_log;
use crate::host::{
	Capabilities, Host, HostCallback, HostHandle, IntersectionEntry, ListenerOptions,
	ObserverOptions, ResolvedTarget,
};

/// Resource accounting for a [`MockHost`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
	/// Resources ever handed out.
	pub acquired: usize,
	/// Resources removed through [`Host::release`].
	pub released: usize,
	/// Resources still held by the host (pending timers, idle requests and
	/// frames, connected observers, attached listeners).
	pub live: usize,
}

struct Observer {
	element_id: String,
	options: ObserverOptions,
	callback: Rc<dyn Fn(IntersectionEntry)>,
}

struct Listener {
	target: ResolvedTarget,
	event: String,
	options: ListenerOptions,
	callback: Rc<dyn Fn()>,
}

#[derive(Default)]
struct MockState {
	now: Duration,
	next_handle: u64,
	capabilities: Capabilities,
	input_pending: Option<bool>,
	elements: HashMap<String, String>,
	timers: BTreeMap<HostHandle, (Duration, HostCallback)>,
	idle: BTreeMap<HostHandle, (Duration, HostCallback)>,
	frames: BTreeMap<HostHandle, HostCallback>,
	observers: BTreeMap<HostHandle, Observer>,
	listeners: BTreeMap<HostHandle, Listener>,
	acquired: Vec<HostHandle>,
	released: Vec<HostHandle>,
}

impl MockState {
	fn allocate(&mut self) -> HostHandle {
		self.next_handle += 1;
		let handle = HostHandle(self.next_handle);
		self.acquired.push(handle);
		handle
	}

	fn live(&self) -> usize {
		self.timers.len() + self.idle.len() + self.frames.len() + self.observers.len() + self.listeners.len()
	}

	/// Earliest timer or idle deadline at or before `limit`.
	fn next_due(&self, limit: Duration) -> Option<(Duration, HostHandle, bool)> {
		let timer = self
			.timers
			.iter()
			.map(|(handle, (due, _))| (*due, *handle, false));
		let idle = self
			.idle
			.iter()
			.map(|(handle, (deadline, _))| (*deadline, *handle, true));
		timer.chain(idle).filter(|(due, _, _)| *due <= limit).min()
	}
}

/// A virtual-clock [`Host`] for tests.
///
/// Callbacks are always invoked with no internal borrow held, so they may
/// call back into the host (release handles, request frames, spawn tasks).
pub struct MockHost {
	state: RefCell<MockState>,
	pool: RefCell<LocalPool>,
	spawner: LocalSpawner,
}

impl Default for MockHost {
	fn default() -> Self {
		Self::new()
	}
}

impl MockHost {
	/// Creates a host supporting every capability, with no elements.
	pub fn new() -> Self {
		let pool = LocalPool::new();
		let spawner = pool.spawner();
		Self {
			state: RefCell::new(MockState::default()),
			pool: RefCell::new(pool),
			spawner,
		}
	}

	/// Creates a host with the given capabilities.
	pub fn with_capabilities(capabilities: Capabilities) -> Self {
		let host = Self::new();
		host.set_capabilities(capabilities);
		host
	}

	/// Replaces the supported capabilities.
	pub fn set_capabilities(&self, capabilities: Capabilities) {
		self.state.borrow_mut().capabilities = capabilities;
	}

	/// Adds an element with the given inner HTML.
	pub fn insert_element(&self, id: impl Into<String>, inner_html: impl Into<String>) {
		self.state
			.borrow_mut()
			.elements
			.insert(id.into(), inner_html.into());
	}

	/// Sets what the input-pending probe reports.
	pub fn set_input_pending(&self, pending: bool) {
		self.state.borrow_mut().input_pending = Some(pending);
	}

	/// Current virtual time.
	pub fn now(&self) -> Duration {
		self.state.borrow().now
	}

	/// Advances the clock, firing due timers and expired idle requests in
	/// deadline order.
	pub fn advance(&self, delta: Duration) {
		let target = self.now() + delta;
		loop {
			let callback = {
				let mut state = self.state.borrow_mut();
				let Some((due, handle, is_idle)) = state.next_due(target) else {
					break;
				};
				state.now = due;
				let entry = if is_idle {
					state.idle.remove(&handle)
				} else {
					state.timers.remove(&handle)
				};
				entry.map(|(_, callback)| callback)
			};
			if let Some(callback) = callback {
				callback();
			}
		}
		self.state.borrow_mut().now = target;
	}

	/// Grants every pending idle request.
	pub fn grant_idle(&self) {
		let idle = std::mem::take(&mut self.state.borrow_mut().idle);
		for (_, (_, callback)) in idle {
			callback();
		}
	}

	/// Runs the animation frames requested so far. Frames requested by these
	/// callbacks wait for the next flush.
	pub fn flush_frames(&self) {
		let frames = std::mem::take(&mut self.state.borrow_mut().frames);
		for (_, callback) in frames {
			callback();
		}
	}

	/// Delivers an intersection entry to every observer of `element_id`.
	pub fn intersect(&self, element_id: &str, is_intersecting: bool, intersection_ratio: f64) {
		let callbacks: Vec<_> = self
			.state
			.borrow()
			.observers
			.values()
			.filter(|observer| observer.element_id == element_id)
			.map(|observer| Rc::clone(&observer.callback))
			.collect();
		let entry = IntersectionEntry {
			is_intersecting,
			intersection_ratio,
		};
		for callback in callbacks {
			callback(entry);
		}
	}

	/// Dispatches `event` on `target`. Single-fire listeners are removed
	/// before they run.
	pub fn dispatch_event(&self, target: &ResolvedTarget, event: &str) {
		let callbacks: Vec<_> = {
			let mut state = self.state.borrow_mut();
			let matching: Vec<HostHandle> = state
				.listeners
				.iter()
				.filter(|(_, listener)| &listener.target == target && listener.event == event)
				.map(|(handle, _)| *handle)
				.collect();
			matching
				.into_iter()
				.filter_map(|handle| {
					let once = state.listeners.get(&handle)?.options.once;
					if once {
						state.listeners.remove(&handle).map(|listener| listener.callback)
					} else {
						state.listeners.get(&handle).map(|listener| Rc::clone(&listener.callback))
					}
				})
				.collect()
		};
		for callback in callbacks {
			callback();
		}
	}

	/// Drives spawned futures until none can make progress.
	pub fn run_until_stalled(&self) {
		self.pool.borrow_mut().run_until_stalled();
	}

	/// Resource accounting.
	pub fn stats(&self) -> ResourceStats {
		let state = self.state.borrow();
		ResourceStats {
			acquired: state.acquired.len(),
			released: state.released.len(),
			live: state.live(),
		}
	}

	/// Handles in acquisition order.
	pub fn acquired_handles(&self) -> Vec<HostHandle> {
		self.state.borrow().acquired.clone()
	}

	/// Handles in release order.
	pub fn released_handles(&self) -> Vec<HostHandle> {
		self.state.borrow().released.clone()
	}

	/// Pending timers.
	pub fn pending_timers(&self) -> usize {
		self.state.borrow().timers.len()
	}

	/// Pending idle requests.
	pub fn pending_idle(&self) -> usize {
		self.state.borrow().idle.len()
	}

	/// Pending animation frames.
	pub fn pending_frames(&self) -> usize {
		self.state.borrow().frames.len()
	}

	/// Connected observers as `(element id, options)`.
	pub fn observers(&self) -> Vec<(String, ObserverOptions)> {
		self.state
			.borrow()
			.observers
			.values()
			.map(|observer| (observer.element_id.clone(), observer.options.clone()))
			.collect()
	}

	/// Attached listeners as `(target, event, options)`.
	pub fn listeners(&self) -> Vec<(ResolvedTarget, String, ListenerOptions)> {
		self.state
			.borrow()
			.listeners
			.values()
			.map(|listener| (listener.target.clone(), listener.event.clone(), listener.options))
			.collect()
	}
}

impl Host for MockHost {
	fn capabilities(&self) -> Capabilities {
		self.state.borrow().capabilities
	}

	fn set_timeout(&self, delay: Duration, callback: HostCallback) -> HostHandle {
		let mut state = self.state.borrow_mut();
		let handle = state.allocate();
		let due = state.now + delay;
		state.timers.insert(handle, (due, callback));
		handle
	}

	fn request_idle_callback(&self, timeout: Duration, callback: HostCallback) -> Option<HostHandle> {
		let mut state = self.state.borrow_mut();
		if !state.capabilities.idle_callback {
			return None;
		}
		let handle = state.allocate();
		let deadline = state.now + timeout;
		state.idle.insert(handle, (deadline, callback));
		Some(handle)
	}

	fn request_animation_frame(&self, callback: HostCallback) -> Option<HostHandle> {
		let mut state = self.state.borrow_mut();
		if !state.capabilities.animation_frame {
			return None;
		}
		let handle = state.allocate();
		state.frames.insert(handle, callback);
		Some(handle)
	}

	fn observe_intersection(
		&self,
		element_id: &str,
		options: &ObserverOptions,
		callback: Rc<dyn Fn(IntersectionEntry)>,
	) -> Option<HostHandle> {
		let mut state = self.state.borrow_mut();
		if !state.capabilities.intersection_observer || !state.elements.contains_key(element_id) {
			return None;
		}
		let handle = state.allocate();
		state.observers.insert(
			handle,
			Observer {
				element_id: element_id.to_string(),
				options: options.clone(),
				callback,
			},
		);
		Some(handle)
	}

	fn add_event_listener(
		&self,
		target: &ResolvedTarget,
		event: &str,
		options: ListenerOptions,
		callback: Rc<dyn Fn()>,
	) -> Option<HostHandle> {
		let mut state = self.state.borrow_mut();
		if matches!(target, ResolvedTarget::Element(id) if !state.elements.contains_key(id)) {
			return None;
		}
		let handle = state.allocate();
		state.listeners.insert(
			handle,
			Listener {
				target: target.clone(),
				event: event.to_string(),
				options,
				callback,
			},
		);
		Some(handle)
	}

	fn release(&self, handle: HostHandle) {
		let mut state = self.state.borrow_mut();
		let cancel_idle = state.capabilities.cancel_idle_callback;
		let removed = state.timers.remove(&handle).is_some()
			|| state.frames.remove(&handle).is_some()
			|| state.observers.remove(&handle).is_some()
			|| state.listeners.remove(&handle).is_some()
			|| (cancel_idle && state.idle.remove(&handle).is_some());
		if removed {
			state.released.push(handle);
		}
	}

	fn input_pending(&self) -> Option<bool> {
		let state = self.state.borrow();
		if !state.capabilities.input_pending {
			return None;
		}
		state.input_pending
	}

	fn container_markup(&self, element_id: &str) -> Option<String> {
		self.state.borrow().elements.get(element_id).cloned()
	}

	fn has_element(&self, element_id: &str) -> bool {
		self.state.borrow().elements.contains_key(element_id)
	}

	fn spawn_local(&self, future: LocalBoxFuture<'static, ()>) {
		if let Err(error) = self.spawner.spawn_local(future) {
			error_log!("MockHost failed to spawn a task: {}", error);
		}
	}
}

impl fmt::Debug for MockHost {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.borrow();
		f.debug_struct("MockHost")
			.field("now", &state.now)
			.field("capabilities", &state.capabilities)
			.field("elements", &state.elements.len())
			.field("live", &state.live())
			.finish()
	}
}

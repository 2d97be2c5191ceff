//! Activation lifecycle of one deferred unit.
//!
//! ```text
//! Dormant ──trigger / activate()──▶ Active
//!    │                                ▲
//!    └──trigger (with on_before)──▶ Activating
//!                      ▲                │
//!                      └── rejected ────┘ (back to Dormant)
//! ```
//!
//! `Active` is terminal.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Lifecycle phase of a deferred unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	/// Showing the placeholder, waiting for a trigger.
	Dormant,
	/// A trigger fired and the `on_before` precondition is being awaited.
	Activating,
	/// Rendering the real content.
	Active,
}

impl Phase {
	/// Returns true for [`Phase::Active`].
	pub fn is_active(self) -> bool {
		matches!(self, Phase::Active)
	}
}

type Subscriber = Rc<dyn Fn(Phase)>;

struct StateInner {
	phase: Cell<Phase>,
	subscribers: RefCell<Vec<Subscriber>>,
}

/// Observable activation phase.
///
/// Clones share the same phase. Subscribers run after every transition that
/// changes the phase.
#[derive(Clone)]
pub struct ActivationState {
	inner: Rc<StateInner>,
}

impl ActivationState {
	/// Creates a state starting at `initial`.
	pub fn new(initial: Phase) -> Self {
		Self {
			inner: Rc::new(StateInner {
				phase: Cell::new(initial),
				subscribers: RefCell::new(Vec::new()),
			}),
		}
	}

	/// Returns the current phase.
	pub fn get(&self) -> Phase {
		self.inner.phase.get()
	}

	/// Returns true once the unit is active.
	pub fn is_active(&self) -> bool {
		self.get().is_active()
	}

	/// Registers `subscriber` to be called with each new phase.
	pub fn subscribe<F>(&self, subscriber: F)
	where
		F: Fn(Phase) + 'static,
	{
		self.inner.subscribers.borrow_mut().push(Rc::new(subscriber));
	}

	/// Moves to `next`.
	///
	/// Returns false without notifying anyone when the phase is unchanged or
	/// the state is already [`Phase::Active`].
	pub fn transition(&self, next: Phase) -> bool {
		let current = self.inner.phase.get();
		if current == next || current.is_active() {
			return false;
		}
		self.inner.phase.set(next);

		let subscribers = self.inner.subscribers.borrow().clone();
		for subscriber in subscribers {
			subscriber(next);
		}
		true
	}
}

impl fmt::Debug for ActivationState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActivationState")
			.field("phase", &self.get())
			.field("subscribers", &self.inner.subscribers.borrow().len())
			.finish()
	}
}

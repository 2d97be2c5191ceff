//! Property-based tests for the activation guarantees
//!
//! Whatever triggers are configured and whatever the host does, a unit
//! activates at most once, and once it is active or unmounted no host
//! resource remains.

#![cfg(not(target_arch = "wasm32"))]

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use proptest::prelude::*;
use reinhardt_lazy_hydration::host::ResolvedTarget;
use reinhardt_lazy_hydration::testing::MockHost;
use reinhardt_lazy_hydration::{
	DeferredUnit, FnComponent, HydrationOnDemand, HydrationOptions, IntoPage, Page, Phase,
	RenderError, TriggerSpec, component_fn,
};

type Content = FnComponent<(), fn(&()) -> Result<Page, RenderError>>;

fn content(_: &()) -> Result<Page, RenderError> {
	Ok("live".into_page())
}

#[derive(Debug, Clone)]
enum HostEvent {
	Advance(u64),
	GrantIdle,
	FlushFrames,
	Intersect(bool, f64),
	Click,
	Activate,
}

fn trigger_strategy() -> impl Strategy<Value = TriggerSpec> {
	prop_oneof![
		(0u64..3000).prop_map(TriggerSpec::delay_ms),
		Just(TriggerSpec::visible()),
		Just(TriggerSpec::Idle),
		Just(TriggerSpec::event("click")),
	]
}

fn event_strategy() -> impl Strategy<Value = HostEvent> {
	prop_oneof![
		(0u64..2500).prop_map(HostEvent::Advance),
		Just(HostEvent::GrantIdle),
		Just(HostEvent::FlushFrames),
		(any::<bool>(), 0.0f64..1.0).prop_map(|(hit, ratio)| HostEvent::Intersect(hit, ratio)),
		Just(HostEvent::Click),
		Just(HostEvent::Activate),
	]
}

fn mounted_unit(host: &Rc<MockHost>, triggers: Vec<TriggerSpec>) -> (DeferredUnit<Content>, Rc<Cell<usize>>) {
	host.insert_element("unit", "<p>static</p>");
	let component: Content = component_fn("Content", content as fn(&()) -> Result<Page, RenderError>);
	let unit = HydrationOnDemand::client(host.clone(), HydrationOptions::new("unit").triggers(triggers))
		.wrap(component)
		.create(());
	let activations = Rc::new(Cell::new(0));
	let counter = Rc::clone(&activations);
	unit.state().unwrap().subscribe(move |phase| {
		if phase == Phase::Active {
			counter.set(counter.get() + 1);
		}
	});
	unit.mount();
	(unit, activations)
}

fn apply(host: &MockHost, unit: &DeferredUnit<Content>, event: &HostEvent) {
	match event {
		HostEvent::Advance(ms) => host.advance(Duration::from_millis(*ms)),
		HostEvent::GrantIdle => host.grant_idle(),
		HostEvent::FlushFrames => host.flush_frames(),
		HostEvent::Intersect(hit, ratio) => host.intersect("unit", *hit, *ratio),
		HostEvent::Click => host.dispatch_event(&ResolvedTarget::Element("unit".to_string()), "click"),
		HostEvent::Activate => {
			unit.activate();
		}
	}
}

proptest! {
	#[test]
	fn prop_activation_happens_at_most_once(
		triggers in prop::collection::vec(trigger_strategy(), 1..5),
		events in prop::collection::vec(event_strategy(), 0..20),
	) {
		let host = Rc::new(MockHost::new());
		let (unit, activations) = mounted_unit(&host, triggers);

		for event in &events {
			apply(&host, &unit, event);
			prop_assert!(activations.get() <= 1);
			if unit.phase() == Some(Phase::Active) {
				prop_assert_eq!(host.stats().live, 0);
			}
		}

		unit.activate();
		unit.activate();
		prop_assert_eq!(activations.get(), 1);
		prop_assert_eq!(host.stats().live, 0);
	}

	#[test]
	fn prop_unmount_releases_every_resource(
		triggers in prop::collection::vec(trigger_strategy(), 1..5),
		events in prop::collection::vec(event_strategy().prop_filter("no forced activation", |e| !matches!(e, HostEvent::Activate)), 0..10),
	) {
		let host = Rc::new(MockHost::new());
		let (unit, activations) = mounted_unit(&host, triggers);
		for event in &events {
			apply(&host, &unit, event);
		}
		let was_active = activations.get() == 1;

		drop(unit);
		host.advance(Duration::from_secs(10));
		host.grant_idle();
		host.flush_frames();

		prop_assert_eq!(host.stats().live, 0);
		prop_assert_eq!(activations.get(), usize::from(was_active));
	}
}

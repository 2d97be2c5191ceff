//! Deferred units: the composition root.
//!
//! [`with_hydration_on_demand`] picks the code path once:
//!
//! - **Server**: the wrapped content always renders inside
//!   `<section id="{id}" data-hydration-on-demand="true" ...>`. No state, no
//!   triggers.
//! - **Client**: the unit decides its initial [`Phase`] synchronously, shows
//!   the markup captured from the server-rendered container while dormant,
//!   and starts its triggers on [`DeferredUnit::mount`].
//!
//! ```ignore
//! let options = HydrationOptions::new("comments").trigger(TriggerSpec::visible());
//! let comments = with_hydration_on_demand(options).wrap(Comments);
//!
//! let unit = comments.create(CommentsProps { post_id: 7 });
//! unit.mount();
//! let html = unit.render()?.render_to_string();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::activation::{ActivationState, Phase};
use crate::component::{Component, Suspense};
use crate::environment::Environment;
use crate::error::{HydrationError, RenderError};
use crate::host::Host;
use crate::options::{BeforeHydrate, HydrationOptions};
use crate::page::{IntoPage, Page, PageElement};
use crate::trigger::registry::{ActivationGuard, RegistryHandle, TriggerContext, TriggerRegistry};
use crate::trigger::TriggerSpec;
use crate::{debug_log, error_log, info_log, warn_log};

/// Data attribute marking a server-rendered deferred container.
pub const HYDRATION_ATTR: &str = "data-hydration-on-demand";

/// Tag of the container element.
pub const CONTAINER_TAG: &str = "section";

/// Wraps content units according to `options`, choosing the server or client
/// path for the running process.
pub fn with_hydration_on_demand(options: HydrationOptions) -> HydrationOnDemand {
	match client_host() {
		Some(host) => HydrationOnDemand::client(host, options),
		None => HydrationOnDemand::server(options),
	}
}

#[cfg(target_arch = "wasm32")]
fn client_host() -> Option<Rc<dyn Host>> {
	if !crate::environment::is_client_environment() {
		return None;
	}
	crate::host::BrowserHost::new().map(|host| Rc::new(host) as Rc<dyn Host>)
}

#[cfg(not(target_arch = "wasm32"))]
fn client_host() -> Option<Rc<dyn Host>> {
	None
}

/// Static HTML read from the container once, when a component is wrapped.
///
/// Empty when the container was not found, e.g. the unit was not part of the
/// server-rendered output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedMarkup(Rc<str>);

impl CapturedMarkup {
	/// Reads the inner HTML of the element with `id`.
	pub fn capture(host: &dyn Host, id: &str) -> Self {
		let markup = host.container_markup(id).unwrap_or_default();
		Self(markup.into())
	}

	/// Returns the markup.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns true when nothing was captured.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[derive(Clone)]
enum Mode {
	Server,
	Client(Rc<dyn Host>),
}

/// A configured wrapper, ready to [`wrap`](Self::wrap) a component.
#[derive(Clone)]
pub struct HydrationOnDemand {
	options: Rc<HydrationOptions>,
	mode: Mode,
}

impl HydrationOnDemand {
	/// Client path backed by `host`.
	pub fn client(host: Rc<dyn Host>, options: HydrationOptions) -> Self {
		Self {
			options: Rc::new(options),
			mode: Mode::Client(host),
		}
	}

	/// Server path: static pass-through.
	pub fn server(options: HydrationOptions) -> Self {
		Self {
			options: Rc::new(options),
			mode: Mode::Server,
		}
	}

	/// Returns the options.
	pub fn options(&self) -> &HydrationOptions {
		&self.options
	}

	/// Returns which path this wrapper takes.
	pub fn environment(&self) -> Environment {
		match self.mode {
			Mode::Server => Environment::Server,
			Mode::Client(_) => Environment::Client,
		}
	}

	/// Wraps `component`. On the client this captures the container markup.
	pub fn wrap<C: Component>(self, component: C) -> Deferred<C> {
		if self.options.wrapper_attributes.contains_key("id") {
			warn_log!(
				"wrapper attribute 'id' of '{}' is ignored; the container id is fixed",
				self.options.id
			);
		}
		let captured = match &self.mode {
			Mode::Server => CapturedMarkup::default(),
			Mode::Client(host) => CapturedMarkup::capture(host.as_ref(), &self.options.id),
		};
		Deferred {
			component: Rc::new(component),
			options: self.options,
			mode: self.mode,
			captured,
		}
	}
}

impl fmt::Debug for HydrationOnDemand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HydrationOnDemand")
			.field("options", &self.options)
			.field("environment", &self.environment())
			.finish()
	}
}

/// Input of a deferred unit: the wrapped component's props plus
/// `force_activation`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferredProps<P> {
	/// Props forwarded to the wrapped component.
	pub props: P,
	/// Activate at creation, bypassing triggers. Ignored when `on_before` is set.
	pub force_activation: bool,
}

impl<P> DeferredProps<P> {
	/// Props without forced activation.
	pub fn new(props: P) -> Self {
		Self {
			props,
			force_activation: false,
		}
	}

	/// Sets `force_activation`.
	pub fn force_activation(mut self, force: bool) -> Self {
		self.force_activation = force;
		self
	}
}

impl<P> From<P> for DeferredProps<P> {
	fn from(props: P) -> Self {
		Self::new(props)
	}
}

/// A wrapped component. Creates [`DeferredUnit`]s.
pub struct Deferred<C: Component> {
	component: Rc<C>,
	options: Rc<HydrationOptions>,
	mode: Mode,
	captured: CapturedMarkup,
}

impl<C: Component> Deferred<C> {
	/// `withHydrationOnDemand(<Name>)` on the client, the plain component name
	/// on the server.
	pub fn display_name(&self) -> String {
		match self.mode {
			Mode::Server => self.component.name().to_string(),
			Mode::Client(_) => format!("withHydrationOnDemand({})", self.component.name()),
		}
	}

	/// Markup captured when the component was wrapped.
	pub fn captured_markup(&self) -> &CapturedMarkup {
		&self.captured
	}

	/// Creates a unit. The initial phase is decided here, synchronously.
	pub fn create(&self, props: impl Into<DeferredProps<C::Props>>) -> DeferredUnit<C> {
		let DeferredProps {
			props,
			force_activation,
		} = props.into();
		let kind = match &self.mode {
			Mode::Server => UnitKind::Server,
			Mode::Client(host) => {
				let eager = eager_activation(host.as_ref(), &self.options, force_activation);
				UnitKind::Client(UnitShared::new(Rc::clone(host), &self.options, eager))
			}
		};
		DeferredUnit {
			component: Rc::clone(&self.component),
			props,
			options: Rc::clone(&self.options),
			captured: self.captured.clone(),
			kind,
		}
	}
}

impl<C: Component> fmt::Debug for Deferred<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Deferred")
			.field("display_name", &self.display_name())
			.field("options", &self.options)
			.field("captured", &self.captured)
			.finish()
	}
}

fn eager_activation(host: &dyn Host, options: &HydrationOptions, force: bool) -> bool {
	if options.on_before.is_some() {
		return false;
	}
	if force {
		return true;
	}
	options.input_pending_aware && !host.input_pending().unwrap_or(options.input_pending_fallback)
}

struct UnitShared {
	id: Rc<str>,
	host: Rc<dyn Host>,
	triggers: Vec<TriggerSpec>,
	on_before: Option<BeforeHydrate>,
	state: ActivationState,
	guard: ActivationGuard,
	registry: RefCell<Option<RegistryHandle>>,
	mounted: Cell<bool>,
	unmounted: Cell<bool>,
	error: RefCell<Option<HydrationError>>,
}

impl UnitShared {
	fn new(host: Rc<dyn Host>, options: &HydrationOptions, eager: bool) -> Rc<Self> {
		Rc::new_cyclic(|weak: &Weak<UnitShared>| {
			let (phase, guard) = if eager {
				(Phase::Active, ActivationGuard::spent())
			} else {
				let weak = weak.clone();
				let guard = ActivationGuard::new(move || {
					if let Some(shared) = weak.upgrade() {
						UnitShared::activate(&shared);
					}
				});
				(Phase::Dormant, guard)
			};
			Self {
				id: options.id.as_str().into(),
				host,
				triggers: options.triggers.clone(),
				on_before: options.on_before.clone(),
				state: ActivationState::new(phase),
				guard,
				registry: RefCell::new(None),
				mounted: Cell::new(false),
				unmounted: Cell::new(false),
				error: RefCell::new(None),
			}
		})
	}

	fn mount(&self) {
		if self.mounted.replace(true) || !self.guard.is_open() {
			return;
		}
		debug_log!("mounting '{}' with {} trigger(s)", self.id, self.triggers.len());
		let context = TriggerContext::new(Rc::clone(&self.host), Rc::clone(&self.id));
		let handle = TriggerRegistry::start(&context, &self.triggers, self.guard.clone());
		*self.registry.borrow_mut() = Some(handle);
	}

	fn dispose_triggers(&self) {
		let registry = self.registry.borrow_mut().take();
		if let Some(registry) = registry {
			registry.dispose_all();
		}
	}

	/// Runs once, from the guard.
	fn activate(this: &Rc<Self>) {
		this.dispose_triggers();
		let Some(on_before) = this.on_before.clone() else {
			info_log!("'{}' activated", this.id);
			this.state.transition(Phase::Active);
			return;
		};

		this.state.transition(Phase::Activating);
		let precondition = on_before();
		let weak = Rc::downgrade(this);
		this.host.spawn_local(Box::pin(async move {
			let outcome = precondition.await;
			if let Some(shared) = weak.upgrade() {
				shared.finish_activation(outcome);
			}
		}));
	}

	fn finish_activation(&self, outcome: Result<(), HydrationError>) {
		if self.unmounted.get() {
			debug_log!("'{}' was unmounted, discarding precondition result", self.id);
			return;
		}
		match outcome {
			Ok(()) => {
				info_log!("'{}' activated after precondition", self.id);
				self.state.transition(Phase::Active);
			}
			Err(error) => {
				error_log!("precondition of '{}' rejected: {}", self.id, error);
				*self.error.borrow_mut() = Some(error);
				self.state.transition(Phase::Dormant);
			}
		}
	}

	fn unmount(&self) {
		self.unmounted.set(true);
		self.dispose_triggers();
		self.guard.revoke();
	}
}

enum UnitKind {
	Server,
	Client(Rc<UnitShared>),
}

/// One mounted instance of a wrapped component.
///
/// Dropping the unit unmounts it: every pending trigger is disposed and a
/// pending precondition result is discarded.
pub struct DeferredUnit<C: Component> {
	component: Rc<C>,
	props: C::Props,
	options: Rc<HydrationOptions>,
	captured: CapturedMarkup,
	kind: UnitKind,
}

impl<C: Component> DeferredUnit<C> {
	/// Starts the configured triggers if the unit is dormant. Idempotent.
	pub fn mount(&self) {
		if let UnitKind::Client(shared) = &self.kind {
			shared.mount();
		}
	}

	/// Disposes every pending trigger and discards a pending precondition.
	/// The unit can no longer activate.
	pub fn unmount(&self) {
		if let UnitKind::Client(shared) = &self.kind {
			shared.unmount();
		}
	}

	/// Caller-forced activation through the same guarded path as triggers,
	/// `on_before` included.
	///
	/// Returns true if this call started the activation.
	pub fn activate(&self) -> bool {
		match &self.kind {
			UnitKind::Server => false,
			UnitKind::Client(shared) => shared.guard.request(),
		}
	}

	/// Current phase. `None` on the server path.
	pub fn phase(&self) -> Option<Phase> {
		self.state().map(|state| state.get())
	}

	/// Observable state. `None` on the server path.
	pub fn state(&self) -> Option<&ActivationState> {
		match &self.kind {
			UnitKind::Server => None,
			UnitKind::Client(shared) => Some(&shared.state),
		}
	}

	/// The stored precondition rejection, if any.
	pub fn error(&self) -> Option<HydrationError> {
		match &self.kind {
			UnitKind::Server => None,
			UnitKind::Client(shared) => shared.error.borrow().clone(),
		}
	}

	/// Number of live trigger sources.
	pub fn live_triggers(&self) -> usize {
		match &self.kind {
			UnitKind::Server => 0,
			UnitKind::Client(shared) => shared.registry.borrow().as_ref().map_or(0, RegistryHandle::len),
		}
	}

	/// Props of the wrapped component.
	pub fn props(&self) -> &C::Props {
		&self.props
	}

	/// Renders the unit.
	///
	/// Dormant and activating units render the placeholder with the captured
	/// markup. Active units render the wrapped content inside the same
	/// `<section id>` container, so the client tree keeps the server tree's
	/// shape instead of replacing the container with bare content; a
	/// [`RenderError::Pending`] from the content shows the placeholder instead.
	/// A rejected precondition is returned as [`RenderError::Failed`].
	pub fn render(&self) -> Result<Page, RenderError> {
		let shared = match &self.kind {
			UnitKind::Server => return self.render_server(),
			UnitKind::Client(shared) => shared,
		};
		if let Some(error) = shared.error.borrow().clone() {
			return Err(RenderError::Failed(error));
		}
		if !shared.state.is_active() {
			return Ok(self.placeholder());
		}

		let fallback = if self.options.disable_fallback {
			self.container().into_page()
		} else {
			self.placeholder()
		};
		let content = self
			.component
			.render(&self.props)
			.map(|page| self.container().child(page).into_page());
		Ok(Suspense::new(fallback).resolve(content)?)
	}

	fn render_server(&self) -> Result<Page, RenderError> {
		let content = self.component.render(&self.props)?;
		let container = PageElement::new(CONTAINER_TAG)
			.attr("id", self.options.id.clone())
			.attr(HYDRATION_ATTR, "true");
		Ok(self.with_wrapper_attributes(container).child(content).into_page())
	}

	fn container(&self) -> PageElement {
		let container = PageElement::new(CONTAINER_TAG).attr("id", self.options.id.clone());
		self.with_wrapper_attributes(container)
	}

	fn placeholder(&self) -> Page {
		self.container()
			.child(Page::raw_html(self.captured.as_str().to_string()))
			.into_page()
	}

	fn with_wrapper_attributes(&self, mut element: PageElement) -> PageElement {
		for (name, value) in &self.options.wrapper_attributes {
			if name == "id" {
				continue;
			}
			element = element.attr(name.clone(), value.clone());
		}
		element
	}
}

impl<C: Component> Drop for DeferredUnit<C> {
	fn drop(&mut self) {
		self.unmount();
	}
}

impl<C: Component> fmt::Debug for DeferredUnit<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeferredUnit")
			.field("id", &self.options.id)
			.field("component", &self.component.name())
			.field("phase", &self.phase())
			.field("live_triggers", &self.live_triggers())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::{PassThroughLoading, component_fn};
	use crate::host::{Capabilities, Capability};
	use crate::testing::MockHost;
	use rstest::{fixture, rstest};
	use std::time::Duration;

	fn hero() -> impl Component<Props = ()> {
		component_fn("Hero", |_: &()| Ok(PageElement::new("h1").child("Live").into_page()))
	}

	#[fixture]
	fn host() -> Rc<MockHost> {
		let host = Rc::new(MockHost::new());
		host.insert_element("a", "<h1>Static</h1>");
		host
	}

	#[rstest]
	fn test_dormant_unit_renders_captured_markup(host: Rc<MockHost>) {
		let options = HydrationOptions::new("a").trigger(TriggerSpec::delay_ms(1000));
		let unit = HydrationOnDemand::client(host.clone(), options).wrap(hero()).create(());

		unit.mount();

		assert_eq!(unit.phase(), Some(Phase::Dormant));
		assert_eq!(
			unit.render().unwrap().render_to_string(),
			r#"<section id="a"><h1>Static</h1></section>"#
		);
	}

	#[rstest]
	fn test_trigger_activates_and_renders_content(host: Rc<MockHost>) {
		let options = HydrationOptions::new("a").trigger(TriggerSpec::delay_ms(1000));
		let unit = HydrationOnDemand::client(host.clone(), options).wrap(hero()).create(());
		unit.mount();

		host.advance(Duration::from_millis(1000));

		assert_eq!(unit.phase(), Some(Phase::Active));
		assert_eq!(
			unit.render().unwrap().render_to_string(),
			r#"<section id="a"><h1>Live</h1></section>"#
		);
	}

	#[rstest]
	fn test_force_activation_skips_triggers(host: Rc<MockHost>) {
		let options = HydrationOptions::new("a").trigger(TriggerSpec::Idle);
		let unit = HydrationOnDemand::client(host.clone(), options)
			.wrap(hero())
			.create(DeferredProps::new(()).force_activation(true));

		unit.mount();

		assert_eq!(unit.phase(), Some(Phase::Active));
		assert_eq!(host.stats().acquired, 0);
	}

	#[rstest]
	#[case(Some(false), true, true)]
	#[case(Some(true), true, false)]
	#[case(None, true, false)]
	#[case(None, false, true)]
	fn test_input_pending_eager_activation(
		host: Rc<MockHost>,
		#[case] pending: Option<bool>,
		#[case] fallback: bool,
		#[case] expect_active: bool,
	) {
		match pending {
			Some(pending) => host.set_input_pending(pending),
			None => host.set_capabilities(Capabilities::all().with(Capability::InputPending, false)),
		}
		let options = HydrationOptions::new("a")
			.input_pending_aware(true)
			.input_pending_fallback(fallback);

		let unit = HydrationOnDemand::client(host.clone(), options).wrap(hero()).create(());

		assert_eq!(unit.phase().map(Phase::is_active), Some(expect_active));
	}

	#[rstest]
	fn test_on_before_forces_dormant_start(host: Rc<MockHost>) {
		let options = HydrationOptions::new("a").on_before(|| async { Ok(()) });
		let unit = HydrationOnDemand::client(host.clone(), options)
			.wrap(hero())
			.create(DeferredProps::new(()).force_activation(true));

		assert_eq!(unit.phase(), Some(Phase::Dormant));
	}

	#[rstest]
	fn test_activate_is_idempotent(host: Rc<MockHost>) {
		let unit = HydrationOnDemand::client(host.clone(), HydrationOptions::new("a"))
			.wrap(hero())
			.create(());
		let transitions = Rc::new(Cell::new(0));
		let counter = Rc::clone(&transitions);
		unit.state().unwrap().subscribe(move |_| counter.set(counter.get() + 1));

		assert!(unit.activate());
		assert!(!unit.activate());

		assert_eq!(transitions.get(), 1);
		assert_eq!(unit.phase(), Some(Phase::Active));
	}

	#[rstest]
	fn test_pending_content_keeps_placeholder(host: Rc<MockHost>) {
		let unit = HydrationOnDemand::client(host.clone(), HydrationOptions::new("a"))
			.wrap(PassThroughLoading)
			.create(DeferredProps::new(()).force_activation(true));

		assert_eq!(
			unit.render().unwrap().render_to_string(),
			r#"<section id="a"><h1>Static</h1></section>"#
		);
	}

	#[rstest]
	fn test_disable_fallback_drops_captured_markup(host: Rc<MockHost>) {
		let options = HydrationOptions::new("a").disable_fallback(true);
		let unit = HydrationOnDemand::client(host.clone(), options)
			.wrap(PassThroughLoading)
			.create(DeferredProps::new(()).force_activation(true));

		assert_eq!(unit.render().unwrap().render_to_string(), r#"<section id="a"></section>"#);
	}

	#[rstest]
	fn test_server_unit_renders_static_container() {
		let options = HydrationOptions::new("a")
			.trigger(TriggerSpec::Idle)
			.wrapper_attribute("class", "card");
		let deferred = HydrationOnDemand::server(options).wrap(hero());
		let unit = deferred.create(());

		unit.mount();

		assert_eq!(deferred.display_name(), "Hero");
		assert_eq!(unit.phase(), None);
		assert_eq!(
			unit.render().unwrap().render_to_string(),
			r#"<section id="a" data-hydration-on-demand="true" class="card"><h1>Live</h1></section>"#
		);
	}

	#[rstest]
	fn test_client_display_name(host: Rc<MockHost>) {
		let deferred = HydrationOnDemand::client(host, HydrationOptions::new("a")).wrap(hero());

		assert_eq!(deferred.display_name(), "withHydrationOnDemand(Hero)");
	}

	#[rstest]
	fn test_wrapper_id_is_ignored(host: Rc<MockHost>) {
		let options = HydrationOptions::new("a").wrapper_attribute("id", "other");
		let unit = HydrationOnDemand::client(host, options).wrap(hero()).create(());

		let page = unit.render().unwrap();

		let element = page.as_element().unwrap();
		assert_eq!(element.get_attr("id"), Some("a"));
		assert_eq!(element.attrs().len(), 1);
	}

	#[rstest]
	fn test_drop_releases_pending_triggers(host: Rc<MockHost>) {
		let options = HydrationOptions::new("a")
			.trigger(TriggerSpec::delay_ms(500))
			.trigger(TriggerSpec::visible())
			.trigger(TriggerSpec::event("click"));
		let unit = HydrationOnDemand::client(host.clone(), options).wrap(hero()).create(());
		unit.mount();
		assert_eq!(host.stats().live, 3);

		drop(unit);

		assert_eq!(host.stats().live, 0);
	}
}

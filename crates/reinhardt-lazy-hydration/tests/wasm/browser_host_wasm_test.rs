//! Browser host tests
//!
//! Run with `wasm-pack test --headless --chrome`.

#![cfg(target_arch = "wasm32")]

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use reinhardt_lazy_hydration::host::{Host, ListenerOptions, ResolvedTarget};
use reinhardt_lazy_hydration::{
	BrowserHost, HydrationOnDemand, HydrationOptions, IntoPage, Phase, TriggerSpec, component_fn,
	is_client_environment,
};
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

async fn sleep(duration: Duration) {
	let promise = js_sys::Promise::new(&mut |resolve, _reject| {
		let window = web_sys::window().unwrap();
		window
			.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, duration.as_millis() as i32)
			.unwrap();
	});
	JsFuture::from(promise).await.unwrap();
}

fn mount_container(id: &str, inner_html: &str) -> web_sys::Element {
	let document = web_sys::window().unwrap().document().unwrap();
	let element = document.create_element("section").unwrap();
	element.set_id(id);
	element.set_inner_html(inner_html);
	document.body().unwrap().append_child(&element).unwrap();
	element
}

#[wasm_bindgen_test]
fn test_browser_is_client_environment() {
	assert!(is_client_environment());
	assert!(BrowserHost::new().is_some());
}

#[wasm_bindgen_test]
async fn test_timeout_fires_and_release_cancels() {
	let host = BrowserHost::new().unwrap();
	let fired = Rc::new(Cell::new(0));

	let counter = Rc::clone(&fired);
	host.set_timeout(Duration::from_millis(5), Box::new(move || counter.set(counter.get() + 1)));
	let counter = Rc::clone(&fired);
	let cancelled = host.set_timeout(Duration::from_millis(5), Box::new(move || counter.set(counter.get() + 10)));
	host.release(cancelled);
	host.release(cancelled);
	sleep(Duration::from_millis(30)).await;

	assert_eq!(fired.get(), 1);
}

#[wasm_bindgen_test]
fn test_container_markup_reads_inner_html() {
	mount_container("wasm-markup", "<p>server</p>");
	let host = BrowserHost::new().unwrap();

	assert_eq!(host.container_markup("wasm-markup").as_deref(), Some("<p>server</p>"));
	assert!(host.has_element("wasm-markup"));
	assert_eq!(host.container_markup("wasm-absent"), None);
}

#[wasm_bindgen_test]
async fn test_delay_trigger_activates_unit() {
	mount_container("wasm-delay", "<p>server</p>");
	let host: Rc<dyn Host> = Rc::new(BrowserHost::new().unwrap());
	let options = HydrationOptions::new("wasm-delay").trigger(TriggerSpec::delay_ms(10));
	let unit = HydrationOnDemand::client(host, options)
		.wrap(component_fn("Live", |_: &()| Ok("live".into_page())))
		.create(());

	unit.mount();
	assert_eq!(unit.phase(), Some(Phase::Dormant));
	assert!(unit.render().unwrap().render_to_string().contains("<p>server</p>"));
	sleep(Duration::from_millis(50)).await;

	assert_eq!(unit.phase(), Some(Phase::Active));
	assert_eq!(unit.live_triggers(), 0);
}

#[wasm_bindgen_test]
async fn test_click_trigger_fires_once() {
	let element = mount_container("wasm-click", "<button>go</button>");
	let host: Rc<dyn Host> = Rc::new(BrowserHost::new().unwrap());
	let options = HydrationOptions::new("wasm-click").trigger(TriggerSpec::event("click"));
	let unit = HydrationOnDemand::client(host, options)
		.wrap(component_fn("Live", |_: &()| Ok("live".into_page())))
		.create(());
	let activations = Rc::new(Cell::new(0));
	let counter = Rc::clone(&activations);
	unit.state().unwrap().subscribe(move |_| counter.set(counter.get() + 1));
	unit.mount();

	let click = web_sys::Event::new("click").unwrap();
	element.dispatch_event(&click).unwrap();
	element.dispatch_event(&click).unwrap();
	sleep(Duration::from_millis(10)).await;

	assert_eq!(unit.phase(), Some(Phase::Active));
	assert_eq!(activations.get(), 1);
}

#[wasm_bindgen_test]
async fn test_listener_release_is_idempotent() {
	let host = BrowserHost::new().unwrap();
	let fired = Rc::new(Cell::new(false));
	let flag = Rc::clone(&fired);

	let handle = host
		.add_event_listener(
			&ResolvedTarget::Window,
			"wasm-test-event",
			ListenerOptions {
				once: false,
				capture: false,
				passive: true,
			},
			Rc::new(move || flag.set(true)),
		)
		.unwrap();
	host.release(handle);
	host.release(handle);
	let event = web_sys::Event::new("wasm-test-event").unwrap();
	web_sys::window().unwrap().dispatch_event(&event).unwrap();
	sleep(Duration::from_millis(10)).await;

	assert!(!fired.get());
}

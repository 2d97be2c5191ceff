//! [`Host`] backed by the browser (`web-sys`).
//!
//! Every JS closure handed to the browser is owned by a resource entry keyed by
//! its [`HostHandle`]. Releasing a handle cancels the browser-side
//! registration first; the closure itself is dropped on a later task, since a
//! one-shot closure retires its own entry while it is running.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::LocalBoxFuture;
use js_sys::{Array, Function, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
	AddEventListenerOptions, IdleRequestOptions, IntersectionObserver, IntersectionObserverEntry,
	IntersectionObserverInit, Window,
};

use super::{
	Capabilities, Host, HostCallback, HostHandle, IntersectionEntry, ListenerOptions,
	ObserverOptions, ResolvedTarget,
};
use crate::warn_log;

enum Resource {
	Timeout {
		id: i32,
		_closure: Closure<dyn FnMut()>,
	},
	Idle {
		id: u32,
		_closure: Closure<dyn FnMut()>,
	},
	Frame {
		id: i32,
		_closure: Closure<dyn FnMut()>,
	},
	Observer {
		observer: IntersectionObserver,
		_closure: Closure<dyn FnMut(Array)>,
	},
	Listener {
		target: web_sys::EventTarget,
		event: String,
		capture: bool,
		closure: Closure<dyn FnMut()>,
	},
}

struct Registry {
	next_handle: Cell<u64>,
	resources: RefCell<HashMap<HostHandle, Resource>>,
}

impl Registry {
	fn allocate(&self) -> HostHandle {
		let raw = self.next_handle.get() + 1;
		self.next_handle.set(raw);
		HostHandle::new(raw)
	}

	fn insert(&self, handle: HostHandle, resource: Resource) {
		self.resources.borrow_mut().insert(handle, resource);
	}

	/// Forgets a resource whose browser registration has already ended.
	fn retire(&self, handle: HostHandle) {
		let resource = self.resources.borrow_mut().remove(&handle);
		if let Some(resource) = resource {
			drop_later(resource);
		}
	}
}

fn drop_later(resource: Resource) {
	wasm_bindgen_futures::spawn_local(async move {
		drop(resource);
	});
}

/// The browser host.
pub struct BrowserHost {
	window: Window,
	capabilities: Capabilities,
	registry: Rc<Registry>,
}

impl BrowserHost {
	/// Creates a host for the current window. `None` outside a browser.
	pub fn new() -> Option<Self> {
		let window = web_sys::window()?;
		let capabilities = probe_capabilities(&window);
		Some(Self {
			window,
			capabilities,
			registry: Rc::new(Registry {
				next_handle: Cell::new(0),
				resources: RefCell::new(HashMap::new()),
			}),
		})
	}

	/// A closure that retires `handle` and then runs `callback`, at most once.
	fn one_shot(&self, handle: HostHandle, callback: HostCallback) -> Closure<dyn FnMut()> {
		let registry: Weak<Registry> = Rc::downgrade(&self.registry);
		let mut callback = Some(callback);
		Closure::wrap(Box::new(move || {
			if let Some(registry) = registry.upgrade() {
				registry.retire(handle);
			}
			if let Some(callback) = callback.take() {
				callback();
			}
		}) as Box<dyn FnMut()>)
	}

	fn event_target(&self, target: &ResolvedTarget) -> Option<web_sys::EventTarget> {
		match target {
			ResolvedTarget::Window => Some(self.window.clone().into()),
			ResolvedTarget::Document => self.window.document().map(Into::into),
			ResolvedTarget::Element(id) => self
				.window
				.document()
				.and_then(|document| document.get_element_by_id(id))
				.map(Into::into),
		}
	}
}

fn has_global(window: &Window, name: &str) -> bool {
	Reflect::has(window, &JsValue::from_str(name)).unwrap_or(false)
}

fn input_pending_probe(window: &Window) -> Option<(JsValue, Function)> {
	let scheduling = Reflect::get(&window.navigator(), &JsValue::from_str("scheduling")).ok()?;
	if !scheduling.is_object() {
		return None;
	}
	let probe = Reflect::get(&scheduling, &JsValue::from_str("isInputPending"))
		.ok()?
		.dyn_into::<Function>()
		.ok()?;
	Some((scheduling, probe))
}

fn probe_capabilities(window: &Window) -> Capabilities {
	Capabilities {
		idle_callback: has_global(window, "requestIdleCallback"),
		cancel_idle_callback: has_global(window, "cancelIdleCallback"),
		animation_frame: has_global(window, "requestAnimationFrame"),
		intersection_observer: has_global(window, "IntersectionObserver"),
		input_pending: input_pending_probe(window).is_some(),
	}
}

fn millis(duration: Duration) -> i32 {
	i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

impl Host for BrowserHost {
	fn capabilities(&self) -> Capabilities {
		self.capabilities
	}

	fn set_timeout(&self, delay: Duration, callback: HostCallback) -> HostHandle {
		let handle = self.registry.allocate();
		let closure = self.one_shot(handle, callback);
		match self
			.window
			.set_timeout_with_callback_and_timeout_and_arguments_0(closure.as_ref().unchecked_ref(), millis(delay))
		{
			Ok(id) => self.registry.insert(
				handle,
				Resource::Timeout {
					id,
					_closure: closure,
				},
			),
			Err(error) => warn_log!("setTimeout failed: {:?}", error),
		}
		handle
	}

	fn request_idle_callback(&self, timeout: Duration, callback: HostCallback) -> Option<HostHandle> {
		if !self.capabilities.idle_callback {
			return None;
		}
		let options = IdleRequestOptions::new();
		options.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
		let handle = self.registry.allocate();

		if !self.capabilities.cancel_idle_callback {
			// Nothing can cancel the request, so the closure must outlive any release.
			let closure = Closure::once_into_js(move || callback());
			if let Err(error) = self
				.window
				.request_idle_callback_with_options(closure.unchecked_ref(), &options)
			{
				warn_log!("requestIdleCallback failed: {:?}", error);
				return None;
			}
			return Some(handle);
		}

		let closure = self.one_shot(handle, callback);
		match self
			.window
			.request_idle_callback_with_options(closure.as_ref().unchecked_ref(), &options)
		{
			Ok(id) => {
				self.registry.insert(
					handle,
					Resource::Idle {
						id,
						_closure: closure,
					},
				);
				Some(handle)
			}
			Err(error) => {
				warn_log!("requestIdleCallback failed: {:?}", error);
				None
			}
		}
	}

	fn request_animation_frame(&self, callback: HostCallback) -> Option<HostHandle> {
		if !self.capabilities.animation_frame {
			return None;
		}
		let handle = self.registry.allocate();
		let closure = self.one_shot(handle, callback);
		match self
			.window
			.request_animation_frame(closure.as_ref().unchecked_ref())
		{
			Ok(id) => {
				self.registry.insert(
					handle,
					Resource::Frame {
						id,
						_closure: closure,
					},
				);
				Some(handle)
			}
			Err(error) => {
				warn_log!("requestAnimationFrame failed: {:?}", error);
				None
			}
		}
	}

	fn observe_intersection(
		&self,
		element_id: &str,
		options: &ObserverOptions,
		callback: Rc<dyn Fn(IntersectionEntry)>,
	) -> Option<HostHandle> {
		if !self.capabilities.intersection_observer {
			return None;
		}
		let element = self.window.document()?.get_element_by_id(element_id)?;

		let init = IntersectionObserverInit::new();
		if let Some(margin) = &options.root_margin {
			init.set_root_margin(margin);
		}
		if !options.threshold.is_empty() {
			let threshold: Array = options
				.threshold
				.iter()
				.map(|ratio| JsValue::from_f64(*ratio))
				.collect();
			init.set_threshold(&threshold);
		}

		let closure = Closure::wrap(Box::new(move |entries: Array| {
			let Ok(entry) = entries.get(0).dyn_into::<IntersectionObserverEntry>() else {
				return;
			};
			callback(IntersectionEntry {
				is_intersecting: entry.is_intersecting(),
				intersection_ratio: entry.intersection_ratio(),
			});
		}) as Box<dyn FnMut(Array)>);

		let observer =
			match IntersectionObserver::new_with_options(closure.as_ref().unchecked_ref(), &init) {
				Ok(observer) => observer,
				Err(error) => {
					warn_log!("IntersectionObserver construction failed: {:?}", error);
					return None;
				}
			};
		observer.observe(&element);

		let handle = self.registry.allocate();
		self.registry.insert(
			handle,
			Resource::Observer {
				observer,
				_closure: closure,
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
		let target = self.event_target(target)?;
		let handle = self.registry.allocate();

		let registry = Rc::downgrade(&self.registry);
		let once = options.once;
		let closure = Closure::wrap(Box::new(move || {
			if once {
				if let Some(registry) = registry.upgrade() {
					registry.retire(handle);
				}
			}
			callback();
		}) as Box<dyn FnMut()>);

		let listener_options = AddEventListenerOptions::new();
		listener_options.set_once(options.once);
		listener_options.set_capture(options.capture);
		listener_options.set_passive(options.passive);

		if let Err(error) = target.add_event_listener_with_callback_and_add_event_listener_options(
			event,
			closure.as_ref().unchecked_ref(),
			&listener_options,
		) {
			warn_log!("addEventListener('{}') failed: {:?}", event, error);
			return None;
		}

		self.registry.insert(
			handle,
			Resource::Listener {
				target,
				event: event.to_string(),
				capture: options.capture,
				closure,
			},
		);
		Some(handle)
	}

	fn release(&self, handle: HostHandle) {
		let resource = self.registry.resources.borrow_mut().remove(&handle);
		let Some(resource) = resource else {
			return;
		};
		match &resource {
			Resource::Timeout { id, .. } => self.window.clear_timeout_with_handle(*id),
			Resource::Idle { id, .. } => self.window.cancel_idle_callback(*id),
			Resource::Frame { id, .. } => {
				let _ = self.window.cancel_animation_frame(*id);
			}
			Resource::Observer { observer, .. } => observer.disconnect(),
			Resource::Listener {
				target,
				event,
				capture,
				closure,
			} => {
				// Already removed by the browser when it was a `once` listener that fired.
				let _ = target.remove_event_listener_with_callback_and_bool(
					event,
					closure.as_ref().unchecked_ref(),
					*capture,
				);
			}
		}
		drop_later(resource);
	}

	fn input_pending(&self) -> Option<bool> {
		if !self.capabilities.input_pending {
			return None;
		}
		let (scheduling, probe) = input_pending_probe(&self.window)?;
		probe.call0(&scheduling).ok()?.as_bool()
	}

	fn container_markup(&self, element_id: &str) -> Option<String> {
		self.window
			.document()?
			.get_element_by_id(element_id)
			.map(|element| element.inner_html())
	}

	fn has_element(&self, element_id: &str) -> bool {
		self.window
			.document()
			.and_then(|document| document.get_element_by_id(element_id))
			.is_some()
	}

	fn spawn_local(&self, future: LocalBoxFuture<'static, ()>) {
		wasm_bindgen_futures::spawn_local(future);
	}
}

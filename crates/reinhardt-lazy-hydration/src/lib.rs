//! Reinhardt Lazy Hydration - deferred activation of server-rendered content
//!
//! Server-rendered markup is shown immediately; the expensive step of making a
//! unit interactive is postponed until a trigger fires, and skipped entirely
//! on the server.
//!
//! ## Architecture
//!
//! - [`environment`]: server/client detection, evaluated once per process
//! - [`host`]: the browser capabilities the scheduler consumes, each with a fallback
//! - [`trigger`]: trigger specs, sources (delay, visible, idle, DOM event) and the registry
//! - [`activation`]: the observable `Dormant -> Activating -> Active` phase
//! - [`options`]: per-unit configuration, built in code or loaded from JSON
//! - [`unit`]: the wrapping function and deferred units
//! - [`component`]: content units and the suspense fallback
//! - [`page`]: the rendered markup tree
//!
//! ## Guarantees
//!
//! - A unit activates at most once, whichever triggers fire and in whatever order.
//! - All trigger sources are disposed before the activation runs.
//! - Unmounting (or dropping) a dormant unit releases every timer, observer
//!   and listener it acquired.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_lazy_hydration::{HydrationOptions, TriggerSpec, with_hydration_on_demand};
//!
//! let options = HydrationOptions::new("comments")
//!     .trigger(TriggerSpec::visible())
//!     .trigger(TriggerSpec::delay_ms(5000));
//!
//! let comments = with_hydration_on_demand(options).wrap(Comments);
//! let unit = comments.create(CommentsProps { post_id: 7 });
//! unit.mount();
//!
//! // Dormant: `<section id="comments">` + the server-rendered markup.
//! let html = unit.render()?.render_to_string();
//! ```
//!
//! ## Features
//!
//! - `testing`: exposes [`testing::MockHost`], a virtual-clock host
//! - `debug-scheduler`: trigger lifecycle logging via `debug_log!`

#![warn(missing_docs)]

pub mod logging;

pub mod activation;
pub mod component;
pub mod environment;
pub mod error;
pub mod host;
pub mod options;
pub mod page;
pub mod trigger;
pub mod unit;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use activation::{ActivationState, Phase};
pub use component::{Component, FnComponent, PassThroughLoading, Suspense, component_fn, pass_through_loading};
pub use environment::{Environment, is_client_environment};
pub use error::{HydrationError, RenderError};
pub use host::{Capabilities, Capability, Host, HostHandle};
pub use options::{BeforeHydrate, HydrationOptions, WrapperAttributes};
pub use page::{IntoPage, Page, PageElement};
pub use trigger::{EventTarget, TriggerSpec};
pub use unit::{
	CapturedMarkup, Deferred, DeferredProps, DeferredUnit, HYDRATION_ATTR, HydrationOnDemand,
	with_hydration_on_demand,
};

#[cfg(target_arch = "wasm32")]
pub use host::BrowserHost;

#[doc(hidden)]
pub mod __private {
	#[cfg(not(target_arch = "wasm32"))]
	pub use tracing;
	pub use web_sys;
}

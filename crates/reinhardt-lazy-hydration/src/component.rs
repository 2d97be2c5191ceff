//! Content units and the suspense pattern.
//!
//! A [`Component`] renders to `Result<Page, RenderError>`. `Err(Pending)` means
//! "not ready yet": a surrounding [`Suspense`] shows its fallback instead.
//! [`pass_through_loading`] is the always-pending body used to compose with
//! that fallback.

use std::fmt;

use crate::error::{HydrationError, RenderError};
use crate::page::{IntoPage, Page};

/// A reusable content unit.
///
/// # Example
///
/// ```ignore
/// use reinhardt_lazy_hydration::{Component, Page, PageElement, RenderError};
/// use reinhardt_lazy_hydration::page::IntoPage;
///
/// struct Greeting;
///
/// impl Component for Greeting {
///     type Props = String;
///
///     fn render(&self, name: &String) -> Result<Page, RenderError> {
///         Ok(PageElement::new("p").child(format!("Hello, {name}!")).into_page())
///     }
///
///     fn name(&self) -> &'static str {
///         "Greeting"
///     }
/// }
/// ```
pub trait Component: 'static {
	/// Input of the unit.
	type Props: 'static;

	/// Renders the unit.
	fn render(&self, props: &Self::Props) -> Result<Page, RenderError>;

	/// Name used for debugging and display names.
	fn name(&self) -> &'static str;
}

/// A component backed by a closure.
pub struct FnComponent<P, F> {
	name: &'static str,
	render: F,
	_props: std::marker::PhantomData<fn(&P)>,
}

/// Creates a component named `name` from a render function.
pub fn component_fn<P, F>(name: &'static str, render: F) -> FnComponent<P, F>
where
	P: 'static,
	F: Fn(&P) -> Result<Page, RenderError> + 'static,
{
	FnComponent {
		name,
		render,
		_props: std::marker::PhantomData,
	}
}

impl<P, F> Component for FnComponent<P, F>
where
	P: 'static,
	F: Fn(&P) -> Result<Page, RenderError> + 'static,
{
	type Props = P;

	fn render(&self, props: &P) -> Result<Page, RenderError> {
		(self.render)(props)
	}

	fn name(&self) -> &'static str {
		self.name
	}
}

impl<P, F> fmt::Debug for FnComponent<P, F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnComponent").field("name", &self.name).finish()
	}
}

/// Shows `fallback` while the content reports [`RenderError::Pending`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspense {
	fallback: Page,
}

impl Suspense {
	/// Creates a boundary with the given fallback.
	pub fn new(fallback: impl IntoPage) -> Self {
		Self {
			fallback: fallback.into_page(),
		}
	}

	/// Returns the fallback.
	pub fn fallback(&self) -> &Page {
		&self.fallback
	}

	/// Resolves a render outcome. Failures pass through unchanged.
	pub fn resolve(&self, outcome: Result<Page, RenderError>) -> Result<Page, HydrationError> {
		match outcome {
			Ok(page) => Ok(page),
			Err(RenderError::Pending) => Ok(self.fallback.clone()),
			Err(RenderError::Failed(error)) => Err(error),
		}
	}

	/// Renders `component` inside this boundary.
	pub fn render<C: Component>(&self, component: &C, props: &C::Props) -> Result<Page, HydrationError> {
		self.resolve(component.render(props))
	}
}

/// Always reports "not ready yet".
///
/// Never resolves on its own: the surrounding [`Suspense`] keeps showing its
/// fallback for as long as this is the unit's body.
pub fn pass_through_loading<T>() -> Result<T, RenderError> {
	Err(RenderError::Pending)
}

/// A component whose body is [`pass_through_loading`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughLoading;

impl Component for PassThroughLoading {
	type Props = ();

	fn render(&self, _props: &()) -> Result<Page, RenderError> {
		pass_through_loading()
	}

	fn name(&self) -> &'static str {
		"PassThroughLoading"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::page::PageElement;
	use rstest::rstest;

	#[rstest]
	fn test_fn_component_renders_props() {
		let greeting = component_fn("Greeting", |name: &String| {
			Ok(PageElement::new("p").child(format!("Hello, {name}!")).into_page())
		});

		let page = greeting.render(&"Ada".to_string()).unwrap();

		assert_eq!(greeting.name(), "Greeting");
		assert_eq!(page.render_to_string(), "<p>Hello, Ada!</p>");
	}

	#[rstest]
	fn test_suspense_shows_fallback_for_pending() {
		let suspense = Suspense::new("loading");

		let page = suspense.render(&PassThroughLoading, &()).unwrap();

		assert_eq!(page.render_to_string(), "loading");
	}

	#[rstest]
	fn test_suspense_propagates_failure() {
		let suspense = Suspense::new("loading");
		let failing = component_fn("Failing", |_: &()| {
			Err(RenderError::Failed(HydrationError::precondition("denied")))
		});

		let result = suspense.render(&failing, &());

		assert_eq!(result, Err(HydrationError::precondition("denied")));
	}

	#[rstest]
	fn test_pass_through_loading_never_resolves() {
		for _ in 0..3 {
			assert!(pass_through_loading::<Page>().unwrap_err().is_pending());
		}
	}
}

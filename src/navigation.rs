//! URL changes and link clicks, for widgets spawned with [`Widget::spawn_application`](`crate::widget::Widget::spawn_application`).

use std::{
	cell::RefCell,
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace};
use wasm_bindgen::{closure::Closure, JsCast};

/// Dispatch an event of this type on the window after changing the URL through the History API,
/// which doesn't fire `popstate` for its own changes.
pub const NAVIGATE_EVENT: &str = "navigate";

const URL_CHANGE_EVENTS: [&str; 3] = ["popstate", "hashchange", NAVIGATE_EVENT];

#[derive(Debug)]
pub(crate) enum Navigated {
	UrlChanged(web_sys::Url),
	InternalRequest(web_sys::Url),
	ExternalRequest(web_sys::Url),
}

/// One listener for a window's URL change events and for clicks on rendered links.
pub(crate) struct Navigation {
	window: web_sys::Window,
	handler: RefCell<Option<Rc<dyn Fn(Navigated)>>>,
	listener: Closure<dyn Fn(web_sys::Event)>,
}
impl Navigation {
	pub(crate) fn new(window: web_sys::Window) -> Rc<Self> {
		let navigation = Rc::new_cyclic(|navigation: &Weak<Self>| {
			let navigation = navigation.clone();
			Self {
				window,
				handler: RefCell::new(None),
				listener: Closure::wrap(Box::new(move |event: web_sys::Event| {
					if let Some(navigation) = navigation.upgrade() {
						navigation.handle_event(&event)
					}
				}) as Box<dyn Fn(web_sys::Event)>),
			}
		});
		for event_type in URL_CHANGE_EVENTS.iter() {
			if let Err(error) = navigation.window.add_event_listener_with_callback(event_type, navigation.function()) {
				error!("Failed to listen for {:?}: {:?}", event_type, error);
			}
		}
		navigation
	}

	/// `None` ignores navigation until a handler is set again.
	pub(crate) fn set_handler(&self, handler: Option<Rc<dyn Fn(Navigated)>>) {
		*self.handler.borrow_mut() = handler;
	}

	/// The listener to add to links as `click` handler.
	pub(crate) fn function(&self) -> &js_sys::Function {
		self.listener.as_ref().unchecked_ref()
	}

	#[instrument(skip(self, event), fields(event_type = %event.type_()))]
	fn handle_event(&self, event: &web_sys::Event) {
		let navigated = if event.type_() == "click" {
			match self.link_request(event) {
				Some(navigated) => navigated,
				None => return,
			}
		} else {
			match self.current_url() {
				Some(url) => Navigated::UrlChanged(url),
				None => return,
			}
		};

		// Cloned out so that the handler can replace itself.
		let handler = self.handler.borrow().clone();
		match handler {
			Some(handler) => handler(navigated),
			None => trace!("Nothing handles {:?}.", navigated),
		}
	}

	fn current_url(&self) -> Option<web_sys::Url> {
		let url = self.window.location().href().and_then(|href| web_sys::Url::new(&href));
		match url {
			Ok(url) => Some(url),
			Err(error) => {
				error!("Failed to read the current URL: {:?}", error);
				None
			}
		}
	}

	/// Plain primary-button clicks on links without `target` or `download` are taken over.
	fn link_request(&self, event: &web_sys::Event) -> Option<Navigated> {
		let click = event.dyn_ref::<web_sys::MouseEvent>()?;
		if click.ctrl_key() || click.meta_key() || click.shift_key() || click.button() >= 1 {
			trace!("Leaving a modified click to the browser.");
			return None;
		}

		let link = event.current_target()?.dyn_into::<web_sys::Element>().ok()?;
		if link.has_attribute("target") || link.has_attribute("download") {
			trace!("Leaving a click on a link with `target` or `download` to the browser.");
			return None;
		}
		let href = link.get_attribute("href")?;

		event.prevent_default();
		let current = self.current_url()?;
		let next = match web_sys::Url::new_with_base(&href, &current.href()) {
			Ok(next) => next,
			Err(error) => {
				error!("Failed to resolve link {:?}: {:?}", href, error);
				return None;
			}
		};

		Some(if next.protocol() == current.protocol() && next.host() == current.host() && next.port() == current.port() {
			Navigated::InternalRequest(next)
		} else {
			Navigated::ExternalRequest(next)
		})
	}
}
impl Drop for Navigation {
	fn drop(&mut self) {
		for event_type in URL_CHANGE_EVENTS.iter() {
			if let Err(error) = self.window.remove_event_listener_with_callback(event_type, self.function()) {
				error!("Failed to stop listening for {:?}: {:?}", event_type, error);
			}
		}
	}
}

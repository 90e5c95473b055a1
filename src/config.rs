//! Environment-dependent rendering options.

use js_sys::{Object, Reflect};
use std::{cell::Cell, rc::Rc};
use tracing::{debug, instrument};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Config {
	/// Whether listeners for handlers that never prevent the default action are registered as passive.
	pub passive_listeners: bool,
}
impl Config {
	/// Probes `window` for support of the `passive` listener option.
	#[must_use]
	#[instrument(skip(window))]
	pub fn detect(window: &web_sys::Window) -> Self {
		let supported = Rc::new(Cell::new(false));

		let getter = {
			let supported = Rc::clone(&supported);
			Closure::wrap(Box::new(move || {
				supported.set(true);
				JsValue::UNDEFINED
			}) as Box<dyn Fn() -> JsValue>)
		};
		let descriptor = Object::new();
		let options = Object::new();
		let probe = js_sys::Function::new_no_args("");
		let registered = Reflect::set(&descriptor, &JsValue::from_str("get"), getter.as_ref())
			.map(|_| Object::define_property(&options, &JsValue::from_str("passive"), &descriptor))
			.and_then(|_| window.add_event_listener_with_callback_and_add_event_listener_options("reflex-dom-probe", &probe, options.unchecked_ref()));
		match registered {
			Ok(()) => {
				if let Err(error) = window.remove_event_listener_with_callback("reflex-dom-probe", &probe) {
					debug!("Failed to remove probe listener: {:?}", error);
				}
			}
			Err(error) => debug!("Passive listener probe failed: {:?}", error),
		}

		let config = Self {
			passive_listeners: supported.get(),
		};
		debug!(?config, "Detected configuration.");
		config
	}
}

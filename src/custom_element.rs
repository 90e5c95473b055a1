//! Registration of custom element classes.
//!
//! Each local name is defined once with a wrapper class whose prototype chain can be swapped later.
//! Rendering the same local name with a different constructor (for example after hot reloading)
//! re-parents the wrapper instead of failing on a second `define`.

use crate::node::CustomElement;
use hashbrown::HashMap;
use js_sys::{Function, Object, Reflect};
use std::cell::RefCell;
use tracing::{error, instrument, trace};
use wasm_bindgen::{JsCast, JsValue};

/// Builds a wrapper class around `base`.
/// Lifecycle callbacks are forwarded only if the current base prototype defines them.
const WRAPPER_SOURCE: &str = "
const registration = class extends base {
	connectedCallback(...args) {
		if (registration.proto.connectedCallback) super.connectedCallback(...args);
	}
	disconnectedCallback(...args) {
		if (registration.proto.disconnectedCallback) super.disconnectedCallback(...args);
	}
	adoptedCallback(...args) {
		if (registration.proto.adoptedCallback) super.adoptedCallback(...args);
	}
	attributeChangedCallback(...args) {
		if (registration.proto.attributeChangedCallback) super.attributeChangedCallback(...args);
	}
};
registration.proto = base.prototype;
return registration;
";

/// The constructor each wrapper currently derives from, by local name.
#[derive(Default)]
pub(crate) struct CustomElements {
	bases: RefCell<HashMap<String, Function>>,
}
impl CustomElements {
	/// Makes sure `element`'s local name is defined and currently backed by its constructor.
	#[instrument(skip(self, document, element), fields(local_name = element.local_name.as_str()))]
	pub(crate) fn ensure(&self, document: &web_sys::Document, element: &CustomElement) {
		let window = match document.default_view() {
			Some(window) => window,
			None => return error!("Can't register a custom element in a document without a window."),
		};
		let registry = window.custom_elements();
		let existing = registry.get(&element.local_name);

		if existing.is_undefined() {
			return self.define(&registry, element);
		}

		let current = self.bases.borrow().get(&element.local_name).cloned();
		match current {
			Some(base) if Object::is(&base, &element.constructor) => (),
			Some(_) => {
				trace!("Re-parenting custom element wrapper.");
				if let Err(error) = reparent(&existing, &element.constructor) {
					return error!("Failed to re-parent custom element wrapper: {:?}", error);
				}
				self.bases.borrow_mut().insert(element.local_name.clone(), element.constructor.clone());
			}
			None => error!("The custom element name is already defined by someone else. Rendering it with that definition."),
		}
	}

	fn define(&self, registry: &web_sys::CustomElementRegistry, element: &CustomElement) {
		trace!("Defining custom element.");
		let factory = Function::new_with_args("base", WRAPPER_SOURCE);
		let class = match factory.call1(&JsValue::UNDEFINED, &element.constructor) {
			Ok(class) => class.unchecked_into::<Function>(),
			Err(error) => return error!("Failed to build custom element wrapper: {:?}", error),
		};

		let defined = match &element.extends {
			Some(extends) => {
				let options = web_sys::ElementDefinitionOptions::new();
				options.set_extends(extends);
				registry.define_with_options(&element.local_name, &class, &options)
			}
			None => registry.define(&element.local_name, &class),
		};
		match defined {
			Ok(()) => {
				self.bases.borrow_mut().insert(element.local_name.clone(), element.constructor.clone());
			}
			Err(error) => error!("Failed to define custom element: {:?}", error),
		}
	}
}

fn reparent(wrapper: &JsValue, constructor: &Function) -> Result<(), JsValue> {
	let base_prototype = Reflect::get(constructor, &JsValue::from_str("prototype"))?;
	let wrapper_prototype = Reflect::get(wrapper, &JsValue::from_str("prototype"))?;
	<Object>::set_prototype_of(wrapper_prototype.unchecked_ref::<Object>(), base_prototype.unchecked_ref());
	Reflect::set(wrapper, &JsValue::from_str("proto"), &base_prototype)?;
	Ok(())
}

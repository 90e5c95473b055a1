//! Loading existing DOM content as a virtual tree, so that a widget can take over server-rendered markup.

use crate::{
	facts::{self, Setting},
	node::{self, Node},
};
use js_sys::Reflect;
use tracing::{instrument, trace};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Attr, CssStyleDeclaration, Element, NamedNodeMap, NodeList, Text};

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Converts `root` and its subtree into a virtual node.
///
/// Text nodes keep their content. Other non-element nodes, like comments, become empty text.
/// The result has no event handlers or properties, so the first diff against it re-applies those.
#[must_use]
#[instrument(skip(root))]
pub fn virtualize(root: &web_sys::Node) -> Node {
	if let Some(text) = root.dyn_ref::<Text>() {
		return node::text(text.data());
	}

	let element = match root.dyn_ref::<Element>() {
		Some(element) => element,
		None => {
			trace!(node_type = root.node_type(), "Virtualizing unsupported node as empty text.");
			return node::text("");
		}
	};

	let mut settings = load_attributes(&element.attributes());
	settings.extend(load_styles(element));
	let children = load_child_nodes(&root.child_nodes());

	match element.namespace_uri() {
		Some(namespace) if namespace != XHTML_NAMESPACE => node::element_ns(namespace, element.local_name(), settings, children),
		_ => node::element(element.local_name(), settings, children),
	}
}

fn load_child_nodes(child_nodes: &NodeList) -> Vec<Node> {
	(0..child_nodes.length()).filter_map(|i| child_nodes.item(i)).map(|child| virtualize(&child)).collect()
}

/// Inline styles are loaded separately.
fn load_attributes(attributes: &NamedNodeMap) -> Vec<Setting> {
	(0..attributes.length())
		.filter_map(|i| attributes.item(i))
		.filter(|attribute| attribute.name() != "style")
		.map(|attribute| load_attribute(&attribute))
		.collect()
}

fn load_attribute(attribute: &Attr) -> Setting {
	match attribute.namespace_uri() {
		Some(namespace) => facts::attribute_ns(namespace, attribute.name(), attribute.value()),
		None => facts::attribute(attribute.name(), attribute.value()),
	}
}

fn load_styles(element: &Element) -> Vec<Setting> {
	let style = match Reflect::get(element, &JsValue::from_str("style")) {
		Ok(style) if style.is_object() => style.unchecked_into::<CssStyleDeclaration>(),
		_ => return Vec::new(),
	};
	(0..style.length())
		.map(|i| style.item(i))
		.map(|name| {
			let value = style.get_property_value(&name).unwrap_or_default();
			facts::style(name, value)
		})
		.collect()
}

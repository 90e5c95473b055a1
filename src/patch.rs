//! Rendering virtual nodes and applying [`Patch`]es to the live DOM.

use crate::{
	config::Config,
	custom_element::CustomElements,
	diff::{EntryOp, Insert, Op, Patch, Reorder, Target},
	event::{EventHandler, EventNode, TaggedEventNode},
	facts::{FactTable, FactsDiff, Namespaced, Value},
	node::{Node, NodeKind},
	registry::Registry,
};
use core::{convert::TryFrom, fmt};
use js_sys::Reflect;
use std::{cell::RefCell, rc::Rc};
use tracing::{error, instrument, trace, warn};
use wasm_bindgen::{throw_str, throw_val, JsCast, JsValue};

/// Renders virtual nodes and patches the DOM nodes it rendered.
///
/// The routing state of rendered nodes (tagger contexts and event routers) lives in this instance,
/// so a tree rendered by one `DomPatcher` must also be patched by it.
pub struct DomPatcher {
	config: Config,
	registry: Registry,
	custom_elements: CustomElements,
	passive_listener_options: web_sys::AddEventListenerOptions,
	active_listener_options: web_sys::AddEventListenerOptions,
	/// Added as `click` listener to each rendered `<a>`.
	link_listener: RefCell<Option<js_sys::Function>>,
}
impl Default for DomPatcher {
	fn default() -> Self {
		Self::new(Config::default())
	}
}
impl fmt::Debug for DomPatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DomPatcher")
			.field("config", &self.config)
			.field("tracked_nodes", &self.registry.len())
			.finish_non_exhaustive()
	}
}
impl DomPatcher {
	#[must_use]
	pub fn new(config: Config) -> Self {
		let passive_listener_options = web_sys::AddEventListenerOptions::new();
		passive_listener_options.set_passive(true);
		let active_listener_options = web_sys::AddEventListenerOptions::new();
		active_listener_options.set_passive(false);

		Self {
			config,
			registry: Registry::new(),
			custom_elements: CustomElements::default(),
			passive_listener_options,
			active_listener_options,
			link_listener: RefCell::new(None),
		}
	}

	/// Sets the listener for clicks on links rendered from now on.
	pub(crate) fn set_link_listener(&self, listener: Option<js_sys::Function>) {
		*self.link_listener.borrow_mut() = listener;
	}

	#[must_use]
	pub fn config(&self) -> Config {
		self.config
	}

	/// The number of DOM nodes that currently carry routing state.
	#[must_use]
	pub fn tracked_nodes(&self) -> usize {
		self.registry.len()
	}

	/// Creates a detached DOM subtree for `vnode`.
	///
	/// Events in the subtree are routed through `event_node`.
	pub fn render(&self, document: &web_sys::Document, vnode: &Node, event_node: &EventNode) -> web_sys::Node {
		match vnode.kind() {
			NodeKind::Thunk(thunk) => self.render(document, thunk.node(), event_node),

			NodeKind::Text(text) => document.create_text_node(text).into(),

			NodeKind::Tagged(tagged) => {
				let (taggers, inner) = tagged.chain();
				let sub_node = TaggedEventNode::new(taggers, event_node.clone());
				let dom = self.render(document, inner, &EventNode::Tagged(Rc::clone(&sub_node)));
				self.registry.set_event_node(&dom, sub_node);
				dom
			}

			NodeKind::Custom(custom) => {
				let dom = custom.model.render(document);
				self.apply_facts(&dom, event_node, &custom.settings);
				dom
			}

			NodeKind::CustomElement(element) => {
				self.custom_elements.ensure(document, element);
				let dom: web_sys::Node = create_element(document, None, &element.local_name).into();
				self.apply_facts(&dom, event_node, &element.settings);
				dom
			}

			NodeKind::Element(element) => {
				let dom = self.create_element(document, element.namespace.as_deref(), &element.local_name);
				self.apply_facts(&dom, event_node, &element.settings);
				for child in &element.children {
					append_child(&dom, &self.render(document, child, event_node));
				}
				dom
			}

			NodeKind::KeyedElement(element) => {
				let dom = self.create_element(document, element.namespace.as_deref(), &element.local_name);
				self.apply_facts(&dom, event_node, &element.settings);
				for (_, child) in &element.children {
					append_child(&dom, &self.render(document, child, event_node));
				}
				dom
			}
		}
	}

	fn create_element(&self, document: &web_sys::Document, namespace: Option<&str>, local_name: &str) -> web_sys::Node {
		let dom: web_sys::Node = create_element(document, namespace, local_name).into();
		if local_name == "a" {
			if let Some(listener) = &*self.link_listener.borrow() {
				if let Err(error) = dom.add_event_listener_with_callback("click", listener) {
					error!("Failed to add link listener: {:?}", error);
				}
			}
		}
		dom
	}

	/// Applies `patches`, computed from `old`, to `root`, which must have been rendered from `old`.
	///
	/// Returns the new root, which differs from `root` only if the root itself was replaced.
	///
	/// # Panics
	///
	/// Throws into JavaScript if the DOM doesn't have the shape `old` describes.
	#[instrument(skip(self, root, old, patches, event_node), fields(patch_count = patches.len()))]
	pub fn patch(&self, root: &web_sys::Node, old: &Node, patches: &mut [Patch], event_node: &EventNode) -> web_sys::Node {
		if patches.is_empty() {
			return root.clone();
		}
		self.add_dom_nodes(root, old, patches, event_node);
		let root = self.apply_patches_help(root.clone(), patches);
		trace!("Tracking {} DOM node(s).", self.registry.len());
		root
	}

	fn add_dom_nodes(&self, dom: &web_sys::Node, vnode: &Node, patches: &mut [Patch], event_node: &EventNode) {
		self.add_dom_nodes_help(dom, vnode, patches, 0, 0, vnode.descendant_count(), event_node);
	}

	/// Associates patches `i..` with DOM nodes in the index range `low..=high`, which `dom` and `vnode` span.
	///
	/// Returns the index of the first patch outside that range.
	#[allow(clippy::too_many_arguments)]
	fn add_dom_nodes_help(&self, dom: &web_sys::Node, vnode: &Node, patches: &mut [Patch], mut i: usize, mut low: usize, high: usize, event_node: &EventNode) -> usize {
		let mut index = match patches.get(i) {
			Some(patch) => patch.index,
			None => return i,
		};

		while index == low {
			let patch = &mut patches[i];
			match &mut patch.op {
				Op::Thunk(sub_patches) => match vnode.kind() {
					NodeKind::Thunk(thunk) => self.add_dom_nodes(dom, thunk.node(), sub_patches, event_node),
					_ => throw_str("reflex-dom bug: `Thunk` patch at a node that isn't a thunk"),
				},
				Op::Reorder(Reorder { sub_patches, .. }) => {
					if !sub_patches.is_empty() {
						self.add_dom_nodes_help(dom, vnode, sub_patches, 0, low, high, event_node);
					}
				}
				Op::Remove(Some(relocation)) => {
					relocation.entry.borrow_mut().dom = Some(dom.clone());
					if !relocation.sub_patches.is_empty() {
						self.add_dom_nodes_help(dom, vnode, &mut relocation.sub_patches, 0, low, high, event_node);
					}
				}
				_ => (),
			}
			patch.target = Some(Target {
				dom: dom.clone(),
				event_node: event_node.clone(),
			});

			i += 1;
			match patches.get(i) {
				Some(next) if next.index <= high => index = next.index,
				_ => return i,
			}
		}

		if let NodeKind::Tagged(tagged) = vnode.kind() {
			let event_node = match self.registry.event_node(dom) {
				Some(sub_node) => EventNode::Tagged(sub_node),
				None => event_node.clone(),
			};
			return self.add_dom_nodes_help(dom, tagged.innermost(), patches, i, low + 1, high, &event_node);
		}

		let children = vnode.children();
		let child_nodes = dom.child_nodes();
		for j in 0..children.len() {
			low += 1;
			let kid = match children.get(j) {
				Some(kid) => kid,
				None => break,
			};
			let next_low = low + kid.descendant_count();
			if low <= index && index <= next_low {
				let child = match u32::try_from(j).ok().and_then(|j| child_nodes.item(j)) {
					Some(child) => child,
					None => {
						error!("Expected a DOM child node at position {}, but there is none. Was the DOM modified externally?", j);
						return i;
					}
				};
				i = self.add_dom_nodes_help(&child, kid, patches, i, low, next_low, event_node);
				match patches.get(i) {
					Some(next) if next.index <= high => index = next.index,
					_ => return i,
				}
			}
			low = next_low;
		}
		i
	}

	fn apply_patches_help(&self, mut root: web_sys::Node, patches: &mut [Patch]) -> web_sys::Node {
		for patch in patches {
			let Target { dom, event_node } = match &patch.target {
				Some(target) => target.clone(),
				None => throw_str("reflex-dom bug: Patch wasn't associated with a DOM node"),
			};
			let replacement = self.apply_patch(&dom, &event_node, &mut patch.op);
			if dom.is_same_node(Some(&root)) {
				root = replacement;
			}
		}
		root
	}

	fn apply_patch(&self, dom: &web_sys::Node, event_node: &EventNode, op: &mut Op) -> web_sys::Node {
		match op {
			Op::Redraw(vnode) => self.apply_redraw(dom, vnode, event_node),

			Op::Facts(facts) => {
				self.apply_facts_diff(dom, event_node, facts);
				dom.clone()
			}

			Op::Text(text) => {
				match dom.dyn_ref::<web_sys::CharacterData>() {
					Some(data) => data.set_data(text),
					None => error!("Expected to update character data but found {:?}.", dom),
				}
				dom.clone()
			}

			Op::Thunk(sub_patches) => self.apply_patches_help(dom.clone(), sub_patches),

			Op::Tagger(taggers) => {
				match self.registry.event_node(dom) {
					Some(sub_node) => sub_node.retag(taggers.clone()),
					None => {
						warn!("Retagging a DOM node without routing context. Creating one.");
						self.registry.set_event_node(dom, TaggedEventNode::new(taggers.clone(), event_node.clone()));
					}
				}
				dom.clone()
			}

			Op::RemoveLast { offset, diff } => {
				// Live list.
				let child_nodes = dom.child_nodes();
				let offset = u32::try_from(*offset).unwrap_or(u32::MAX);
				for _ in 0..*diff {
					match child_nodes.item(offset) {
						Some(child) => {
							if let Err(error) = dom.remove_child(&child) {
								error!("Failed to remove child node: {:?}", error);
							}
							self.registry.forget(&child);
						}
						None => {
							error!("Ran out of child nodes to remove at offset {}.", offset);
							break;
						}
					}
				}
				dom.clone()
			}

			Op::Append { offset, children } => {
				let document = document_of(dom);
				let the_end = u32::try_from(*offset).ok().and_then(|offset| dom.child_nodes().item(offset));
				for child in children.iter() {
					let rendered = self.render(&document, child, event_node);
					if let Err(error) = dom.insert_before(&rendered, the_end.as_ref()) {
						error!("Failed to append child node: {:?}", error);
					}
				}
				dom.clone()
			}

			Op::Remove(None) => {
				remove_from_parent(dom);
				self.registry.forget(dom);
				dom.clone()
			}

			Op::Remove(Some(relocation)) => {
				// End insertions pick the node up from where it is.
				if relocation.entry.borrow().index.is_some() {
					remove_from_parent(dom);
				}
				let moved = self.apply_patches_help(dom.clone(), &mut relocation.sub_patches);
				relocation.entry.borrow_mut().dom = Some(moved);
				dom.clone()
			}

			Op::Reorder(reorder) => self.apply_reorder(dom, event_node, reorder),

			Op::Custom(patch) => {
				let replacement = patch.apply(dom);
				self.take_over(dom, &replacement);
				replacement
			}
		}
	}

	fn apply_redraw(&self, dom: &web_sys::Node, vnode: &Node, event_node: &EventNode) -> web_sys::Node {
		let document = document_of(dom);
		let replacement = self.render(&document, vnode, event_node);
		self.take_over(dom, &replacement);
		replacement
	}

	/// Puts `replacement` in `dom`'s place, unless they're the same node.
	fn take_over(&self, dom: &web_sys::Node, replacement: &web_sys::Node) {
		if replacement.is_same_node(Some(dom)) {
			return;
		}

		// A node that replaces a tagged subtree's root must keep routing through that subtree's context.
		if self.registry.event_node(replacement).is_none() {
			if let Some(sub_node) = self.registry.event_node(dom) {
				self.registry.set_event_node(replacement, sub_node);
			}
		}

		replace_in_parent(dom, replacement);
		self.registry.forget(dom);
	}

	fn apply_reorder(&self, dom: &web_sys::Node, event_node: &EventNode, reorder: &mut Reorder) -> web_sys::Node {
		let document = document_of(dom);

		let fragment = reorder.end_inserts.as_ref().map(|end_inserts| {
			let fragment = document.create_document_fragment();
			for insert in end_inserts {
				append_child(&fragment, &self.insertion(&document, insert, event_node));
			}
			fragment
		});

		let dom = self.apply_patches_help(dom.clone(), &mut reorder.sub_patches);

		for insert in &reorder.inserts {
			let node = self.insertion(&document, insert, event_node);
			let reference = insert.index.and_then(|index| u32::try_from(index).ok()).and_then(|index| dom.child_nodes().item(index));
			if let Err(error) = dom.insert_before(&node, reference.as_ref()) {
				error!("Failed to insert keyed child: {:?}", error);
			}
		}

		if let Some(fragment) = fragment {
			append_child(&dom, &fragment);
		}

		dom
	}

	/// The DOM node to place for `insert`: the preserved node of a moved key, or a fresh rendering.
	fn insertion(&self, document: &web_sys::Document, insert: &Insert, event_node: &EventNode) -> web_sys::Node {
		let entry = insert.entry.borrow();
		if entry.op == EntryOp::Move {
			match &entry.dom {
				Some(dom) => dom.clone(),
				None => throw_str("reflex-dom bug: Moved keyed child has no DOM node"),
			}
		} else {
			self.render(document, &entry.vnode, event_node)
		}
	}

	fn apply_facts(&self, dom: &web_sys::Node, event_node: &EventNode, facts: &FactTable) {
		apply_styles(dom, facts.styles.iter().map(|(key, value)| (key.as_str(), value.as_str())));
		if !facts.events.is_empty() {
			self.apply_events(dom, event_node, facts.events.iter().map(|(key, handler)| (key.as_str(), Some(handler))));
		}
		apply_attributes(dom, facts.attributes.iter().map(|(key, value)| (key.as_str(), value.as_deref())));
		apply_attributes_ns(
			dom,
			facts.attributes_ns.iter().map(|(key, Namespaced { namespace, value })| (key.as_str(), namespace.as_str(), value.as_deref())),
		);
		apply_properties(dom, facts.properties.iter().map(|(key, value)| (key.as_str(), value)));
	}

	fn apply_facts_diff(&self, dom: &web_sys::Node, event_node: &EventNode, facts: &FactsDiff) {
		apply_styles(dom, facts.styles.iter().map(|(key, value)| (key.as_str(), value.as_str())));
		if !facts.events.is_empty() {
			self.apply_events(dom, event_node, facts.events.iter().map(|(key, handler)| (key.as_str(), handler.as_ref())));
		}
		apply_attributes(dom, facts.attributes.iter().map(|(key, value)| (key.as_str(), value.as_deref())));
		apply_attributes_ns(
			dom,
			facts.attributes_ns.iter().map(|(key, Namespaced { namespace, value })| (key.as_str(), namespace.as_str(), value.as_deref())),
		);
		apply_properties(dom, facts.properties.iter().map(|(key, value)| (key.as_str(), value)));
	}

	/// `None` handlers unbind.
	fn apply_events<'a>(&self, dom: &web_sys::Node, event_node: &EventNode, events: impl Iterator<Item = (&'a str, Option<&'a EventHandler>)>) {
		let router = self.registry.router(dom, event_node);
		for (event_type, handler) in events {
			match handler {
				Some(handler) => {
					if router.bind(event_type, handler.clone()) {
						let result = if self.config.passive_listeners {
							let options = if handler.phase().is_passive() {
								&self.passive_listener_options
							} else {
								&self.active_listener_options
							};
							dom.add_event_listener_with_callback_and_add_event_listener_options(event_type, router.function(), options)
						} else {
							dom.add_event_listener_with_callback(event_type, router.function())
						};
						if let Err(error) = result {
							error!("Failed to add event listener {:?}: {:?}", event_type, error);
						}
					}
				}
				None => {
					if router.unbind(event_type) {
						if let Err(error) = dom.remove_event_listener_with_callback(event_type, router.function()) {
							error!("Failed to remove event listener {:?}: {:?}", event_type, error);
						}
					}
				}
			}
		}
	}
}

fn document_of(dom: &web_sys::Node) -> web_sys::Document {
	match dom.owner_document().or_else(|| dom.dyn_ref::<web_sys::Document>().cloned()) {
		Some(document) => document,
		None => throw_str("reflex-dom: Patch target has no owner document"),
	}
}

fn create_element(document: &web_sys::Document, namespace: Option<&str>, local_name: &str) -> web_sys::Element {
	let created = match namespace {
		Some(namespace) => document.create_element_ns(Some(namespace), local_name),
		None => document.create_element(local_name),
	};
	created.unwrap_or_else(|error| throw_val(error))
}

fn append_child(parent: &web_sys::Node, child: &web_sys::Node) {
	if let Err(error) = parent.append_child(child) {
		error!("Failed to append child node: {:?}", error);
	}
}

fn remove_from_parent(dom: &web_sys::Node) {
	if let Some(parent) = dom.parent_node() {
		if let Err(error) = parent.remove_child(dom) {
			error!("Failed to remove node: {:?}", error);
		}
	}
}

fn replace_in_parent(dom: &web_sys::Node, replacement: &web_sys::Node) {
	if let Some(parent) = dom.parent_node() {
		if let Err(error) = parent.replace_child(replacement, dom) {
			error!("Failed to replace node: {:?}", error);
		}
	}
}

fn apply_styles<'a>(dom: &web_sys::Node, styles: impl Iterator<Item = (&'a str, &'a str)>) {
	let mut styles = styles.peekable();
	if styles.peek().is_none() {
		return;
	}

	let style = match Reflect::get(dom, &JsValue::from_str("style")) {
		Ok(style) if style.is_object() => style,
		_ => return warn!("Can't apply styles to {:?}, which has no `style`.", dom),
	};
	for (key, value) in styles {
		if let Err(error) = Reflect::set(&style, &JsValue::from_str(key), &JsValue::from_str(value)) {
			error!("Failed to set style {:?}: {:?}", key, error);
		}
	}
}

/// `None` removes.
fn apply_attributes<'a>(dom: &web_sys::Node, attributes: impl Iterator<Item = (&'a str, Option<&'a str>)>) {
	let mut attributes = attributes.peekable();
	if attributes.peek().is_none() {
		return;
	}

	let element = match dom.dyn_ref::<web_sys::Element>() {
		Some(element) => element,
		None => return warn!("Can't apply attributes to {:?}, which isn't an element.", dom),
	};
	for (key, value) in attributes {
		let result = match value {
			Some(value) => element.set_attribute(key, value),
			None => element.remove_attribute(key),
		};
		if let Err(error) = result {
			error!("Failed to update attribute {:?}: {:?}", key, error);
		}
	}
}

/// `None` and empty values remove.
fn apply_attributes_ns<'a>(dom: &web_sys::Node, attributes: impl Iterator<Item = (&'a str, &'a str, Option<&'a str>)>) {
	let mut attributes = attributes.peekable();
	if attributes.peek().is_none() {
		return;
	}

	let element = match dom.dyn_ref::<web_sys::Element>() {
		Some(element) => element,
		None => return warn!("Can't apply namespaced attributes to {:?}, which isn't an element.", dom),
	};
	for (key, namespace, value) in attributes {
		let result = match value {
			Some(value) if !value.is_empty() => element.set_attribute_ns(Some(namespace), key, value),
			_ => element.remove_attribute_ns(Some(namespace), key),
		};
		if let Err(error) = result {
			error!("Failed to update attribute {:?} in {:?}: {:?}", key, namespace, error);
		}
	}
}

fn apply_properties<'a>(dom: &web_sys::Node, properties: impl Iterator<Item = (&'a str, &'a Value)>) {
	for (key, value) in properties {
		let key_js = JsValue::from_str(key);
		let value = value.to_js();

		// Assigning an unchanged `value` would move the caret.
		if key == "value" || key == "checked" {
			if let Ok(current) = Reflect::get(dom, &key_js) {
				if current == value {
					continue;
				}
			}
		}

		if let Err(error) = Reflect::set(dom, &key_js, &value) {
			error!("Failed to set property {:?}: {:?}", key, error);
		}
	}
}

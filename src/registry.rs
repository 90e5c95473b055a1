use crate::event::{EventNode, EventRouter, TaggedEventNode};
use hashbrown::HashMap;
use js_sys::{Object, WeakMap};
use std::{cell::Cell, cell::RefCell, rc::Rc};
use tracing::trace;
use wasm_bindgen::JsValue;

#[derive(Default)]
struct Record {
	/// Set on the root DOM node of a tagged subtree.
	event_node: Option<Rc<TaggedEventNode>>,
	router: Option<Rc<EventRouter>>,
}

/// Side table from rendered DOM nodes to their routing state.
///
/// DOM nodes are keyed through a [`WeakMap`], so nodes removed by other code don't keep records reachable from JavaScript.
/// Records of nodes removed by patches are dropped eagerly with [`Registry::forget`].
pub(crate) struct Registry {
	ids: WeakMap,
	records: RefCell<HashMap<u32, Record>>,
	next_id: Cell<u32>,
}
impl Registry {
	pub(crate) fn new() -> Self {
		Self {
			ids: WeakMap::new(),
			records: RefCell::default(),
			next_id: Cell::new(0),
		}
	}

	fn key(dom: &web_sys::Node) -> &Object {
		dom.as_ref()
	}

	fn id(&self, dom: &web_sys::Node) -> Option<u32> {
		let id = self.ids.get(Self::key(dom)).as_f64()?;
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let id = id as u32;
		Some(id)
	}

	fn id_or_insert(&self, dom: &web_sys::Node) -> u32 {
		if let Some(id) = self.id(dom) {
			return id;
		}
		let id = self.next_id.get();
		self.next_id.set(id.wrapping_add(1));
		self.ids.set(Self::key(dom), &JsValue::from(id));
		id
	}

	pub(crate) fn event_node(&self, dom: &web_sys::Node) -> Option<Rc<TaggedEventNode>> {
		let id = self.id(dom)?;
		self.records.borrow().get(&id).and_then(|record| record.event_node.clone())
	}

	pub(crate) fn set_event_node(&self, dom: &web_sys::Node, event_node: Rc<TaggedEventNode>) {
		let id = self.id_or_insert(dom);
		self.records.borrow_mut().entry(id).or_default().event_node = Some(event_node);
	}

	/// Returns the router of `dom`, creating it if necessary, and points it at `target`.
	pub(crate) fn router(&self, dom: &web_sys::Node, target: &EventNode) -> Rc<EventRouter> {
		let id = self.id_or_insert(dom);
		let mut records = self.records.borrow_mut();
		let record = records.entry(id).or_default();
		match &record.router {
			Some(router) => {
				router.retarget(target.clone());
				Rc::clone(router)
			}
			None => Rc::clone(record.router.get_or_insert_with(|| EventRouter::new(target.clone()))),
		}
	}

	/// Drops the records of `dom` and its subtree.
	pub(crate) fn forget(&self, dom: &web_sys::Node) {
		if self.records.borrow().is_empty() {
			return;
		}

		let mut forgotten = 0_usize;
		self.forget_help(dom, &mut forgotten);
		trace!("Forgot {} record(s), {} remaining.", forgotten, self.records.borrow().len());
	}

	fn forget_help(&self, dom: &web_sys::Node, forgotten: &mut usize) {
		if let Some(id) = self.id(dom) {
			self.ids.delete(Self::key(dom));
			if self.records.borrow_mut().remove(&id).is_some() {
				*forgotten += 1;
			}
		}

		let child_nodes = dom.child_nodes();
		for i in 0..child_nodes.length() {
			if let Some(child) = child_nodes.item(i) {
				self.forget_help(&child, forgotten)
			}
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.records.borrow().len()
	}
}

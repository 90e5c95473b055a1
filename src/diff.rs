//! Computes index-addressed [`Patch`]es between two virtual trees.
//!
//! Nodes are numbered depth-first, pre-order, starting with `0` at the root.
//! A [`Tagged`](`NodeKind::Tagged`) wrapper occupies an index of its own, thunks restart numbering for their content.
//! Patches come out sorted by non-decreasing index, which is what lets the
//! [`DomPatcher`](`crate::patch::DomPatcher`) resolve them in a single walk.

use crate::{
	event::{pairwise_same, EventNode, Tagger},
	facts::{diff_facts, FactTable, FactsDiff},
	node::{CustomPatch, Node, NodeKind},
};
use core::fmt;
use hashbrown::HashMap;
use std::{cell::RefCell, rc::Rc};
use tracing::{instrument, trace, trace_span};

/// Appended to a key that's already in use within one keyed diff.
const DUPLICATE_KEY_SUFFIX: &str = "_reflexDuplicateKey";

/// One change at a depth-first `index` of the old tree.
pub struct Patch {
	pub(crate) index: usize,
	pub(crate) op: Op,
	pub(crate) target: Option<Target>,
}
impl Patch {
	fn new(index: usize, op: Op) -> Self {
		Self { index, op, target: None }
	}

	#[must_use]
	pub fn index(&self) -> usize {
		self.index
	}

	#[must_use]
	pub fn op(&self) -> &Op {
		&self.op
	}
}
impl fmt::Debug for Patch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Patch").field("index", &self.index).field("op", &self.op).finish_non_exhaustive()
	}
}

/// The DOM node a patch applies to, plus the routing context it was rendered in.
#[derive(Debug, Clone)]
pub(crate) struct Target {
	pub(crate) dom: web_sys::Node,
	pub(crate) event_node: EventNode,
}

#[derive(Debug)]
pub enum Op {
	/// Replace the node with a fresh rendering of this one.
	Redraw(Node),
	/// Patches for a thunk's content, numbered from its root.
	Thunk(Vec<Patch>),
	/// New taggers for a tagged subtree's routing context.
	Tagger(Vec<Tagger>),
	Text(String),
	Facts(FactsDiff),
	Custom(CustomPatch),
	/// Remove `diff` children starting at `offset`.
	RemoveLast { offset: usize, diff: usize },
	/// Append `children`, which are the new children from `offset` on.
	Append { offset: usize, children: Vec<Node> },
	Reorder(Reorder),
	/// Remove a keyed child. [`Some`] if the child is moved elsewhere instead.
	Remove(Option<Relocation>),
}

/// Reconciliation of a keyed element's children.
#[derive(Debug)]
pub struct Reorder {
	/// Patches in the numbering of the keyed element's subtree, including `Remove`s.
	pub sub_patches: Vec<Patch>,
	pub inserts: Vec<Insert>,
	/// Insertions at the very end, in order.
	pub end_inserts: Option<Vec<Insert>>,
}

/// A node to insert during a [`Reorder`].
#[derive(Debug)]
pub struct Insert {
	/// The position among the new children. [`None`] for end insertions.
	pub index: Option<usize>,
	pub(crate) entry: Rc<RefCell<Entry>>,
}
impl Insert {
	/// Whether this reinserts a DOM node removed elsewhere in the same reorder, rather than rendering a new one.
	#[must_use]
	pub fn is_move(&self) -> bool {
		self.entry.borrow().op == EntryOp::Move
	}
}

/// Details of a keyed child that's moved rather than removed.
#[derive(Debug)]
pub struct Relocation {
	/// Patches for the moved node, numbered from its position in the old tree.
	pub sub_patches: Vec<Patch>,
	pub(crate) entry: Rc<RefCell<Entry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOp {
	Insert,
	Delete,
	Move,
}

/// Per-key bookkeeping of one keyed diff, shared by the `Remove` patch and the [`Insert`] of a key.
#[derive(Debug)]
pub(crate) struct Entry {
	pub(crate) op: EntryOp,
	pub(crate) vnode: Node,
	/// Target position among the new children, once known.
	pub(crate) index: Option<usize>,
	/// Position of the `Remove` patch in the keyed diff's local patches, and the old tree index.
	removal: Option<(usize, usize)>,
	/// The detached DOM node of a moved key, filled in during patch application.
	pub(crate) dom: Option<web_sys::Node>,
}

/// Computes the patches that turn `x` into `y`.
#[must_use]
#[instrument(skip(x, y))]
pub fn diff(x: &Node, y: &Node) -> Vec<Patch> {
	let mut patches = Vec::new();
	diff_help(x, y, &mut patches, 0);
	trace!("Diffed into {} top-level patch(es).", patches.len());
	patches
}

fn push_patch(patches: &mut Vec<Patch>, index: usize, op: Op) -> usize {
	patches.push(Patch::new(index, op));
	patches.len() - 1
}

fn diff_help(x: &Node, y: &Node, patches: &mut Vec<Patch>, index: usize) {
	if x.same(y) {
		return;
	}

	match (x.kind(), y.kind()) {
		(NodeKind::Thunk(x_thunk), NodeKind::Thunk(y_thunk)) => {
			let x_refs = x_thunk.refs();
			let y_refs = y_thunk.refs();
			if x_refs.len() == y_refs.len() && x_refs.iter().zip(y_refs).all(|(x, y)| x.same(y)) {
				if y_thunk.adopt(x_thunk.node()) {
					return trace!("Thunk refs matched at {}.", index);
				}
				trace!("Thunk refs matched at {}, but the new thunk was already forced. Diffing its content.", index);
			}

			let mut sub_patches = Vec::new();
			diff_help(x_thunk.node(), y_thunk.node(), &mut sub_patches, 0);
			if !sub_patches.is_empty() {
				push_patch(patches, index, Op::Thunk(sub_patches));
			}
		}

		(NodeKind::Tagged(x_tagged), NodeKind::Tagged(y_tagged)) => {
			let (x_taggers, x_inner) = x_tagged.chain();
			let (y_taggers, y_inner) = y_tagged.chain();

			// Routing contexts can't change depth in place.
			if x_taggers.len() != y_taggers.len() {
				push_patch(patches, index, Op::Redraw(y.clone()));
				return;
			}

			if !pairwise_same(&x_taggers, &y_taggers) {
				push_patch(patches, index, Op::Tagger(y_taggers));
			}

			diff_help(x_inner, y_inner, patches, index + 1);
		}

		(NodeKind::Text(x_text), NodeKind::Text(y_text)) => {
			if x_text != y_text {
				push_patch(patches, index, Op::Text(y_text.clone()));
			}
		}

		(NodeKind::Element(x_element), NodeKind::Element(y_element)) => {
			if diff_header(
				(&x_element.local_name, x_element.namespace.as_deref(), &x_element.settings),
				(&y_element.local_name, y_element.namespace.as_deref(), &y_element.settings),
				y,
				patches,
				index,
			) {
				diff_kids(&x_element.children, &y_element.children, patches, index);
			}
		}

		(NodeKind::Element(x_element), NodeKind::KeyedElement(y_element)) => {
			// The old children can't be matched by key, so the new ones are compared by position instead.
			if diff_header(
				(&x_element.local_name, x_element.namespace.as_deref(), &x_element.settings),
				(&y_element.local_name, y_element.namespace.as_deref(), &y_element.settings),
				y,
				patches,
				index,
			) {
				let y_children: Vec<Node> = y_element.children.iter().map(|(_, node)| node.clone()).collect();
				diff_kids(&x_element.children, &y_children, patches, index);
			}
		}

		(NodeKind::KeyedElement(x_element), NodeKind::KeyedElement(y_element)) => {
			if diff_header(
				(&x_element.local_name, x_element.namespace.as_deref(), &x_element.settings),
				(&y_element.local_name, y_element.namespace.as_deref(), &y_element.settings),
				y,
				patches,
				index,
			) {
				diff_keyed_kids(&x_element.children, &y_element.children, patches, index);
			}
		}

		(NodeKind::CustomElement(x_element), NodeKind::CustomElement(y_element)) => {
			if !js_sys::Object::is(&x_element.constructor, &y_element.constructor) {
				push_patch(patches, index, Op::Redraw(y.clone()));
				return;
			}
			diff_header((&x_element.local_name, None, &x_element.settings), (&y_element.local_name, None, &y_element.settings), y, patches, index);
		}

		(NodeKind::Custom(x_custom), NodeKind::Custom(y_custom)) => {
			if x_custom.model_type() != y_custom.model_type() {
				push_patch(patches, index, Op::Redraw(y.clone()));
				return;
			}

			if let Some(facts) = diff_facts(&x_custom.settings, &y_custom.settings) {
				push_patch(patches, index, Op::Facts(facts));
			}

			if let Some(patch) = x_custom.model.diff(&*y_custom.model) {
				push_patch(patches, index, Op::Custom(patch));
			}
		}

		_ => {
			push_patch(patches, index, Op::Redraw(y.clone()));
		}
	}
}

/// Pushes a `Redraw` if the elements can't be patched into each other, or a `Facts` patch if their settings differ.
///
/// Returns whether the children should be diffed.
fn diff_header(x: (&str, Option<&str>, &FactTable), y: (&str, Option<&str>, &FactTable), y_node: &Node, patches: &mut Vec<Patch>, index: usize) -> bool {
	let (x_local_name, x_namespace, x_settings) = x;
	let (y_local_name, y_namespace, y_settings) = y;

	if x_local_name != y_local_name || x_namespace != y_namespace {
		push_patch(patches, index, Op::Redraw(y_node.clone()));
		return false;
	}

	if let Some(facts) = diff_facts(x_settings, y_settings) {
		push_patch(patches, index, Op::Facts(facts));
	}
	true
}

fn diff_kids(x_kids: &[Node], y_kids: &[Node], patches: &mut Vec<Patch>, mut index: usize) {
	let x_len = x_kids.len();
	let y_len = y_kids.len();

	if x_len > y_len {
		push_patch(patches, index, Op::RemoveLast { offset: y_len, diff: x_len - y_len });
	} else if x_len < y_len {
		push_patch(
			patches,
			index,
			Op::Append {
				offset: x_len,
				children: y_kids[x_len..].to_vec(),
			},
		);
	}

	for (x_kid, y_kid) in x_kids.iter().zip(y_kids) {
		index += 1;
		diff_help(x_kid, y_kid, patches, index);
		index += x_kid.descendant_count();
	}
}

#[allow(clippy::too_many_lines)]
fn diff_keyed_kids(x_kids: &[(String, Node)], y_kids: &[(String, Node)], patches: &mut Vec<Patch>, root_index: usize) {
	let span = trace_span!("Diffing keyed children", x_len = x_kids.len(), y_len = y_kids.len());
	let _enter = span.enter();

	let mut local_patches = Vec::new();
	let mut changes = HashMap::<String, Rc<RefCell<Entry>>>::new();
	let mut inserts = Vec::new();

	let x_len = x_kids.len();
	let y_len = y_kids.len();
	let mut x_index = 0;
	let mut y_index = 0;
	let mut index = root_index;

	while x_index < x_len && y_index < y_len {
		let (x_key, x_node) = &x_kids[x_index];
		let (y_key, y_node) = &y_kids[y_index];

		if x_key == y_key {
			index += 1;
			diff_help(x_node, y_node, &mut local_patches, index);
			index += x_node.descendant_count();

			x_index += 1;
			y_index += 1;
			continue;
		}

		let x_next = x_kids.get(x_index + 1);
		let y_next = y_kids.get(y_index + 1);

		let old_match = matches!(x_next, Some((key, _)) if key == y_key);
		let new_match = matches!(y_next, Some((key, _)) if key == x_key);

		match (x_next, y_next) {
			// Adjacent swap.
			(Some((_, x_next_node)), Some((_, y_next_node))) if new_match && old_match => {
				index += 1;
				diff_help(x_node, y_next_node, &mut local_patches, index);
				insert_node(&mut changes, &mut local_patches, x_key, y_node, Some(y_index), &mut inserts);
				index += x_node.descendant_count();

				index += 1;
				remove_node(&mut changes, &mut local_patches, x_key, x_next_node, index);
				index += x_next_node.descendant_count();

				x_index += 2;
				y_index += 2;
			}

			// Insertion in front of the current old key.
			(_, Some((_, y_next_node))) if new_match => {
				index += 1;
				insert_node(&mut changes, &mut local_patches, y_key, y_node, Some(y_index), &mut inserts);
				diff_help(x_node, y_next_node, &mut local_patches, index);
				index += x_node.descendant_count();

				x_index += 1;
				y_index += 2;
			}

			// Removal of the current old key.
			(Some((_, x_next_node)), _) if old_match => {
				index += 1;
				remove_node(&mut changes, &mut local_patches, x_key, x_node, index);
				index += x_node.descendant_count();

				index += 1;
				diff_help(x_next_node, y_node, &mut local_patches, index);
				index += x_next_node.descendant_count();

				x_index += 2;
				y_index += 1;
			}

			// Replacement, with the sequences lining up again right after.
			(Some((x_next_key, x_next_node)), Some((y_next_key, y_next_node))) if x_next_key == y_next_key => {
				index += 1;
				remove_node(&mut changes, &mut local_patches, x_key, x_node, index);
				insert_node(&mut changes, &mut local_patches, y_key, y_node, Some(y_index), &mut inserts);
				index += x_node.descendant_count();

				index += 1;
				diff_help(x_next_node, y_next_node, &mut local_patches, index);
				index += x_next_node.descendant_count();

				x_index += 2;
				y_index += 2;
			}

			_ => {
				trace!("Keyed fast paths exhausted at old {} / new {}.", x_index, y_index);
				break;
			}
		}
	}

	while x_index < x_len {
		let (x_key, x_node) = &x_kids[x_index];
		index += 1;
		remove_node(&mut changes, &mut local_patches, x_key, x_node, index);
		index += x_node.descendant_count();
		x_index += 1;
	}

	let mut end_inserts = None;
	while y_index < y_len {
		let (y_key, y_node) = &y_kids[y_index];
		insert_node(&mut changes, &mut local_patches, y_key, y_node, None, end_inserts.get_or_insert_with(Vec::new));
		y_index += 1;
	}

	if !local_patches.is_empty() || !inserts.is_empty() || end_inserts.is_some() {
		push_patch(
			patches,
			root_index,
			Op::Reorder(Reorder {
				sub_patches: local_patches,
				inserts,
				end_inserts,
			}),
		);
	}
}

fn insert_node(changes: &mut HashMap<String, Rc<RefCell<Entry>>>, local_patches: &mut Vec<Patch>, key: &str, vnode: &Node, y_index: Option<usize>, inserts: &mut Vec<Insert>) {
	let entry = match changes.get(key) {
		None => {
			let entry = Rc::new(RefCell::new(Entry {
				op: EntryOp::Insert,
				vnode: vnode.clone(),
				index: y_index,
				removal: None,
				dom: None,
			}));
			inserts.push(Insert {
				index: y_index,
				entry: Rc::clone(&entry),
			});
			changes.insert(key.to_owned(), entry);
			return;
		}
		Some(entry) => Rc::clone(entry),
	};

	// The key was removed earlier in this pass, so the node moves here.
	let removed = {
		let entry = entry.borrow();
		if entry.op == EntryOp::Delete {
			Some((entry.vnode.clone(), entry.removal))
		} else {
			None
		}
	};
	if let Some((x_vnode, removal)) = removed {
		trace!("Key {:?} moves forward.", key);
		inserts.push(Insert {
			index: y_index,
			entry: Rc::clone(&entry),
		});
		{
			let mut entry = entry.borrow_mut();
			entry.op = EntryOp::Move;
			entry.index = y_index;
		}

		if let Some((position, x_index)) = removal {
			let mut sub_patches = Vec::new();
			diff_help(&x_vnode, vnode, &mut sub_patches, x_index);
			local_patches[position].op = Op::Remove(Some(Relocation { sub_patches, entry }));
		}
		return;
	}

	// Duplicate key: retry under a disambiguated one.
	insert_node(changes, local_patches, &format!("{}{}", key, DUPLICATE_KEY_SUFFIX), vnode, y_index, inserts)
}

fn remove_node(changes: &mut HashMap<String, Rc<RefCell<Entry>>>, local_patches: &mut Vec<Patch>, key: &str, vnode: &Node, index: usize) {
	let entry = match changes.get(key) {
		None => {
			let position = push_patch(local_patches, index, Op::Remove(None));
			changes.insert(
				key.to_owned(),
				Rc::new(RefCell::new(Entry {
					op: EntryOp::Delete,
					vnode: vnode.clone(),
					index: None,
					removal: Some((position, index)),
					dom: None,
				})),
			);
			return;
		}
		Some(entry) => Rc::clone(entry),
	};

	// The key was inserted earlier in this pass, so the node moves there.
	let inserted = {
		let entry = entry.borrow();
		if entry.op == EntryOp::Insert {
			Some(entry.vnode.clone())
		} else {
			None
		}
	};
	if let Some(y_vnode) = inserted {
		trace!("Key {:?} moves backward.", key);
		entry.borrow_mut().op = EntryOp::Move;

		let mut sub_patches = Vec::new();
		diff_help(vnode, &y_vnode, &mut sub_patches, index);
		push_patch(local_patches, index, Op::Remove(Some(Relocation { sub_patches, entry })));
		return;
	}

	remove_node(changes, local_patches, &format!("{}{}", key, DUPLICATE_KEY_SUFFIX), vnode, index)
}

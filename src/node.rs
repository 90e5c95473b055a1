//! The virtual node model.
//!
//! [`Node`]s are immutable and cheap to clone. Identity ([`Node::same`]) is the fast path of the differ,
//! so views that reuse a subtree from a previous render skip it entirely.

use crate::{
	event::{same_rc, Tagger},
	facts::{FactTable, Setting},
};
use core::{
	any::{Any, TypeId},
	fmt,
};
use std::{cell::OnceCell, rc::Rc};

/// A shared, immutable virtual node.
#[derive(Clone)]
pub struct Node(Rc<NodeKind>);

pub enum NodeKind {
	Text(String),
	Element(Element),
	KeyedElement(KeyedElement),
	CustomElement(CustomElement),
	Custom(CustomNode),
	Tagged(Tagged),
	Thunk(Thunk),
}

impl Node {
	fn new(kind: NodeKind) -> Self {
		Self(Rc::new(kind))
	}

	#[must_use]
	pub fn kind(&self) -> &NodeKind {
		&self.0
	}

	/// Whether both handles point to the very same node.
	#[must_use]
	pub fn same(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	/// The number of nodes strictly below this one in depth-first patch numbering.
	///
	/// Thunks count as zero: their content is diffed with its own numbering.
	#[must_use]
	pub fn descendant_count(&self) -> usize {
		match self.kind() {
			NodeKind::Element(element) => element.descendant_count,
			NodeKind::KeyedElement(element) => element.descendant_count,
			NodeKind::Tagged(tagged) => tagged.descendant_count,
			NodeKind::Text(_) | NodeKind::CustomElement(_) | NodeKind::Custom(_) | NodeKind::Thunk(_) => 0,
		}
	}

	/// Routes every message produced below this node through `tag`.
	#[must_use]
	pub fn map<A: 'static, B: 'static>(self, tag: impl Fn(A) -> B + 'static) -> Self {
		self.tag(Tagger::new(tag))
	}

	#[must_use]
	pub fn tag(self, tagger: Tagger) -> Self {
		let descendant_count = 1 + self.descendant_count();
		Self::new(NodeKind::Tagged(Tagged {
			tagger,
			node: self,
			descendant_count,
		}))
	}

	pub(crate) fn children(&self) -> Children<'_> {
		match self.kind() {
			NodeKind::Element(element) => Children::Plain(&element.children),
			NodeKind::KeyedElement(element) => Children::Keyed(&element.children),
			_ => Children::Plain(&[]),
		}
	}
}
impl From<NodeKind> for Node {
	fn from(kind: NodeKind) -> Self {
		Self::new(kind)
	}
}
impl fmt::Debug for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.kind(), f)
	}
}
impl fmt::Debug for NodeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NodeKind::Text(text) => {
				if cfg!(feature = "dangerous-logging") {
					f.debug_tuple("Text").field(text).finish()
				} else {
					f.debug_tuple("Text").field(&text.len()).finish()
				}
			}
			NodeKind::Element(element) => f
				.debug_struct("Element")
				.field("local_name", &element.local_name)
				.field("namespace", &element.namespace)
				.field("children", &element.children)
				.finish_non_exhaustive(),
			NodeKind::KeyedElement(element) => f
				.debug_struct("KeyedElement")
				.field("local_name", &element.local_name)
				.field("namespace", &element.namespace)
				.field("children", &element.children)
				.finish_non_exhaustive(),
			NodeKind::CustomElement(element) => f.debug_struct("CustomElement").field("local_name", &element.local_name).finish_non_exhaustive(),
			NodeKind::Custom(_) => f.debug_struct("Custom").finish_non_exhaustive(),
			NodeKind::Tagged(tagged) => f.debug_struct("Tagged").field("tagger", &tagged.tagger).field("node", &tagged.node).finish(),
			NodeKind::Thunk(thunk) => f.debug_struct("Thunk").field("node", &thunk.node.get()).finish_non_exhaustive(),
		}
	}
}

pub(crate) enum Children<'a> {
	Plain(&'a [Node]),
	Keyed(&'a [(String, Node)]),
}
impl<'a> Children<'a> {
	pub(crate) fn len(&self) -> usize {
		match self {
			Children::Plain(children) => children.len(),
			Children::Keyed(children) => children.len(),
		}
	}

	pub(crate) fn get(&self, index: usize) -> Option<&'a Node> {
		match self {
			Children::Plain(children) => children.get(index),
			Children::Keyed(children) => children.get(index).map(|(_, node)| node),
		}
	}
}

fn count_descendants<'a>(children: impl Iterator<Item = &'a Node>) -> usize {
	children.map(|child| 1 + child.descendant_count()).sum()
}

pub struct Element {
	pub(crate) local_name: String,
	pub(crate) namespace: Option<String>,
	pub(crate) settings: FactTable,
	pub(crate) children: Vec<Node>,
	descendant_count: usize,
}
impl Element {
	#[must_use]
	pub fn local_name(&self) -> &str {
		&self.local_name
	}

	#[must_use]
	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}

	#[must_use]
	pub fn settings(&self) -> &FactTable {
		&self.settings
	}

	#[must_use]
	pub fn children(&self) -> &[Node] {
		&self.children
	}
}

pub struct KeyedElement {
	pub(crate) local_name: String,
	pub(crate) namespace: Option<String>,
	pub(crate) settings: FactTable,
	pub(crate) children: Vec<(String, Node)>,
	descendant_count: usize,
}
impl KeyedElement {
	#[must_use]
	pub fn local_name(&self) -> &str {
		&self.local_name
	}

	#[must_use]
	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}

	#[must_use]
	pub fn settings(&self) -> &FactTable {
		&self.settings
	}

	#[must_use]
	pub fn children(&self) -> &[(String, Node)] {
		&self.children
	}
}

/// An element backed by a registered custom element class.
pub struct CustomElement {
	pub(crate) local_name: String,
	pub(crate) constructor: js_sys::Function,
	pub(crate) extends: Option<String>,
	pub(crate) settings: FactTable,
}
impl CustomElement {
	#[must_use]
	pub fn local_name(&self) -> &str {
		&self.local_name
	}

	#[must_use]
	pub fn settings(&self) -> &FactTable {
		&self.settings
	}
}

/// A leaf that renders and patches itself.
pub trait Custom: 'static {
	fn render(&self, document: &web_sys::Document) -> web_sys::Node;

	/// Returns a patch for the rendered DOM node, or [`None`] if `next` needs no changes.
	fn diff(&self, next: &Self) -> Option<CustomPatch>;
}

pub(crate) trait CustomModel {
	fn render(&self, document: &web_sys::Document) -> web_sys::Node;
	fn diff(&self, next: &dyn CustomModel) -> Option<CustomPatch>;
	fn as_any(&self) -> &dyn Any;
}
impl<T: Custom> CustomModel for T {
	fn render(&self, document: &web_sys::Document) -> web_sys::Node {
		Custom::render(self, document)
	}

	fn diff(&self, next: &dyn CustomModel) -> Option<CustomPatch> {
		next.as_any().downcast_ref::<T>().and_then(|next| Custom::diff(self, next))
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

pub struct CustomNode {
	pub(crate) settings: FactTable,
	pub(crate) model: Rc<dyn CustomModel>,
}
impl CustomNode {
	/// Custom nodes with different model types never patch each other.
	pub(crate) fn model_type(&self) -> TypeId {
		self.model.as_any().type_id()
	}
}

/// Updates the DOM node of a [`Custom`] leaf, returning the node that should take its place.
#[derive(Clone)]
pub struct CustomPatch(Rc<dyn Fn(&web_sys::Node) -> web_sys::Node>);
impl CustomPatch {
	pub fn new(patch: impl Fn(&web_sys::Node) -> web_sys::Node + 'static) -> Self {
		Self(Rc::new(patch))
	}

	#[must_use]
	pub fn apply(&self, dom: &web_sys::Node) -> web_sys::Node {
		(self.0)(dom)
	}
}
impl fmt::Debug for CustomPatch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("CustomPatch").field(&Rc::as_ptr(&self.0).cast::<()>()).finish()
	}
}

pub struct Tagged {
	pub(crate) tagger: Tagger,
	pub(crate) node: Node,
	descendant_count: usize,
}
impl Tagged {
	/// Collapses directly nested taggers, outermost first, and returns the first untagged node.
	#[must_use]
	pub fn chain(&self) -> (Vec<Tagger>, &Node) {
		let mut taggers = vec![self.tagger.clone()];
		let mut node = &self.node;
		while let NodeKind::Tagged(tagged) = node.kind() {
			taggers.push(tagged.tagger.clone());
			node = &tagged.node;
		}
		(taggers, node)
	}

	pub(crate) fn innermost(&self) -> &Node {
		let mut node = &self.node;
		while let NodeKind::Tagged(tagged) = node.kind() {
			node = &tagged.node;
		}
		node
	}
}

/// What a thunk's cached content depends on. Compared by identity.
#[derive(Clone)]
pub enum ThunkRef {
	Address(usize),
	Shared(Rc<dyn Any>),
}
impl ThunkRef {
	pub fn shared<T: 'static>(value: &Rc<T>) -> Self {
		Self::Shared(Rc::clone(value) as Rc<dyn Any>)
	}

	#[must_use]
	pub fn same(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Address(a), Self::Address(b)) => a == b,
			(Self::Shared(a), Self::Shared(b)) => same_rc(a, b),
			_ => false,
		}
	}
}
impl fmt::Debug for ThunkRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Address(address) => f.debug_tuple("Address").field(address).finish(),
			Self::Shared(value) => f.debug_tuple("Shared").field(&Rc::as_ptr(value).cast::<()>()).finish(),
		}
	}
}

/// A lazily computed subtree that is reused while its refs stay the same.
pub struct Thunk {
	pub(crate) refs: Vec<ThunkRef>,
	thunk: Box<dyn Fn() -> Node>,
	node: OnceCell<Node>,
}
impl Thunk {
	#[must_use]
	pub fn refs(&self) -> &[ThunkRef] {
		&self.refs
	}

	/// Forces the thunk. The result is cached.
	pub fn node(&self) -> &Node {
		self.node.get_or_init(|| (self.thunk)())
	}

	#[must_use]
	pub fn is_forced(&self) -> bool {
		self.node.get().is_some()
	}

	/// Takes over a previous thunk's content without forcing this one.
	///
	/// Returns `false` if this thunk was already forced to other content, which is then kept.
	#[must_use]
	pub(crate) fn adopt(&self, node: &Node) -> bool {
		match self.node.set(node.clone()) {
			Ok(()) => true,
			Err(_) => self.node().same(node),
		}
	}
}

pub fn text(content: impl Into<String>) -> Node {
	Node::new(NodeKind::Text(content.into()))
}

pub fn element(local_name: impl Into<String>, settings: impl IntoIterator<Item = Setting>, children: Vec<Node>) -> Node {
	element_help(local_name.into(), None, settings, children)
}

pub fn element_ns(namespace: impl Into<String>, local_name: impl Into<String>, settings: impl IntoIterator<Item = Setting>, children: Vec<Node>) -> Node {
	element_help(local_name.into(), Some(namespace.into()), settings, children)
}

fn element_help(local_name: String, namespace: Option<String>, settings: impl IntoIterator<Item = Setting>, children: Vec<Node>) -> Node {
	let descendant_count = count_descendants(children.iter());
	Node::new(NodeKind::Element(Element {
		local_name,
		namespace,
		settings: FactTable::organize(settings),
		children,
		descendant_count,
	}))
}

/// An element whose children are reconciled by key.
///
/// Keys should be unique among siblings. Duplicates are tolerated, but lose the move optimization.
pub fn keyed(local_name: impl Into<String>, settings: impl IntoIterator<Item = Setting>, children: Vec<(String, Node)>) -> Node {
	keyed_help(local_name.into(), None, settings, children)
}

pub fn keyed_ns(namespace: impl Into<String>, local_name: impl Into<String>, settings: impl IntoIterator<Item = Setting>, children: Vec<(String, Node)>) -> Node {
	keyed_help(local_name.into(), Some(namespace.into()), settings, children)
}

fn keyed_help(local_name: String, namespace: Option<String>, settings: impl IntoIterator<Item = Setting>, children: Vec<(String, Node)>) -> Node {
	let descendant_count = count_descendants(children.iter().map(|(_, node)| node));
	Node::new(NodeKind::KeyedElement(KeyedElement {
		local_name,
		namespace,
		settings: FactTable::organize(settings),
		children,
		descendant_count,
	}))
}

/// An element of a custom element class. The class is registered on first render.
pub fn custom_element(local_name: impl Into<String>, constructor: js_sys::Function, extends: Option<String>, settings: impl IntoIterator<Item = Setting>) -> Node {
	Node::new(NodeKind::CustomElement(CustomElement {
		local_name: local_name.into(),
		constructor,
		extends,
		settings: FactTable::organize(settings),
	}))
}

pub fn custom<T: Custom>(settings: impl IntoIterator<Item = Setting>, model: T) -> Node {
	Node::new(NodeKind::Custom(CustomNode {
		settings: FactTable::organize(settings),
		model: Rc::new(model),
	}))
}

/// Routes every message produced in `node` through `tag`.
pub fn map<A: 'static, B: 'static>(tag: impl Fn(A) -> B + 'static, node: Node) -> Node {
	node.map(tag)
}

pub fn thunk(refs: Vec<ThunkRef>, thunk: impl Fn() -> Node + 'static) -> Node {
	Node::new(NodeKind::Thunk(Thunk {
		refs,
		thunk: Box::new(thunk),
		node: OnceCell::new(),
	}))
}

/// Caches `view(&a)` for as long as `view` and `a` stay the same.
pub fn lazy<A: 'static>(view: fn(&A) -> Node, a: Rc<A>) -> Node {
	thunk(vec![ThunkRef::Address(view as usize), ThunkRef::shared(&a)], move || view(&a))
}

pub fn lazy2<A: 'static, B: 'static>(view: fn(&A, &B) -> Node, a: Rc<A>, b: Rc<B>) -> Node {
	thunk(vec![ThunkRef::Address(view as usize), ThunkRef::shared(&a), ThunkRef::shared(&b)], move || view(&a, &b))
}

pub fn lazy3<A: 'static, B: 'static, C: 'static>(view: fn(&A, &B, &C) -> Node, a: Rc<A>, b: Rc<B>, c: Rc<C>) -> Node {
	thunk(
		vec![ThunkRef::Address(view as usize), ThunkRef::shared(&a), ThunkRef::shared(&b), ThunkRef::shared(&c)],
		move || view(&a, &b, &c),
	)
}

#![cfg(target_arch = "wasm32")]

use reflex_dom::{
	diff,
	facts::{attribute, style},
	node::{element, keyed, text, thunk, ThunkRef},
	virtualize, Config, DomPatcher, EventNode, Message, Node, Sink,
};
use std::{rc::Rc, sync::Once};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, Document, Element};

wasm_bindgen_test_configure!(run_in_browser);

static LOG: Once = Once::new();
fn init_log() {
	LOG.call_once(tracing_wasm::set_as_global_default);
}

struct Discard;
impl Sink for Discard {
	fn send(&self, _: Message) {}
	fn sync(&self, _: Message) {}
}

fn document() -> Document {
	window().unwrap().document().unwrap()
}

fn html(node: &web_sys::Node) -> String {
	match node.dyn_ref::<Element>() {
		Some(element) => element.outer_html(),
		None => node.text_content().unwrap_or_default(),
	}
}

/// Patches a rendering of `before` into `after` and checks it against a fresh rendering of `after`.
///
/// Elements carry at most one attribute each, as serialization order follows insertion order.
fn assert_patches_into(before: &Node, after: &Node) -> web_sys::Node {
	init_log();

	let document = document();
	let patcher = DomPatcher::new(Config::default());
	let events = EventNode::root(Rc::new(Discard));

	let container = document.create_element("div").unwrap();
	let root = patcher.render(&document, before, &events);
	container.append_child(&root).unwrap();

	let mut patches = diff(before, after);
	let root = patcher.patch(&root, before, &mut patches, &events);

	let expected = patcher.render(&document, after, &events);
	assert_eq!(html(&root), html(&expected));
	assert!(container.first_child().unwrap().is_same_node(Some(&root)));
	root
}

fn keyed_list(keys: &[&str]) -> Node {
	keyed("ul", None, keys.iter().map(|key| ((*key).to_owned(), element("li", vec![attribute("id", *key)], vec![text(*key)]))).collect())
}

fn items(root: &web_sys::Node) -> Vec<web_sys::Node> {
	let children = root.child_nodes();
	(0..children.length()).map(|i| children.item(i).unwrap()).collect()
}

fn item(root: &web_sys::Node, id: &str) -> web_sys::Node {
	items(root).into_iter().find(|node| node.dyn_ref::<Element>().unwrap().id() == id).unwrap()
}

#[wasm_bindgen_test]
fn identical() {
	let node = element("p", vec![attribute("class", "a")], vec![text("Hello")]);
	assert_patches_into(&node, &element("p", vec![attribute("class", "a")], vec![text("Hello")]));
}

#[wasm_bindgen_test]
fn text_change() {
	assert_patches_into(&element("p", None, vec![text("Hello")]), &element("p", None, vec![text("Goodbye")]));
}

#[wasm_bindgen_test]
fn facts_change() {
	assert_patches_into(&element("p", vec![attribute("title", "a")], vec![]), &element("p", vec![style("color", "red")], vec![]));
	assert_patches_into(&element("p", vec![style("color", "red")], vec![]), &element("p", vec![style("color", "blue")], vec![]));
}

#[wasm_bindgen_test]
fn remove_last() {
	let list = |n: usize| element("ol", None, (0..n).map(|i| element("li", None, vec![text(i.to_string())])).collect());
	let root = assert_patches_into(&list(5), &list(2));
	assert_eq!(root.child_nodes().length(), 2);
	assert_patches_into(&list(2), &list(5));
	assert_patches_into(&list(3), &list(0));
}

#[wasm_bindgen_test]
fn root_redraw() {
	let root = assert_patches_into(&element("p", None, vec![text("a")]), &element("div", None, vec![text("a")]));
	assert_eq!(root.node_name(), "DIV");
	assert_patches_into(&text("a"), &element("div", None, vec![]));
}

#[wasm_bindgen_test]
fn nested_redraw() {
	assert_patches_into(
		&element("div", None, vec![element("p", None, vec![text("a")]), text("b"), element("i", None, vec![])]),
		&element("div", None, vec![text("a"), element("p", None, vec![text("b")]), element("i", None, vec![text("c")])]),
	);
}

#[wasm_bindgen_test]
fn keyed_swap_keeps_nodes() {
	let document = document();
	let patcher = DomPatcher::default();
	let events = EventNode::root(Rc::new(Discard));

	let before = keyed_list(&["a", "b"]);
	let after = keyed_list(&["b", "a"]);

	let root = patcher.render(&document, &before, &events);
	let a = item(&root, "a");
	let b = item(&root, "b");

	let mut patches = diff(&before, &after);
	let root = patcher.patch(&root, &before, &mut patches, &events);

	let items = items(&root);
	assert_eq!(items.len(), 2);
	assert!(items[0].is_same_node(Some(&b)));
	assert!(items[1].is_same_node(Some(&a)));
	assert_eq!(html(&root), html(&patcher.render(&document, &after, &events)));
}

#[wasm_bindgen_test]
fn keyed_reorders() {
	let cases: &[(&[&str], &[&str])] = &[
		(&["a", "c"], &["a", "b", "c"]),
		(&["a", "b", "c"], &["a", "c"]),
		(&["a", "b", "c"], &["a", "x", "c"]),
		(&["a"], &["a", "b", "c"]),
		(&["a", "b", "c", "d"], &["c", "d", "a", "b"]),
		(&["a", "b", "c", "d"], &["d", "c", "b", "a"]),
		(&["a", "b", "c"], &[]),
		(&[], &["a", "b"]),
	];
	for (before, after) in cases {
		assert_patches_into(&keyed_list(before), &keyed_list(after));
	}
}

#[wasm_bindgen_test]
fn keyed_rotation_moves_nodes() {
	let document = document();
	let patcher = DomPatcher::default();
	let events = EventNode::root(Rc::new(Discard));

	let before = keyed_list(&["a", "b", "c", "d"]);
	let after = keyed_list(&["c", "d", "a", "b"]);

	let root = patcher.render(&document, &before, &events);
	let originals: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| item(&root, id)).collect();

	let mut patches = diff(&before, &after);
	let root = patcher.patch(&root, &before, &mut patches, &events);

	for (original, id) in originals.iter().zip(&["a", "b", "c", "d"]) {
		assert!(item(&root, id).is_same_node(Some(original)), "{} was re-created", id);
	}
	assert_eq!(html(&root), html(&patcher.render(&document, &after, &events)));
}

#[wasm_bindgen_test]
fn keyed_duplicates() {
	let keyed = |keys: &[&str]| keyed("ul", None, keys.iter().enumerate().map(|(i, key)| ((*key).to_owned(), element("li", None, vec![text(i.to_string())]))).collect());
	assert_patches_into(&keyed(&["a", "b", "c", "d"]), &keyed(&["d", "c", "a", "a"]));
	assert_patches_into(&keyed(&["a", "a"]), &keyed(&["a"]));
	assert_patches_into(&keyed(&["a"]), &keyed(&["a", "a", "a"]));
}

#[wasm_bindgen_test]
fn keyed_moves_carry_patches() {
	let before = keyed("ul", None, vec![("a".to_owned(), text("A")), ("b".to_owned(), text("B"))]);
	let after = keyed("ul", None, vec![("b".to_owned(), text("B!")), ("a".to_owned(), text("A"))]);
	assert_patches_into(&before, &after);
}

#[wasm_bindgen_test]
fn element_becomes_keyed() {
	assert_patches_into(&element("ul", None, vec![element("li", None, vec![text("a")])]), &keyed_list(&["a", "b"]));
}

#[wasm_bindgen_test]
fn tagged() {
	let before = element("div", None, vec![text("a").map(|n: i32| n)]);
	let after = element("div", None, vec![text("b").map(|n: i32| n + 1)]);
	assert_patches_into(&before, &after);

	let deeper = element("div", None, vec![text("b").map(|n: i32| n).map(|n: i32| n)]);
	assert_patches_into(&before, &deeper);
}

#[wasm_bindgen_test]
fn thunks() {
	let before = element("div", None, vec![thunk(vec![ThunkRef::Address(1)], || element("p", None, vec![text("one")]))]);
	let same = element("div", None, vec![thunk(vec![ThunkRef::Address(1)], || element("p", None, vec![text("ignored")]))]);
	let changed = element("div", None, vec![thunk(vec![ThunkRef::Address(2)], || element("p", None, vec![text("two")]))]);

	let document = document();
	let patcher = DomPatcher::default();
	let events = EventNode::root(Rc::new(Discard));
	let root = patcher.render(&document, &before, &events);

	let mut patches = diff(&before, &same);
	assert!(patches.is_empty());
	let root = patcher.patch(&root, &before, &mut patches, &events);
	assert_eq!(root.text_content().unwrap(), "one");

	let mut patches = diff(&same, &changed);
	let root = patcher.patch(&root, &same, &mut patches, &events);
	assert_eq!(root.text_content().unwrap(), "two");
}

#[wasm_bindgen_test]
fn virtualized_markup_needs_no_patches() {
	init_log();

	let container = document().create_element("div").unwrap();
	container.set_inner_html(r#"<p class="greeting">Hello<b>!</b></p>"#);
	let root = container.first_child().unwrap();

	let virtual_root = virtualize(&root);
	let view = element("p", vec![attribute("class", "greeting")], vec![text("Hello"), element("b", None, vec![text("!")])]);
	assert!(diff(&virtual_root, &view).is_empty());

	let changed = element("p", vec![attribute("class", "greeting")], vec![text("Goodbye")]);
	let mut patches = diff(&virtual_root, &changed);
	let root = DomPatcher::default().patch(&root, &virtual_root, &mut patches, &EventNode::root(Rc::new(Discard)));
	assert_eq!(html(&root), r#"<p class="greeting">Goodbye</p>"#);
}

#[wasm_bindgen_test]
fn virtualized_svg_keeps_namespace() {
	let container = document().create_element("div").unwrap();
	container.set_inner_html(r#"<svg><circle r="1"></circle></svg>"#);
	let root = container.first_child().unwrap();

	let view = reflex_dom::node::element_ns(
		"http://www.w3.org/2000/svg",
		"svg",
		None,
		vec![reflex_dom::node::element_ns("http://www.w3.org/2000/svg", "circle", vec![attribute("r", "1")], vec![])],
	);
	assert!(diff(&virtualize(&root), &view).is_empty());
}

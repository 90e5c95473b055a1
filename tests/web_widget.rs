#![cfg(target_arch = "wasm32")]

use reflex_dom::{
	attribute::{self, on},
	effect,
	facts,
	navigation::NAVIGATE_EVENT,
	node::{element, text},
	Application, Config, Decoded, Effect, Node, Program, Transaction, Widget,
};
use std::sync::Once;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlElement};

wasm_bindgen_test_configure!(run_in_browser);

static LOG: Once = Once::new();
fn init_log() {
	LOG.call_once(tracing_wasm::set_as_global_default);
}

/// Resolves after all currently queued microtasks.
async fn next_tick() {
	let promise = js_sys::Promise::new(&mut |resolve, _| {
		window().unwrap().set_timeout_with_callback(&resolve).unwrap();
	});
	JsFuture::from(promise).await.unwrap();
}

struct Counter {
	count: i32,
}

#[derive(Debug)]
enum Msg {
	Increment,
	IncrementTwice,
	Load(i32),
	Focus(&'static str),
	Focused,
}

impl Program for Counter {
	type Message = Msg;
	type Options = i32;

	fn init(count: i32) -> Transaction<Self> {
		(Self { count }, Effect::none())
	}

	fn update(self, message: Msg) -> Transaction<Self> {
		match message {
			Msg::Increment => (Self { count: self.count + 1 }, Effect::none()),
			Msg::IncrementTwice => (Self { count: self.count + 1 }, Effect::send(Msg::Increment)),
			Msg::Load(n) => (self, Effect::task(async move { Ok::<_, ()>(n) }, |n| Some(Msg::Increment).filter(|_| n > 0), |()| None)),
			Msg::Focus(id) => (self, Effect::attempt(effect::focus(id.to_owned()), |()| Some(Msg::Focused))),
			Msg::Focused => (Self { count: -1 }, Effect::none()),
		}
	}

	fn view(&self) -> Node {
		element(
			"button",
			vec![attribute::id("counter"), on("click", |_| Ok(Decoded::new(Msg::Increment)))],
			vec![text(self.count.to_string())],
		)
	}
}

fn spawn(count: i32) -> (web_sys::Element, Widget<Counter>) {
	init_log();
	let document = window().unwrap().document().unwrap();
	let container = document.create_element("div").unwrap();
	let placeholder = document.create_element("div").unwrap();
	container.append_child(&placeholder).unwrap();
	(container, Widget::spawn_with_config(count, placeholder, Config::default()))
}

fn shown(widget: &Widget<Counter>) -> String {
	widget.root().text_content().unwrap()
}

#[wasm_bindgen_test]
fn init_renders_over_placeholder() {
	let (container, widget) = spawn(5);

	assert_eq!(shown(&widget), "5");
	assert_eq!(widget.root().node_name(), "BUTTON");
	assert!(container.first_child().unwrap().is_same_node(Some(&widget.root())));
	assert_eq!(widget.with_state(|counter| counter.count), Some(5));
}

#[wasm_bindgen_test]
fn sync_renders_immediately() {
	let (_container, widget) = spawn(0);

	widget.sync(Msg::Increment);
	assert_eq!(shown(&widget), "1");
}

#[wasm_bindgen_test]
async fn send_is_queued() {
	let (_container, widget) = spawn(0);

	widget.send(Msg::Increment);
	assert_eq!(shown(&widget), "0");

	next_tick().await;
	assert_eq!(shown(&widget), "1");
}

#[wasm_bindgen_test]
async fn clicks_update_the_program() {
	let (_container, widget) = spawn(0);
	let button = widget.root().dyn_into::<HtmlElement>().unwrap();

	button.click();
	button.click();
	next_tick().await;

	assert_eq!(shown(&widget), "2");
	assert!(widget.root().is_same_node(Some(&button)));
}

#[wasm_bindgen_test]
async fn effects_run_after_rendering() {
	let (_container, widget) = spawn(0);

	widget.sync(Msg::IncrementTwice);
	assert_eq!(shown(&widget), "1");

	next_tick().await;
	assert_eq!(shown(&widget), "2");
}

#[wasm_bindgen_test]
async fn tasks_report_back() {
	let (_container, widget) = spawn(0);

	widget.sync(Msg::Load(1));
	widget.sync(Msg::Load(0));
	next_tick().await;

	assert_eq!(shown(&widget), "1");
}

#[wasm_bindgen_test]
async fn failed_attempts_are_dropped() {
	let (_container, widget) = spawn(3);

	widget.sync(Msg::Focus("no-such-element"));
	next_tick().await;

	assert_eq!(shown(&widget), "3");
}

/// A document created through `DOMImplementation`, which has no window of its own.
fn blank_document(title: &str) -> web_sys::Document {
	init_log();
	window().unwrap().document().unwrap().implementation().unwrap().create_html_document_with_title(title).unwrap()
}

struct Page {
	title: String,
	clicks: u32,
}

#[derive(Debug)]
enum PageMsg {
	Retitle(&'static str),
	Click,
}

impl Program for Page {
	type Message = PageMsg;
	type Options = &'static str;

	fn init(title: &'static str) -> Transaction<Self> {
		(Self { title: title.to_owned(), clicks: 0 }, Effect::none())
	}

	fn update(self, message: PageMsg) -> Transaction<Self> {
		match message {
			PageMsg::Retitle(title) => (Self { title: title.to_owned(), ..self }, Effect::none()),
			PageMsg::Click => (Self { clicks: self.clicks + 1, ..self }, Effect::none()),
		}
	}

	fn view(&self) -> Node {
		element(
			"body",
			None,
			vec![element("button", vec![on("click", |_| Ok(Decoded::new(PageMsg::Click)))], vec![text(self.title.clone())])],
		)
	}

	fn title(&self) -> Option<String> {
		Some(self.title.clone())
	}
}

#[wasm_bindgen_test]
fn spawn_document_creates_a_missing_body_and_syncs_the_title() {
	let document = blank_document("Blank");
	let body = document.body().unwrap();
	document.document_element().unwrap().remove_child(&body).unwrap();
	assert!(document.body().is_none());

	let widget = Widget::<Page>::spawn_document("First", &document);
	let body: web_sys::Node = document.body().unwrap().into();
	assert!(widget.root().is_same_node(Some(&body)));
	assert_eq!(body.text_content().unwrap(), "First");
	assert_eq!(document.title(), "First");

	widget.sync(PageMsg::Retitle("Second"));
	assert_eq!(document.body().unwrap().text_content().unwrap(), "Second");
	assert_eq!(document.title(), "Second");
}

#[wasm_bindgen_test]
async fn respawning_on_a_document_takes_over_its_tree() {
	let document = blank_document("Blank");
	let first = Widget::<Page>::spawn_document("First", &document);
	let button = document.body().unwrap().first_child().unwrap();

	let second = Widget::<Page>::spawn_document("Second", &document);
	assert!(second.root().is_same_node(Some(&first.root())));
	assert!(document.body().unwrap().first_child().unwrap().is_same_node(Some(&button)));
	assert_eq!(button.text_content().unwrap(), "Second");

	first.sync(PageMsg::Retitle("Stale"));
	assert_eq!(button.text_content().unwrap(), "Second");
	assert_eq!(document.title(), "Second");

	button.dyn_ref::<HtmlElement>().unwrap().click();
	next_tick().await;
	assert_eq!(second.with_state(|page| page.clicks), Some(1));
	assert_eq!(first.with_state(|page| page.clicks), Some(0));
}

/// Records what it's told about the URL.
struct Router {
	log: Vec<String>,
}

#[derive(Debug)]
enum RouterMsg {
	Changed(String),
	Internal(String),
	External(String),
	Pushed,
}

impl Program for Router {
	type Message = RouterMsg;
	type Options = ();

	fn init((): ()) -> Transaction<Self> {
		(Self { log: vec![] }, Effect::none())
	}

	fn update(mut self, message: RouterMsg) -> Transaction<Self> {
		let effect = match &message {
			RouterMsg::Internal(path) => Effect::attempt(effect::push_url(path.clone()), |()| Some(RouterMsg::Pushed)),
			_ => Effect::none(),
		};
		self.log.push(format!("{:?}", message));
		(self, effect)
	}

	fn view(&self) -> Node {
		let link = |href: &str, settings: Vec<reflex_dom::Setting>| {
			let mut settings = settings;
			settings.push(facts::attribute("href", href));
			element("a", settings, vec![text(href)])
		};
		element(
			"body",
			None,
			vec![
				link("/reflex-internal", vec![]),
				link("https://example.com/elsewhere", vec![]),
				link("/reflex-new-tab", vec![facts::attribute("target", "_blank")]),
			],
		)
	}
}

impl Application for Router {
	fn init_with_url((): (), url: web_sys::Url) -> Transaction<Self> {
		(Self { log: vec![format!("Init({:?})", url.pathname())] }, Effect::none())
	}

	fn on_url_change(url: web_sys::Url) -> RouterMsg {
		RouterMsg::Changed(url.pathname())
	}

	fn on_internal_url_request(url: web_sys::Url) -> RouterMsg {
		RouterMsg::Internal(url.pathname())
	}

	fn on_external_url_request(url: web_sys::Url) -> RouterMsg {
		RouterMsg::External(url.host())
	}
}

#[wasm_bindgen_test]
async fn applications_route_links_and_url_changes() {
	let window = window().unwrap();
	let original = window.location().href().unwrap();
	let original_path = window.location().pathname().unwrap();

	let document = blank_document("Router");
	let widget = Widget::<Router>::spawn_application((), &document);
	let links = document.get_elements_by_tag_name("a");
	let link = |i: u32| links.item(i).unwrap().dyn_into::<HtmlElement>().unwrap();
	let log = || widget.with_state(|router| router.log.clone()).unwrap();
	assert_eq!(log(), vec![format!("Init({:?})", original_path)]);

	link(0).click();
	next_tick().await;
	assert_eq!(window.location().pathname().unwrap(), "/reflex-internal");

	link(1).click();
	link(2).click();
	next_tick().await;

	window.dispatch_event(&web_sys::Event::new("hashchange").unwrap()).unwrap();
	window.dispatch_event(&web_sys::Event::new(NAVIGATE_EVENT).unwrap()).unwrap();
	next_tick().await;

	window.history().unwrap().replace_state_with_url(&JsValue::NULL, "", Some(&original)).unwrap();

	assert_eq!(
		log(),
		vec![
			format!("Init({:?})", original_path),
			r#"Internal("/reflex-internal")"#.to_owned(),
			r#"Changed("/reflex-internal")"#.to_owned(),
			"Pushed".to_owned(),
			r#"External("example.com")"#.to_owned(),
			r#"Changed("/reflex-internal")"#.to_owned(),
			r#"Changed("/reflex-internal")"#.to_owned(),
		]
	);
}

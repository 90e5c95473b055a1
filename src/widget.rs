//! Hosting a [`Program`] in the DOM.
//!
//! A [`Widget`] owns the program state and renders it into a mount: the last rendered virtual tree and the DOM root.
//! Each message runs `update`, re-renders synchronously and then performs the requested effects.
//!
//! A document keeps its mount when another widget is spawned on it, so the new widget patches the existing DOM.

use crate::{
	config::Config,
	diff::diff,
	effect::{Effect, Port},
	event::{EventNode, Message, Sink},
	load::virtualize,
	navigation::{Navigated, Navigation},
	node::Node,
	patch::DomPatcher,
};
use core::any::type_name;
use futures::future::LocalBoxFuture;
use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace, trace_span};
use wasm_bindgen::{throw_str, throw_val};
use wasm_bindgen_futures::spawn_local;

/// The result of [`Program::init`] and [`Program::update`]: the next state, and what to do next.
pub type Transaction<P> = (P, Effect<<P as Program>::Message>);

/// A model-view-update program.
pub trait Program: Sized + 'static {
	type Message: 'static;
	type Options;

	fn init(options: Self::Options) -> Transaction<Self>;

	fn update(self, message: Self::Message) -> Transaction<Self>;

	fn view(&self) -> Node;

	/// The document title, for programs that own a whole document.
	fn title(&self) -> Option<String> {
		None
	}
}

/// A [`Program`] that owns a document and its URL. See [`Widget::spawn_application`].
pub trait Application: Program {
	/// Like [`Program::init`], with the current URL.
	fn init_with_url(options: Self::Options, _url: web_sys::Url) -> Transaction<Self> {
		Self::init(options)
	}

	/// The URL changed through history navigation, a fragment change or [`push_url`](`crate::effect::push_url`).
	fn on_url_change(url: web_sys::Url) -> Self::Message;

	/// A link to the current origin was clicked. The browser stays on the page.
	fn on_internal_url_request(url: web_sys::Url) -> Self::Message;

	/// A link to another origin was clicked. The browser stays on the page, see [`load`](`crate::effect::load`).
	fn on_external_url_request(url: web_sys::Url) -> Self::Message;
}

/// A running [`Program`].
///
/// Dropping every handle to a widget stops it: queued messages and the results of pending effects are discarded.
///
/// Spawning another widget on the same document hands the rendered tree over to that widget.
/// The previous one then stops rendering and receiving events, but keeps its state.
pub struct Widget<P: Program> {
	inner: Rc<Inner<P>>,
}
impl<P: Program> Clone for Widget<P> {
	fn clone(&self) -> Self {
		Self { inner: Rc::clone(&self.inner) }
	}
}

struct Inner<P: Program> {
	state: RefCell<Option<P>>,
	mount: Rc<Mount>,
	/// Set for widgets that own a document, whose title they keep in sync.
	document: Option<web_sys::Document>,
	thread: Rc<MainThread<P>>,
	rendering: Cell<bool>,
}

/// Delivers messages to a widget without keeping it alive.
struct MainThread<P: Program> {
	widget: Weak<Inner<P>>,
}

/// What a widget renders into.
struct Mount {
	node: RefCell<Node>,
	root: RefCell<web_sys::Node>,
	patcher: DomPatcher,
	/// The root of every routing context in the rendered tree.
	relay: Rc<Relay>,
	navigation: RefCell<Option<Rc<Navigation>>>,
}
impl Mount {
	fn new(root: web_sys::Node, config: Config) -> Rc<Self> {
		Rc::new(Self {
			node: RefCell::new(virtualize(&root)),
			root: RefCell::new(root),
			patcher: DomPatcher::new(config),
			relay: Rc::default(),
			navigation: RefCell::new(None),
		})
	}

	/// Routes link clicks and URL changes to `handler`, or stops doing so for `None`.
	fn navigate(&self, window: Option<web_sys::Window>, handler: Option<Rc<dyn Fn(Navigated)>>) {
		let mut navigation = self.navigation.borrow_mut();
		match (handler, window) {
			(Some(handler), Some(window)) => {
				let navigation = navigation.get_or_insert_with(|| Navigation::new(window));
				navigation.set_handler(Some(handler));
				self.patcher.set_link_listener(Some(navigation.function().clone()));
			}
			(Some(_), None) => throw_str("reflex-dom: Can't route URLs without a window"),
			(None, _) => {
				if let Some(navigation) = &*navigation {
					navigation.set_handler(None);
				}
				self.patcher.set_link_listener(None);
			}
		}
	}
}

/// Forwards messages from the rendered tree to the widget that currently owns its [`Mount`].
#[derive(Default)]
struct Relay {
	target: RefCell<Option<Weak<dyn Sink>>>,
}
impl Relay {
	fn target(&self) -> Option<Rc<dyn Sink>> {
		self.target.borrow().as_ref().and_then(Weak::upgrade)
	}

	fn is_target<P: Program>(&self, thread: &Rc<MainThread<P>>) -> bool {
		self.target().map_or(false, |target| Rc::as_ptr(&target).cast::<()>() == Rc::as_ptr(thread).cast::<()>())
	}
}
impl Sink for Relay {
	fn send(&self, message: Message) {
		match self.target() {
			Some(target) => target.send(message),
			None => trace!("Dropping message for a stopped widget."),
		}
	}

	fn sync(&self, message: Message) {
		match self.target() {
			Some(target) => target.sync(message),
			None => trace!("Dropping message for a stopped widget."),
		}
	}
}

thread_local! {
	/// Documents that widgets were spawned on, with what they render into.
	static DOCUMENT_MOUNTS: RefCell<Vec<(web_sys::Document, Rc<Mount>)>> = RefCell::new(Vec::new());
}

/// The mount of `document`'s body, which is created if missing.
fn document_mount(document: &web_sys::Document) -> Rc<Mount> {
	let existing = DOCUMENT_MOUNTS.with(|mounts| {
		mounts
			.borrow()
			.iter()
			.find(|(mounted, _)| mounted.is_same_node(Some(&**document)))
			.map(|(_, mount)| Rc::clone(mount))
	});
	if let Some(mount) = existing {
		trace!("Taking over the document from the previous widget.");
		return mount;
	}

	let body: web_sys::Node = match document.body() {
		Some(body) => body.into(),
		None => {
			let body: web_sys::Node = document.create_element("body").unwrap_or_else(|error| throw_val(error)).into();
			match document.document_element() {
				Some(html) => {
					if let Err(error) = html.append_child(&body) {
						error!("Failed to attach created body: {:?}", error);
					}
				}
				None => throw_str("reflex-dom: Can't create a body for a document without a document element"),
			}
			body
		}
	};
	let config = window_of(document).map(|window| Config::detect(&window)).unwrap_or_default();
	let mount = Mount::new(body, config);
	DOCUMENT_MOUNTS.with(|mounts| mounts.borrow_mut().push((document.clone(), Rc::clone(&mount))));
	mount
}

/// Documents created through `DOMImplementation` have no window of their own.
fn window_of(document: &web_sys::Document) -> Option<web_sys::Window> {
	document.default_view().or_else(web_sys::window)
}

impl<P: Program> Widget<P> {
	/// Starts `P` in `root`, taking over its current content.
	#[must_use]
	pub fn spawn(options: P::Options, root: web_sys::Element) -> Self {
		let config = web_sys::window().map(|window| Config::detect(&window)).unwrap_or_default();
		Self::spawn_with_config(options, root, config)
	}

	#[must_use]
	#[instrument(skip(options, root))]
	pub fn spawn_with_config(options: P::Options, root: web_sys::Element, config: Config) -> Self {
		Self::start(Mount::new(root.into(), config), None, |_| P::init(options))
	}

	/// Starts `P` in `document`'s body, creating one if necessary, and keeps the document title in sync.
	///
	/// If a widget was spawned on `document` before, `P` continues from what that widget rendered.
	#[must_use]
	#[instrument(skip(options, document))]
	pub fn spawn_document(options: P::Options, document: &web_sys::Document) -> Self {
		let mount = document_mount(document);
		mount.navigate(None, None);
		Self::start(mount, Some(document.clone()), |_| P::init(options))
	}

	fn start(mount: Rc<Mount>, document: Option<web_sys::Document>, init: impl FnOnce(&Rc<MainThread<P>>) -> Transaction<P>) -> Self {
		let span = trace_span!("Starting widget", program = type_name::<P>());
		let _enter = span.enter();

		let inner = Rc::new_cyclic(|widget| Inner {
			state: RefCell::new(None),
			mount,
			document,
			thread: Rc::new(MainThread { widget: Weak::clone(widget) }),
			rendering: Cell::new(false),
		});
		let target: Weak<dyn Sink> = Rc::downgrade(&inner.thread) as Weak<MainThread<P>>;
		*inner.mount.relay.target.borrow_mut() = Some(target);

		inner.transact(init(&inner.thread));
		Self { inner }
	}

	/// Delivers `message` after the current task.
	pub fn send(&self, message: P::Message) {
		Port::send(&*self.inner.thread, message)
	}

	/// Delivers `message` immediately, re-rendering before this method returns.
	///
	/// # Panics
	///
	/// In debug builds, if called while this widget is rendering.
	pub fn sync(&self, message: P::Message) {
		self.inner.sync(message)
	}

	/// The current DOM root. It changes if a render replaces the root node.
	#[must_use]
	pub fn root(&self) -> web_sys::Node {
		self.inner.mount.root.borrow().clone()
	}

	/// Inspects the current state. [`None`] only while an update is in progress.
	pub fn with_state<R>(&self, f: impl FnOnce(&P) -> R) -> Option<R> {
		self.inner.state.borrow().as_ref().map(f)
	}
}

impl<P: Application> Widget<P> {
	/// Like [`Widget::spawn_document`], and routes URL changes and link clicks to `P`.
	///
	/// Rendered `<a>` elements get a `click` listener. Clicks without modifier keys, on links without `target` or `download`,
	/// don't navigate and instead become [`Application::on_internal_url_request`] or [`Application::on_external_url_request`].
	/// `popstate`, `hashchange` and [`NAVIGATE_EVENT`](`crate::navigation::NAVIGATE_EVENT`) on the window become [`Application::on_url_change`].
	///
	/// # Panics
	///
	/// Throws into JavaScript if there's no window.
	#[must_use]
	#[instrument(skip(options, document))]
	pub fn spawn_application(options: P::Options, document: &web_sys::Document) -> Self {
		let mount = document_mount(document);
		let window = window_of(document);
		let url = window
			.as_ref()
			.map(|window| window.location().href().and_then(|href| web_sys::Url::new(&href)))
			.unwrap_or_else(|| throw_str("reflex-dom: Can't route URLs without a window"))
			.unwrap_or_else(|error| throw_val(error));

		Self::start(Rc::clone(&mount), Some(document.clone()), move |thread| {
			let thread = Rc::clone(thread);
			let handler: Rc<dyn Fn(Navigated)> = Rc::new(move |navigated: Navigated| {
				let message = match navigated {
					Navigated::UrlChanged(url) => P::on_url_change(url),
					Navigated::InternalRequest(url) => P::on_internal_url_request(url),
					Navigated::ExternalRequest(url) => P::on_external_url_request(url),
				};
				Port::send(&*thread, message)
			});
			mount.navigate(window, Some(handler));
			P::init_with_url(options, url)
		})
	}
}

impl<P: Program> Inner<P> {
	fn sync(&self, message: P::Message) {
		debug_assert!(!self.rendering.get(), "reflex-dom: `sync` called on `{}` while it was rendering", type_name::<P>());

		let state = match self.state.try_borrow_mut().ok().and_then(|mut state| state.take()) {
			Some(state) => state,
			None => return error!("`{}` received a message while it was updating. Dropping the message.", type_name::<P>()),
		};
		self.transact(state.update(message))
	}

	fn transact(&self, (state, effect): Transaction<P>) {
		*self.state.borrow_mut() = Some(state);
		{
			let state = self.state.borrow();
			if let Some(state) = &*state {
				self.render(state);
			}
		}

		if !effect.is_none() {
			let port: Rc<dyn Port<P::Message>> = Rc::clone(&self.thread) as Rc<dyn Port<P::Message>>;
			effect.perform(&port)
		}
	}

	fn render(&self, state: &P) {
		let span = trace_span!("Rendering", program = type_name::<P>());
		let _enter = span.enter();
		if !self.mount.relay.is_target(&self.thread) {
			return trace!("Not rendering, as another widget took over the document.");
		}
		self.rendering.set(true);

		let mount = &self.mount;
		let next = state.view();
		let previous = mount.node.replace(next.clone());
		let mut patches = diff(&previous, &next);
		trace!("Applying {} patch(es).", patches.len());

		let event_node = EventNode::root(Rc::clone(&mount.relay) as Rc<dyn Sink>);
		let root = mount.root.borrow().clone();
		let root = mount.patcher.patch(&root, &previous, &mut patches, &event_node);
		*mount.root.borrow_mut() = root;

		if let Some(document) = &self.document {
			if let Some(title) = state.title() {
				if document.title() != title {
					document.set_title(&title)
				}
			}
		}

		self.rendering.set(false);
	}
}

impl<P: Program> Port<P::Message> for MainThread<P> {
	fn send(&self, message: P::Message) {
		let widget = Weak::clone(&self.widget);
		spawn_local(async move {
			match widget.upgrade() {
				Some(widget) => widget.sync(message),
				None => trace!("Dropping message for a stopped widget."),
			}
		})
	}

	fn sync(&self, message: P::Message) {
		match self.widget.upgrade() {
			Some(widget) => widget.sync(message),
			None => trace!("Dropping message for a stopped widget."),
		}
	}

	fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
		spawn_local(task)
	}
}

impl<P: Program> Sink for MainThread<P> {
	fn send(&self, message: Message) {
		Port::send(self, downcast::<P>(message))
	}

	fn sync(&self, message: Message) {
		Port::sync(self, downcast::<P>(message))
	}
}

fn downcast<P: Program>(message: Message) -> P::Message {
	match message.downcast::<P::Message>() {
		Ok(message) => *message,
		Err(_) => {
			if cfg!(debug_assertions) {
				panic!("reflex-dom: `{}` received a message that isn't a `{}`. Is a `map` missing?", type_name::<P>(), type_name::<P::Message>())
			} else {
				throw_str("reflex-dom: Widget received a message of the wrong type")
			}
		}
	}
}

//! Event handlers, tagger chains and message routing.
//!
//! Every DOM node that has event settings gets exactly one native listener, its [`EventRouter`].
//! The router looks up the [`EventHandler`] currently registered for the event type, decodes the native event
//! and then walks the chain of [`EventNode`]s towards the widget that owns the tree,
//! rewriting the message with every [`Tagger`] it passes.

use core::{
	any::{type_name, Any},
	fmt,
};
use hashbrown::HashMap;
use std::{
	cell::RefCell,
	rc::{Rc, Weak},
};
use thiserror::Error;
use tracing::{debug, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast};

/// A type-erased message on its way from an event handler to a widget.
pub type Message = Box<dyn Any>;

/// Identity comparison for shared closures, ignoring vtable pointers.
pub(crate) fn same_rc<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
	Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

/// Rewrites a message as it crosses a subtree boundary.
///
/// Taggers compare by identity: cloning a [`Tagger`] keeps it equal to the original,
/// while two taggers made from the same closure code are still considered different.
#[derive(Clone)]
pub struct Tagger(Rc<dyn Fn(Message) -> Message>);
impl Tagger {
	/// Wraps `tag` so that it can be applied to erased messages.
	///
	/// # Panics
	///
	/// The resulting tagger panics when it receives a message that isn't an `A`.
	/// This can only happen if a subtree was mapped with a function for the wrong message type.
	pub fn new<A: 'static, B: 'static>(tag: impl Fn(A) -> B + 'static) -> Self {
		Self(Rc::new(move |message: Message| match message.downcast::<A>() {
			Ok(message) => Box::new(tag(*message)) as Message,
			Err(_) => panic!("reflex-dom: Tagger expected a message of type `{}`", type_name::<A>()),
		}))
	}

	#[must_use]
	pub fn tag(&self, message: Message) -> Message {
		(self.0)(message)
	}

	#[must_use]
	pub fn same(&self, other: &Self) -> bool {
		same_rc(&self.0, &other.0)
	}
}
impl fmt::Debug for Tagger {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Tagger").field(&Rc::as_ptr(&self.0).cast::<()>()).finish()
	}
}

/// Pairwise identity comparison of two tagger lists.
#[must_use]
pub fn pairwise_same(a: &[Tagger], b: &[Tagger]) -> bool {
	a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.same(b))
}

/// How a handler may interact with the native event, which decides whether its listener can be passive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPhase {
	Normal,
	MayStopPropagation,
	MayPreventDefault,
	Custom,
}
impl EventPhase {
	#[must_use]
	pub fn is_passive(self) -> bool {
		matches!(self, Self::Normal | Self::MayStopPropagation)
	}
}

/// The successful result of decoding a native event.
pub struct Decoded {
	pub message: Message,
	pub stop_propagation: bool,
	pub prevent_default: bool,
}
impl Decoded {
	pub fn new<T: 'static>(message: T) -> Self {
		Self {
			message: Box::new(message),
			stop_propagation: false,
			prevent_default: false,
		}
	}

	/// Stops propagation of the native event and delivers the message synchronously.
	#[must_use]
	pub fn with_stop_propagation(mut self) -> Self {
		self.stop_propagation = true;
		self
	}

	#[must_use]
	pub fn with_prevent_default(mut self) -> Self {
		self.prevent_default = true;
		self
	}
}
impl fmt::Debug for Decoded {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Decoded")
			.field("stop_propagation", &self.stop_propagation)
			.field("prevent_default", &self.prevent_default)
			.finish_non_exhaustive()
	}
}

/// A decoder rejected a native event. Such events are dropped without notifying the program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DecodeError(pub String);
impl DecodeError {
	pub fn new(reason: impl Into<String>) -> Self {
		Self(reason.into())
	}
}

pub type Decoder = Rc<dyn Fn(&web_sys::Event) -> Result<Decoded, DecodeError>>;

/// An event setting: which event to listen for, how to turn it into a message and how to tag that message.
#[derive(Clone)]
pub struct EventHandler {
	event_type: String,
	decoder: Decoder,
	phase: EventPhase,
	taggers: Vec<Tagger>,
}
impl EventHandler {
	pub fn new(event_type: impl Into<String>, phase: EventPhase, decoder: impl Fn(&web_sys::Event) -> Result<Decoded, DecodeError> + 'static) -> Self {
		Self::with_decoder(event_type, phase, Rc::new(decoder))
	}

	/// Like [`EventHandler::new`], but shares an existing decoder so that handlers built in different renders compare equal.
	pub fn with_decoder(event_type: impl Into<String>, phase: EventPhase, decoder: Decoder) -> Self {
		Self {
			event_type: event_type.into(),
			decoder,
			phase,
			taggers: Vec::new(),
		}
	}

	#[must_use]
	pub fn event_type(&self) -> &str {
		&self.event_type
	}

	#[must_use]
	pub fn phase(&self) -> EventPhase {
		self.phase
	}

	#[must_use]
	pub fn taggers(&self) -> &[Tagger] {
		&self.taggers
	}

	/// Appends `tagger`. Taggers run in the order they were added, before any enclosing [`Tagged`](`crate::node::NodeKind::Tagged`) subtree's.
	#[must_use]
	pub fn map(mut self, tagger: Tagger) -> Self {
		self.taggers.push(tagger);
		self
	}

	/// Equality that decides whether a rendered handler must be replaced.
	#[must_use]
	pub fn equal(&self, other: &Self) -> bool {
		self.event_type == other.event_type && self.phase == other.phase && same_rc(&self.decoder, &other.decoder) && pairwise_same(&self.taggers, &other.taggers)
	}

	/// # Errors
	///
	/// Whatever the decoder rejects the event with.
	pub fn decode(&self, event: &web_sys::Event) -> Result<Decoded, DecodeError> {
		(self.decoder)(event)
	}
}
impl fmt::Debug for EventHandler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventHandler")
			.field("event_type", &self.event_type)
			.field("phase", &self.phase)
			.field("decoder", &Rc::as_ptr(&self.decoder).cast::<()>())
			.field("taggers", &self.taggers)
			.finish()
	}
}

/// Where decoded messages end up after all taggers have been applied.
pub trait Sink {
	/// Queued delivery. The message is handled after the current task.
	fn send(&self, message: Message);

	/// Synchronous, re-entrant delivery.
	///
	/// Calling this while the receiving widget is rendering lets patch application observe a half-updated DOM.
	fn sync(&self, message: Message);
}

/// The routing context of a rendered DOM node.
#[derive(Clone)]
pub enum EventNode {
	Root(Rc<dyn Sink>),
	Tagged(Rc<TaggedEventNode>),
}
impl EventNode {
	pub fn root(sink: Rc<dyn Sink>) -> Self {
		Self::Root(sink)
	}

	/// Creates a routing context below `parent`. `taggers` are ordered outermost first.
	pub fn tagged(taggers: Vec<Tagger>, parent: EventNode) -> Self {
		Self::Tagged(TaggedEventNode::new(taggers, parent))
	}
}
impl fmt::Debug for EventNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Root(sink) => f.debug_tuple("Root").field(&Rc::as_ptr(sink).cast::<()>()).finish(),
			Self::Tagged(node) => f.debug_tuple("Tagged").field(node).finish(),
		}
	}
}

/// The routing context created for a [`Tagged`](`crate::node::NodeKind::Tagged`) subtree.
///
/// The taggers are swapped in place by `Tagger` patches, so listeners bound below never need rebinding.
#[derive(Debug)]
pub struct TaggedEventNode {
	taggers: RefCell<Vec<Tagger>>,
	parent: EventNode,
}
impl TaggedEventNode {
	pub(crate) fn new(taggers: Vec<Tagger>, parent: EventNode) -> Rc<Self> {
		Rc::new(Self {
			taggers: RefCell::new(taggers),
			parent,
		})
	}

	pub(crate) fn retag(&self, taggers: Vec<Tagger>) {
		*self.taggers.borrow_mut() = taggers;
	}

	#[must_use]
	pub fn taggers(&self) -> Vec<Tagger> {
		self.taggers.borrow().clone()
	}
}

/// Rewrites a decoded message through `handler`'s own taggers and every enclosing routing context, then delivers it.
///
/// Within one context, taggers are applied innermost first.
/// Messages whose event asked to stop propagation are delivered with [`Sink::sync`], all others with [`Sink::send`].
pub fn route(handler: &EventHandler, decoded: Decoded, target: &EventNode) {
	let Decoded { mut message, stop_propagation, .. } = decoded;

	for tagger in &handler.taggers {
		message = tagger.tag(message);
	}

	let mut current = target.clone();
	loop {
		let parent = match &current {
			EventNode::Tagged(node) => {
				// Cloned so that user code can't observe a borrow.
				let taggers = node.taggers();
				for tagger in taggers.iter().rev() {
					message = tagger.tag(message);
				}
				node.parent.clone()
			}
			EventNode::Root(sink) => {
				return if stop_propagation { sink.sync(message) } else { sink.send(message) };
			}
		};
		current = parent;
	}
}

/// Decodes `event` with `handler` and routes the result. Decode failures are dropped.
pub(crate) fn forward(handler: &EventHandler, event: &web_sys::Event, target: &EventNode) {
	let span = trace_span!("Forwarding event", event_type = handler.event_type.as_str());
	let _enter = span.enter();

	let decoded = match handler.decode(event) {
		Ok(decoded) => decoded,
		Err(error) => return debug!("Dropping undecodable event: {}", error),
	};

	if decoded.stop_propagation {
		event.stop_propagation()
	}
	if decoded.prevent_default {
		event.prevent_default()
	}

	route(handler, decoded, target)
}

/// The single native listener of one DOM node.
///
/// Handlers are swapped per event type without touching the native listener.
pub(crate) struct EventRouter {
	handlers: RefCell<HashMap<String, EventHandler>>,
	target: RefCell<EventNode>,
	listener: Closure<dyn Fn(web_sys::Event)>,
}
impl EventRouter {
	pub(crate) fn new(target: EventNode) -> Rc<Self> {
		Rc::new_cyclic(|router: &Weak<Self>| {
			let router = router.clone();
			Self {
				handlers: RefCell::default(),
				target: RefCell::new(target),
				listener: Closure::wrap(Box::new(move |event: web_sys::Event| {
					if let Some(router) = router.upgrade() {
						router.handle_event(&event)
					}
				}) as Box<dyn Fn(web_sys::Event)>),
			}
		})
	}

	fn handle_event(&self, event: &web_sys::Event) {
		let event_type = event.type_();
		// Both are cloned out so that a synchronous render can rebind this router.
		let handler = match self.handlers.borrow().get(&event_type) {
			Some(handler) => handler.clone(),
			None => return warn!("Event router received {:?} without a handler for it.", event_type),
		};
		let target = self.target.borrow().clone();
		forward(&handler, event, &target)
	}

	pub(crate) fn retarget(&self, target: EventNode) {
		*self.target.borrow_mut() = target;
	}

	/// Registers `handler` for `event_type` and returns whether a native listener must be added.
	pub(crate) fn bind(&self, event_type: &str, handler: EventHandler) -> bool {
		self.handlers.borrow_mut().insert(event_type.to_owned(), handler).is_none()
	}

	/// Unregisters the handler for `event_type` and returns whether there was one.
	pub(crate) fn unbind(&self, event_type: &str) -> bool {
		self.handlers.borrow_mut().remove(event_type).is_some()
	}

	pub(crate) fn function(&self) -> &js_sys::Function {
		self.listener.as_ref().unchecked_ref()
	}
}

//! Side effects requested by a program's `init` and `update`.
//!
//! An [`Effect`] is a description. Nothing happens until the runtime calls [`Effect::perform`] with a [`Port`]
//! that feeds messages back into the program.

use crate::navigation::NAVIGATE_EVENT;
use core::{fmt::Debug, future::Future};
use futures::future::{FutureExt, LocalBoxFuture};
use std::rc::Rc;
use thiserror::Error;
use tracing::warn;
use wasm_bindgen::{JsCast, JsValue};

/// Where an effect's messages go.
pub trait Port<Msg> {
	/// Queued delivery.
	fn send(&self, message: Msg);

	/// Immediate delivery.
	fn sync(&self, message: Msg);

	/// Runs `task` in the background.
	fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

#[must_use = "Effects do nothing unless performed."]
pub struct Effect<Msg>(Inner<Msg>);

enum Inner<Msg> {
	None,
	Send(Msg),
	Task(LocalBoxFuture<'static, Option<Msg>>),
	Batch(Vec<Effect<Msg>>),
	Map(Box<dyn FnOnce(&Rc<dyn Port<Msg>>)>),
}

impl<Msg: 'static> Effect<Msg> {
	pub fn none() -> Self {
		Self(Inner::None)
	}

	/// Sends `message` back to the program, asynchronously.
	pub fn send(message: Msg) -> Self {
		Self(Inner::Send(message))
	}

	/// Runs `task` and turns its outcome into at most one message.
	pub fn task<T, E, F>(task: F, ok: impl FnOnce(T) -> Option<Msg> + 'static, err: impl FnOnce(E) -> Option<Msg> + 'static) -> Self
	where
		F: Future<Output = Result<T, E>> + 'static,
	{
		Self(Inner::Task(
			async move {
				match task.await {
					Ok(value) => ok(value),
					Err(error) => err(error),
				}
			}
			.boxed_local(),
		))
	}

	/// Like [`Effect::task`], but failures are logged and otherwise dropped.
	pub fn attempt<T, E, F>(task: F, ok: impl FnOnce(T) -> Option<Msg> + 'static) -> Self
	where
		F: Future<Output = Result<T, E>> + 'static,
		E: Debug + 'static,
	{
		Self::task(task, ok, |error| {
			warn!("Task failed but error was not handled: {:?}", error);
			None
		})
	}

	/// Performs all `effects`, in order.
	pub fn batch(effects: impl IntoIterator<Item = Self>) -> Self {
		Self(Inner::Batch(effects.into_iter().collect()))
	}

	/// Routes every message this effect produces through `tag`.
	pub fn map<B: 'static>(self, tag: impl Fn(Msg) -> B + 'static) -> Effect<B> {
		match self.0 {
			Inner::None => Effect::none(),
			inner => {
				let effect = Self(inner);
				let tag: Rc<dyn Fn(Msg) -> B> = Rc::new(tag);
				Effect(Inner::Map(Box::new(move |port: &Rc<dyn Port<B>>| {
					let port: Rc<dyn Port<Msg>> = Rc::new(MappedPort { port: Rc::clone(port), tag });
					effect.perform(&port)
				})))
			}
		}
	}

	#[must_use]
	pub fn is_none(&self) -> bool {
		matches!(self.0, Inner::None)
	}

	pub fn perform(self, port: &Rc<dyn Port<Msg>>) {
		match self.0 {
			Inner::None => (),
			Inner::Send(message) => port.send(message),
			Inner::Task(task) => {
				let sender = Rc::clone(port);
				port.spawn(
					async move {
						if let Some(message) = task.await {
							sender.send(message)
						}
					}
					.boxed_local(),
				)
			}
			Inner::Batch(effects) => {
				for effect in effects {
					effect.perform(port)
				}
			}
			Inner::Map(perform) => perform(port),
		}
	}
}
impl<Msg: 'static> Default for Effect<Msg> {
	fn default() -> Self {
		Self::none()
	}
}

struct MappedPort<A, B> {
	port: Rc<dyn Port<B>>,
	tag: Rc<dyn Fn(A) -> B>,
}
impl<A, B> Port<A> for MappedPort<A, B> {
	fn send(&self, message: A) {
		self.port.send((self.tag)(message))
	}

	fn sync(&self, message: A) {
		self.port.sync((self.tag)(message))
	}

	fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
		self.port.spawn(task)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
	#[error("no element with id {0:?}")]
	MissingTarget(String),
	#[error("element {0:?} doesn't support this operation")]
	Unsupported(String),
	#[error("no window available")]
	NoWindow,
	#[error("no document available")]
	NoDocument,
	#[error("JavaScript error: {0}")]
	Js(String),
}

fn element_by_id(id: &str) -> Result<web_sys::Element, EffectError> {
	let document = web_sys::window().and_then(|window| window.document()).ok_or(EffectError::NoDocument)?;
	document.get_element_by_id(id).ok_or_else(|| EffectError::MissingTarget(id.to_owned()))
}

/// Focuses the element with the given `id`.
///
/// # Errors
///
/// Iff there's no such element, it can't be focused or focusing it throws.
pub async fn focus(id: String) -> Result<(), EffectError> {
	let element = element_by_id(&id)?;
	let element = element.dyn_ref::<web_sys::HtmlElement>().ok_or_else(|| EffectError::Unsupported(id.clone()))?;
	element.focus().map_err(js_error)
}

/// Selects `start..end` in the text input or text area with the given `id`.
///
/// # Errors
///
/// Iff there's no such element, it isn't a text control or the browser rejects the selection.
pub async fn set_selection(id: String, start: u32, end: u32) -> Result<(), EffectError> {
	let element = element_by_id(&id)?;
	let result = if let Some(input) = element.dyn_ref::<web_sys::HtmlInputElement>() {
		input.set_selection_range(start, end)
	} else if let Some(text_area) = element.dyn_ref::<web_sys::HtmlTextAreaElement>() {
		text_area.set_selection_range(start, end)
	} else {
		return Err(EffectError::Unsupported(id));
	};
	result.map_err(js_error)
}

fn js_error(error: JsValue) -> EffectError {
	EffectError::Js(format!("{:?}", error))
}

/// Changes the URL through the History API, then notifies the application.
///
/// Nothing happens if `url` resolves to the current URL.
///
/// # Errors
///
/// Iff there's no window or the browser rejects the URL.
pub async fn push_url(url: String) -> Result<(), EffectError> {
	change_url(&url, |history, url| history.push_state_with_url(&JsValue::NULL, "", Some(url)))
}

/// Like [`push_url`], but replaces the current history entry.
///
/// # Errors
///
/// Iff there's no window or the browser rejects the URL.
pub async fn replace_url(url: String) -> Result<(), EffectError> {
	change_url(&url, |history, url| history.replace_state_with_url(&JsValue::NULL, "", Some(url)))
}

fn change_url(url: &str, change: impl FnOnce(&web_sys::History, &str) -> Result<(), JsValue>) -> Result<(), EffectError> {
	let window = web_sys::window().ok_or(EffectError::NoWindow)?;
	let current = window.location().href().map_err(js_error)?;
	let next = web_sys::Url::new_with_base(url, &current).map_err(js_error)?.href();
	if next == current {
		return Ok(());
	}

	let history = window.history().map_err(js_error)?;
	change(&history, &next).map_err(js_error)?;

	let event = web_sys::Event::new(NAVIGATE_EVENT).map_err(js_error)?;
	window.dispatch_event(&event).map(drop).map_err(js_error)
}

/// Moves `delta` entries through the session history. Negative values go back.
///
/// # Errors
///
/// Iff there's no window or the browser refuses.
pub async fn go(delta: i32) -> Result<(), EffectError> {
	let window = web_sys::window().ok_or(EffectError::NoWindow)?;
	window.history().and_then(|history| history.go_with_delta(delta)).map_err(js_error)
}

/// Leaves the page for `url`.
///
/// # Errors
///
/// Iff there's no window or the browser refuses. A refused URL reloads the page instead, as long as that works.
pub async fn load(url: String) -> Result<(), EffectError> {
	let location = web_sys::window().ok_or(EffectError::NoWindow)?.location();
	if let Err(error) = location.set_href(&url) {
		warn!("Failed to load {:?}, reloading instead: {:?}", url, error);
		return location.reload().map_err(js_error);
	}
	Ok(())
}

/// # Errors
///
/// Iff there's no window or the browser refuses.
pub async fn reload() -> Result<(), EffectError> {
	web_sys::window().ok_or(EffectError::NoWindow)?.location().reload().map_err(js_error)
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::{
		executor::{LocalPool, LocalSpawner},
		future,
		task::LocalSpawnExt,
	};
	use std::cell::RefCell;

	struct RecordingPort {
		log: RefCell<Vec<String>>,
		spawner: LocalSpawner,
	}
	impl Port<String> for RecordingPort {
		fn send(&self, message: String) {
			self.log.borrow_mut().push(format!("send {}", message))
		}

		fn sync(&self, message: String) {
			self.log.borrow_mut().push(format!("sync {}", message))
		}

		fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
			self.spawner.spawn_local(task).unwrap()
		}
	}

	fn port(pool: &LocalPool) -> (Rc<RecordingPort>, Rc<dyn Port<String>>) {
		let recording = Rc::new(RecordingPort {
			log: RefCell::default(),
			spawner: pool.spawner(),
		});
		let port: Rc<dyn Port<String>> = recording.clone();
		(recording, port)
	}

	#[test]
	fn none_does_nothing() {
		let mut pool = LocalPool::new();
		let (recording, port) = port(&pool);

		let effect = Effect::<String>::none();
		assert!(effect.is_none());
		effect.perform(&port);
		pool.run();

		assert!(recording.log.borrow().is_empty());
	}

	#[test]
	fn batch_performs_in_order() {
		let mut pool = LocalPool::new();
		let (recording, port) = port(&pool);

		Effect::batch(vec![Effect::send("a".to_owned()), Effect::none(), Effect::send("b".to_owned())]).perform(&port);
		pool.run();

		assert_eq!(*recording.log.borrow(), vec!["send a".to_owned(), "send b".to_owned()]);
	}

	#[test]
	fn maps_compose() {
		let mut pool = LocalPool::new();
		let (recording, port) = port(&pool);

		Effect::send(1).map(|n: i32| n + 1).map(|n: i32| format!("<{}>", n)).perform(&port);
		pool.run();

		assert_eq!(*recording.log.borrow(), vec!["send <2>".to_owned()]);
	}

	#[test]
	fn mapped_none_stays_none() {
		assert!(Effect::<i32>::none().map(|n: i32| n.to_string()).is_none());
	}

	#[test]
	fn task_reports_both_outcomes() {
		let mut pool = LocalPool::new();
		let (recording, port) = port(&pool);

		Effect::batch(vec![
			Effect::task(future::ready(Ok::<_, String>(3)), |n: i32| Some(format!("ok {}", n)), |e: String| Some(format!("err {}", e))),
			Effect::task(future::ready(Err::<i32, _>("x".to_owned())), |n: i32| Some(format!("ok {}", n)), |e: String| Some(format!("err {}", e))),
			Effect::task(future::ready(Ok::<_, String>(4)), |_: i32| None, |_: String| None),
		])
		.perform(&port);
		assert!(recording.log.borrow().is_empty(), "Tasks must not complete synchronously.");
		pool.run();

		assert_eq!(*recording.log.borrow(), vec!["send ok 3".to_owned(), "send err x".to_owned()]);
	}

	#[test]
	fn attempt_drops_failures() {
		let mut pool = LocalPool::new();
		let (recording, port) = port(&pool);

		Effect::attempt(future::ready(Err::<(), _>(EffectError::MissingTarget("cell".to_owned()))), |()| Some("focused".to_owned())).perform(&port);
		pool.run();

		assert!(recording.log.borrow().is_empty());
	}
}

//! Element settings ("facts"): organizing them into a [`FactTable`] and diffing two tables.

use crate::event::{Decoded, DecodeError, EventHandler, EventPhase, Tagger};
use hashbrown::HashMap;
use wasm_bindgen::JsValue;

/// A property value. Plain data, so it can be compared.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	String(String),
}
impl Value {
	pub(crate) fn to_js(&self) -> JsValue {
		match self {
			Value::Null => JsValue::NULL,
			Value::Bool(value) => JsValue::from_bool(*value),
			Value::Number(value) => JsValue::from_f64(*value),
			Value::String(value) => JsValue::from_str(value),
		}
	}

	fn to_class(&self) -> String {
		match self {
			Value::Null => "null".to_owned(),
			Value::Bool(value) => value.to_string(),
			Value::Number(value) => value.to_string(),
			Value::String(value) => value.clone(),
		}
	}
}
impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::String(value.to_owned())
	}
}
impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}
impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}
impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Number(value)
	}
}
impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Self::Number(value.into())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Namespaced<T> {
	pub namespace: String,
	pub value: T,
}

/// One raw element setting, as written in a view.
#[derive(Debug, Clone)]
pub enum Setting {
	Style { key: String, value: String },
	Event(EventHandler),
	Property { key: String, value: Value },
	/// `None` means "absent". Rendering it removes the attribute.
	Attribute { key: String, value: Option<String> },
	AttributeNs { namespace: String, key: String, value: Option<String> },
}
impl Setting {
	/// Routes an event setting's messages through `tagger`. Other settings are returned unchanged.
	#[must_use]
	pub fn map(self, tagger: Tagger) -> Self {
		match self {
			Setting::Event(handler) => Setting::Event(handler.map(tagger)),
			other => other,
		}
	}
}

pub fn style(key: impl Into<String>, value: impl Into<String>) -> Setting {
	Setting::Style { key: key.into(), value: value.into() }
}

pub fn property(key: impl Into<String>, value: impl Into<Value>) -> Setting {
	Setting::Property { key: key.into(), value: value.into() }
}

pub fn attribute(key: impl Into<String>, value: impl Into<String>) -> Setting {
	Setting::Attribute {
		key: key.into(),
		value: Some(value.into()),
	}
}

pub fn attribute_ns(namespace: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Setting {
	Setting::AttributeNs {
		namespace: namespace.into(),
		key: key.into(),
		value: Some(value.into()),
	}
}

/// A [`EventPhase::Normal`] event listener.
pub fn on(event_type: impl Into<String>, decoder: impl Fn(&web_sys::Event) -> Result<Decoded, DecodeError> + 'static) -> Setting {
	Setting::Event(EventHandler::new(event_type, EventPhase::Normal, decoder))
}

pub fn on_with_phase(event_type: impl Into<String>, phase: EventPhase, decoder: impl Fn(&web_sys::Event) -> Result<Decoded, DecodeError> + 'static) -> Setting {
	Setting::Event(EventHandler::new(event_type, phase, decoder))
}

/// Element settings grouped by category.
///
/// Within a category, later settings win, except for `class` attributes and `className` properties,
/// which are joined with a single space.
#[derive(Debug, Clone, Default)]
pub struct FactTable {
	pub(crate) styles: HashMap<String, String>,
	pub(crate) events: HashMap<String, EventHandler>,
	pub(crate) attributes: HashMap<String, Option<String>>,
	pub(crate) attributes_ns: HashMap<String, Namespaced<Option<String>>>,
	pub(crate) properties: HashMap<String, Value>,
}
fn join_classes(classes: Option<String>, value: Option<String>) -> Option<String> {
	match (classes, value) {
		(Some(classes), Some(value)) => Some(classes + " " + &value),
		(classes, value) => value.or(classes),
	}
}

impl FactTable {
	#[must_use]
	pub fn organize(settings: impl IntoIterator<Item = Setting>) -> Self {
		let mut table = Self::default();
		for setting in settings {
			match setting {
				Setting::Style { key, value } => {
					table.styles.insert(key, value);
				}
				Setting::Event(handler) => {
					table.events.insert(handler.event_type().to_owned(), handler);
				}
				Setting::Attribute { key, value } if key == "class" => {
					let value = join_classes(table.attributes.remove(&key).flatten(), value);
					table.attributes.insert(key, value);
				}
				Setting::Attribute { key, value } => {
					table.attributes.insert(key, value);
				}
				Setting::AttributeNs { namespace, key, value } if key == "class" => {
					let value = join_classes(table.attributes_ns.remove(&key).and_then(|classes| classes.value), value);
					table.attributes_ns.insert(key, Namespaced { namespace, value });
				}
				Setting::AttributeNs { namespace, key, value } => {
					table.attributes_ns.insert(key, Namespaced { namespace, value });
				}
				Setting::Property { key, value } if key == "className" => {
					let value = match table.properties.remove(&key) {
						Some(classes) => Value::String(classes.to_class() + " " + &value.to_class()),
						None => value,
					};
					table.properties.insert(key, value);
				}
				Setting::Property { key, value } => {
					table.properties.insert(key, value);
				}
			}
		}
		table
	}

	#[must_use]
	pub fn styles(&self) -> &HashMap<String, String> {
		&self.styles
	}

	#[must_use]
	pub fn events(&self) -> &HashMap<String, EventHandler> {
		&self.events
	}

	#[must_use]
	pub fn attributes(&self) -> &HashMap<String, Option<String>> {
		&self.attributes
	}

	#[must_use]
	pub fn attributes_ns(&self) -> &HashMap<String, Namespaced<Option<String>>> {
		&self.attributes_ns
	}

	#[must_use]
	pub fn properties(&self) -> &HashMap<String, Value> {
		&self.properties
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.styles.is_empty() && self.events.is_empty() && self.attributes.is_empty() && self.attributes_ns.is_empty() && self.properties.is_empty()
	}
}

/// Changed categories only. Removals are encoded as the category's neutral value:
///
/// - styles: `""`
/// - events, attributes: `None`
/// - namespaced attributes: the old namespace with `None`
/// - properties: `""` if the old value was a string, otherwise [`Value::Null`]
#[derive(Debug, Clone, Default)]
pub struct FactsDiff {
	pub styles: HashMap<String, String>,
	pub events: HashMap<String, Option<EventHandler>>,
	pub attributes: HashMap<String, Option<String>>,
	pub attributes_ns: HashMap<String, Namespaced<Option<String>>>,
	pub properties: HashMap<String, Value>,
}
impl FactsDiff {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.styles.is_empty() && self.events.is_empty() && self.attributes.is_empty() && self.attributes_ns.is_empty() && self.properties.is_empty()
	}
}

/// These are always re-applied, since the user may have edited the live value.
fn is_volatile(key: &str) -> bool {
	key == "value" || key == "checked"
}

fn diff_category<V, D>(
	x: &HashMap<String, V>,
	y: &HashMap<String, V>,
	out: &mut HashMap<String, D>,
	unchanged: impl Fn(&str, &V, &V) -> bool,
	removed: impl Fn(&V) -> D,
	added: impl Fn(&V) -> D,
) {
	for (key, x_value) in x {
		match y.get(key) {
			None => {
				out.insert(key.clone(), removed(x_value));
			}
			Some(y_value) if unchanged(key, x_value, y_value) => (),
			Some(y_value) => {
				out.insert(key.clone(), added(y_value));
			}
		}
	}
	for (key, y_value) in y {
		if !x.contains_key(key) {
			out.insert(key.clone(), added(y_value));
		}
	}
}

fn unchanged_eq<V: PartialEq>(key: &str, x: &V, y: &V) -> bool {
	x == y && !is_volatile(key)
}

/// Computes the changes that turn `x` into `y`, or [`None`] if there are none.
#[must_use]
pub fn diff_facts(x: &FactTable, y: &FactTable) -> Option<FactsDiff> {
	let mut diff = FactsDiff::default();

	diff_category(&x.styles, &y.styles, &mut diff.styles, unchanged_eq, |_| String::new(), Clone::clone);
	diff_category(&x.events, &y.events, &mut diff.events, |_, x, y| x.equal(y), |_| None, |handler| Some(handler.clone()));
	diff_category(&x.attributes, &y.attributes, &mut diff.attributes, unchanged_eq, |_| None, Clone::clone);
	diff_category(
		&x.attributes_ns,
		&y.attributes_ns,
		&mut diff.attributes_ns,
		unchanged_eq,
		|old| Namespaced {
			namespace: old.namespace.clone(),
			value: None,
		},
		Clone::clone,
	);
	diff_category(
		&x.properties,
		&y.properties,
		&mut diff.properties,
		unchanged_eq,
		|old| match old {
			Value::String(_) => Value::String(String::new()),
			_ => Value::Null,
		},
		Clone::clone,
	);

	if diff.is_empty() {
		None
	} else {
		Some(diff)
	}
}

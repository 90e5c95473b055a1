//! Convenience constructors for common [`Setting`]s, and sanitizers for untrusted setting names and values.

use crate::facts::{self, Setting, Value};

pub use crate::facts::{attribute, attribute_ns, on, on_with_phase, property, style};

/// Sets the `className` property. Multiple `class_name` settings on one element are joined.
pub fn class_name(value: impl Into<String>) -> Setting {
	facts::property("className", value.into())
}

/// Sets `className` to the names whose flag is `true`.
pub fn class_list<'a>(classes: impl IntoIterator<Item = (&'a str, bool)>) -> Setting {
	let names: Vec<&str> = classes.into_iter().filter(|&(_, enabled)| enabled).map(|(name, _)| name).collect();
	class_name(names.join(" "))
}

pub fn id(value: impl Into<String>) -> Setting {
	facts::property("id", value.into())
}

pub fn title(value: impl Into<String>) -> Setting {
	facts::property("title", value.into())
}

pub fn href(value: impl Into<String>) -> Setting {
	facts::property("href", value.into())
}

pub fn src(value: impl Into<String>) -> Setting {
	facts::property("src", value.into())
}

pub fn alt(value: impl Into<String>) -> Setting {
	facts::property("alt", value.into())
}

pub fn placeholder(value: impl Into<String>) -> Setting {
	facts::property("placeholder", value.into())
}

pub fn name(value: impl Into<String>) -> Setting {
	facts::property("name", value.into())
}

pub fn r#type(value: impl Into<String>) -> Setting {
	facts::property("type", value.into())
}

pub fn r#for(value: impl Into<String>) -> Setting {
	facts::property("htmlFor", value.into())
}

/// The live value of a form control. Re-applied on every render in which it differs from the DOM.
pub fn value(value: impl Into<String>) -> Setting {
	facts::property("value", value.into())
}

pub fn default_value(value: impl Into<String>) -> Setting {
	facts::property("defaultValue", value.into())
}

pub fn text_content(value: impl Into<String>) -> Setting {
	facts::property("textContent", value.into())
}

pub fn tab_index(value: i32) -> Setting {
	facts::property("tabIndex", value)
}

/// The live checked state of a checkbox or radio button.
pub fn checked(value: bool) -> Setting {
	facts::property("checked", value)
}

/// A boolean attribute that's either present (empty) or absent.
pub fn toggle(key: impl Into<String>, present: bool) -> Setting {
	Setting::Attribute {
		key: key.into(),
		value: if present { Some(String::new()) } else { None },
	}
}

pub fn disabled(value: bool) -> Setting {
	toggle("disabled", value)
}

pub fn hidden(value: bool) -> Setting {
	toggle("hidden", value)
}

pub fn autofocus(value: bool) -> Setting {
	toggle("autofocus", value)
}

pub fn data(key: &str, value: impl Into<String>) -> Setting {
	facts::attribute(format!("data-{}", key), value)
}

pub fn aria(key: &str, value: impl Into<String>) -> Setting {
	facts::attribute(format!("aria-{}", key), value)
}

/// Replaces the tag name `script` with `p`, so that untrusted markup can't execute.
#[must_use]
pub fn no_script(local_name: &str) -> &str {
	if local_name.eq_ignore_ascii_case("script") {
		"p"
	} else {
		local_name
	}
}

/// Prefixes event-handler attributes (`on…`) and `formAction` with `data-`, neutralizing them.
#[must_use]
pub fn no_on_or_form_action(key: &str) -> String {
	if starts_with_ignore_ascii_case(key, "on") || key == "formAction" {
		format!("data-{}", key)
	} else {
		key.to_owned()
	}
}

/// Prefixes `innerHTML` and `formAction` property names with `data-`, neutralizing them.
#[must_use]
pub fn no_inner_html_or_form_action(key: &str) -> String {
	if key == "innerHTML" || key == "formAction" {
		format!("data-{}", key)
	} else {
		key.to_owned()
	}
}

fn starts_with_ignore_ascii_case(value: &str, prefix: &str) -> bool {
	value.len() >= prefix.len() && value.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Whether `value`, ignoring leading whitespace and embedded control characters, starts with `scheme:`.
fn has_scheme(value: &str, scheme: &str) -> bool {
	let mut normalized = value.chars().skip_while(|c| c.is_whitespace()).filter(|c| !c.is_control() && !c.is_whitespace());
	scheme.chars().all(|expected| normalized.next().map_or(false, |c| c.eq_ignore_ascii_case(&expected))) && normalized.next() == Some(':')
}

/// Blanks `javascript:` URIs.
#[must_use]
pub fn no_javascript_uri(value: &str) -> &str {
	if has_scheme(value, "javascript") {
		""
	} else {
		value
	}
}

/// Blanks `javascript:` URIs and `data:text/html` URIs.
#[must_use]
pub fn no_javascript_or_html_uri(value: &str) -> &str {
	if has_scheme(value, "javascript") || (has_scheme(value, "data") && is_html_data_uri(value)) {
		""
	} else {
		value
	}
}

fn is_html_data_uri(value: &str) -> bool {
	let value = value.trim_start();
	value.len() >= "data:text/html".len() && value.as_bytes()[.."data:text/html".len()].eq_ignore_ascii_case(b"data:text/html")
}

/// Applies the sanitizers that fit `setting`'s category.
#[must_use]
pub fn sanitize(setting: Setting) -> Setting {
	match setting {
		Setting::Attribute { key, value } => {
			let key = no_on_or_form_action(&key);
			let value = value.map(|value| no_javascript_or_html_uri(&value).to_owned());
			Setting::Attribute { key, value }
		}
		Setting::AttributeNs { namespace, key, value } => {
			let key = no_on_or_form_action(&key);
			let value = value.map(|value| no_javascript_or_html_uri(&value).to_owned());
			Setting::AttributeNs { namespace, key, value }
		}
		Setting::Property { key, value } => {
			let key = no_inner_html_or_form_action(&key);
			let value = match value {
				Value::String(value) => Value::String(no_javascript_or_html_uri(&value).to_owned()),
				other => other,
			};
			Setting::Property { key, value }
		}
		other => other,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scripts_become_paragraphs() {
		assert_eq!(no_script("script"), "p");
		assert_eq!(no_script("SCRIPT"), "p");
		assert_eq!(no_script("div"), "div");
	}

	#[test]
	fn handlers_are_neutralized() {
		assert_eq!(no_on_or_form_action("onclick"), "data-onclick");
		assert_eq!(no_on_or_form_action("ONload"), "data-ONload");
		assert_eq!(no_on_or_form_action("formAction"), "data-formAction");
		assert_eq!(no_on_or_form_action("title"), "title");
		assert_eq!(no_inner_html_or_form_action("innerHTML"), "data-innerHTML");
		assert_eq!(no_inner_html_or_form_action("outerHTML"), "outerHTML");
	}

	#[test]
	fn uris() {
		assert_eq!(no_javascript_uri("javascript:alert(1)"), "");
		assert_eq!(no_javascript_uri("  JavaScript:alert(1)"), "");
		assert_eq!(no_javascript_uri("java\tscript:alert(1)"), "");
		assert_eq!(no_javascript_uri("https://example.com/"), "https://example.com/");
		assert_eq!(no_javascript_uri("javascript"), "javascript");
		assert_eq!(no_javascript_or_html_uri("data:text/html,<b>hi</b>"), "");
		assert_eq!(no_javascript_or_html_uri("data:image/png;base64,AAAA"), "data:image/png;base64,AAAA");
	}

	#[test]
	fn sanitize_attribute() {
		match sanitize(facts::attribute("onclick", "javascript:void(0)")) {
			Setting::Attribute { key, value } => {
				assert_eq!(key, "data-onclick");
				assert_eq!(value.as_deref(), Some(""));
			}
			other => panic!("Unexpected setting: {:?}", other),
		}
	}

	#[test]
	fn class_list_joins_enabled() {
		match class_list(vec![("a", true), ("b", false), ("c", true)]) {
			Setting::Property { key, value } => {
				assert_eq!(key, "className");
				assert_eq!(value, Value::String("a c".to_owned()));
			}
			other => panic!("Unexpected setting: {:?}", other),
		}
	}
}

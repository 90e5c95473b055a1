use reflex_dom::{
	attribute::{self, class_name},
	facts::{self, diff_facts, Namespaced},
	Decoded, FactTable, Setting, Value,
};

const SVG: &str = "http://www.w3.org/2000/svg";

#[test]
fn classes_are_joined() {
	let table = FactTable::organize(vec![facts::attribute("class", "a"), facts::attribute("title", "x"), facts::attribute("class", "b")]);
	assert_eq!(table.attributes().get("class"), Some(&Some("a b".to_owned())));

	let table = FactTable::organize(vec![class_name("a"), class_name("b"), facts::property("className", 1)]);
	assert_eq!(table.properties().get("className"), Some(&Value::String("a b 1".to_owned())));
}

#[test]
fn namespaced_classes_are_joined() {
	let table = FactTable::organize(vec![facts::attribute_ns(SVG, "class", "a"), facts::attribute_ns(SVG, "class", "b")]);
	assert_eq!(
		table.attributes_ns().get("class"),
		Some(&Namespaced {
			namespace: SVG.to_owned(),
			value: Some("a b".to_owned()),
		})
	);
	assert_eq!(table.attributes().get("class"), None);
}

#[test]
fn later_settings_win() {
	let table = FactTable::organize(vec![facts::attribute("title", "a"), facts::attribute("title", "b"), facts::style("color", "red"), facts::style("color", "blue")]);
	assert_eq!(table.attributes().get("title"), Some(&Some("b".to_owned())));
	assert_eq!(table.styles().get("color").map(String::as_str), Some("blue"));
}

#[test]
fn absent_class_keeps_earlier_classes() {
	let table = FactTable::organize(vec![facts::attribute("class", "a"), attribute::toggle("class", false)]);
	assert_eq!(table.attributes().get("class"), Some(&Some("a".to_owned())));
}

#[test]
fn equal_tables_have_no_diff() {
	let settings = || vec![facts::style("color", "red"), facts::attribute("title", "t"), facts::property("id", "main"), facts::attribute_ns(SVG, "href", "#a")];
	assert!(diff_facts(&FactTable::organize(settings()), &FactTable::organize(settings())).is_none());
}

#[test]
fn removals_use_neutral_values() {
	let x = FactTable::organize(vec![
		facts::style("color", "red"),
		facts::attribute("title", "t"),
		facts::attribute_ns(SVG, "href", "#a"),
		facts::property("id", "main"),
		facts::property("tabIndex", 3),
	]);
	let diff = diff_facts(&x, &FactTable::default()).unwrap();

	assert_eq!(diff.styles.get("color").map(String::as_str), Some(""));
	assert_eq!(diff.attributes.get("title"), Some(&None));
	assert_eq!(
		diff.attributes_ns.get("href"),
		Some(&Namespaced {
			namespace: SVG.to_owned(),
			value: None,
		})
	);
	assert_eq!(diff.properties.get("id"), Some(&Value::String(String::new())));
	assert_eq!(diff.properties.get("tabIndex"), Some(&Value::Null));
}

#[test]
fn additions_and_changes() {
	let x = FactTable::organize(vec![facts::attribute("title", "a"), facts::style("color", "red")]);
	let y = FactTable::organize(vec![facts::attribute("title", "b"), facts::style("color", "red"), facts::style("width", "1em")]);
	let diff = diff_facts(&x, &y).unwrap();

	assert_eq!(diff.attributes.get("title"), Some(&Some("b".to_owned())));
	assert_eq!(diff.styles.len(), 1);
	assert_eq!(diff.styles.get("width").map(String::as_str), Some("1em"));
	assert!(diff.properties.is_empty());
}

#[test]
fn live_values_always_count_as_changed() {
	let settings = || vec![attribute::value("typed"), attribute::checked(true), attribute::id("x")];
	let diff = diff_facts(&FactTable::organize(settings()), &FactTable::organize(settings())).unwrap();

	assert_eq!(diff.properties.len(), 2);
	assert_eq!(diff.properties.get("value"), Some(&Value::String("typed".to_owned())));
	assert_eq!(diff.properties.get("checked"), Some(&Value::Bool(true)));
}

#[test]
fn events_compare_by_identity() {
	let click = facts::on("click", |_| Ok(Decoded::new(())));
	let x = FactTable::organize(vec![click.clone()]);

	assert!(diff_facts(&x, &FactTable::organize(vec![click])).is_none());

	let diff = diff_facts(&x, &FactTable::organize(vec![facts::on("click", |_| Ok(Decoded::new(())))])).unwrap();
	assert!(matches!(diff.events.get("click"), Some(Some(_))));

	let diff = diff_facts(&x, &FactTable::default()).unwrap();
	assert!(matches!(diff.events.get("click"), Some(None)));
}

#[test]
fn mapped_events_differ_from_unmapped() {
	let click = facts::on("click", |_| Ok(Decoded::new(1)));
	let tagger = reflex_dom::Tagger::new(|n: i32| n + 1);

	let x = FactTable::organize(vec![click.clone().map(tagger.clone())]);
	assert!(diff_facts(&x, &FactTable::organize(vec![click.clone().map(tagger)])).is_none());
	assert!(diff_facts(&x, &FactTable::organize(vec![click])).is_some());
}

#[test]
fn sanitized_settings_are_organized_like_any_other() {
	let table = FactTable::organize(vec![attribute::sanitize(facts::attribute("onclick", "alert(1)"))]);
	assert!(table.attributes().get("onclick").is_none());
	assert!(table.attributes().contains_key("data-onclick"));
	assert!(!matches!(attribute::sanitize(facts::style("color", "red")), Setting::Attribute { .. }));
}

//! # Serialization Tests
//!
//! JSON encoding and decoding of record trees through the public API:
//! class tags, trusted subtype resolution, strict mode, unused-key
//! warnings (captured from the `tracing` output) and property-based
//! round-trip checks.

use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;

use propkit_schema::{
    deserialize, Collection, DeserializeOptions, DeserializeWarning, EngineConfig, Float, Instance, Integer, Property,
    PropertyError, Record, RecordType, SchemaBuilder, SerializeOptions, Text, TypeRegistry, Union, Value,
};

// ─── Helpers ────────────────────────────────────────────────────────

/// In-memory log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut sink) = self.0.lock() {
            sink.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a subscriber writing plain text into a fresh buffer.
fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let sink = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, sink.contents())
}

struct Shapes {
    registry: TypeRegistry,
    shape: Rc<RecordType>,
    square: Rc<RecordType>,
    drawing: Rc<RecordType>,
}

fn shapes_with(registry: TypeRegistry) -> Shapes {
    let shape = SchemaBuilder::new("Shape")
        .property("label", Property::new("", Text::new()).optional())
        .build(&registry)
        .unwrap();
    let square = SchemaBuilder::new("Square")
        .extends(&shape)
        .property("side", Property::new("", Float::new().min(0.0)).default(1.0))
        .build(&registry)
        .unwrap();
    let drawing = SchemaBuilder::new("Drawing")
        .property("title", Property::new("", Text::new()))
        .property("main", Property::new("", Instance::new("Shape")).optional())
        .property(
            "layers",
            Property::new("", Collection::list_of(Instance::new("Shape"))).default(Value::List(Vec::new())),
        )
        .build(&registry)
        .unwrap();
    Shapes {
        registry,
        shape,
        square,
        drawing,
    }
}

fn shapes() -> Shapes {
    shapes_with(TypeRegistry::new())
}

fn trusted() -> DeserializeOptions {
    DeserializeOptions {
        trusted: true,
        ..Default::default()
    }
}

// ─── Encoding ───────────────────────────────────────────────────────

#[test]
fn nested_records_encode_inline_with_class_tags() {
    let s = shapes();
    let square = Record::with(&s.square, [("label", Value::from("sq")), ("side", Value::Float(2.5))]).unwrap();
    let drawing = Record::with(&s.drawing, [("title", Value::from("plan")), ("main", Value::from(&square))]).unwrap();

    let data = drawing.serialize(SerializeOptions::default()).unwrap();
    assert_eq!(
        data,
        json!({
            "__class__": "Drawing",
            "title": "plan",
            "main": {"__class__": "Square", "label": "sq", "side": 2.5},
            "layers": []
        })
    );

    let bare = drawing.serialize(SerializeOptions { include_class: false }).unwrap();
    assert!(bare.get("__class__").is_none());
    assert!(bare["main"].get("__class__").is_none());
}

#[test]
fn cycles_are_refused_without_a_uid_registry() {
    let registry = TypeRegistry::new();
    let node = SchemaBuilder::new("Link")
        .property("next", Property::new("", Instance::new("Link")).optional())
        .build(&registry)
        .unwrap();
    let a = Record::new(&node).unwrap();
    let b = Record::with(&node, [("next", &a)]).unwrap();
    a.set("next", &b).unwrap();

    let err = a.serialize(SerializeOptions::default()).unwrap_err();
    assert!(matches!(err, PropertyError::SelfReference { ref type_name } if type_name == "Link"));
}

// ─── Decoding ───────────────────────────────────────────────────────

#[test]
fn trusted_decoding_restores_subtypes() {
    let s = shapes();
    let square = Record::with(&s.square, [("side", 3.0)]).unwrap();
    let drawing = Record::with(
        &s.drawing,
        [("title", Value::from("t")), ("layers", Value::list([Value::from(&square)]))],
    )
    .unwrap();
    let data = drawing.serialize(SerializeOptions::default()).unwrap();

    let decoded = deserialize(&s.drawing, &data, &s.registry, trusted()).unwrap();
    assert!(decoded.warnings.is_empty());
    let layers = decoded.record.get("layers").unwrap().unwrap();
    let layer = layers.as_slice().unwrap()[0].as_record().unwrap().clone();
    assert_eq!(layer.type_name(), "Square");
    assert!(decoded.record.equal(&drawing));
}

#[test]
fn untrusted_decoding_keeps_the_declared_type_and_warns() {
    let s = shapes();
    let data = json!({
        "title": "t",
        "main": {"__class__": "Square", "label": "x", "side": 4.0}
    });

    let decoded = deserialize(&s.drawing, &data, &s.registry, DeserializeOptions::default()).unwrap();
    let main = decoded.record.get("main").unwrap().unwrap();
    let main = main.as_record().unwrap();
    assert!(Rc::ptr_eq(main.record_type(), &s.shape));
    assert_eq!(main.get("label").unwrap(), Some(Value::from("x")));
    assert_eq!(
        decoded.warnings,
        vec![DeserializeWarning::UnusedKeys {
            type_name: "Shape".into(),
            keys: vec!["side".into()],
        }]
    );
}

#[test]
fn unused_keys_are_logged() {
    let s = shapes();
    let data = json!({"title": "t", "colour": "blue"});

    let (decoded, logs) = capture_logs(|| deserialize(&s.drawing, &data, &s.registry, DeserializeOptions::default()));
    let decoded = decoded.unwrap();
    assert_eq!(decoded.warnings.len(), 1);
    assert!(logs.contains("unused properties while deserializing"), "logs: {logs}");
    assert!(logs.contains("colour"), "logs: {logs}");
    assert!(logs.contains("WARN"), "logs: {logs}");
}

#[test]
fn unused_key_logging_follows_config() {
    let config = EngineConfig {
        warn_unused_keys: false,
        ..EngineConfig::default()
    };
    let s = shapes_with(TypeRegistry::with_config(config));
    let data = json!({"title": "t", "colour": "blue"});

    let (decoded, logs) = capture_logs(|| deserialize(&s.drawing, &data, &s.registry, DeserializeOptions::default()));
    let decoded = decoded.unwrap();
    assert_eq!(decoded.warnings.len(), 1, "the warning is still returned");
    assert!(!logs.contains("unused properties"), "logs: {logs}");
}

#[test]
fn strict_mode_turns_warnings_into_errors() {
    let s = shapes();
    let strict = DeserializeOptions {
        strict: true,
        trusted: true,
        ..Default::default()
    };

    let err = deserialize(&s.drawing, &json!({"title": "t", "colour": "blue"}), &s.registry, strict).unwrap_err();
    assert!(matches!(err, PropertyError::Deserialization(_)));

    let data = json!({"title": "t", "main": {"__class__": "Hexagon"}});
    let err = deserialize(&s.drawing, &data, &s.registry, strict).unwrap_err();
    assert!(err.to_string().contains("Hexagon"), "{err}");

    let lenient = deserialize(&s.drawing, &data, &s.registry, trusted()).unwrap();
    assert_eq!(
        lenient.warnings,
        vec![DeserializeWarning::UnknownClass {
            class_name: "Hexagon".into()
        }]
    );
}

#[test]
fn trusted_tag_must_name_a_subtype() {
    let s = shapes();
    let data = json!({"title": "t", "main": {"__class__": "Drawing", "title": "inner"}});
    let err = deserialize(&s.drawing, &data, &s.registry, trusted()).unwrap_err();
    assert!(err.to_string().contains("not a subtype"), "{err}");
}

#[test]
fn assert_valid_checks_the_decoded_tree() {
    let s = shapes();
    let data = json!({"main": {"label": "x"}});
    let options = DeserializeOptions {
        assert_valid: true,
        ..Default::default()
    };

    let err = deserialize(&s.drawing, &data, &s.registry, options).unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert_eq!(err.failures()[0].property, "title");

    let lax = deserialize(&s.drawing, &data, &s.registry, DeserializeOptions::default()).unwrap();
    assert!(lax.record.validate().is_err());
}

#[test]
fn invalid_values_in_input_fail_decoding() {
    let s = shapes();
    let data = json!({"title": "t", "main": {"__class__": "Square", "side": -1.0}});
    let err = deserialize(&s.drawing, &data, &s.registry, trusted()).unwrap_err();
    assert!(err.is_field_failure(), "{err:?}");
    assert_eq!(err.failures()[0].property, "side");
}

// ─── Unions ─────────────────────────────────────────────────────────

fn union_type(registry: &TypeRegistry, text_first: bool) -> Rc<RecordType> {
    let text = Property::new("", Text::new());
    let number = Property::new("", Integer::new().cast(true));
    let candidates = if text_first { vec![text, number] } else { vec![number, text] };
    let name = if text_first { "TextSetting" } else { "NumberSetting" };
    SchemaBuilder::new(name)
        .property("value", Property::new("", Union::new(candidates)).optional())
        .build(registry)
        .unwrap()
}

#[test]
fn union_rejects_values_no_candidate_accepts() {
    let registry = TypeRegistry::new();
    let ty = union_type(&registry, true);
    let record = Record::new(&ty).unwrap();
    let err = record.set("value", Value::list([1])).unwrap_err();
    let failure = &err.failures()[0];
    assert_eq!(failure.related.len(), 2);
}

proptest! {
    #[test]
    fn union_candidate_order_breaks_ties(n in 0_i64..1_000_000) {
        let registry = TypeRegistry::new();
        let text_first = Record::new(&union_type(&registry, true)).unwrap();
        let number_first = Record::new(&union_type(&registry, false)).unwrap();

        text_first.set("value", n.to_string()).unwrap();
        number_first.set("value", n.to_string()).unwrap();

        prop_assert_eq!(text_first.get("value").unwrap(), Some(Value::Str(n.to_string())));
        prop_assert_eq!(number_first.get("value").unwrap(), Some(Value::Int(n)));
        prop_assert_eq!(
            text_first.serialize(SerializeOptions { include_class: false }).unwrap(),
            json!({"value": n.to_string()})
        );
        prop_assert_eq!(
            number_first.serialize(SerializeOptions { include_class: false }).unwrap(),
            json!({"value": n})
        );
    }

    #[test]
    fn records_round_trip_through_json(
        title in "[a-z ]{0,12}",
        labels in proptest::collection::vec(proptest::option::of("[a-z]{1,6}"), 0..5),
        sides in proptest::collection::vec(0.0_f64..1.0e6, 0..5),
    ) {
        let s = shapes();
        let mut layers = Vec::new();
        for (i, side) in sides.iter().enumerate() {
            let square = Record::with(&s.square, [("side", *side)]).unwrap();
            if let Some(Some(label)) = labels.get(i) {
                square.set("label", label.as_str()).unwrap();
            }
            layers.push(Value::Record(square));
        }
        let drawing = Record::with(
            &s.drawing,
            [("title", Value::from(title.as_str())), ("layers", Value::List(layers))],
        )
        .unwrap();

        let data = drawing.serialize(SerializeOptions::default()).unwrap();
        let decoded = deserialize(&s.drawing, &data, &s.registry, trusted()).unwrap();
        prop_assert!(decoded.warnings.is_empty());
        prop_assert!(decoded.record.equal(&drawing));
        prop_assert_eq!(decoded.record.serialize(SerializeOptions::default()).unwrap(), data);
    }

    #[test]
    fn validation_is_idempotent(side in -10.0_f64..10.0, label in proptest::option::of("[a-z]{0,4}")) {
        let s = shapes();
        let square = Record::new(&s.square).unwrap();
        let _ = square.set("side", side);
        if let Some(label) = &label {
            square.set("label", label.as_str()).unwrap();
        }
        let before = square.values();
        let first = square.validate().is_ok();
        let second = square.validate().is_ok();
        prop_assert_eq!(first, second);
        prop_assert!(first, "stored values always satisfy their properties");
        prop_assert_eq!(square.values(), before);
    }
}

//! # Record Lifecycle Tests
//!
//! Exercises record types end to end through the public API: schema
//! definition, construction from keyword arguments, defaults, the three
//! notification phases, whole-object validation and error hooks.
//!
//! Every test builds its own [`TypeRegistry`] so type names never leak
//! between tests.

use std::cell::RefCell;
use std::rc::Rc;

use propkit_schema::{
    Collection, Color, Float, Instance, Integer, Listener, ListenerMode, Property, PropertyError, Reason, Record,
    RecordType, SchemaBuilder, SchemaDefinitionError, StringChoice, Text, TypeRegistry, Value,
};

fn invoice_type(registry: &TypeRegistry) -> Rc<RecordType> {
    SchemaBuilder::new("Invoice")
        .property("number", Property::new("Invoice number", Integer::new().min(1)))
        .property("customer", Property::new("Customer name", Text::new().trim()))
        .property(
            "currency",
            Property::new("ISO currency", StringChoice::new(["EUR", "USD"])).default("EUR"),
        )
        .property("total", Property::new("Amount due", Float::new().min(0.0)).default(0.0))
        .build(registry)
        .unwrap()
}

// ─── Construction ───────────────────────────────────────────────────

#[test]
fn construction_applies_keywords_over_defaults() {
    let registry = TypeRegistry::new();
    let ty = invoice_type(&registry);
    let invoice = Record::with(&ty, [("number", Value::Int(7)), ("customer", Value::from("  Acme "))]).unwrap();

    assert_eq!(invoice.get("number").unwrap(), Some(Value::Int(7)));
    assert_eq!(invoice.get("customer").unwrap(), Some(Value::from("Acme")));
    assert_eq!(invoice.get("currency").unwrap(), Some(Value::from("EUR")));
    assert_eq!(invoice.get("total").unwrap(), Some(Value::Float(0.0)));
    invoice.validate().unwrap();
}

#[test]
fn construction_reports_every_bad_keyword_together() {
    let registry = TypeRegistry::new();
    let ty = invoice_type(&registry);
    let err = Record::with(
        &ty,
        [
            ("number", Value::Int(0)),
            ("currency", Value::from("GBP")),
            ("total", Value::from("lots")),
        ],
    )
    .unwrap_err();

    let PropertyError::Validation(agg) = &err else {
        panic!("expected an aggregate, got {err:?}");
    };
    assert_eq!(agg.len(), 3);
    assert_eq!(agg.for_property("number").count(), 1);
    assert_eq!(agg.for_property("currency").count(), 1);
    assert_eq!(agg.for_property("total").count(), 1);
    assert!(agg.failures().iter().all(|f| f.reason == Reason::Invalid));
    assert!(agg.failures().iter().all(|f| f.type_name() == Some("Invoice")));
}

#[test]
fn unknown_keywords_fail_before_anything_is_built() {
    let registry = TypeRegistry::new();
    let ty = invoice_type(&registry);
    let err = Record::with(&ty, [("number", Value::Int(1)), ("colour", Value::from("red"))]).unwrap_err();
    match err {
        PropertyError::UnknownKeyword { type_name, keys } => {
            assert_eq!(type_name, "Invoice");
            assert_eq!(keys, vec!["colour".to_string()]);
        }
        other => panic!("expected UnknownKeyword, got {other:?}"),
    }
}

// ─── Validation ─────────────────────────────────────────────────────

#[test]
fn validate_lists_every_missing_required_property() {
    let registry = TypeRegistry::new();
    let ty = invoice_type(&registry);
    let invoice = Record::new(&ty).unwrap();

    let err = invoice.validate().unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.is_missing()));
    let mut names: Vec<&str> = failures.iter().map(|f| f.property.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["customer", "number"]);
    assert!(failures[0].message.contains("Invoice"));
}

#[test]
fn validate_checks_nested_records() {
    let registry = TypeRegistry::new();
    invoice_type(&registry);
    let ledger = SchemaBuilder::new("Ledger")
        .property(
            "entries",
            Property::new("", Collection::list_of(Instance::new("Invoice"))).default(Value::List(Vec::new())),
        )
        .build(&registry)
        .unwrap();

    let entry = Value::map([("number", Value::Int(3))]);
    let ledger = Record::with(&ledger, [("entries", Value::list([entry]))]).unwrap();
    let err = ledger.validate().unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].property, "customer");
    assert_eq!(failures[0].type_name(), Some("Invoice"));
}

#[test]
fn class_validators_run_after_property_checks() {
    let registry = TypeRegistry::new();
    let range = SchemaBuilder::new("Range")
        .property("low", Property::new("", Integer::new()))
        .property("high", Property::new("", Integer::new()))
        .class_validator(|record| {
            let low = record.get("low")?.and_then(|v| v.as_i64());
            let high = record.get("high")?.and_then(|v| v.as_i64());
            match (low, high) {
                (Some(low), Some(high)) if low > high => Err(propkit_schema::FieldError::invalid(
                    "high",
                    Some(record.owner()),
                    "high must not be below low",
                )
                .into()),
                _ => Ok(()),
            }
        })
        .build(&registry)
        .unwrap();

    let ok = Record::with(&range, [("low", 1), ("high", 2)]).unwrap();
    ok.validate().unwrap();

    let bad = Record::with(&range, [("low", 5), ("high", 2)]).unwrap();
    let err = bad.validate().unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert_eq!(err.failures()[0].message, "high must not be below low");

    let partial = Record::with(&range, [("low", 5)]).unwrap();
    let err = partial.validate().unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert!(err.failures()[0].is_missing());
}

#[derive(Debug, thiserror::Error)]
#[error("shipment rejected: {0}")]
struct ShipmentRejected(String);

#[test]
fn error_hook_translates_failures() {
    let registry = TypeRegistry::new();
    let ty = SchemaBuilder::new("Shipment")
        .property("weight", Property::new("", Float::new().min(0.0)))
        .property("carrier", Property::new("", Text::new()))
        .error_hook(|_, failures| {
            let names: Vec<String> = failures.iter().map(|f| f.property.clone()).collect();
            PropertyError::hook(failures, ShipmentRejected(names.join(",")))
        })
        .build(&registry)
        .unwrap();

    let err = Record::with(&ty, [("weight", Value::Float(-1.0)), ("carrier", Value::Int(4))]).unwrap_err();
    assert_eq!(err.to_string(), "shipment rejected: weight,carrier");
    assert_eq!(err.failures().len(), 2);

    let record = Record::new(&ty).unwrap();
    let err = record.validate().unwrap_err();
    assert!(matches!(err, PropertyError::Hook { .. }));
    assert_eq!(err.failures().len(), 2);
}

// ─── Defaults ───────────────────────────────────────────────────────

#[test]
fn subtype_overrides_inherited_default() {
    let registry = TypeRegistry::new();
    let base = invoice_type(&registry);
    let domestic = SchemaBuilder::new("DomesticInvoice")
        .extends(&base)
        .default("currency", "USD")
        .build(&registry)
        .unwrap();

    let record = Record::with(&domestic, [("number", Value::Int(1)), ("customer", Value::from("x"))]).unwrap();
    assert_eq!(record.get("currency").unwrap(), Some(Value::from("USD")));
    assert!(domestic.is_a(&base));
    assert!(!base.is_a(&domestic));

    let err = SchemaBuilder::new("BadInvoice")
        .extends(&base)
        .default("currency", "GBP")
        .build(&registry)
        .unwrap_err();
    assert!(matches!(err, SchemaDefinitionError::InvalidDefault { .. }));
}

#[test]
fn generator_defaults_are_fresh_per_instance_and_on_reset() {
    let registry = TypeRegistry::new();
    let counter = Rc::new(RefCell::new(0_i64));
    let source = Rc::clone(&counter);
    let ty = SchemaBuilder::new("Ticket")
        .property(
            "serial",
            Property::new("", Integer::new()).default_with(move || {
                *source.borrow_mut() += 1;
                Value::Int(*source.borrow())
            }),
        )
        .build(&registry)
        .unwrap();

    let first = Record::new(&ty).unwrap();
    let second = Record::new(&ty).unwrap();
    assert_ne!(first.get("serial").unwrap(), second.get("serial").unwrap());

    let before = first.get("serial").unwrap();
    first.reset("serial").unwrap();
    assert_ne!(first.get("serial").unwrap(), before);
}

#[test]
fn unset_leaves_the_property_empty() {
    let registry = TypeRegistry::new();
    let ty = invoice_type(&registry);
    let invoice = Record::with(&ty, [("number", Value::Int(1)), ("customer", Value::from("x"))]).unwrap();
    invoice.unset("currency").unwrap();
    assert_eq!(invoice.get("currency").unwrap(), None);
    assert!(!invoice.contains("currency"));
    invoice.reset("currency").unwrap();
    assert_eq!(invoice.get("currency").unwrap(), Some(Value::from("EUR")));
}

#[test]
fn read_only_properties_reject_writes() {
    let registry = TypeRegistry::new();
    let ty = SchemaBuilder::new("Frozen")
        .property("kind", Property::new("", Text::new()).default("fixed").read_only())
        .build(&registry)
        .unwrap();
    let record = Record::new(&ty).unwrap();
    assert_eq!(record.get("kind").unwrap(), Some(Value::from("fixed")));
    assert!(matches!(record.set("kind", "other"), Err(PropertyError::ReadOnly { .. })));
    assert!(matches!(record.reset("kind"), Err(PropertyError::ReadOnly { .. })));
}

// ─── Notification ───────────────────────────────────────────────────

#[test]
fn phases_run_in_order_and_see_the_final_value() {
    let registry = TypeRegistry::new();
    let log: Rc<RefCell<Vec<String>>> = Rc::default();
    let (a, b, c) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
    let ty = SchemaBuilder::new("Thermostat")
        .property("target", Property::new("", Integer::new()).default(20))
        .validator("target", move |_, change| {
            a.borrow_mut().push("validate".into());
            if let Some(Value::Int(t)) = change.value {
                change.value = Some(Value::Int(t.clamp(5, 30)));
            }
            Ok(())
        })
        .observer("target", move |_, change| {
            b.borrow_mut().push(format!("change {:?}", change.value));
            Ok(())
        })
        .observe_set("target", move |_, change| {
            c.borrow_mut().push(format!("set {:?}", change.value));
            Ok(())
        })
        .build(&registry)
        .unwrap();

    let record = Record::new(&ty).unwrap();
    assert!(log.borrow().is_empty(), "construction defaults are silent");

    record.set("target", 99).unwrap();
    assert_eq!(record.get("target").unwrap(), Some(Value::Int(30)));
    assert_eq!(
        *log.borrow(),
        ["validate", "change Some(Int(30))", "set Some(Int(30))"]
    );

    log.borrow_mut().clear();
    record.set("target", 30).unwrap();
    assert_eq!(*log.borrow(), ["validate", "set Some(Int(30))"]);

    log.borrow_mut().clear();
    record.set_silent("target", 10).unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn instance_listeners_follow_type_listeners() {
    let registry = TypeRegistry::new();
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    let from_type = Rc::clone(&log);
    let ty = SchemaBuilder::new("Lamp")
        .property("on", Property::new("", propkit_schema::Boolean::new()).default(false))
        .observer("on", move |_, _| {
            from_type.borrow_mut().push("type");
            Ok(())
        })
        .build(&registry)
        .unwrap();

    let lamp = Record::new(&ty).unwrap();
    let from_instance = Rc::clone(&log);
    lamp.observe(Listener::new("on", ListenerMode::ObserveChange, move |_, _| {
        from_instance.borrow_mut().push("instance");
        Ok(())
    }))
    .unwrap();

    let other = Record::new(&ty).unwrap();
    lamp.set("on", true).unwrap();
    other.set("on", true).unwrap();
    assert_eq!(*log.borrow(), ["type", "instance", "type"]);
}

#[test]
fn failing_validator_leaves_the_old_value() {
    let registry = TypeRegistry::new();
    let ty = SchemaBuilder::new("Gate")
        .property("code", Property::new("", Text::new()).default("open"))
        .validator("code", |record, change| match &change.value {
            Some(Value::Str(s)) if s.is_empty() => {
                Err(propkit_schema::FieldError::invalid("code", Some(record.owner()), "code is empty").into())
            }
            _ => Ok(()),
        })
        .build(&registry)
        .unwrap();

    let gate = Record::new(&ty).unwrap();
    let err = gate.set("code", "").unwrap_err();
    assert!(matches!(err, PropertyError::InvalidValue(_)));
    assert_eq!(gate.get("code").unwrap(), Some(Value::from("open")));
}

// ─── Kinds ──────────────────────────────────────────────────────────

#[test]
fn colors_normalize_to_rgb_tuples() {
    let registry = TypeRegistry::new();
    let ty = SchemaBuilder::new("Swatch")
        .property("color", Property::new("", Color::new()).optional())
        .build(&registry)
        .unwrap();
    let swatch = Record::new(&ty).unwrap();
    let red = Value::tuple([255, 0, 0]);

    for input in [Value::from("red"), Value::from("#FF0000"), Value::from("#f00"), Value::tuple([255, 0, 0])] {
        swatch.set("color", input).unwrap();
        assert_eq!(swatch.get("color").unwrap(), Some(red.clone()));
    }
    assert!(swatch.set("color", Value::tuple([256, 0, 0])).is_err());
    assert!(swatch.set("color", Value::tuple([1, 2])).is_err());
    assert!(swatch.set("color", "not-a-color").is_err());

    swatch.set("color", "random").unwrap();
    let channels = swatch.get("color").unwrap().unwrap();
    assert_eq!(channels.as_slice().map(<[Value]>::len), Some(3));
}

#[test]
fn collection_length_bounds_are_enforced() {
    let registry = TypeRegistry::new();
    let ty = SchemaBuilder::new("Team")
        .property(
            "members",
            Property::new("", Collection::list_of(Text::new()).min_length(1).max_length(3)).optional(),
        )
        .build(&registry)
        .unwrap();
    let team = Record::new(&ty).unwrap();

    team.set("members", Value::list(["a"])).unwrap();
    team.set("members", Value::list(["a", "b", "c"])).unwrap();

    let err = team.set("members", Value::list(Vec::<Value>::new())).unwrap_err();
    assert!(err.to_string().contains("0 items"));
    assert!(team.set("members", Value::list(["a", "b", "c", "d"])).is_err());
    assert!(team.set("members", Value::list([Value::from("a"), Value::Int(1)])).is_err());
    assert_eq!(team.get("members").unwrap(), Some(Value::list(["a", "b", "c"])));
}

#[test]
fn structural_equality_ignores_identity() {
    let registry = TypeRegistry::new();
    let ty = invoice_type(&registry);
    let kwargs = || [("number", Value::Int(4)), ("customer", Value::from("x"))];
    let a = Record::with(&ty, kwargs()).unwrap();
    let b = Record::with(&ty, kwargs()).unwrap();
    assert_ne!(a, b);
    assert!(a.equal(&b));
    b.set("total", 1.5).unwrap();
    assert!(!a.equal(&b));
}

#[test]
fn nan_totals_validate_and_huge_numbers_are_refused() {
    let registry = TypeRegistry::new();
    let ty = invoice_type(&registry);
    let invoice = Record::with(&ty, [("number", Value::Int(9)), ("customer", Value::from("x"))]).unwrap();

    invoice.set("total", f64::NAN).unwrap();
    invoice.validate().unwrap();
    invoice.validate().unwrap();

    for huge in [1e20, -1e20, f64::INFINITY] {
        assert!(invoice.set("number", huge).is_err(), "{huge}");
    }
    assert_eq!(invoice.get("number").unwrap(), Some(Value::Int(9)));
}

#[test]
fn observed_list_on_an_unset_field_stores_the_first_push() {
    let registry = TypeRegistry::new();
    let ty = SchemaBuilder::new("Checklist")
        .property(
            "done",
            Property::new("", Collection::list_of(Integer::new()).observe_mutations(true)).optional(),
        )
        .build(&registry)
        .unwrap();
    let list = Record::new(&ty).unwrap();
    let mut done = list.observed::<Vec<Value>>("done").unwrap();
    done.push(3).unwrap();
    assert!(done.is_attached());
    assert_eq!(list.get("done").unwrap(), Some(Value::list([3])));
}

use std::sync::Arc;

use morph_api::{builtin, ErrorKind, Mapping, Metamorphosis, ModelDef, Record, Schema, Shape, TypeSet, Value};
use morph_engine::{Configuration, Engine, EngineConfig, SettingValue, Target};
use rstest::{fixture, rstest};

fn bootstrap(strict: bool) -> Engine {
    let engine = Engine::bootstrap(EngineConfig {
        strict_schemas: strict,
        ..EngineConfig::default()
    })
    .expect("engine");
    engine.registry().register_model(Arc::new(
        ModelDef::new("Person")
            .field("first", Shape::ty(builtin::STR))
            .field("last", Shape::ty(builtin::STR))
            .getter("full", |person, _| {
                let part = |name| person.get(name).and_then(|v| v.as_str().map(str::to_owned));
                Ok(Value::from(format!(
                    "{} {}",
                    part("first").unwrap_or_default(),
                    part("last").unwrap_or_default()
                )))
            })
            .setter("full", |person, _, value| {
                let full = value.as_str().unwrap_or_default().to_owned();
                let (first, last) = full.split_once(' ').unwrap_or((full.as_str(), ""));
                person.set("first", Value::from(first));
                person.set("last", Value::from(last));
                Ok(())
            }),
    ));
    engine
}

#[fixture]
fn engine() -> Engine {
    bootstrap(false)
}

fn orwell() -> Value {
    Value::from(Record::with_fields(
        "Person",
        [
            ("first", Value::from("George")),
            ("last", Value::from("Orwell")),
            ("nickname", Value::from("Eric")),
        ],
    ))
}

fn int_schema(keys: &[&str]) -> Schema {
    Schema::fields(keys.iter().map(|k| (*k, Shape::ty(builtin::INT))))
}

#[rstest]
fn destination_may_not_require_missing_keys(engine: Engine) {
    let value = Value::from(Mapping::new().with("a", 1));
    let declared = Shape::map(int_schema(&["a"]));
    let wider = Schema::fields([("a", Shape::ty(builtin::INT)), ("b", Shape::ty(builtin::STR))]);

    let err = engine
        .convert_from(&value, declared, wider, &Configuration::new())
        .unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::SchemasDontMatch { key, .. } if key == "b"),
        "{err}"
    );
}

#[rstest]
fn destination_may_drop_keys(engine: Engine) {
    let value = Value::from(Mapping::new().with("a", 1).with("b", 2));
    let out = engine
        .convert_from(&value, Shape::map(int_schema(&["a", "b"])), int_schema(&["a"]), &Configuration::new())
        .expect("convert");
    assert_eq!(out, Value::from(Mapping::new().with("a", 1)));
}

#[rstest]
fn best_effort_improvises_and_keeps_what_is_there(engine: Engine) {
    let value = Value::from(Mapping::new().with("a", 1).with("c", 3));
    let out = engine.convert(&value, int_schema(&["a", "b"])).expect("convert");
    assert_eq!(out, Value::from(Mapping::new().with("a", 1)));
}

#[test]
fn validated_mode_refuses_to_improvise() {
    let engine = bootstrap(true);
    let value = Value::from(Mapping::new().with("a", 1));

    let err = engine.convert(&value, int_schema(&["a"])).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::SchemaNotValid(_)), "{err}");

    let nested = Value::from(Mapping::new().with("a", vec![Value::from(1), Value::from(2)]));
    let from = Shape::map(Schema::fields([("a", Shape::list_of(Shape::ty(builtin::INT)))]));
    let to = Schema::fields([("a", Shape::list_of(Shape::ty(builtin::STR)))]);
    let out = engine
        .convert_from(&nested, from, to, &Configuration::new())
        .expect("declared all the way down");
    assert_eq!(
        out,
        Value::from(Mapping::new().with("a", vec![Value::from("1"), Value::from("2")]))
    );
}

#[test]
fn validated_mode_uses_model_schemas() {
    let engine = bootstrap(true);
    let out = engine.convert(&orwell(), Shape::ty(builtin::MAP)).expect("convert");
    let keys: Vec<String> = out.as_map().expect("map").keys().map(ToString::to_string).collect();
    assert_eq!(keys, ["first", "last", "full"]);
}

#[test]
fn malformed_schemas_are_rejected_upfront() {
    use morph_api::SchemaKey;

    let err = Schema::new([(SchemaKey::Final, Shape::ty(builtin::INT)), (SchemaKey::from("a"), Shape::Any)])
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::SchemaNotValid(_)));
}

#[rstest]
fn final_source_passes_through_unchanged(engine: Engine) {
    let value = Value::from(Mapping::new().with("opaque", true));
    let from = Shape::map(Schema::leaf(Shape::ty(builtin::MAP)));
    let out = engine
        .convert_from(&value, from.clone(), Shape::ty(builtin::MAP), &Configuration::new())
        .expect("passthrough");
    assert_eq!(out, value);

    let err = engine
        .convert_from(&value, from, int_schema(&["opaque"]), &Configuration::new())
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::SchemasDontMatch { .. }), "{err}");
}

#[rstest]
fn virtual_fields_go_through_the_capability_table(engine: Engine) {
    let out = engine.convert(&orwell(), Shape::ty(builtin::MAP)).expect("to mapping");
    assert_eq!(
        out,
        Value::from(
            Mapping::new()
                .with("first", "George")
                .with("last", "Orwell")
                .with("full", "George Orwell")
        )
    );

    let input = Value::from(Mapping::new().with("full", "Eric Blair"));
    let out = engine.convert(&input, Shape::ty("Person")).expect("to person");
    let person = out.as_record().expect("record");
    assert_eq!(person.get("first"), Some(Value::from("Eric")));
    assert_eq!(person.get("last"), Some(Value::from("Blair")));
}

fn record_to_mapping(engine: &Engine) -> morph_engine::CastProto {
    engine
        .registry()
        .snapshot()
        .cast(&Metamorphosis::new(
            TypeSet::subclass_of(builtin::RECORD),
            TypeSet::subclass_of(builtin::MAP),
        ))
        .cloned()
        .expect("built-in cast")
}

#[rstest]
#[case::exclude("exclude", SettingValue::List(vec!["full".into()]), &["first", "last"])]
#[case::include("include", SettingValue::List(vec!["last".into(), "full".into()]), &["last", "full"])]
#[case::extra(
    "extra_schema",
    SettingValue::map([("nickname", Shape::ty(builtin::STR))]),
    &["first", "last", "full", "nickname"]
)]
fn record_fields_can_be_selected(
    engine: Engine,
    #[case] setting: &str,
    #[case] value: SettingValue,
    #[case] expected: &[&str],
) {
    let proto = record_to_mapping(&engine).with(setting, value).expect("configured");
    engine.registry().register_named("selected", proto);

    let out = engine.convert(&orwell(), Target::named("selected")).expect("convert");
    let keys: Vec<String> = out.as_map().expect("map").keys().map(ToString::to_string).collect();
    assert_eq!(keys, expected);
}

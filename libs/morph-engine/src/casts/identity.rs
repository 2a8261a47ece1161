use morph_api::error::{ConvertError, ConvertResult};
use morph_api::value::Value;

use crate::cast::{Cast, CastKind};
use crate::context::Context;
use crate::dac::fits;

/// Returns the input unchanged when it already fits the destination.
///
/// Records come back as fresh instances all the way down, so a conversion
/// never hands out a record it was given.
#[derive(Debug, Default)]
pub struct IdentityCast;

impl CastKind for IdentityCast {
    fn name(&self) -> &str {
        "identity"
    }

    fn call(&self, cast: &Cast, value: &Value, cx: &mut Context) -> ConvertResult<Value> {
        if !fits(&cast.to, value, cx.snapshot().types()) {
            return Err(ConvertError::invalid_value(format!(
                "'{}' value does not fit '{}'",
                value.type_key(),
                cast.to
            )));
        }
        Ok(value.deep_copy())
    }
}

#[cfg(test)]
mod tests {
    use morph_api::metamorphosis::Metamorphosis;
    use morph_api::schema::Shape;
    use morph_api::types::builtin;
    use morph_api::value::Record;

    use super::*;
    use crate::cast::{base_defaults, CastProto};

    fn identity(to: Shape) -> Cast {
        CastProto::new(IdentityCast)
            .and_then(|p| p.instantiate(&base_defaults()?, Metamorphosis::default(), Shape::Any, to, 0))
            .expect("cast")
    }

    #[test]
    fn records_are_copied_not_aliased() {
        let mut cx = Context::detached(8);
        let record = Record::with_fields("Book", [("title", Value::from("1984"))]);
        let out = identity(Shape::Any).call(&Value::Record(record.clone()), &mut cx).expect("identity");
        let copy = out.as_record().expect("record");
        assert!(!copy.ptr_eq(&record));
        assert_eq!(copy, &record);
    }

    #[test]
    fn nested_records_are_copied_too() {
        let mut cx = Context::detached(8);
        let child = Record::with_fields("Note", [("text", Value::from("hi"))]);
        let parent = Record::with_fields("Note", [("child", Value::Record(child.clone()))]);
        let out = identity(Shape::Any).call(&Value::Record(parent), &mut cx).expect("identity");
        let copied = out
            .as_record()
            .and_then(|r| r.get("child"))
            .and_then(|c| c.as_record().cloned())
            .expect("child");
        assert!(!copied.ptr_eq(&child));
        copied.set("text", Value::from("mutated"));
        assert_eq!(child.get("text"), Some(Value::from("hi")));
    }

    #[test]
    fn rejects_values_of_another_type() {
        let mut cx = Context::detached(8);
        assert!(identity(Shape::ty(builtin::STR)).call(&Value::from(1), &mut cx).is_err());
        assert_eq!(identity(Shape::ty(builtin::INT)).call(&Value::from(1), &mut cx).ok(), Some(Value::from(1)));
    }
}

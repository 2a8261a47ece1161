use morph_api::error::{ConvertError, ConvertResult};
use morph_api::value::Value;

use crate::cast::{Cast, CastKind};
use crate::context::Context;

/// Leaf cast between two scalar types.
#[derive(Debug, Clone, Copy)]
pub struct ScalarCast {
    name: &'static str,
    convert: fn(&Value) -> ConvertResult<Value>,
}

impl ScalarCast {
    pub const fn new(name: &'static str, convert: fn(&Value) -> ConvertResult<Value>) -> Self {
        Self { name, convert }
    }

    pub const INT_TO_STR: Self = Self::new("int_to_str", int_to_str);
    pub const STR_TO_INT: Self = Self::new("str_to_int", str_to_int);
    pub const FLOAT_TO_STR: Self = Self::new("float_to_str", float_to_str);
    pub const STR_TO_FLOAT: Self = Self::new("str_to_float", str_to_float);
    pub const INT_TO_FLOAT: Self = Self::new("int_to_float", int_to_float);
    pub const BOOL_TO_STR: Self = Self::new("bool_to_str", bool_to_str);
}

impl CastKind for ScalarCast {
    fn name(&self) -> &str {
        self.name
    }

    fn call(&self, _cast: &Cast, value: &Value, _cx: &mut Context) -> ConvertResult<Value> {
        (self.convert)(value)
    }
}

fn unexpected(expected: &str, value: &Value) -> ConvertError {
    ConvertError::invalid_value(format!("expected {expected}, got '{}'", value.type_key()))
}

fn int_to_str(value: &Value) -> ConvertResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Str(i.to_string())),
        other => Err(unexpected("int", other)),
    }
}

fn str_to_int(value: &Value) -> ConvertResult<Value> {
    match value {
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| ConvertError::invalid_value(format!("'{s}' is not an integer: {e}"))),
        other => Err(unexpected("str", other)),
    }
}

fn float_to_str(value: &Value) -> ConvertResult<Value> {
    match value {
        Value::Float(f) => Ok(Value::Str(f.to_string())),
        other => Err(unexpected("float", other)),
    }
}

fn str_to_float(value: &Value) -> ConvertResult<Value> {
    match value {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| ConvertError::invalid_value(format!("'{s}' is not a number: {e}"))),
        other => Err(unexpected("str", other)),
    }
}

fn int_to_float(value: &Value) -> ConvertResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        other => Err(unexpected("int", other)),
    }
}

fn bool_to_str(value: &Value) -> ConvertResult<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Str(b.to_string())),
        other => Err(unexpected("bool", other)),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ScalarCast::INT_TO_STR, Value::from(78), Value::from("78"))]
    #[case(ScalarCast::STR_TO_INT, Value::from(" 78 "), Value::from(78))]
    #[case(ScalarCast::FLOAT_TO_STR, Value::from(1.5), Value::from("1.5"))]
    #[case(ScalarCast::STR_TO_FLOAT, Value::from("2.25"), Value::from(2.25))]
    #[case(ScalarCast::INT_TO_FLOAT, Value::from(3), Value::from(3.0))]
    #[case(ScalarCast::BOOL_TO_STR, Value::from(true), Value::from("true"))]
    fn converts(#[case] cast: ScalarCast, #[case] input: Value, #[case] expected: Value) {
        assert_eq!((cast.convert)(&input).ok(), Some(expected));
    }

    #[test]
    fn bad_numerals_are_invalid_values() {
        let err = (ScalarCast::STR_TO_INT.convert)(&Value::from("seventy")).unwrap_err();
        assert!(matches!(err.kind(), morph_api::error::ErrorKind::InvalidValue(_)));
    }
}

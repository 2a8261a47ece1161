use std::sync::Arc;

use morph_api::error::{ConvertError, ConvertResult};
use morph_api::model::{ModelDef, ObjectAdapter};
use morph_api::schema::{Schema, SchemaKey};
use morph_api::types::{builtin, TypeKey};
use morph_api::value::{Key, Mapping, Record, Value};

use crate::cast::Cast;
use crate::context::Context;
use crate::dac::DivideAndConquer;
use crate::settings::{Configuration, SettingDecl, SettingKey, SettingKind, SettingValue, Strategy};

/// How the input is split into items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decompose {
    /// Existing key/value pairs, in order.
    Mapping,
    /// Elements, keyed by index.
    Sequence,
    /// Schema keys, read through the model adapter.
    Record,
}

/// How converted items are put back together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recompose {
    Mapping,
    /// Keys are dropped, iteration order is kept.
    Sequence,
    /// Construct the destination instance, then set every item on it.
    Record,
}

/// Divide-and-conquer cast between the built-in structured shapes.
#[derive(Debug, Clone)]
pub struct StructuredCast {
    name: &'static str,
    decompose: Decompose,
    recompose: Recompose,
}

impl StructuredCast {
    pub const fn new(name: &'static str, decompose: Decompose, recompose: Recompose) -> Self {
        Self {
            name,
            decompose,
            recompose,
        }
    }
}

fn names(values: &[SettingValue]) -> Vec<Key> {
    values
        .iter()
        .filter_map(|v| match v {
            SettingValue::Str(s) => Some(Key::Str(s.clone())),
            SettingValue::Int(i) => Some(Key::Int(*i)),
            _ => None,
        })
        .collect()
}

/// Adapter for records of `ty`; a bare one when no model is registered.
fn adapter_for(ty: &TypeKey, cx: &Context) -> Arc<dyn ObjectAdapter> {
    match cx.snapshot().model(ty) {
        Some(adapter) => Arc::clone(adapter),
        None => Arc::new(ModelDef::new(ty.clone())),
    }
}

impl DivideAndConquer for StructuredCast {
    fn name(&self) -> &str {
        self.name
    }

    /// Record decomposition also declares
    /// - `include`: field names to keep (all when empty)
    /// - `exclude`: field names to drop
    /// - `extra_schema`: field name -> shape, read on top of the model's schema
    fn defaults(&self) -> ConvertResult<Configuration> {
        if self.decompose != Decompose::Record {
            return Ok(Configuration::new());
        }
        Configuration::new()
            .with_setting(
                SettingDecl::new("include", SettingValue::List(Vec::new()))
                    .expect(SettingKind::List)
                    .on_customize(Strategy::Ignore),
            )?
            .with_setting(
                SettingDecl::new("exclude", SettingValue::List(Vec::new()))
                    .expect(SettingKind::List)
                    .on_customize(Strategy::Ignore),
            )?
            .with_setting(
                SettingDecl::new("extra_schema", SettingValue::Map(Vec::new()))
                    .expect(SettingKind::Map)
                    .on_override(Strategy::MergeShallow)
                    .on_customize(Strategy::Ignore),
            )
    }

    fn refine_source_schema(&self, cast: &Cast, schema: Schema) -> ConvertResult<Schema> {
        if self.decompose != Decompose::Record || schema.is_final() {
            return Ok(schema);
        }
        let mut schema = schema;
        for (key, shape) in cast.settings.get_map("extra_schema")? {
            match (key, shape) {
                (SettingKey::Key(key), SettingValue::Shape(shape)) => {
                    schema.insert(SchemaKey::Key(key.clone()), shape.clone())?;
                }
                _ => {
                    return Err(ConvertError::setting_type("extra_schema", "key -> shape", "other entry"));
                }
            }
        }

        let include = names(cast.settings.get_list("include")?);
        let exclude = names(cast.settings.get_list("exclude")?);
        schema.retain(|key| match key {
            SchemaKey::Key(key) => {
                (include.is_empty() || include.contains(key)) && !exclude.contains(key)
            }
            SchemaKey::Any | SchemaKey::Final => true,
        });
        Ok(schema)
    }

    fn destination_schema(&self, cast: &Cast, input: &Value, cx: &Context) -> ConvertResult<Option<Schema>> {
        if let Some(schema) = cx.snapshot().schema_of(&cast.to) {
            return Ok(Some(schema));
        }
        // Rebuilding a record into "any" keeps its own type.
        if self.recompose == Recompose::Record && cast.to.type_key().is_none() {
            return Ok(cx.snapshot().schema_of(&input.type_key().into()));
        }
        Ok(None)
    }

    fn iter_input(&self, cast: &Cast, input: &Value, schema: &Schema, cx: &Context) -> ConvertResult<Vec<(Key, Value)>> {
        match (self.decompose, input) {
            (Decompose::Mapping, Value::Map(mapping)) => Ok(mapping.iter().cloned().collect()),
            (Decompose::Sequence, Value::List(items)) => Ok(items
                .iter()
                .enumerate()
                .map(|(i, item)| (Key::from(i), item.clone()))
                .collect()),
            (Decompose::Record, Value::Record(record)) => {
                let adapter = adapter_for(&record.type_key(), cx);
                let types = cx.snapshot().types();
                schema
                    .keys()
                    .map(|key| {
                        adapter
                            .get(record, &key.to_string(), types)
                            .map(|value| (key.clone(), value))
                            .map_err(|e| e.with_key(key.clone()))
                    })
                    .collect()
            }
            (_, other) => Err(ConvertError::invalid_value(format!(
                "'{}' cannot decompose a '{}'",
                cast.name(),
                other.type_key()
            ))),
        }
    }

    fn build_output(
        &self,
        cast: &Cast,
        input: &Value,
        items: Vec<(Key, Value)>,
        cx: &Context,
    ) -> ConvertResult<Value> {
        match self.recompose {
            Recompose::Mapping => Ok(Value::Map(items.into_iter().collect::<Mapping>())),
            Recompose::Sequence => Ok(Value::List(items.into_iter().map(|(_, v)| v).collect())),
            Recompose::Record => {
                let ty = match cast.to.type_key() {
                    Some(ty) => ty.clone(),
                    None => input.type_key(),
                };
                let types = cx.snapshot().types();
                // Undeclared names are taken to be ad hoc record types.
                if types.contains(&ty) && !types.is_subtype(&ty, &TypeKey::new(builtin::RECORD)) {
                    return Err(ConvertError::invalid_value(format!(
                        "'{ty}' is not a record type"
                    )));
                }
                let adapter = adapter_for(&ty, cx);
                let keys: Vec<Key> = items.iter().map(|(k, _)| k.clone()).collect();
                // An inherited adapter would construct its own type.
                let record = if adapter.type_key() == &ty {
                    adapter.construct(&keys)?
                } else {
                    Record::new(ty.clone())
                };
                for (key, value) in items {
                    adapter
                        .set(&record, &key.to_string(), value, types)
                        .map_err(|e| e.with_key(key.clone()))?;
                }
                Ok(Value::Record(record))
            }
        }
    }
}

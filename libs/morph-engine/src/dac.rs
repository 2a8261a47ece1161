//! Divide and conquer: decompose the input into keyed items, convert every
//! item with its own resolved cast, recompose the results.

use std::fmt;

use morph_api::error::{ConvertError, ConvertResult};
use morph_api::metamorphosis::Metamorphosis;
use morph_api::schema::{validate_schemas_match, Schema, Shape};
use morph_api::types::{TypeHierarchy, TypeSet};
use morph_api::value::{Key, Value};

use crate::cast::{Cast, CastKind};
use crate::context::Context;
use crate::resolver;
use crate::settings::{Configuration, SettingDecl, SettingKind, SettingValue, Strategy};

/// A structured conversion, described by its three stages.
pub trait DivideAndConquer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Settings declared on top of [`dac_defaults`].
    fn defaults(&self) -> ConvertResult<Configuration> {
        Ok(Configuration::new())
    }

    /// Declared schema of `input`, or `None` if it has to be improvised.
    ///
    /// Records use their model's schema; anything else uses the schema
    /// carried by the cast's source shape.
    fn source_schema(&self, cast: &Cast, input: &Value, cx: &Context) -> ConvertResult<Option<Schema>> {
        if let Value::Record(record) = input {
            if let Some(adapter) = cx.snapshot().model(&record.type_key()) {
                return Ok(Some(adapter.schema().clone()));
            }
        }
        Ok(cast.from.declared_schema())
    }

    /// Adjust the source schema (declared or improvised) before decomposition.
    fn refine_source_schema(&self, _cast: &Cast, schema: Schema) -> ConvertResult<Schema> {
        Ok(schema)
    }

    fn destination_schema(&self, cast: &Cast, _input: &Value, cx: &Context) -> ConvertResult<Option<Schema>> {
        Ok(cx.snapshot().schema_of(&cast.to))
    }

    /// Decompose `input` into `(key, item)` pairs.
    fn iter_input(&self, cast: &Cast, input: &Value, schema: &Schema, cx: &Context) -> ConvertResult<Vec<(Key, Value)>>;

    /// `true` drops the item before it is converted.
    fn strip_item(&self, cast: &Cast, _key: &Key, item: &Value) -> ConvertResult<bool> {
        Ok(item.is_null() && cast.settings.get_bool("strip_none")?)
    }

    /// Assemble the converted items, in decomposition order.
    fn build_output(
        &self,
        cast: &Cast,
        input: &Value,
        items: Vec<(Key, Value)>,
        cx: &Context,
    ) -> ConvertResult<Value>;
}

/// Settings every divide-and-conquer cast declares. None of them reach
/// child casts.
///
/// - `key_to_cast`: item key -> cast, for that item only
/// - `value_cast`: cast for every item without a `key_to_cast` entry
/// - `key_cast`: cast applied to the keys themselves, before the two above
///   and the destination schema look the item up
pub fn dac_defaults() -> ConvertResult<Configuration> {
    Configuration::new()
        .with_setting(
            SettingDecl::new("key_to_cast", SettingValue::Map(Vec::new()))
                .expect(SettingKind::Map)
                .on_override(Strategy::MergeShallow)
                .on_customize(Strategy::Ignore),
        )?
        .with_setting(
            SettingDecl::new("value_cast", SettingValue::Null)
                .expect(SettingKind::Cast)
                .on_customize(Strategy::Ignore),
        )?
        .with_setting(
            SettingDecl::new("key_cast", SettingValue::Null)
                .expect(SettingKind::Cast)
                .on_customize(Strategy::Ignore),
        )
}

/// [`CastKind`] running a [`DivideAndConquer`] description.
#[derive(Debug)]
pub struct DivideAndConquerCast<D>(pub D);

impl<D: DivideAndConquer> CastKind for DivideAndConquerCast<D> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn defaults(&self) -> ConvertResult<Configuration> {
        let mut settings = dac_defaults()?;
        settings.override_with(&self.0.defaults()?)?;
        Ok(settings)
    }

    fn call(&self, cast: &Cast, value: &Value, cx: &mut Context) -> ConvertResult<Value> {
        run(&self.0, cast, value, cx)
    }
}

/// `true` if a value of the given type satisfies the destination shape.
/// `Null` fits every shape, so optional fields can stay empty.
pub fn fits(to: &Shape, value: &Value, types: &TypeHierarchy) -> bool {
    if value.is_null() {
        return true;
    }
    match to.type_key() {
        Some(ty) => types.is_subtype(&value.type_key(), ty),
        None => true,
    }
}

/// A decomposed item, its key already through `key_cast`.
struct Item {
    source_key: Key,
    key: Key,
    value: Value,
}

struct ItemPlan<'a> {
    source: &'a Schema,
    destination: Option<&'a Schema>,
}

/// Decompose, convert, recompose.
///
/// A record that is reached again while it is still being decomposed fails
/// with `CyclicStructure`.
pub fn run<D: DivideAndConquer + ?Sized>(d: &D, cast: &Cast, input: &Value, cx: &mut Context) -> ConvertResult<Value> {
    let record = input.as_record().cloned();
    if let Some(record) = &record {
        cx.enter(record)?;
    }
    let result = run_stages(d, cast, input, cx);
    if let Some(record) = &record {
        cx.leave(record);
    }
    result
}

fn run_stages<D: DivideAndConquer + ?Sized>(d: &D, cast: &Cast, input: &Value, cx: &mut Context) -> ConvertResult<Value> {
    let logs = cast.logs();
    let strict = cast.settings.get_bool("strict_schemas")?;

    let declared = d.source_schema(cast, input, cx)?;
    let improvised = declared.is_none();
    let source = match declared {
        Some(schema) => schema,
        None if strict => {
            return Err(ConvertError::schema_not_valid(format!(
                "no declared schema for '{}' in validated mode",
                input.type_key()
            )));
        }
        None => {
            if logs {
                tracing::debug!(ty = %input.type_key(), best_effort = true, "improvised source schema");
            }
            Schema::improvise(input)
        }
    };
    let source = d.refine_source_schema(cast, source)?;
    source.validate()?;

    let destination = d.destination_schema(cast, input, cx)?;
    if let Some(destination) = &destination {
        destination.validate()?;
        // Improvised schemas only promise what is there right now, so only
        // the leaf rule applies to them.
        if !improvised || destination.is_final() {
            validate_schemas_match(&source, destination)?;
        }
    }

    // An opaque leaf is not decomposed.
    if source.is_final() {
        return Ok(input.deep_copy());
    }

    if logs {
        tracing::debug!(cast = cast.name(), depth = cast.depth, "decomposing");
    }
    let mut items = Vec::new();
    for (source_key, value) in d.iter_input(cast, input, &source, cx)? {
        if d.strip_item(cast, &source_key, &value)? {
            continue;
        }
        let key = convert_key(cast, &source_key, cx)?;
        if destination.as_ref().is_some_and(|schema| !schema.admits(&key)) {
            continue;
        }
        items.push(Item { source_key, key, value });
    }

    if logs {
        tracing::debug!(cast = cast.name(), items = items.len(), "converting items");
    }
    let plan = ItemPlan {
        source: &source,
        destination: destination.as_ref(),
    };
    let converted = convert_items(cast, &plan, items, cx)?;

    if logs {
        tracing::debug!(cast = cast.name(), "recomposing");
    }
    let output = d.build_output(cast, input, converted, cx)?;
    if !fits(&cast.to, &output, cx.snapshot().types()) {
        return Err(ConvertError::invalid_value(format!(
            "'{}' built a '{}', expected '{}'",
            cast.name(),
            output.type_key(),
            cast.to
        )));
    }

    let ty = output.type_key();
    for hook in cx.snapshot().hooks_for(&ty) {
        hook(&output)?;
    }
    Ok(output)
}

fn convert_items(
    cast: &Cast,
    plan: &ItemPlan<'_>,
    items: Vec<Item>,
    cx: &mut Context,
) -> ConvertResult<Vec<(Key, Value)>> {
    #[cfg(feature = "parallel")]
    if items.len() >= cx.parallel_threshold() {
        use rayon::prelude::*;

        let base = cx.fork();
        // `collect` keeps the input order whatever the completion order.
        return items
            .into_par_iter()
            .map(|item| {
                let mut cx = base.fork();
                convert_item(cast, plan, item, &mut cx)
            })
            .collect();
    }

    items
        .into_iter()
        .map(|item| convert_item(cast, plan, item, cx))
        .collect()
}

/// Convert one item.
///
/// The source schema is looked up with the key the item had in the input.
/// `key_to_cast` and the destination schema see the key as it will appear in
/// the output. Error paths name the input key.
fn convert_item(cast: &Cast, plan: &ItemPlan<'_>, item: Item, cx: &mut Context) -> ConvertResult<(Key, Value)> {
    let Item { source_key, key, value } = item;
    let from = match plan.source.get(&source_key) {
        Some(Shape::Any) | None => Shape::Type(value.type_key()),
        Some(shape) => shape.clone(),
    };
    let to = plan
        .destination
        .and_then(|schema| schema.get(&key))
        .cloned()
        .unwrap_or_default();
    let request = Metamorphosis::new(item_source(&from, &value, cx.snapshot().types()), to.type_set());

    let converted = resolver::resolve_item(cx, cast, &key, &request, from, to)
        .and_then(|child| child.call(&value, cx))
        .map_err(|e| e.with_metamorphosis(&request).with_key(source_key))?;
    Ok((key, converted))
}

/// Source pattern of an item request.
///
/// The type the schema declares for the item wins, so a cast registered for
/// a nominal field type (say `celsius` over a float) is found. The runtime
/// type is used when the item is `Null` or already at least as specific.
fn item_source(declared: &Shape, item: &Value, types: &TypeHierarchy) -> TypeSet {
    let runtime = item.type_key();
    match declared.type_key() {
        Some(ty) if !item.is_null() && !types.is_subtype(&runtime, ty) => TypeSet::Exact(ty.clone()),
        _ => TypeSet::Exact(runtime),
    }
}

fn convert_key(cast: &Cast, key: &Key, cx: &mut Context) -> ConvertResult<Key> {
    let Some(proto) = cast.settings.get_cast("key_cast")? else {
        return Ok(key.clone());
    };
    let value = Value::from(key.clone());
    let request = Metamorphosis::new(TypeSet::Exact(value.type_key()), TypeSet::Any);
    let converted = proto
        .instantiate(&cast.settings, request, Shape::Any, Shape::Any, cast.depth)
        .and_then(|key_cast| key_cast.call(&value, cx))
        .map_err(|e| e.with_key(key.clone()))?;
    Key::try_from(converted).map_err(|other| {
        ConvertError::invalid_value(format!(
            "key cast produced a '{}', keys must be int or str",
            other.type_key()
        ))
        .with_key(key.clone())
    })
}

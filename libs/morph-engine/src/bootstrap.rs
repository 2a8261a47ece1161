use std::sync::Arc;

use morph_api::error::{ConvertError, ConvertResult};
use morph_api::metamorphosis::Metamorphosis;
use morph_api::model::Model;
use morph_api::schema::Shape;
use morph_api::types::TypeSet;
use morph_api::value::Value;

use crate::cast::{base_defaults, CastKind, CastProto};
use crate::casts::{Decompose, IdentityCast, Recompose, ScalarCast, StructuredCast};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::dac::DivideAndConquerCast;
use crate::error::EngineError;
use crate::registry::Registry;
use crate::resolver;
use crate::settings::Configuration;
use crate::target::Target;

fn structured(name: &'static str, decompose: Decompose, recompose: Recompose) -> ConvertResult<CastProto> {
    CastProto::new(DivideAndConquerCast(StructuredCast::new(name, decompose, recompose)))
}

fn scalar(cast: ScalarCast) -> ConvertResult<CastProto> {
    CastProto::new(cast)
}

/// Register the built-in casts: identity, the structured shapes and the
/// scalar conversions.
pub fn install_builtins(registry: &Registry) -> ConvertResult<()> {
    use morph_api::types::builtin::{BOOL, FLOAT, INT, LIST, MAP, RECORD, STR};
    let sub = TypeSet::subclass_of;
    let exact = TypeSet::exact;

    let table: Vec<(Metamorphosis, CastProto)> = vec![
        (Metamorphosis::default(), CastProto::new(IdentityCast)?),
        (
            Metamorphosis::new(sub(LIST), TypeSet::Any),
            structured("sequence", Decompose::Sequence, Recompose::Sequence)?,
        ),
        (
            Metamorphosis::new(sub(MAP), TypeSet::Any),
            structured("mapping", Decompose::Mapping, Recompose::Mapping)?,
        ),
        (
            Metamorphosis::new(sub(MAP), sub(LIST)),
            structured("mapping_to_sequence", Decompose::Mapping, Recompose::Sequence)?,
        ),
        (
            Metamorphosis::new(sub(LIST), sub(MAP)),
            structured("sequence_to_mapping", Decompose::Sequence, Recompose::Mapping)?,
        ),
        (
            Metamorphosis::new(sub(RECORD), sub(MAP)),
            structured("record_to_mapping", Decompose::Record, Recompose::Mapping)?,
        ),
        (
            Metamorphosis::new(sub(MAP), sub(RECORD)),
            structured("mapping_to_record", Decompose::Mapping, Recompose::Record)?,
        ),
        (
            Metamorphosis::new(sub(RECORD), TypeSet::Any),
            structured("record", Decompose::Record, Recompose::Record)?,
        ),
        (Metamorphosis::new(exact(INT), exact(STR)), scalar(ScalarCast::INT_TO_STR)?),
        (Metamorphosis::new(exact(STR), exact(INT)), scalar(ScalarCast::STR_TO_INT)?),
        (Metamorphosis::new(exact(FLOAT), exact(STR)), scalar(ScalarCast::FLOAT_TO_STR)?),
        (Metamorphosis::new(exact(STR), exact(FLOAT)), scalar(ScalarCast::STR_TO_FLOAT)?),
        (Metamorphosis::new(exact(INT), exact(FLOAT)), scalar(ScalarCast::INT_TO_FLOAT)?),
        (Metamorphosis::new(exact(BOOL), exact(STR)), scalar(ScalarCast::BOOL_TO_STR)?),
    ];

    for (mm, proto) in table {
        registry.register(mm, proto);
    }
    Ok(())
}

/// Entry point for conversions: a registry plus the engine configuration.
#[derive(Debug)]
pub struct Engine {
    registry: Arc<Registry>,
    config: EngineConfig,
}

impl Engine {
    /// Engine over a fresh registry, with the built-in casts unless the
    /// configuration turns them off.
    pub fn bootstrap(config: EngineConfig) -> Result<Self, EngineError> {
        Self::bootstrap_on(Arc::new(Registry::new()), config)
    }

    /// Same as [`Engine::bootstrap`], installing into an existing registry.
    /// Installing twice is harmless: built-ins replace themselves.
    pub fn bootstrap_on(registry: Arc<Registry>, config: EngineConfig) -> Result<Self, EngineError> {
        if config.builtins {
            install_builtins(&registry)?;
            tracing::info!("installed built-in casts");
        }
        tracing::info!(
            max_depth = config.max_depth,
            strict_schemas = config.strict_schemas,
            "engine ready"
        );
        Ok(Self { registry, config })
    }

    /// Engine over an existing registry, as is. Nothing gets installed.
    pub fn with_registry(registry: Arc<Registry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Settings every top-level cast is customized with.
    pub fn root_settings(&self) -> ConvertResult<Configuration> {
        let mut settings = base_defaults()?;
        settings.set("logs", self.config.logs)?;
        settings.set("strict_schemas", self.config.strict_schemas)?;
        Ok(settings)
    }

    pub fn convert(&self, value: &Value, to: impl Into<Target>) -> ConvertResult<Value> {
        self.convert_from(value, Shape::Any, to, &Configuration::new())
    }

    /// Convert with extra root settings, e.g. `strip_none` or user options
    /// read by casts further down.
    pub fn convert_with(
        &self,
        value: &Value,
        to: impl Into<Target>,
        settings: &Configuration,
    ) -> ConvertResult<Value> {
        self.convert_from(value, Shape::Any, to, settings)
    }

    /// Convert a value whose shape is declared upfront. A structured `from`
    /// supplies the source schema, so the top level is validated instead of
    /// improvised.
    pub fn convert_from(
        &self,
        value: &Value,
        from: Shape,
        to: impl Into<Target>,
        settings: &Configuration,
    ) -> ConvertResult<Value> {
        let mut root = self.root_settings()?;
        root.override_with(settings)?;
        let mut cx = Context::new(
            self.registry.snapshot(),
            self.config.max_depth,
            self.config.parallel_threshold,
        );

        let cast = match to.into() {
            Target::Shape(to) => {
                let request = Metamorphosis::new(TypeSet::Exact(value.type_key()), to.type_set());
                resolver::resolve(&mut cx, &root, &request, from, to, 0)?
            }
            Target::Named(name) => {
                let request = Metamorphosis::new(TypeSet::Exact(value.type_key()), TypeSet::Any);
                let proto = cx
                    .snapshot()
                    .named(&name)
                    .cloned()
                    .ok_or_else(|| ConvertError::no_converter(request.clone()))?;
                tracing::debug!(name = %name, cast = proto.name(), "using named cast");
                proto.instantiate(&root, request, from, Shape::Any, 0)?
            }
        };
        cast.call(value, &mut cx)
    }

    /// Convert into a Rust model. The model has to be registered.
    pub fn convert_into<M: Model>(&self, value: &Value) -> ConvertResult<M> {
        let converted = self.convert(value, M::shape())?;
        M::from_value(converted)
    }
}

/// Set up the process-wide registry. Call once at startup, before
/// [`convert`]; the registry holds nothing until then.
pub fn bootstrap_global(config: EngineConfig) -> Result<Engine, EngineError> {
    Engine::bootstrap_on(Registry::global(), config)
}

/// Register a cast kind for `mm` in the process-wide registry.
pub fn register(mm: Metamorphosis, kind: impl CastKind + 'static) -> ConvertResult<()> {
    Registry::global().register(mm, CastProto::new(kind)?);
    Ok(())
}

/// Convert through the process-wide registry with the default configuration.
/// Only what [`bootstrap_global`] and [`register`] put there is available.
pub fn convert(value: &Value, to: impl Into<Target>) -> ConvertResult<Value> {
    Engine::with_registry(Registry::global(), EngineConfig::default()).convert(value, to)
}

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use morph_api::error::ConvertResult;
use morph_api::metamorphosis::Metamorphosis;
use morph_api::model::{Model, ObjectAdapter};
use morph_api::schema::{Schema, Shape};
use morph_api::types::{TypeHierarchy, TypeKey, TypeSet};
use morph_api::value::Value;

use crate::cast::CastProto;

/// Called with every freshly recomposed value of a matching type.
pub type Hook = Arc<dyn Fn(&Value) -> ConvertResult<()> + Send + Sync>;

/// Immutable view of the registry. One is taken per top-level conversion.
#[derive(Clone, Default)]
pub struct Snapshot {
    types: TypeHierarchy,
    models: HashMap<TypeKey, Arc<dyn ObjectAdapter>>,
    casts: Vec<(Metamorphosis, CastProto)>,
    named: HashMap<String, CastProto>,
    hooks: Vec<(TypeSet, Hook)>,
}

impl Snapshot {
    pub fn types(&self) -> &TypeHierarchy {
        &self.types
    }

    /// Global registrations, in registration order.
    pub fn casts(&self) -> &[(Metamorphosis, CastProto)] {
        &self.casts
    }

    pub fn cast(&self, mm: &Metamorphosis) -> Option<&CastProto> {
        self.casts.iter().find(|(m, _)| m == mm).map(|(_, p)| p)
    }

    pub fn named(&self, name: &str) -> Option<&CastProto> {
        self.named.get(name)
    }

    /// Adapter of `ty`, or of its closest ancestor that has one.
    pub fn model(&self, ty: &TypeKey) -> Option<&Arc<dyn ObjectAdapter>> {
        self.types
            .linearize(ty)
            .iter()
            .find_map(|ancestor| self.models.get(ancestor))
    }

    /// Item schema of a shape: declared on the shape itself, else the
    /// default schema of the model it names.
    pub fn schema_of(&self, shape: &Shape) -> Option<Schema> {
        shape.declared_schema().or_else(|| {
            let ty = shape.type_key()?;
            self.model(ty).map(|adapter| adapter.schema().clone())
        })
    }

    pub fn hooks_for<'a>(&'a self, ty: &'a TypeKey) -> impl Iterator<Item = &'a Hook> + 'a {
        self.hooks
            .iter()
            .filter(move |(pattern, _)| pattern.matches(ty, &self.types))
            .map(|(_, hook)| hook)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("casts", &self.casts.iter().map(|(mm, p)| (mm.to_string(), p.name().to_string())).collect::<Vec<_>>())
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Process-wide registrations.
///
/// Readers take a cheap [`Snapshot`] handle; writers copy the snapshot,
/// change the copy and swap it in. Registrations are additive.
#[derive(Debug, Default)]
pub struct Registry {
    current: RwLock<Arc<Snapshot>>,
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry. Starts empty; see [`crate::bootstrap_global`].
    pub fn global() -> Arc<Registry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Registry::new())))
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = match self.current.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        Arc::clone(&guard)
    }

    fn update(&self, change: impl FnOnce(&mut Snapshot)) {
        let mut guard = match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        change(Arc::make_mut(&mut guard));
    }

    /// Register `proto` for `mm`. Registering the same metamorphosis again
    /// replaces the previous prototype.
    pub fn register(&self, mm: Metamorphosis, proto: CastProto) {
        tracing::info!(mm = %mm, cast = proto.name(), "registered cast");
        self.update(|snapshot| {
            match snapshot.casts.iter_mut().find(|(m, _)| *m == mm) {
                Some(entry) => entry.1 = proto,
                None => snapshot.casts.push((mm, proto)),
            }
        });
    }

    /// Register a prototype usable by name as a conversion target.
    pub fn register_named(&self, name: impl Into<String>, proto: CastProto) {
        let name = name.into();
        tracing::info!(name = %name, cast = proto.name(), "registered named cast");
        self.update(|snapshot| {
            snapshot.named.insert(name, proto);
        });
    }

    /// Declare a type and its parents (most significant first).
    pub fn declare_type(&self, ty: impl Into<TypeKey>, parents: Vec<TypeKey>) {
        let ty = ty.into();
        tracing::info!(ty = %ty, parents = ?parents, "declared type");
        self.update(|snapshot| snapshot.types.declare(ty, parents));
    }

    /// Register an object-model adapter; declares its type as well.
    pub fn register_model(&self, adapter: Arc<dyn ObjectAdapter>) {
        let ty = adapter.type_key().clone();
        tracing::info!(ty = %ty, fields = adapter.schema().len(), "registered model");
        self.update(|snapshot| {
            snapshot.types.declare(ty.clone(), adapter.parents().to_vec());
            snapshot.models.insert(ty, adapter);
        });
    }

    pub fn declare_model<M: Model>(&self) {
        self.register_model(Arc::new(M::model_def()));
    }

    /// Run `hook` after every recomposition producing a type matched by `pattern`.
    pub fn on_recomposed<F>(&self, pattern: TypeSet, hook: F)
    where
        F: Fn(&Value) -> ConvertResult<()> + Send + Sync + 'static,
    {
        tracing::info!(pattern = %pattern, "registered recomposition hook");
        self.update(|snapshot| snapshot.hooks.push((pattern, Arc::new(hook))));
    }
}

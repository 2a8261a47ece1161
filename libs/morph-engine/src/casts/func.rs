use std::fmt;
use std::sync::Arc;

use morph_api::error::ConvertResult;
use morph_api::value::Value;

use crate::cast::{Cast, CastKind};
use crate::context::Context;
use crate::settings::Configuration;

/// Conversion function. Receives the resolved cast, e.g. to read settings.
pub type CastFn = Arc<dyn Fn(&Value, &Cast) -> ConvertResult<Value> + Send + Sync>;

/// Leaf cast backed by a closure.
#[derive(Clone)]
pub struct FnCast {
    name: String,
    func: CastFn,
    defaults: Configuration,
}

impl FnCast {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value, &Cast) -> ConvertResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            defaults: Configuration::new(),
        }
    }

    /// Settings this cast declares on top of the base ones.
    pub fn with_defaults(mut self, defaults: Configuration) -> Self {
        self.defaults = defaults;
        self
    }
}

impl CastKind for FnCast {
    fn name(&self) -> &str {
        &self.name
    }

    fn defaults(&self) -> ConvertResult<Configuration> {
        Ok(self.defaults.clone())
    }

    fn call(&self, cast: &Cast, value: &Value, _cx: &mut Context) -> ConvertResult<Value> {
        (self.func)(value, cast)
    }
}

impl fmt::Debug for FnCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCast").field("name", &self.name).finish_non_exhaustive()
    }
}

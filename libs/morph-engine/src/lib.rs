pub mod bootstrap;
pub mod cast;
pub mod casts;
pub mod config;
pub mod context;
pub mod dac;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod settings;
pub mod target;

pub use bootstrap::{bootstrap_global, convert, install_builtins, register, Engine};
pub use cast::{base_defaults, Cast, CastKind, CastProto};
pub use config::EngineConfig;
pub use context::Context;
pub use dac::{DivideAndConquer, DivideAndConquerCast};
pub use error::EngineError;
pub use registry::{Registry, Snapshot};
pub use settings::{Configuration, SettingDecl, SettingKey, SettingKind, SettingValue, Strategy};
pub use target::Target;

// Lets `#[derive(Model)]` output (which names `::morph_api`) compile inside this crate's tests.
extern crate self as morph_api;

pub mod error;
pub mod metamorphosis;
pub mod model;
pub mod schema;
pub mod types;
pub mod value;

pub use morph_api_derive::Model;

pub use error::{ConvertError, ConvertResult, ErrorKind, KeyPath};
pub use metamorphosis::Metamorphosis;
pub use model::{FromValue, Model, ModelDef, ObjectAdapter, ToValue, Typed};
pub use schema::{validate_schema, validate_schemas_match, Schema, SchemaKey, Shape};
pub use types::{builtin, Specificity, TypeHierarchy, TypeKey, TypeSet};
pub use value::{Key, Mapping, Record, Value};

use morph_api::schema::{Schema, Shape};
use morph_api::types::TypeKey;

/// What a top-level conversion should produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Resolve through the registry.
    Shape(Shape),
    /// Use the cast registered under this name, skipping resolution.
    Named(String),
}

impl Target {
    pub fn named(name: impl Into<String>) -> Self {
        Target::Named(name.into())
    }
}

impl From<Shape> for Target {
    fn from(shape: Shape) -> Self {
        Target::Shape(shape)
    }
}

impl From<TypeKey> for Target {
    fn from(ty: TypeKey) -> Self {
        Target::Shape(Shape::Type(ty))
    }
}

/// A bare schema describes a mapping.
impl From<Schema> for Target {
    fn from(schema: Schema) -> Self {
        Target::Shape(Shape::map(schema))
    }
}

//! Built-in cast kinds.

mod func;
mod identity;
mod scalar;
mod structured;

pub use func::{CastFn, FnCast};
pub use identity::IdentityCast;
pub use scalar::ScalarCast;
pub use structured::{Decompose, Recompose, StructuredCast};

//! Built-in [`OperationHandler`](crate::OperationHandler) implementations.
//!
//! | Handler | Admits | Priority |
//! |---------|--------|----------|
//! | [`PrimitiveHandler`] | every kind, one scheme | top |
//! | [`CompositeHandler`] | COPY and MOVE across registered schemes | fallback |

mod composite;
mod primitive;
pub(crate) mod transfer;

pub use composite::CompositeHandler;
pub use primitive::PrimitiveHandler;

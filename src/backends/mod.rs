//! Reference backends.
//!
//! | Provider | Scheme | Connections |
//! |----------|--------|-------------|
//! | [`LocalProvider`] | `file` | none, direct `std::fs` calls |
//! | [`MemoryProvider`] | `mem` | pooled per authority |

mod local;
mod memory;

pub use local::LocalProvider;
pub use memory::{
    MEMORY_SCHEME, MemoryConnection, MemoryConnector, MemoryNetwork, MemoryProvider, MemoryServer,
};

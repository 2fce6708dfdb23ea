//! The counter store: id resolution, bulk writes, day queries and the
//! error channel that carries their failures.

pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod events;
pub mod query;
pub mod resolver;

pub use bootstrap::SchemaBootstrap;
pub use engine::CounterStore;
pub use error::{ErrorKind, StoreError};
pub use events::{ErrorChannel, ErrorEvent};
pub use query::CounterQuery;
pub use resolver::{IdResolver, NameCache};

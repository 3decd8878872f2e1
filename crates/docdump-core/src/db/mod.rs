//! Database handle abstraction and implementations.
//!
//! The engine only ever talks to a database through [`DocumentDatabase`]:
//!
//! - **Memory**: in-process database (tests, embedding)
//! - **MongoDB**: official driver, behind the `mongodb` feature

mod backend;
mod memory;
#[cfg(feature = "mongodb")]
mod mongo;

pub use backend::{is_primary_key_index, DocumentDatabase, DocumentStream, PRIMARY_KEY_INDEX};
pub use memory::MemoryDatabase;
#[cfg(feature = "mongodb")]
pub use mongo::MongoDatabase;

//! Remote key-management namespace.
//!
//! One flat collection per family, addressed by `(family, name)`. The HTTP
//! store talks to a real server; the memory store implements the same
//! contract in-process.

pub mod http;
pub mod memory;
pub mod store;

pub use http::{HttpKeyStore, HttpStoreConfig};
pub use memory::{MemoryKeyStore, StoreCall};
pub use store::RemoteStore;

//! Keyed, TTL-bounded storage for run metadata and registered files.
//!
//! - `store`: the [`KvStore`] contract plus the in-process [`MemoryKvStore`]
//! - `runs`: [`RunRegistry`], the run records shared by control plane and engine

pub mod runs;
pub mod store;

pub use runs::{RegistryCancellation, RunRegistry};
pub use store::{KvStore, MemoryKvStore, Ttl};

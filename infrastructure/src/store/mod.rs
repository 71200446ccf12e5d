//! Resource store adapters
//!
//! [`InMemoryResourceStore`] keeps every declarative resource in process.
//! It is filled from a TOML [`Manifest`], which is validated as a whole
//! before anything is inserted.

mod manifest;
mod memory_store;

pub use manifest::{Manifest, ManifestError, QueryInput, QueryManifest};
pub use memory_store::InMemoryResourceStore;

//! Conversation memory backed by an external HTTP service.

mod http;

pub use http::{HttpMemory, HttpMemoryFactory};

//! Queries and their targets

pub mod entities;
pub mod selector;

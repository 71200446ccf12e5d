//! Core domain primitives shared by every module

pub mod error;

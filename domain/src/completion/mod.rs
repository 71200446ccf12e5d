//! Completion model: unary results, streaming chunks and their assembly.

pub mod assembler;
pub mod chunk;
pub mod entities;

pub use assembler::{Assembled, StreamAssembler};
pub use chunk::{Chunk, ChunkChoice, Delta, ToolCallDelta};
pub use entities::{Choice, Completion, FinishReason, TokenUsage};

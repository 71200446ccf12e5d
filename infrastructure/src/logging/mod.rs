//! Logging infrastructure: streamed query events.
//!
//! Provides [`JsonlEventStreamFactory`], a JSONL file writer that implements
//! the [`EventStreamFactory`](conductor_application::EventStreamFactory) port.

mod jsonl_event_stream;

pub use jsonl_event_stream::{JsonlEventStream, JsonlEventStreamFactory};

//! JSONL file writer for streamed query events.
//!
//! Every chunk, completion notification and close of every streaming query
//! becomes one JSON line with a `type`, the query identity and a
//! `timestamp`. All queries share one append-only file.

use async_trait::async_trait;
use conductor_application::ports::event_stream::{
    ChunkSink, EventStream, EventStreamFactory, SinkError,
};
use conductor_domain::{Chunk, Query};
use serde_json::{Value, json};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

type SharedWriter = Arc<Mutex<BufWriter<File>>>;

/// Creates one [`JsonlEventStream`] per streaming query.
pub struct JsonlEventStreamFactory {
    writer: SharedWriter,
    path: PathBuf,
}

impl JsonlEventStreamFactory {
    /// Open (or create) the file at `path` for appending.
    ///
    /// Creates parent directories if they don't exist.
    /// Returns `None` if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create event log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open event log file {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the event file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventStreamFactory for JsonlEventStreamFactory {
    async fn create(&self, query: &Query) -> Result<Arc<dyn EventStream>, SinkError> {
        debug!("Opening event stream for query {}", query.key);
        Ok(Arc::new(JsonlEventStream {
            writer: Arc::clone(&self.writer),
            query: query.key.to_string(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Event stream of one query.
pub struct JsonlEventStream {
    writer: SharedWriter,
    query: String,
    closed: AtomicBool,
}

impl JsonlEventStream {
    fn write(&self, event_type: &str, data: Option<Value>) -> Result<(), SinkError> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut record = json!({
            "type": event_type,
            "query": self.query,
            "timestamp": timestamp,
        });
        if let (Some(data), Value::Object(map)) = (data, &mut record) {
            map.insert("data".to_string(), data);
        }

        let line = serde_json::to_string(&record).map_err(|e| SinkError::Write(e.to_string()))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SinkError::Write("event log writer poisoned".to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| SinkError::Write(e.to_string()))?;
        // Append-only; flush every record so readers can tail the file.
        writer.flush().map_err(|e| SinkError::Write(e.to_string()))
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkSink for JsonlEventStream {
    async fn on_chunk(&self, chunk: &Chunk) -> Result<(), SinkError> {
        self.ensure_open()?;
        let data = serde_json::to_value(chunk).map_err(|e| SinkError::Write(e.to_string()))?;
        self.write("chunk", Some(data))
    }
}

#[async_trait]
impl EventStream for JsonlEventStream {
    async fn notify_completion(&self) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.write("completed", None)
    }

    async fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.write("closed", None)
    }
}

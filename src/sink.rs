//! Event sinks: where the simulation's output stream goes.
//!
//! The driver only knows the two-operation contract: `write` accepts one
//! event and may buffer, `flush` commits at end of run. A sink shared across
//! workers synchronizes internally; the driver never locks.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;

use crate::event::Event;

/// Errors surfaced by sink construction and flushing.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Abstract event consumer.
///
/// `write` must not block indefinitely and may buffer; failures are the
/// sink's concern and are reported, at the latest, from `flush`.
pub trait EventSink: Send + Sync {
    fn write(&self, event: &Event);
    fn flush(&self) -> Result<(), SinkError>;
}

/// Discards every event. The default when no log path is configured.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn write(&self, _event: &Event) {}

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

struct LogInner {
    writer: BufWriter<File>,
    scratch: Vec<u8>,
    first_error: Option<io::Error>,
}

/// Append-only binary log of length-framed event records.
///
/// Safe to share across workers; writes serialize on an internal mutex.
/// An I/O error during `write` is stashed and returned by the next `flush`.
pub struct BinaryLogSink {
    inner: Mutex<LogInner>,
}

impl BinaryLogSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Mutex::new(LogInner {
                writer: BufWriter::new(file),
                scratch: Vec::with_capacity(256),
                first_error: None,
            }),
        })
    }
}

impl EventSink for BinaryLogSink {
    fn write(&self, event: &Event) {
        let mut inner = self.inner.lock().expect("log sink poisoned");
        inner.scratch.clear();
        event.encode_framed(&mut inner.scratch);
        let LogInner { writer, scratch, first_error } = &mut *inner;
        if let Err(err) = writer.write_all(scratch.as_slice()) {
            first_error.get_or_insert(err);
        }
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().expect("log sink poisoned");
        if let Some(err) = inner.first_error.take() {
            return Err(err.into());
        }
        inner.writer.flush()?;
        Ok(())
    }
}

/// Captures the framed byte stream in memory. Used by tests that compare
/// event streams across runs.
#[derive(Default)]
pub struct MemorySink {
    bytes: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The framed stream written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().expect("memory sink poisoned").clone()
    }

    /// Decode the captured stream back into events.
    pub fn events(&self) -> Vec<Event> {
        let bytes = self.bytes();
        let mut events = Vec::new();
        let mut off = 0;
        while off < bytes.len() {
            let (event, used) = Event::decode_framed(&bytes[off..])
                .expect("memory sink holds a well-formed stream");
            events.push(event);
            off += used;
        }
        events
    }
}

impl EventSink for MemorySink {
    fn write(&self, event: &Event) {
        let mut bytes = self.bytes.lock().expect("memory sink poisoned");
        event.encode_framed(&mut bytes);
    }

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Factory mirroring the CLI convention: no path means discard.
pub fn open_sink(path: Option<&Path>) -> Result<Box<dyn EventSink>, SinkError> {
    match path {
        None => Ok(Box::new(NullSink)),
        Some(path) => Ok(Box::new(BinaryLogSink::create(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, Side};

    fn sample(ts: u64) -> Event {
        Event {
            ts_ns: ts,
            kind: EventKind::OrderAdd,
            symbol: "AAPL".to_owned(),
            price: 100.5,
            qty: 3,
            side: Side::Buy,
        }
    }

    #[test]
    fn test_null_sink() {
        let sink = NullSink;
        sink.write(&sample(1));
        assert!(sink.flush().is_ok());
    }

    #[test]
    fn test_memory_sink_roundtrip() {
        let sink = MemorySink::new();
        sink.write(&sample(1));
        sink.write(&sample(2));
        sink.flush().unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], sample(1));
        assert_eq!(events[1], sample(2));
    }

    #[test]
    fn test_binary_log_sink_writes_framed_stream() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("mktsim-sink-test-{}.bin", std::process::id()));

        let sink = BinaryLogSink::create(&path).unwrap();
        sink.write(&sample(7));
        sink.write(&sample(8));
        sink.flush().unwrap();
        drop(sink);

        let bytes = std::fs::read(&path).unwrap();
        let (first, used) = Event::decode_framed(&bytes).unwrap();
        let (second, used2) = Event::decode_framed(&bytes[used..]).unwrap();
        assert_eq!(first, sample(7));
        assert_eq!(second, sample(8));
        assert_eq!(used + used2, bytes.len());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_sink_defaults_to_null() {
        let sink = open_sink(None).unwrap();
        sink.write(&sample(1));
        assert!(sink.flush().is_ok());
    }
}

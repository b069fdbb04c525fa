//! Lumen Vault - Progress Reporting & Cancellation
//!
//! Long-running operations report through an explicit callback sink and
//! are cancelled through an explicit token checked between chunk
//! boundaries. No reactive machinery: the embedder hands in a closure
//! and polls or forwards updates however it likes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Cooperative cancellation flag, checked between chunks.
///
/// Cancellation is never mid-chunk: partial-state guarantees (no
/// half-written destination files, no partially-authenticated
/// plaintext) hold at chunk granularity.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of a long-running operation's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub bytes_processed: u64,
    pub bytes_total: u64,
    pub items_processed: u64,
    pub items_total: u64,
    pub status: String,
}

/// Minimum wall-clock interval between throttled emissions
const MIN_EMIT_INTERVAL: Duration = Duration::from_millis(200);

/// Byte jump that forces an emission regardless of the interval
const FORCE_EMIT_BYTES: u64 = 16 * 1024 * 1024;

struct SinkState {
    current: Progress,
    last_emit: Option<Instant>,
    last_emit_bytes: u64,
}

/// Throttled progress sink wrapping a caller-supplied callback.
///
/// Byte updates arrive once per 4 MiB chunk, which would flood an
/// observer on fast disks; emissions are throttled by time and byte
/// delta. The final update from [`ProgressSink::finish`] is always
/// delivered with exact completion values, before the operation
/// returns.
pub struct ProgressSink {
    callback: Box<dyn Fn(&Progress) + Send + Sync>,
    state: Mutex<SinkState>,
}

impl ProgressSink {
    pub fn new(callback: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            state: Mutex::new(SinkState {
                current: Progress::default(),
                last_emit: None,
                last_emit_bytes: 0,
            }),
        }
    }

    /// Start a new operation. Always emits.
    pub fn begin(&self, bytes_total: u64, items_total: u64, status: &str) {
        let mut st = self.state.lock();
        st.current = Progress {
            bytes_processed: 0,
            bytes_total,
            items_processed: 0,
            items_total,
            status: status.to_string(),
        };
        st.last_emit = Some(Instant::now());
        st.last_emit_bytes = 0;
        (self.callback)(&st.current);
    }

    /// Update cumulative bytes processed. Throttled.
    pub fn bytes(&self, bytes_processed: u64) {
        let mut st = self.state.lock();
        st.current.bytes_processed = bytes_processed;

        let interval_due = st
            .last_emit
            .map_or(true, |t| t.elapsed() >= MIN_EMIT_INTERVAL);
        let byte_jump = bytes_processed.saturating_sub(st.last_emit_bytes) >= FORCE_EMIT_BYTES;
        if interval_due || byte_jump {
            st.last_emit = Some(Instant::now());
            st.last_emit_bytes = bytes_processed;
            (self.callback)(&st.current);
        }
    }

    /// Mark an item as finished. Item boundaries are coarse enough to
    /// always emit.
    pub fn item_done(&self, items_processed: u64, status: &str) {
        let mut st = self.state.lock();
        st.current.items_processed = items_processed;
        st.current.status = status.to_string();
        st.last_emit = Some(Instant::now());
        st.last_emit_bytes = st.current.bytes_processed;
        (self.callback)(&st.current);
    }

    /// Final update with exact completion values. Always emits, and is
    /// guaranteed to precede the operation's return.
    pub fn finish(&self, status: &str) {
        let mut st = self.state.lock();
        st.current.bytes_processed = st.current.bytes_total;
        st.current.items_processed = st.current.items_total;
        st.current.status = status.to_string();
        (self.callback)(&st.current);
    }

    /// Current snapshot, for poll-style observers.
    pub fn snapshot(&self) -> Progress {
        self.state.lock().current.clone()
    }
}

//! In-memory recorders for what the bridge sends and logs.
//!
//! - [`RecordingChannel`] is a [`Channel`] that keeps everything posted to
//!   it.
//! - [`LogCapture`] is a `tracing_subscriber` writer that keeps formatted log
//!   lines.
//!
//! Used by integration tests and by embedders that want to inspect traffic
//! without a real hosting page.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use mapframe_core::{OutboundMessage, Response};
use tracing_subscriber::fmt::MakeWriter;

use crate::domain::{Channel, ChannelError, TargetOrigin};

/// A channel that stores every posted message in order.
pub struct RecordingChannel {
    sent: Mutex<Vec<(OutboundMessage, TargetOrigin)>>,
    connected: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    fn sent(&self) -> MutexGuard<'_, Vec<(OutboundMessage, TargetOrigin)>> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every posted message with its target, oldest first.
    pub fn messages(&self) -> Vec<(OutboundMessage, TargetOrigin)> {
        self.sent().clone()
    }

    /// Only the paired responses, oldest first.
    pub fn responses(&self) -> Vec<Response> {
        self.sent()
            .iter()
            .filter_map(|(m, _)| m.as_response().cloned())
            .collect()
    }

    /// Messages whose wire `type` equals `kind`.
    pub fn of_kind(&self, kind: &str) -> Vec<(OutboundMessage, TargetOrigin)> {
        self.sent()
            .iter()
            .filter(|(m, _)| m.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent().is_empty()
    }

    pub fn clear(&self) {
        self.sent().clear();
    }

    /// Simulates the hosting page going away: later posts fail with
    /// [`ChannelError::NoRecipient`].
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for RecordingChannel {
    fn post(&self, message: OutboundMessage, target: TargetOrigin) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(ChannelError::NoRecipient);
        }
        self.sent().push((message, target));
        Ok(())
    }
}

// ── Log capture ───────────────────────────────────────────────────────────────

/// Shared buffer of formatted log output.
///
/// # Example
///
/// ```rust
/// use mapframe_bridge::infrastructure::recording::LogCapture;
///
/// let logs = LogCapture::new();
/// let subscriber = tracing_subscriber::fmt()
///     .with_writer(logs.clone())
///     .with_ansi(false)
///     .finish();
/// tracing::subscriber::with_default(subscriber, || tracing::warn!("careful"));
/// assert!(logs.contents().contains("WARN"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Runs `f` with a plain-text subscriber writing into this buffer.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

//! Packet sinks
//!
//! Sinks are the downstream end of a session. A sink failure is reported to
//! the caller and never touches session state.

use crate::error::ComputeError;
use crate::packet::SignalPacket;
use crossbeam_channel::{Sender, TrySendError};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Receives every assembled packet
pub trait PacketSink {
    fn send(&mut self, packet: &SignalPacket) -> Result<(), ComputeError>;

    /// Flush buffered output, if any
    fn flush(&mut self) -> Result<(), ComputeError> {
        Ok(())
    }
}

/// Writes one compact JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PacketSink for JsonLinesSink<W> {
    fn send(&mut self, packet: &SignalPacket) -> Result<(), ComputeError> {
        serde_json::to_writer(&mut self.writer, packet)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ComputeError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards packets into a bounded channel, dropping when the reader lags
pub struct QueueSink {
    tx: Sender<SignalPacket>,
    dropped: Arc<AtomicU64>,
}

impl QueueSink {
    pub fn new(tx: Sender<SignalPacket>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared drop counter
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PacketSink for QueueSink {
    fn send(&mut self, packet: &SignalPacket) -> Result<(), ComputeError> {
        match self.tx.try_send(packet.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "packet queue full, dropping packet");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(ComputeError::EncodingError(
                "packet queue receiver disconnected".to_string(),
            )),
        }
    }
}

//! Frame queue and consumer loop
//!
//! The transport callback pushes [`RawFrame`]s into a bounded queue and returns
//! immediately. A single consumer drains the queue into a [`MonitoringSession`]
//! and fans packets out to sinks. When the consumer falls behind, the oldest
//! frames are discarded so the newest data always gets through.

use crate::decoder::RawFrame;
use crate::error::{ComputeError, ConfigError};
use crate::session::MonitoringSession;
use crate::sink::PacketSink;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What happened to a pushed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after discarding the oldest frame
    EvictedOldest,
    /// The queue is gone; the frame was discarded
    Closed,
}

/// Producer half. Cheap to clone; the consumer stops once every clone is
/// dropped.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: Sender<RawFrame>,
    evict: Receiver<RawFrame>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

/// Consumer half. Dropping it closes the queue for every sender.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: Receiver<RawFrame>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Create a bounded drop-oldest queue
pub fn frame_queue(capacity: usize) -> Result<(FrameSender, FrameReceiver), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::QueueCapacity);
    }
    let (tx, rx) = bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    Ok((
        FrameSender {
            tx,
            evict: rx.clone(),
            dropped: Arc::clone(&dropped),
            closed: Arc::clone(&closed),
        },
        FrameReceiver { rx, dropped, closed },
    ))
}

impl FrameSender {
    /// Enqueue without blocking
    pub fn push(&self, frame: RawFrame) -> PushOutcome {
        // `evict` keeps the channel connected, so the consumer's departure is
        // tracked separately.
        if self.is_closed() {
            return PushOutcome::Closed;
        }
        let mut frame = frame;
        let mut outcome = PushOutcome::Queued;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return outcome,
                Err(TrySendError::Full(rejected)) => {
                    if self.evict.try_recv().is_ok() {
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!(dropped, "frame queue full, evicted oldest frame");
                        outcome = PushOutcome::EvictedOldest;
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return PushOutcome::Closed,
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once the consumer half has been dropped
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl FrameReceiver {
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Totals from one consumer run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerReport {
    pub frames_processed: u64,
    pub decode_errors: u64,
    pub sink_errors: u64,
    pub transitions: u64,
    /// Frames evicted by the producer side
    pub frames_dropped: u64,
}

/// Drain frames into the session until every sender is dropped. Bad frames and
/// failing sinks are logged and skipped.
pub fn run_consumer(
    receiver: &FrameReceiver,
    session: &mut MonitoringSession,
    sinks: &mut [Box<dyn PacketSink + Send>],
) -> ConsumerReport {
    let mut report = ConsumerReport::default();

    for frame in receiver.rx.iter() {
        let update = match session.ingest_frame(&frame) {
            Ok(update) => update,
            Err(e) => {
                report.decode_errors += 1;
                warn!(error = %e, len = frame.bytes.len(), "dropping undecodable frame");
                continue;
            }
        };
        report.frames_processed += 1;
        if update.transitioned {
            report.transitions += 1;
        }

        for sink in sinks.iter_mut() {
            if let Err(e) = sink.send(&update.packet) {
                report.sink_errors += 1;
                warn!(error = %e, "sink rejected packet");
            }
        }
    }

    for sink in sinks.iter_mut() {
        if let Err(e) = sink.flush() {
            report.sink_errors += 1;
            warn!(error = %e, "sink flush failed");
        }
    }

    report.frames_dropped = receiver.dropped();
    info!(
        frames = report.frames_processed,
        decode_errors = report.decode_errors,
        dropped = report.frames_dropped,
        "consumer finished"
    );
    report
}

/// Run [`run_consumer`] on a dedicated thread. Joining hands the session back.
pub fn spawn_consumer(
    receiver: FrameReceiver,
    mut session: MonitoringSession,
    mut sinks: Vec<Box<dyn PacketSink + Send>>,
) -> Result<JoinHandle<(MonitoringSession, ConsumerReport)>, ComputeError> {
    let handle = thread::Builder::new()
        .name("ringstress-consumer".to_string())
        .spawn(move || {
            let report = run_consumer(&receiver, &mut session, &mut sinks);
            (session, report)
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UatrConfig;
    use crate::packet::SignalPacket;
    use crate::sink::QueueSink;
    use pretty_assertions::assert_eq;

    fn frame(stress: u8, ts: f64) -> RawFrame {
        let mut bytes = vec![0u8; 20];
        bytes[14] = stress;
        RawFrame::new(bytes, Some(ts))
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(frame_queue(0).unwrap_err(), ConfigError::QueueCapacity);
    }

    #[test]
    fn test_push_evicts_oldest() {
        let (tx, rx) = frame_queue(2).unwrap();
        assert_eq!(tx.push(frame(1, 1.0)), PushOutcome::Queued);
        assert_eq!(tx.push(frame(2, 2.0)), PushOutcome::Queued);
        assert_eq!(tx.push(frame(3, 3.0)), PushOutcome::EvictedOldest);

        assert_eq!(rx.len(), 2);
        assert_eq!(rx.dropped(), 1);
        let kept: Vec<Option<f64>> = rx.rx.try_iter().map(|f| f.received_at).collect();
        assert_eq!(kept, vec![Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_push_after_consumer_dropped_is_closed() {
        let (tx, rx) = frame_queue(2).unwrap();
        assert_eq!(tx.push(frame(1, 1.0)), PushOutcome::Queued);
        drop(rx);

        assert!(tx.is_closed());
        let outcomes: Vec<PushOutcome> = (0..4).map(|i| tx.push(frame(2, i as f64))).collect();
        assert_eq!(outcomes, vec![PushOutcome::Closed; 4]);
        assert_eq!(tx.dropped(), 0);
    }

    #[test]
    fn test_consumer_survives_bad_frames() {
        let (tx, rx) = frame_queue(16).unwrap();
        tx.push(frame(100, 1.0));
        tx.push(RawFrame::new(vec![0u8; 3], Some(2.0)));
        tx.push(frame(120, 3.0));
        drop(tx);

        let (packet_tx, packet_rx) = bounded::<SignalPacket>(16);
        let mut sinks: Vec<Box<dyn PacketSink + Send>> = vec![Box::new(QueueSink::new(packet_tx))];
        let mut session = MonitoringSession::new("ring", None, UatrConfig::default());

        let report = run_consumer(&rx, &mut session, &mut sinks);
        assert_eq!(report.frames_processed, 2);
        assert_eq!(report.decode_errors, 1);
        assert_eq!(report.sink_errors, 0);

        let timestamps: Vec<f64> = packet_rx.try_iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![1.0, 3.0]);
        assert_eq!(session.stats().frames_rejected, 1);
    }

    #[test]
    fn test_spawned_consumer_returns_session() {
        let (tx, rx) = frame_queue(64).unwrap();
        let session = MonitoringSession::new("ring", Some("s-3".to_string()), UatrConfig::default());
        let handle = spawn_consumer(rx, session, Vec::new()).unwrap();

        for t in 0..10 {
            tx.push(frame(50, t as f64));
        }
        drop(tx);

        let (session, report) = handle.join().unwrap();
        assert_eq!(report.frames_processed + report.frames_dropped, 10);
        assert_eq!(session.stats().frames_ingested, report.frames_processed);
    }
}

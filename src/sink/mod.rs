//! Batch consumers: network streaming and file recording
//!
//! Every sink runs the same coalescing loop ([`run_sink`]):
//!
//! 1. Block on the queue for up to `pop_timeout`; on timeout re-check stop.
//! 2. After the first batch, wait `coalesce_window`, then take every batch
//!    already queued without blocking, concatenated in arrival order.
//! 3. Hand the combined batch to the sink in one call.
//!
//! A failed delivery is logged and the combined batch dropped. Nothing is
//! retried or re-queued.

mod persist;
mod stream;

pub use persist::{default_record_path, FileSink};
pub use stream::{TcpSink, UdpSink};

use crate::config::SinkTarget;
use crate::error::Result;
use crate::queue::{BatchConsumer, Pop};
use crate::sample::MeasurementPoint;
use crate::supervisor::StopSignal;
use std::thread;
use std::time::{Duration, Instant};

/// Default blocking pop timeout
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Default coalescing window
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(100);

/// Destination for coalesced batches
pub trait Sink {
    /// Short label for logs
    fn name(&self) -> &'static str;

    /// Write or send one coalesced batch
    ///
    /// `received` is when the first batch of the group was popped.
    fn deliver(&mut self, points: &[MeasurementPoint], received: Instant) -> Result<()>;

    /// Called once when the loop ends
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn deliver(&mut self, points: &[MeasurementPoint], received: Instant) -> Result<()> {
        (**self).deliver(points, received)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Open the sink a target describes
///
/// A TCP target connects here, so an unreachable receiver fails now.
pub fn open_sink(target: &SinkTarget) -> Result<Box<dyn Sink>> {
    Ok(match target {
        SinkTarget::Udp(addr) => Box::new(UdpSink::new(*addr)?),
        SinkTarget::Tcp(addr) => Box::new(TcpSink::connect(*addr)?),
        SinkTarget::File(path) => Box::new(FileSink::create(path)?),
    })
}

/// Timing of the coalescing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkSettings {
    pub pop_timeout: Duration,
    pub coalesce_window: Duration,
    /// Stop on our own after this long
    pub max_duration: Option<Duration>,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            pop_timeout: DEFAULT_POP_TIMEOUT,
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            max_duration: None,
        }
    }
}

/// Counters returned when a sink loop ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Successful deliveries (packets sent or groups written)
    pub deliveries: u64,
    pub points: u64,
    /// Coalesced batches lost to a failed delivery
    pub dropped: u64,
    pub dropped_points: u64,
    /// The closing write or flush failed
    pub finish_failed: bool,
}

/// Drive `sink` from `consumer` until `stop` is set or the run duration elapses
pub fn run_sink<S: Sink + ?Sized>(
    sink: &mut S,
    consumer: &BatchConsumer,
    settings: &SinkSettings,
    stop: &StopSignal,
) -> Result<SinkStats> {
    let started = Instant::now();
    let mut stats = SinkStats::default();
    let mut producer_gone = false;

    log::info!("{} sink started", sink.name());

    while !stop.is_stopped() {
        if let Some(limit) = settings.max_duration {
            if started.elapsed() >= limit {
                log::info!("{} sink reached its {:?} run limit", sink.name(), limit);
                break;
            }
        }

        let mut combined = match consumer.pop(settings.pop_timeout) {
            Pop::Batch(batch) => batch,
            Pop::Timeout => continue,
            Pop::Disconnected => {
                if !producer_gone {
                    log::warn!("{} sink: acquisition has ended, waiting for stop", sink.name());
                    producer_gone = true;
                }
                thread::sleep(settings.pop_timeout);
                continue;
            }
        };
        let received = Instant::now();

        thread::sleep(settings.coalesce_window);
        let merged = consumer.drain_into(&mut combined);

        match sink.deliver(&combined, received) {
            Ok(()) => {
                log::debug!(
                    "{} sink delivered {} points ({} batches)",
                    sink.name(),
                    combined.len(),
                    merged + 1
                );
                stats.deliveries += 1;
                stats.points += combined.len() as u64;
            }
            Err(e) => {
                log::warn!(
                    "{} sink dropped {} points: {}",
                    sink.name(),
                    combined.len(),
                    e
                );
                stats.dropped += 1;
                stats.dropped_points += combined.len() as u64;
            }
        }
    }

    if let Err(e) = sink.finish() {
        log::error!("{} sink failed to finish: {}", sink.name(), e);
        stats.finish_failed = true;
    }
    log::info!(
        "{} sink stopped: {} deliveries, {} points, {} dropped",
        sink.name(),
        stats.deliveries,
        stats.points,
        stats.dropped
    );
    Ok(stats)
}

/// Sink that records deliveries in memory
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    pub deliveries: std::sync::Arc<std::sync::Mutex<Vec<Vec<MeasurementPoint>>>>,
    pub fail: std::sync::Arc<std::sync::atomic::AtomicBool>,
    pub finished: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn delivered(&self) -> Vec<Vec<MeasurementPoint>> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "Recording"
    }

    fn deliver(&mut self, points: &[MeasurementPoint], _received: Instant) -> Result<()> {
        use std::sync::atomic::Ordering;
        if self.fail.load(Ordering::Relaxed) {
            return Err(crate::error::ImuError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "send failed",
            )));
        }
        self.deliveries.lock().unwrap().push(points.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        use std::sync::atomic::Ordering;
        self.finished.store(true, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            return Err(crate::error::ImuError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "flush failed",
            )));
        }
        Ok(())
    }
}

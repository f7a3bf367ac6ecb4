//! Acquisition loop
//!
//! The only code that touches the sensor buses once streaming starts. Each
//! cycle drains every device's FIFO and pushes non-empty batches onto the
//! sample queue, one push per device, then sleeps for the poll interval.

use crate::device::{DeviceState, Icm20689};
use crate::error::{ImuError, Result};
use crate::queue::BatchProducer;
use crate::supervisor::StopSignal;
use crate::transport::RegisterBus;
use std::thread;
use std::time::Duration;

/// Default sleep between polling cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Counters returned when the loop ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub cycles: u64,
    pub batches: u64,
    pub points: u64,
    pub overflow_warnings: u64,
    /// Sensor ids dropped from the rotation after a bus error
    pub failed_devices: Vec<i32>,
}

/// Polls a set of sensors into a batch queue
pub struct AcquisitionLoop<B: RegisterBus> {
    devices: Vec<Icm20689<B>>,
    producer: BatchProducer,
    poll_interval: Duration,
}

impl<B: RegisterBus> AcquisitionLoop<B> {
    pub fn new(devices: Vec<Icm20689<B>>, producer: BatchProducer) -> Self {
        Self {
            devices,
            producer,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Enable the FIFO on every device not yet streaming
    ///
    /// Devices that fail are logged and removed.
    fn start_devices(&mut self, stats: &mut AcquisitionStats) {
        self.devices.retain_mut(|device| {
            if device.state() == DeviceState::Streaming {
                return true;
            }
            match device.enable_fifo() {
                Ok(()) => true,
                Err(e) => {
                    log::error!("Sensor {} failed to start: {}", device.sensor_id(), e);
                    stats.failed_devices.push(device.sensor_id());
                    false
                }
            }
        });
    }

    /// Run until `stop` is set or every device has failed
    ///
    /// The stop flag is checked once per cycle, before any bus access.
    pub fn run(mut self, stop: &StopSignal) -> Result<AcquisitionStats> {
        let mut stats = AcquisitionStats::default();
        self.start_devices(&mut stats);

        log::info!(
            "Acquisition started: {} sensors, poll interval {:?}",
            self.devices.len(),
            self.poll_interval
        );

        let mut consumer_gone = false;

        while !stop.is_stopped() {
            if self.devices.is_empty() {
                log::error!("No sensors left to poll");
                return Err(ImuError::AllDevicesFailed);
            }

            let producer = &self.producer;
            self.devices.retain_mut(|device| match device.drain_fifo_detailed() {
                Ok(drain) => {
                    if drain.overflow_risk {
                        stats.overflow_warnings += 1;
                    }
                    if !drain.batch.is_empty() {
                        stats.batches += 1;
                        stats.points += drain.batch.len() as u64;
                        if !producer.push(drain.batch) && !consumer_gone {
                            log::warn!("Sample queue consumer is gone; batches are being discarded");
                            consumer_gone = true;
                        }
                    }
                    true
                }
                Err(e) => {
                    log::error!("Sensor {} removed after read failure: {}", device.sensor_id(), e);
                    stats.failed_devices.push(device.sensor_id());
                    false
                }
            });

            stats.cycles += 1;
            thread::sleep(self.poll_interval);
        }

        log::info!(
            "Acquisition stopped after {} cycles ({} points, {} overflow warnings)",
            stats.cycles,
            stats.points,
            stats.overflow_warnings
        );
        Ok(stats)
    }
}

//! Streamer configuration
//!
//! Built once at start-up (the binaries map command-line flags onto it)
//! and validated before any hardware is touched.

use crate::acquisition::DEFAULT_POLL_INTERVAL;
use crate::device::{MAX_SAMPLE_RATE_HZ, MIN_SAMPLE_RATE_HZ};
use crate::error::{ImuError, Result};
use crate::registers::{AccelRange, GyroRange};
use crate::sink::{SinkSettings, DEFAULT_COALESCE_WINDOW, DEFAULT_POP_TIMEOUT};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Default UDP/TCP receiver
pub const DEFAULT_ENDPOINT: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 200), 1025));

/// I2C clock for the select-line variant (400 kHz fast mode)
pub const DEFAULT_I2C_CLOCK_HZ: u32 = 400_000;

/// SPI clock for the burst variant
pub const DEFAULT_SPI_CLOCK_HZ: u32 = 1_000_000;

/// One sensor on the bus
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub sensor_id: i32,
    /// FT232H high-byte GPIO driving this sensor's select line
    pub select_pin: u8,
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub sample_rate_hz: u32,
}

impl DeviceConfig {
    /// Sensor with the deployment defaults (±8 g, ±2000 °/s, 100 Hz)
    pub fn new(sensor_id: i32, select_pin: u8) -> Self {
        Self {
            sensor_id,
            select_pin,
            accel_range: AccelRange::G8,
            gyro_range: GyroRange::Dps2000,
            sample_rate_hz: 100,
        }
    }
}

/// Register transport variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    /// Shared I2C address, one select pin per sensor, no burst reads
    I2c,
    /// SPI with one chip select per sensor and burst FIFO reads
    Spi,
}

/// Where coalesced batches go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Udp(SocketAddr),
    Tcp(SocketAddr),
    File(PathBuf),
}

/// Complete streamer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerConfig {
    pub devices: Vec<DeviceConfig>,
    pub bus: BusKind,
    /// MPSSE channel index
    pub channel: u32,
    pub clock_hz: u32,
    pub poll_interval: Duration,
    pub coalesce_window: Duration,
    pub pop_timeout: Duration,
    /// Stop after this long; runs until interrupted when `None`
    pub run_duration: Option<Duration>,
    pub sink: SinkTarget,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            devices: (1..=4).map(|id| DeviceConfig::new(id, (id - 1) as u8)).collect(),
            bus: BusKind::Spi,
            channel: 0,
            clock_hz: DEFAULT_SPI_CLOCK_HZ,
            poll_interval: DEFAULT_POLL_INTERVAL,
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            pop_timeout: DEFAULT_POP_TIMEOUT,
            run_duration: None,
            sink: SinkTarget::Udp(DEFAULT_ENDPOINT),
        }
    }
}

impl StreamerConfig {
    /// Check the configuration before opening hardware
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(ImuError::InvalidParameter("At least one device is required".into()));
        }

        let mut ids = HashSet::new();
        let mut pins = HashSet::new();
        for device in &self.devices {
            if device.sensor_id <= 0 {
                return Err(ImuError::InvalidParameter(format!(
                    "Sensor id must be positive, got {}",
                    device.sensor_id
                )));
            }
            if !ids.insert(device.sensor_id) {
                return Err(ImuError::InvalidParameter(format!(
                    "Duplicate sensor id {}",
                    device.sensor_id
                )));
            }
            if device.select_pin > 7 {
                return Err(ImuError::InvalidParameter(format!(
                    "Select pin must be 0-7, got {}",
                    device.select_pin
                )));
            }
            if !pins.insert(device.select_pin) {
                return Err(ImuError::InvalidParameter(format!(
                    "Select pin {} is used twice",
                    device.select_pin
                )));
            }
            if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&device.sample_rate_hz) {
                return Err(ImuError::InvalidParameter(format!(
                    "Sensor {} sample rate must be {}-{} Hz, got {}",
                    device.sensor_id, MIN_SAMPLE_RATE_HZ, MAX_SAMPLE_RATE_HZ, device.sample_rate_hz
                )));
            }
        }

        if self.clock_hz == 0 {
            return Err(ImuError::InvalidParameter("Bus clock must be non-zero".into()));
        }
        if self.pop_timeout.is_zero() {
            return Err(ImuError::InvalidParameter("Queue pop timeout must be non-zero".into()));
        }
        if self.run_duration.is_some_and(|d| d.is_zero()) {
            return Err(ImuError::InvalidParameter("Run duration must be non-zero".into()));
        }
        Ok(())
    }

    /// Coalescing-loop settings for the sink
    pub fn sink_settings(&self) -> SinkSettings {
        SinkSettings {
            pop_timeout: self.pop_timeout,
            coalesce_window: self.coalesce_window,
            max_duration: self.run_duration,
        }
    }
}

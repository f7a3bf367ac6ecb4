//! Multi-sensor ICM-20689 acquisition and streaming over FT232H
//!
//! Several ICM-20689 IMUs share one FT232H (I2C with a select pin per
//! sensor, or SPI with a chip select per sensor). An acquisition thread
//! drains each sensor's hardware FIFO into batches; a sink thread coalesces
//! queued batches and streams them over UDP/TCP or records them to a file.
//!
//! # Quick Start
//!
//! ## Driving a sensor directly
//! ```ignore
//! use ft232_imu_streamer::{AccelRange, GyroRange, Icm20689, MpsseChannel, SpiBus};
//!
//! let channel = MpsseChannel::open_spi(0, 1_000_000)?;
//! let mut sensor = Icm20689::new(1, SpiBus::new(channel, 0)?)?;
//! sensor.verify_identity()?;
//! sensor.configure(AccelRange::G8, GyroRange::Dps2000, 100)?;
//!
//! let reading = sensor.read_all()?;
//! println!("Accel X: {:.2} m/s²", reading.accel.x);
//! println!("Gyro Z: {:.2}°/s", reading.gyro.z);
//! println!("Temp: {:.1}°C", reading.temperature);
//! ```
//!
//! ## Streaming pipeline
//! ```ignore
//! use ft232_imu_streamer::{sample_queue, AcquisitionLoop, Supervisor, UdpSink, SinkSettings};
//!
//! let (producer, consumer) = sample_queue();
//! let acquisition = AcquisitionLoop::new(sensors, producer);
//!
//! let supervisor = Supervisor::new();
//! supervisor.install_termination_handler()?;
//! let target = "192.168.0.200:1025".parse()?;
//! let report = supervisor.run(acquisition, move || UdpSink::new(target), consumer, SinkSettings::default())?;
//! ```
//!
//! The hardware back-end needs the `mpsse` feature and the FTDI libMPSSE
//! library; everything else builds and tests without it.

pub mod acquisition;
pub mod common;
pub mod config;
pub mod device;
pub mod error;
#[cfg(feature = "mpsse")]
mod ffi;
pub mod queue;
pub mod registers;
pub mod sample;
pub mod sink;
pub mod supervisor;
pub mod transport;
pub mod wire;

// Re-export public API
pub use acquisition::{AcquisitionLoop, AcquisitionStats};
pub use common::TimeKeeper;
pub use config::{BusKind, DeviceConfig, SinkTarget, StreamerConfig};
pub use device::{DeviceState, Icm20689};
pub use error::{ImuError, Result};
pub use queue::{sample_queue, BatchConsumer, BatchProducer, Pop};
pub use registers::{AccelRange, GyroRange, Register};
pub use sample::{Batch, MeasurementPoint, RawSample, Reading, Vector3};
pub use sink::{open_sink, run_sink, FileSink, Sink, SinkSettings, SinkStats, TcpSink, UdpSink};
pub use supervisor::{StopSignal, Supervisor, SupervisorReport};
pub use transport::{BusInterface, RegisterBus, SelectLine};
#[cfg(feature = "mpsse")]
pub use transport::{I2cSelectBus, MpsseChannel, SpiBus};

//! ICM-20689 streamer
//!
//! Opens the FT232H, configures one ICM-20689 per select line and streams
//! FIFO data to a UDP/TCP receiver or records it to a text file until
//! Ctrl+C (or the optional duration) ends the run.
//!
//! Usage:
//!   imu-streamer --bus spi --select-pins 0,1,2,3 --sink udp --target 192.168.0.200:1025
//!   imu-streamer --sink file --duration 3600

use clap::{Parser, ValueEnum};
use ft232_imu_streamer::sink::default_record_path;
use ft232_imu_streamer::{
    sample_queue, AccelRange, AcquisitionLoop, BusKind, DeviceConfig, GyroRange, I2cSelectBus, Icm20689,
    ImuError, MpsseChannel, RegisterBus, SinkTarget, SpiBus, StreamerConfig, Supervisor,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

type BoxedBus = Box<dyn RegisterBus + Send>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BusArg {
    I2c,
    Spi,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SinkArg {
    Udp,
    Tcp,
    File,
}

#[derive(Parser, Debug)]
#[command(name = "imu-streamer")]
#[command(about = "Stream ICM-20689 FIFO data from an FT232H over UDP/TCP or to a file", long_about = None)]
struct Args {
    /// Sensor bus: I2C with a select pin per sensor, or SPI with a chip select per sensor
    #[arg(short, long, value_enum, default_value_t = BusArg::Spi)]
    bus: BusArg,

    /// MPSSE channel index
    #[arg(long, default_value = "0")]
    channel: u32,

    /// Bus clock in Hz (default: 400 kHz for I2C, 1 MHz for SPI)
    #[arg(long)]
    clock: Option<u32>,

    /// Select pins (ACBUS0-7), one per sensor; sensor ids are assigned 1, 2, ...
    #[arg(short = 'p', long, value_delimiter = ',', default_value = "0,1,2,3")]
    select_pins: Vec<u8>,

    /// Accelerometer full-scale range in g (2, 4, 8, 16)
    #[arg(short, long, default_value = "8")]
    accel_range: u16,

    /// Gyroscope full-scale range in °/s (250, 500, 1000, 2000)
    #[arg(short, long, default_value = "2000")]
    gyro_range: u16,

    /// Sample rate in Hz (4-1000)
    #[arg(short, long, default_value = "100")]
    rate: u32,

    /// FIFO poll interval in milliseconds
    #[arg(long, default_value = "5")]
    poll_ms: u64,

    /// Coalescing window in milliseconds
    #[arg(long, default_value = "100")]
    window_ms: u64,

    /// Where to send the data
    #[arg(short, long, value_enum, default_value_t = SinkArg::Udp)]
    sink: SinkArg,

    /// Receiver address for the udp and tcp sinks
    #[arg(short, long, default_value = "192.168.0.200:1025")]
    target: SocketAddr,

    /// Output file for the file sink (default: imu_YYYYmmdd_HHMMSS.txt)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Duration in seconds (optional, runs until Ctrl+C if omitted)
    #[arg(short, long)]
    duration: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<StreamerConfig, ImuError> {
        let accel_range = AccelRange::from_g(self.accel_range).ok_or_else(|| {
            ImuError::InvalidParameter(format!("Accel range must be 2, 4, 8 or 16 g, got {}", self.accel_range))
        })?;
        let gyro_range = GyroRange::from_dps(self.gyro_range).ok_or_else(|| {
            ImuError::InvalidParameter(format!(
                "Gyro range must be 250, 500, 1000 or 2000 °/s, got {}",
                self.gyro_range
            ))
        })?;

        let devices = self
            .select_pins
            .iter()
            .enumerate()
            .map(|(i, &pin)| DeviceConfig {
                accel_range,
                gyro_range,
                sample_rate_hz: self.rate,
                ..DeviceConfig::new(i as i32 + 1, pin)
            })
            .collect();

        let bus = match self.bus {
            BusArg::I2c => BusKind::I2c,
            BusArg::Spi => BusKind::Spi,
        };
        let clock_hz = self.clock.unwrap_or(match bus {
            BusKind::I2c => ft232_imu_streamer::config::DEFAULT_I2C_CLOCK_HZ,
            BusKind::Spi => ft232_imu_streamer::config::DEFAULT_SPI_CLOCK_HZ,
        });

        let sink = match self.sink {
            SinkArg::Udp => SinkTarget::Udp(self.target),
            SinkArg::Tcp => SinkTarget::Tcp(self.target),
            SinkArg::File => SinkTarget::File(self.output.unwrap_or_else(default_record_path)),
        };

        let config = StreamerConfig {
            devices,
            bus,
            channel: self.channel,
            clock_hz,
            poll_interval: Duration::from_millis(self.poll_ms),
            coalesce_window: Duration::from_millis(self.window_ms),
            run_duration: self.duration.map(Duration::from_secs),
            sink,
            ..StreamerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

/// Open the channel and bring up every configured sensor
fn open_sensors(config: &StreamerConfig) -> Result<Vec<Icm20689<BoxedBus>>, ImuError> {
    let channel = match config.bus {
        BusKind::I2c => MpsseChannel::open_i2c(config.channel, config.clock_hz)?,
        BusKind::Spi => MpsseChannel::open_spi(config.channel, config.clock_hz)?,
    };

    let mut sensors = Vec::with_capacity(config.devices.len());
    for device in &config.devices {
        let bus: BoxedBus = match config.bus {
            BusKind::I2c => Box::new(I2cSelectBus::new(channel.clone(), device.select_pin)?),
            BusKind::Spi => Box::new(SpiBus::new(channel.clone(), device.select_pin)?),
        };

        let mut sensor = Icm20689::new(device.sensor_id, bus)?;
        sensor.verify_identity()?;
        sensor.configure(device.accel_range, device.gyro_range, device.sample_rate_hz)?;
        log::info!(
            "Sensor {} on pin {}: ±{}g, ±{}°/s, {:.1} Hz",
            device.sensor_id,
            device.select_pin,
            sensor.accel_range().g(),
            sensor.gyro_range().dps(),
            sensor.sample_rate_hz()
        );
        sensors.push(sensor);
    }
    Ok(sensors)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;

    log::info!("ICM-20689 streamer");
    log::info!("Bus: {:?} @ {} Hz, channel {}", config.bus, config.clock_hz, config.channel);
    log::info!("Sink: {:?}", config.sink);
    match config.run_duration {
        Some(duration) => log::info!("Duration: {} seconds", duration.as_secs()),
        None => log::info!("Duration: continuous (Ctrl+C to stop)"),
    }

    let sensors = match open_sensors(&config) {
        Ok(sensors) => sensors,
        Err(ImuError::NoChannelsFound) => {
            log::error!("No FT232H devices found. Check the USB connection and FTDI drivers.");
            return Err(Box::new(ImuError::NoChannelsFound));
        }
        Err(ImuError::InvalidDeviceId(id)) => {
            log::error!(
                "Unexpected WHO_AM_I 0x{:02X}. Check sensor wiring, power (3.3V) and select pins.",
                id
            );
            return Err(Box::new(ImuError::InvalidDeviceId(id)));
        }
        Err(e) => return Err(Box::new(e)),
    };

    let (producer, consumer) = sample_queue();
    let acquisition = AcquisitionLoop::new(sensors, producer).with_poll_interval(config.poll_interval);

    let supervisor = Supervisor::new();
    supervisor.install_termination_handler()?;

    let target = config.sink.clone();
    let report = supervisor.run(
        acquisition,
        move || ft232_imu_streamer::open_sink(&target),
        consumer,
        config.sink_settings(),
    )?;

    match &report.acquisition {
        Ok(stats) => log::info!(
            "Acquisition: {} points in {} batches, {} overflow warnings",
            stats.points,
            stats.batches,
            stats.overflow_warnings
        ),
        Err(e) => log::error!("Acquisition failed: {}", e),
    }
    match &report.sink {
        Ok(stats) => log::info!(
            "Sink: {} points in {} deliveries, {} dropped",
            stats.points,
            stats.deliveries,
            stats.dropped
        ),
        Err(e) => log::error!("Sink failed: {}", e),
    }
    if report.sink.as_ref().is_ok_and(|stats| stats.finish_failed) {
        log::warn!("Sink output may be incomplete: the closing write failed");
    }

    if report.degraded {
        log::warn!("Run ended degraded");
    }
    if let Err(e) = report.acquisition.and(report.sink.map(|_| ())) {
        return Err(Box::new(e));
    }
    Ok(())
}

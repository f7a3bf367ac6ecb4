//! ICM-20689 sensor device driver
//!
//! Owns one sensor's calibration state (cached full-scale ranges and sample
//! rate) on top of any [`RegisterBus`], converts register values to
//! physical units and drains the hardware FIFO into [`Batch`]es.

use crate::error::{ImuError, Result};
use crate::registers::{
    fifo_en, user_ctrl, AccelRange, GyroRange, Register, CONFIG_DLPF_1KHZ, INTERNAL_SAMPLE_RATE_HZ,
    WHO_AM_I_VALUE,
};
use crate::sample::{Batch, MeasurementPoint, RawSample, Reading, Vector3, STANDARD_GRAVITY};
use crate::transport::{BusInterface, RegisterBus};

/// 16-bit values per FIFO slot (accel x,y,z then gyro x,y,z)
pub const FIFO_VALUES_PER_SAMPLE: usize = 6;

/// Bytes per FIFO slot
pub const FIFO_SAMPLE_SIZE: usize = FIFO_VALUES_PER_SAMPLE * 2;

/// Default drain clamp, in 16-bit values (the 4 KiB FIFO holds 2048)
pub const DEFAULT_FIFO_DRAIN_LIMIT: usize = 2048;

/// Default FIFO level above which a drain logs an overflow-risk warning
pub const DEFAULT_FIFO_WARN_THRESHOLD: usize = 128;

/// Lowest and highest sample rates the 8-bit divider can express
pub const MIN_SAMPLE_RATE_HZ: u32 = 4;
pub const MAX_SAMPLE_RATE_HZ: u32 = 1000;

/// Combine a big-endian register pair into a signed value
///
/// Patterns at or above 0x8000 are negative (two's complement).
pub fn decode_word(high: u8, low: u8) -> i16 {
    i16::from_be_bytes([high, low])
}

/// Decode a byte stream pairwise into signed 16-bit values
///
/// A trailing odd byte is ignored.
pub fn decode_words(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| decode_word(pair[0], pair[1]))
        .collect()
}

/// SMPLRT_DIV value for a target rate: `round(1000 / rate) - 1`
pub fn sample_rate_divider(rate_hz: u32) -> Result<u8> {
    if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&rate_hz) {
        return Err(ImuError::InvalidParameter(format!(
            "Sample rate must be {}-{} Hz, got {}",
            MIN_SAMPLE_RATE_HZ, MAX_SAMPLE_RATE_HZ, rate_hz
        )));
    }
    let divider = (INTERNAL_SAMPLE_RATE_HZ / rate_hz as f64).round() - 1.0;
    Ok(divider as u8)
}

/// Lifecycle of a sensor device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Constructed, FIFO not running
    Unconfigured,
    /// FIFO reset and enabled; `drain_fifo` is valid
    Streaming,
}

/// Outcome of one FIFO drain
#[derive(Debug, Clone, Default)]
pub struct FifoDrain {
    pub batch: Batch,
    /// 16-bit values the device reported as queued
    pub reported: usize,
    /// The reported level crossed the warning threshold
    pub overflow_risk: bool,
}

/// ICM-20689 sensor on a register bus
pub struct Icm20689<B: RegisterBus> {
    bus: B,
    sensor_id: i32,
    accel_range: AccelRange,
    gyro_range: GyroRange,
    sample_rate_hz: f64,
    state: DeviceState,
    fifo_drain_limit: usize,
    fifo_warn_threshold: usize,
}

impl<B: RegisterBus> Icm20689<B> {
    /// Create a device and wake it from sleep
    ///
    /// On an SPI bus the sensor's I2C interface is disabled as well so a
    /// shared chip select cannot be mistaken for I2C traffic.
    ///
    /// # Arguments
    /// * `sensor_id` - Stable id carried by every measurement point
    /// * `bus` - Register transport for this sensor
    pub fn new(sensor_id: i32, bus: B) -> Result<Self> {
        let mut device = Self {
            bus,
            sensor_id,
            accel_range: AccelRange::G2,
            gyro_range: GyroRange::Dps250,
            sample_rate_hz: INTERNAL_SAMPLE_RATE_HZ,
            state: DeviceState::Unconfigured,
            fifo_drain_limit: DEFAULT_FIFO_DRAIN_LIMIT,
            fifo_warn_threshold: DEFAULT_FIFO_WARN_THRESHOLD,
        };

        // Wake up the sensor (clear sleep bit)
        device.bus.write(Register::PwrMgmt1, 0x00)?;

        if device.bus.interface() == BusInterface::Spi {
            device.bus.write(Register::UserCtrl, user_ctrl::I2C_IF_DIS)?;
        }

        Ok(device)
    }

    /// Override the FIFO drain clamp and warning threshold (both in 16-bit values)
    pub fn with_fifo_limits(mut self, drain_limit: usize, warn_threshold: usize) -> Self {
        self.fifo_drain_limit = drain_limit.max(FIFO_VALUES_PER_SAMPLE);
        self.fifo_warn_threshold = warn_threshold;
        self
    }

    pub fn sensor_id(&self) -> i32 {
        self.sensor_id
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Cached accelerometer range (the last one written)
    pub fn accel_range(&self) -> AccelRange {
        self.accel_range
    }

    /// Cached gyroscope range (the last one written)
    pub fn gyro_range(&self) -> GyroRange {
        self.gyro_range
    }

    /// Cached sample rate in Hz
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Read WHO_AM_I
    pub fn who_am_i(&mut self) -> Result<u8> {
        self.bus.read(Register::WhoAmI)
    }

    /// Check WHO_AM_I against the ICM-20689 identity
    pub fn verify_identity(&mut self) -> Result<()> {
        let id = self.who_am_i()?;
        if id != WHO_AM_I_VALUE {
            return Err(ImuError::InvalidDeviceId(id));
        }
        Ok(())
    }

    /// Program ranges, sample rate, low-pass filter and FIFO sources
    ///
    /// Each config register is zeroed before the new value is written and
    /// the cached calibration is updated with every write.
    ///
    /// # Example
    /// ```ignore
    /// sensor.configure(AccelRange::G8, GyroRange::Dps2000, 100)?;
    /// sensor.enable_fifo()?;
    /// ```
    pub fn configure(&mut self, accel_range: AccelRange, gyro_range: GyroRange, sample_rate_hz: u32) -> Result<()> {
        // Validate before touching the hardware
        sample_rate_divider(sample_rate_hz)?;

        self.bus.write(Register::FifoEn, fifo_en::ACCEL_GYRO)?;
        self.bus.write(Register::Config, CONFIG_DLPF_1KHZ)?;
        self.set_sample_rate(sample_rate_hz)?;
        self.set_accel_range(accel_range)?;
        self.set_gyro_range(gyro_range)?;

        log::debug!(
            "Sensor {} configured: ±{}g, ±{}°/s, {:.1} Hz",
            self.sensor_id,
            accel_range.g(),
            gyro_range.dps(),
            self.sample_rate_hz
        );
        Ok(())
    }

    /// Zero `register`, then write `value`
    fn write_config(&mut self, register: Register, value: u8) -> Result<()> {
        self.bus.write(register, 0x00)?;
        self.bus.write(register, value)
    }

    pub fn set_accel_range(&mut self, range: AccelRange) -> Result<()> {
        self.write_config(Register::AccelConfig, range.register_value())?;
        self.accel_range = range;
        Ok(())
    }

    pub fn set_gyro_range(&mut self, range: GyroRange) -> Result<()> {
        self.write_config(Register::GyroConfig, range.register_value())?;
        self.gyro_range = range;
        Ok(())
    }

    /// Set the output rate (4-1000 Hz) through SMPLRT_DIV
    pub fn set_sample_rate(&mut self, rate_hz: u32) -> Result<()> {
        let divider = sample_rate_divider(rate_hz)?;
        self.write_config(Register::SmplrtDiv, divider)?;
        self.sample_rate_hz = INTERNAL_SAMPLE_RATE_HZ / (divider as f64 + 1.0);
        Ok(())
    }

    /// Read the accelerometer range from ACCEL_CONFIG and re-sync the cache
    pub fn read_accel_range(&mut self) -> Result<AccelRange> {
        let raw = self.bus.read(Register::AccelConfig)?;
        self.accel_range = AccelRange::from_register_value(raw);
        Ok(self.accel_range)
    }

    /// Gyroscope range as last written
    pub fn read_gyro_range(&self) -> GyroRange {
        self.gyro_range
    }

    /// Raw GYRO_CONFIG register value
    ///
    /// The cache is left alone: it already tracks every range write.
    pub fn read_gyro_config_raw(&mut self) -> Result<u8> {
        self.bus.read(Register::GyroConfig)
    }

    /// Read the effective sample rate back from SMPLRT_DIV
    pub fn read_sample_rate(&mut self) -> Result<f64> {
        let divider = self.bus.read(Register::SmplrtDiv)?;
        Ok(INTERNAL_SAMPLE_RATE_HZ / (divider as f64 + 1.0))
    }

    /// Read a signed value from a high/low register pair (two single-byte reads)
    fn read_word(&mut self, high: Register, low: Register) -> Result<i16> {
        let h = self.bus.read(high)?;
        let l = self.bus.read(low)?;
        Ok(decode_word(h, l))
    }

    fn read_triplet(&mut self, regs: [(Register, Register); 3]) -> Result<[i16; 3]> {
        Ok([
            self.read_word(regs[0].0, regs[0].1)?,
            self.read_word(regs[1].0, regs[1].1)?,
            self.read_word(regs[2].0, regs[2].1)?,
        ])
    }

    /// Die temperature in °C
    pub fn read_temperature(&mut self) -> Result<f64> {
        let raw = self.read_word(Register::TempOutH, Register::TempOutL)?;
        Ok(raw as f64 / 340.0 + 36.53)
    }

    /// Accelerometer reading in g
    pub fn read_accel_g(&mut self) -> Result<Vector3> {
        let raw = self.read_triplet([
            (Register::AccelXoutH, Register::AccelXoutL),
            (Register::AccelYoutH, Register::AccelYoutL),
            (Register::AccelZoutH, Register::AccelZoutL),
        ])?;
        let scale = self.accel_range.sensitivity();
        Ok(Vector3::new(
            raw[0] as f64 / scale,
            raw[1] as f64 / scale,
            raw[2] as f64 / scale,
        ))
    }

    /// Accelerometer reading in m/s²
    pub fn read_accel(&mut self) -> Result<Vector3> {
        let g = self.read_accel_g()?;
        Ok(Vector3::new(
            g.x * STANDARD_GRAVITY,
            g.y * STANDARD_GRAVITY,
            g.z * STANDARD_GRAVITY,
        ))
    }

    /// Gyroscope reading in °/s
    pub fn read_gyro(&mut self) -> Result<Vector3> {
        let raw = self.read_triplet([
            (Register::GyroXoutH, Register::GyroXoutL),
            (Register::GyroYoutH, Register::GyroYoutL),
            (Register::GyroZoutH, Register::GyroZoutL),
        ])?;
        let scale = self.gyro_range.sensitivity();
        Ok(Vector3::new(
            raw[0] as f64 / scale,
            raw[1] as f64 / scale,
            raw[2] as f64 / scale,
        ))
    }

    /// Temperature, acceleration (m/s²) and rotation rate in one call
    pub fn read_all(&mut self) -> Result<Reading> {
        let temperature = self.read_temperature()?;
        let accel = self.read_accel()?;
        let gyro = self.read_gyro()?;
        Ok(Reading {
            accel,
            gyro,
            temperature,
        })
    }

    /// Queued FIFO data in 16-bit values
    ///
    /// FIFO_COUNT reports bytes; each value is one register pair.
    pub fn fifo_count(&mut self) -> Result<usize> {
        let high = self.bus.read(Register::FifoCountH)?;
        let low = self.bus.read(Register::FifoCountL)?;
        Ok(u16::from_be_bytes([high, low]) as usize / 2)
    }

    /// Route accel and gyro into the FIFO, then reset and enable it
    ///
    /// The reset write always precedes the enable write. Other USER_CTRL
    /// bits (such as I2C_IF_DIS) are preserved.
    pub fn enable_fifo(&mut self) -> Result<()> {
        self.bus.write(Register::FifoEn, fifo_en::ACCEL_GYRO)?;

        let current = self.bus.read(Register::UserCtrl)?;

        // Reset FIFO
        self.bus.write(Register::UserCtrl, current | user_ctrl::FIFO_RST)?;

        // Enable FIFO
        self.bus.write(Register::UserCtrl, current | user_ctrl::FIFO_EN)?;

        self.state = DeviceState::Streaming;
        log::debug!("Sensor {} FIFO enabled", self.sensor_id);
        Ok(())
    }

    /// Read every complete sample currently queued in the FIFO
    ///
    /// The reported level is clamped to the drain limit so one call has a
    /// bounded transfer time. Leftover values that do not fill a whole
    /// sample stay in the FIFO for the next drain. An empty batch means
    /// nothing was ready.
    pub fn drain_fifo(&mut self) -> Result<Batch> {
        Ok(self.drain_fifo_detailed()?.batch)
    }

    /// [`drain_fifo`](Self::drain_fifo) plus the level it saw
    pub fn drain_fifo_detailed(&mut self) -> Result<FifoDrain> {
        if self.state != DeviceState::Streaming {
            return Err(ImuError::FifoNotEnabled(self.sensor_id));
        }

        let reported = self.fifo_count()?;
        let overflow_risk = reported > self.fifo_warn_threshold;
        if overflow_risk {
            // Informational only: anything already overwritten in hardware is gone
            log::warn!(
                "Sensor {} FIFO count {} exceeds {}; samples may have been lost",
                self.sensor_id,
                reported,
                self.fifo_warn_threshold
            );
        }

        let count = reported.min(self.fifo_drain_limit);
        let groups = count / FIFO_VALUES_PER_SAMPLE;
        if groups == 0 {
            return Ok(FifoDrain {
                batch: Vec::new(),
                reported,
                overflow_risk,
            });
        }

        let bytes = self.bus.bulk_read(Register::FifoRw, groups * FIFO_SAMPLE_SIZE)?;
        if bytes.len() != groups * FIFO_SAMPLE_SIZE {
            return Err(ImuError::TransferError {
                expected: (groups * FIFO_SAMPLE_SIZE) as u32,
                actual: bytes.len() as u32,
            });
        }

        let values = decode_words(&bytes);
        let accel_lsb = self.accel_range.sensitivity();
        let gyro_lsb = self.gyro_range.sensitivity();

        let batch = values
            .chunks_exact(FIFO_VALUES_PER_SAMPLE)
            .filter_map(|slot| <&[i16; FIFO_VALUES_PER_SAMPLE]>::try_from(slot).ok())
            .map(|slot| {
                MeasurementPoint::from_raw(
                    self.sensor_id,
                    RawSample::from_fifo_values(slot),
                    accel_lsb,
                    gyro_lsb,
                )
            })
            .collect();

        Ok(FifoDrain {
            batch,
            reported,
            overflow_risk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockBus;

    fn streaming_device(bus: &MockBus) -> Icm20689<MockBus> {
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        device.configure(AccelRange::G8, GyroRange::Dps2000, 100).unwrap();
        device.enable_fifo().unwrap();
        bus.clear_writes();
        device
    }

    #[test]
    fn test_decode_word_exhaustive() {
        for v in 0u32..=0xFFFF {
            let expected = if v < 0x8000 { v as i32 } else { v as i32 - 65536 };
            let decoded = decode_word((v >> 8) as u8, (v & 0xFF) as u8);
            assert_eq!(decoded as i32, expected, "pattern 0x{:04X}", v);
        }
    }

    #[test]
    fn test_sample_rate_divider() {
        assert_eq!(sample_rate_divider(1000).unwrap(), 0);
        assert_eq!(sample_rate_divider(100).unwrap(), 9);
        assert_eq!(sample_rate_divider(300).unwrap(), 2); // round(3.33) - 1
        assert_eq!(sample_rate_divider(4).unwrap(), 249);
        assert!(sample_rate_divider(3).is_err());
        assert!(sample_rate_divider(1001).is_err());
    }

    #[test]
    fn test_new_wakes_device_and_disables_i2c_on_spi() {
        let bus = MockBus::new();
        let device = Icm20689::new(2, bus.clone()).unwrap();

        assert_eq!(device.state(), DeviceState::Unconfigured);
        assert_eq!(
            bus.writes(),
            vec![(Register::PwrMgmt1, 0x00), (Register::UserCtrl, user_ctrl::I2C_IF_DIS)]
        );

        let i2c = MockBus::new().without_bulk();
        Icm20689::new(3, i2c.clone()).unwrap();
        assert_eq!(i2c.writes(), vec![(Register::PwrMgmt1, 0x00)]);
    }

    #[test]
    fn test_configure_zeroes_then_writes() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        bus.clear_writes();

        device.configure(AccelRange::G8, GyroRange::Dps2000, 100).unwrap();

        assert_eq!(
            bus.writes(),
            vec![
                (Register::FifoEn, fifo_en::ACCEL_GYRO),
                (Register::Config, CONFIG_DLPF_1KHZ),
                (Register::SmplrtDiv, 0x00),
                (Register::SmplrtDiv, 9),
                (Register::AccelConfig, 0x00),
                (Register::AccelConfig, 0x10),
                (Register::GyroConfig, 0x00),
                (Register::GyroConfig, 0x18),
            ]
        );
        assert_eq!(device.accel_range(), AccelRange::G8);
        assert_eq!(device.gyro_range(), GyroRange::Dps2000);
        assert!((device.sample_rate_hz() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_configure_rejects_bad_rate_without_writing() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        bus.clear_writes();

        let result = device.configure(AccelRange::G2, GyroRange::Dps250, 0);

        assert!(matches!(result, Err(ImuError::InvalidParameter(_))));
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn test_read_accel_uses_configured_range() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        device.configure(AccelRange::G8, GyroRange::Dps2000, 100).unwrap();

        bus.set_register(Register::AccelXoutH, 0x10);
        bus.set_register(Register::AccelXoutL, 0x00);

        let accel = device.read_accel().unwrap();
        let expected = (0x1000 as f64 / 4096.0) * 9.80665;
        assert!((accel.x - expected).abs() < 1e-9);
        assert_eq!(accel.y, 0.0);
        assert_eq!(accel.z, 0.0);

        let g = device.read_accel_g().unwrap();
        assert!((g.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_for_every_accel_range() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        bus.set_register(Register::AccelYoutH, 0xF0); // -4096
        bus.set_register(Register::AccelYoutL, 0x00);

        for range in AccelRange::ALL {
            device.set_accel_range(range).unwrap();
            assert_eq!(bus.register(Register::AccelConfig), range.register_value());
            let g = device.read_accel_g().unwrap();
            assert_eq!(g.y, -4096.0 / range.sensitivity());
        }
    }

    #[test]
    fn test_read_gyro_for_every_range() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        bus.set_register(Register::GyroZoutH, 0x02);
        bus.set_register(Register::GyroZoutL, 0x0C); // 524

        for range in GyroRange::ALL {
            device.set_gyro_range(range).unwrap();
            let gyro = device.read_gyro().unwrap();
            assert_eq!(gyro.z, 524.0 / range.sensitivity());
            assert_eq!(gyro.x, 0.0);
        }
    }

    #[test]
    fn test_read_temperature() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        bus.set_register(Register::TempOutH, 0xFE);
        bus.set_register(Register::TempOutL, 0xAC); // -340

        let temp = device.read_temperature().unwrap();
        assert!((temp - 35.53).abs() < 1e-9);
    }

    #[test]
    fn test_read_all_combines_readings() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        bus.set_register(Register::GyroXoutH, 0x00);
        bus.set_register(Register::GyroXoutL, 131);

        let reading = device.read_all().unwrap();
        assert!((reading.gyro.x - 1.0).abs() < 1e-12);
        assert!((reading.temperature - 36.53).abs() < 1e-9);
        assert_eq!(reading.accel, Vector3::default());
    }

    #[test]
    fn test_read_accel_range_resyncs_cache() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        bus.set_register(Register::AccelConfig, 0x18);

        assert_eq!(device.read_accel_range().unwrap(), AccelRange::G16);
        assert_eq!(device.accel_range(), AccelRange::G16);
    }

    #[test]
    fn test_read_sample_rate() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        device.set_sample_rate(200).unwrap();
        assert!((device.read_sample_rate().unwrap() - 200.0).abs() < 1e-9);
        assert_eq!(device.read_gyro_config_raw().unwrap(), 0x00);
    }

    #[test]
    fn test_verify_identity() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();

        assert!(matches!(device.verify_identity(), Err(ImuError::InvalidDeviceId(0x00))));
        bus.set_register(Register::WhoAmI, WHO_AM_I_VALUE);
        assert!(device.verify_identity().is_ok());
    }

    #[test]
    fn test_enable_fifo_resets_before_enabling() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        bus.clear_writes();

        device.enable_fifo().unwrap();

        let base = user_ctrl::I2C_IF_DIS;
        assert_eq!(
            bus.writes(),
            vec![
                (Register::FifoEn, fifo_en::ACCEL_GYRO),
                (Register::UserCtrl, base | user_ctrl::FIFO_RST),
                (Register::UserCtrl, base | user_ctrl::FIFO_EN),
            ]
        );
        assert_eq!(device.state(), DeviceState::Streaming);
    }

    #[test]
    fn test_drain_requires_streaming() {
        let bus = MockBus::new();
        let mut device = Icm20689::new(9, bus.clone()).unwrap();

        assert!(matches!(device.drain_fifo(), Err(ImuError::FifoNotEnabled(9))));
    }

    #[test]
    fn test_fifo_count_halves_byte_count() {
        let bus = MockBus::new();
        let mut device = streaming_device(&bus);
        bus.report_fifo_bytes(300);

        assert_eq!(device.fifo_count().unwrap(), 150);
    }

    #[test]
    fn test_drain_yields_whole_samples_only() {
        for k in 0..4usize {
            for r in 0..FIFO_VALUES_PER_SAMPLE {
                let bus = MockBus::new();
                let mut device = streaming_device(&bus);

                let values: Vec<i16> = (0..(6 * k + r) as i16).map(|v| v * 100 - 700).collect();
                bus.push_fifo_words(&values);

                let batch = device.drain_fifo().unwrap();

                assert_eq!(batch.len(), k, "count {}", 6 * k + r);
                for (i, point) in batch.iter().enumerate() {
                    let raw = point.raw.unwrap();
                    assert_eq!(raw.accel, [values[6 * i], values[6 * i + 1], values[6 * i + 2]]);
                    assert_eq!(raw.gyro, [values[6 * i + 3], values[6 * i + 4], values[6 * i + 5]]);
                }
                // The partial sample stays queued
                assert_eq!(bus.fifo_len(), r * 2);
            }
        }
    }

    #[test]
    fn test_drain_scales_with_cached_ranges() {
        let bus = MockBus::new();
        let mut device = streaming_device(&bus);
        bus.push_fifo_words(&[4096, -8192, 0, 164, -328, 16]);

        let batch = device.drain_fifo().unwrap();

        assert_eq!(batch.len(), 1);
        let point = batch[0];
        assert_eq!(point.sensor_id, 1);
        assert!((point.accel.x - STANDARD_GRAVITY).abs() < 1e-9);
        assert!((point.accel.y + 2.0 * STANDARD_GRAVITY).abs() < 1e-9);
        assert!((point.gyro.x - 10.0).abs() < 1e-9);
        assert!((point.gyro.y + 20.0).abs() < 1e-9);
        assert!((point.gyro.z - 16.0 / 16.4).abs() < 1e-9);
    }

    #[test]
    fn test_drain_uses_single_bulk_read() {
        let bus = MockBus::new();
        let mut device = streaming_device(&bus);
        bus.push_fifo_words(&[1; 18]);

        let batch = device.drain_fifo().unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(bus.bulk_reads(), 1);
    }

    #[test]
    fn test_drain_on_non_bulk_bus() {
        let bus = MockBus::new().without_bulk();
        let mut device = streaming_device(&bus);
        bus.push_fifo_words(&[5, 6, 7, 8, 9, 10]);

        let batch = device.drain_fifo().unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].raw.unwrap().gyro, [8, 9, 10]);
        assert_eq!(bus.bulk_reads(), 0);
    }

    #[test]
    fn test_empty_fifo_yields_empty_batch() {
        let bus = MockBus::new();
        let mut device = streaming_device(&bus);

        assert!(device.drain_fifo().unwrap().is_empty());
        assert_eq!(bus.bulk_reads(), 0);
    }

    #[test]
    fn test_drain_clamps_to_limit_and_flags_overflow() {
        let bus = MockBus::new();
        let mut device = streaming_device(&bus).with_fifo_limits(12, 6);
        bus.push_fifo_words(&[3; 30]);

        let drain = device.drain_fifo_detailed().unwrap();

        assert_eq!(drain.reported, 30);
        assert!(drain.overflow_risk);
        assert_eq!(drain.batch.len(), 2);
        assert_eq!(bus.fifo_len(), 18 * 2);

        let rest = device.drain_fifo_detailed().unwrap();
        assert_eq!(rest.reported, 18);
        assert_eq!(rest.batch.len(), 2);
    }

    #[test]
    fn test_bus_error_propagates() {
        let bus = MockBus::new();
        let mut device = streaming_device(&bus);
        bus.set_failing(true);

        assert!(matches!(device.drain_fifo(), Err(ImuError::Bus(_))));
        assert!(matches!(device.read_gyro(), Err(ImuError::Bus(_))));
    }
}

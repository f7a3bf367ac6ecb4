//! Measurement types flowing from the sensors to the senders

/// Standard gravity (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Three-axis value in physical units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn from_raw(raw: [i16; 3], divisor: f64) -> Self {
        Self {
            x: raw[0] as f64 / divisor,
            y: raw[1] as f64 / divisor,
            z: raw[2] as f64 / divisor,
        }
    }
}

/// Decoded but unscaled register values of one FIFO slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

impl RawSample {
    /// Build from six values in FIFO order (ax, ay, az, gx, gy, gz)
    pub fn from_fifo_values(values: &[i16; 6]) -> Self {
        Self {
            accel: [values[0], values[1], values[2]],
            gyro: [values[3], values[4], values[5]],
        }
    }
}

/// One device's accelerometer (m/s²) and gyroscope (°/s) reading from a single FIFO slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementPoint {
    pub sensor_id: i32,
    pub accel: Vector3,
    pub gyro: Vector3,
    /// Present for points read from hardware, absent for points decoded off the wire
    pub raw: Option<RawSample>,
}

impl MeasurementPoint {
    pub fn new(sensor_id: i32, accel: Vector3, gyro: Vector3) -> Self {
        Self {
            sensor_id,
            accel,
            gyro,
            raw: None,
        }
    }

    /// Scale a raw slot with the given sensitivities (LSB/g and LSB/(°/s))
    pub fn from_raw(sensor_id: i32, raw: RawSample, accel_lsb_per_g: f64, gyro_lsb_per_dps: f64) -> Self {
        Self {
            sensor_id,
            accel: Vector3::from_raw(raw.accel, accel_lsb_per_g / STANDARD_GRAVITY),
            gyro: Vector3::from_raw(raw.gyro, gyro_lsb_per_dps),
            raw: Some(raw),
        }
    }

    /// Raw accel and gyro integers, falling back to truncated scaled values
    pub fn raw_or_truncated(&self) -> [i64; 6] {
        match self.raw {
            Some(raw) => [
                raw.accel[0] as i64,
                raw.accel[1] as i64,
                raw.accel[2] as i64,
                raw.gyro[0] as i64,
                raw.gyro[1] as i64,
                raw.gyro[2] as i64,
            ],
            None => [
                self.accel.x as i64,
                self.accel.y as i64,
                self.accel.z as i64,
                self.gyro.x as i64,
                self.gyro.y as i64,
                self.gyro.z as i64,
            ],
        }
    }
}

/// Direct-read snapshot returned by `read_all`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// m/s²
    pub accel: Vector3,
    /// °/s
    pub gyro: Vector3,
    /// °C
    pub temperature: f64,
}

/// Ordered run of measurement points in FIFO emission order
pub type Batch = Vec<MeasurementPoint>;

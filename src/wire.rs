//! Wire packet codec
//!
//! One packet carries one coalesced batch. Everything is big-endian:
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────────────────┐
//! │ i32 count     │ count × point                                │
//! └───────────────┴──────────────────────────────────────────────┘
//! point = i32 sensor_id │ f64 ax, ay, az (m/s²) │ f64 gx, gy, gz (°/s)
//! ```
//!
//! A UDP datagram holds exactly one packet. On TCP, packets are sent back
//! to back and the count prefix is the only framing.

use crate::error::{ImuError, Result};
use crate::sample::{MeasurementPoint, Vector3};
use std::io::{ErrorKind, Read};

/// Size of the count prefix
pub const HEADER_SIZE: usize = 4;

/// Encoded size of one point
pub const POINT_SIZE: usize = 4 + 6 * 8;

/// Largest point count `read_packet` accepts from a stream
pub const MAX_STREAM_POINTS: usize = 1 << 20;

/// Encoded size of a packet holding `points` points
pub const fn packet_size(points: usize) -> usize {
    HEADER_SIZE + points * POINT_SIZE
}

/// Serialize `points` into a fresh buffer
pub fn encode_packet(points: &[MeasurementPoint]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(packet_size(points.len()));
    encode_packet_into(points, &mut buf);
    buf
}

/// Serialize `points` into `buf`, replacing its contents
///
/// Lets a sender reuse one allocation across packets.
pub fn encode_packet_into(points: &[MeasurementPoint], buf: &mut Vec<u8>) {
    buf.clear();
    buf.reserve(packet_size(points.len()));
    buf.extend_from_slice(&(points.len() as i32).to_be_bytes());
    for point in points {
        buf.extend_from_slice(&point.sensor_id.to_be_bytes());
        for v in [point.accel, point.gyro] {
            buf.extend_from_slice(&v.x.to_be_bytes());
            buf.extend_from_slice(&v.y.to_be_bytes());
            buf.extend_from_slice(&v.z.to_be_bytes());
        }
    }
}

fn parse_count(header: [u8; HEADER_SIZE]) -> Result<usize> {
    let count = i32::from_be_bytes(header);
    if count < 0 {
        return Err(ImuError::MalformedPacket(format!("negative point count {}", count)));
    }
    Ok(count as usize)
}

fn parse_point(bytes: &[u8]) -> MeasurementPoint {
    let f = |i: usize| {
        let start = 4 + i * 8;
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[start..start + 8]);
        f64::from_be_bytes(word)
    };
    let sensor_id = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    MeasurementPoint::new(
        sensor_id,
        Vector3::new(f(0), f(1), f(2)),
        Vector3::new(f(3), f(4), f(5)),
    )
}

/// Decode a complete packet (one UDP datagram)
///
/// The buffer must hold exactly the points the header announces.
pub fn decode_packet(bytes: &[u8]) -> Result<Vec<MeasurementPoint>> {
    if bytes.len() < HEADER_SIZE {
        return Err(ImuError::MalformedPacket(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }
    let count = parse_count([bytes[0], bytes[1], bytes[2], bytes[3]])?;

    let body = &bytes[HEADER_SIZE..];
    let expected = count.checked_mul(POINT_SIZE);
    if expected != Some(body.len()) {
        return Err(ImuError::MalformedPacket(format!(
            "header announces {} points but body is {} bytes",
            count,
            body.len()
        )));
    }

    Ok(body.chunks_exact(POINT_SIZE).map(parse_point).collect())
}

/// Read the next packet from a byte stream (TCP)
///
/// Returns `Ok(None)` on a clean end of stream between packets. A stream
/// that ends inside a packet, header included, is malformed.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Option<Vec<MeasurementPoint>>> {
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(ImuError::MalformedPacket(format!(
                    "stream ended after {} of {} header bytes",
                    filled, HEADER_SIZE
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let count = parse_count(header)?;
    if count > MAX_STREAM_POINTS {
        return Err(ImuError::MalformedPacket(format!(
            "point count {} exceeds {}",
            count, MAX_STREAM_POINTS
        )));
    }

    let mut body = vec![0u8; count * POINT_SIZE];
    reader.read_exact(&mut body).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            ImuError::MalformedPacket(format!("stream ended inside a {}-point packet", count))
        } else {
            e.into()
        }
    })?;

    Ok(Some(body.chunks_exact(POINT_SIZE).map(parse_point).collect()))
}

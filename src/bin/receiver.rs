//! IMU packet receiver
//!
//! Listens for packets from `imu-streamer` and logs a summary of each one.
//! Useful to check a running streamer end to end.
//!
//! Usage:
//!   imu-receiver --bind 0.0.0.0:1025
//!   imu-receiver --tcp --bind 0.0.0.0:1025 --verbose

use clap::Parser;
use ft232_imu_streamer::wire;
use ft232_imu_streamer::{ImuError, MeasurementPoint, StopSignal, TimeKeeper};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::time::Duration;

/// Socket timeout so the stop flag is re-checked while idle
const READ_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "imu-receiver")]
#[command(about = "Receive and summarize ICM-20689 wire packets", long_about = None)]
struct Args {
    /// Local address to listen on
    #[arg(short, long, default_value = "0.0.0.0:1025")]
    bind: SocketAddr,

    /// Accept one TCP connection instead of UDP datagrams
    #[arg(long)]
    tcp: bool,

    /// Log every point, not just the per-packet summary
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Default)]
struct Totals {
    packets: u64,
    points: u64,
}

impl Totals {
    fn record(&mut self, points: &[MeasurementPoint], clock: &TimeKeeper, verbose: bool) {
        self.packets += 1;
        self.points += points.len() as u64;

        let mut per_sensor: BTreeMap<i32, usize> = BTreeMap::new();
        for point in points {
            *per_sensor.entry(point.sensor_id).or_default() += 1;
        }
        log::info!(
            "[{:8.3}s] packet {} with {} points {:?}",
            clock.elapsed_secs(),
            self.packets,
            points.len(),
            per_sensor
        );

        if verbose {
            for p in points {
                log::info!(
                    "  sensor {}: accel ({:8.3}, {:8.3}, {:8.3}) m/s²  gyro ({:9.3}, {:9.3}, {:9.3}) °/s",
                    p.sensor_id,
                    p.accel.x,
                    p.accel.y,
                    p.accel.z,
                    p.gyro.x,
                    p.gyro.y,
                    p.gyro.z
                );
            }
        }
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn receive_udp(bind: SocketAddr, stop: &StopSignal, verbose: bool) -> Result<Totals, ImuError> {
    let socket = UdpSocket::bind(bind)?;
    socket.set_read_timeout(Some(READ_TIMEOUT))?;
    log::info!("Listening for UDP packets on {}", bind);

    let clock = TimeKeeper::new();
    let mut totals = Totals::default();
    let mut buf = vec![0u8; 65536];

    while !stop.is_stopped() {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        match wire::decode_packet(&buf[..len]) {
            Ok(points) => totals.record(&points, &clock, verbose),
            Err(e) => log::warn!("Discarding {} bytes from {}: {}", len, from, e),
        }
    }
    Ok(totals)
}

/// Read one packet once its first byte is available
///
/// The idle timeout is lifted for the duration of the packet so a slow
/// sender cannot split a frame into a spurious `WouldBlock`.
fn read_whole_packet(stream: &mut TcpStream) -> Result<Option<Vec<MeasurementPoint>>, ImuError> {
    stream.set_read_timeout(None)?;
    let packet = wire::read_packet(stream);
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    packet
}

fn receive_tcp(bind: SocketAddr, stop: &StopSignal, verbose: bool) -> Result<Totals, ImuError> {
    let listener = TcpListener::bind(bind)?;
    listener.set_nonblocking(true)?;
    log::info!("Waiting for a TCP streamer on {}", bind);

    let (mut stream, peer) = loop {
        if stop.is_stopped() {
            return Ok(Totals::default());
        }
        match listener.accept() {
            Ok(accepted) => break accepted,
            Err(e) if is_timeout(&e) => std::thread::sleep(Duration::from_millis(50)),
            Err(e) => return Err(e.into()),
        }
    };
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    log::info!("Streamer connected from {}", peer);

    // Packets have no resync marker, so a partial read ends the session
    let clock = TimeKeeper::new();
    let mut totals = Totals::default();
    let mut first = [0u8; 1];
    while !stop.is_stopped() {
        match stream.peek(&mut first) {
            Ok(0) => {
                log::info!("Streamer closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        }
        match read_whole_packet(&mut stream) {
            Ok(Some(points)) => totals.record(&points, &clock, verbose),
            Ok(None) => {
                log::info!("Streamer closed the connection");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(totals)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("Stopping receiver");
        handler_stop.stop();
    })?;

    let totals = if args.tcp {
        receive_tcp(args.bind, &stop, args.verbose)?
    } else {
        receive_udp(args.bind, &stop, args.verbose)?
    };

    log::info!("Received {} packets with {} points", totals.packets, totals.points);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft232_imu_streamer::Vector3;
    use std::io::Write;
    use std::thread;

    #[test]
    fn test_slow_packet_body_is_read_whole() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let points = vec![MeasurementPoint::new(2, Vector3::new(1.0, 2.0, 3.0), Vector3::default())];
        let bytes = wire::encode_packet(&points);

        let sender = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(&bytes[..10]).unwrap();
            thread::sleep(READ_TIMEOUT + Duration::from_millis(200));
            stream.write_all(&bytes[10..]).unwrap();
        });

        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        let received = read_whole_packet(&mut stream).unwrap().unwrap();
        sender.join().unwrap();

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sensor_id, 2);
        assert_eq!(received[0].accel, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(stream.read_timeout().unwrap(), Some(READ_TIMEOUT));
    }
}

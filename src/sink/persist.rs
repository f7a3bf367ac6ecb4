//! Text recorder for coalesced batches
//!
//! One line per point:
//!
//! ```text
//! <index> <elapsed seconds, 4 decimals> <ax> <ay> <az> <gx> <gy> <gz>
//! ```
//!
//! with raw sensor integers, followed at shutdown by a trailer line
//! `<count> recorded in <seconds> seconds`.

use super::Sink;
use crate::common::TimeKeeper;
use crate::error::Result;
use crate::sample::MeasurementPoint;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Timestamped file name in the working directory, e.g. `imu_20240131_142501.txt`
pub fn default_record_path() -> PathBuf {
    PathBuf::from(format!("imu_{}.txt", chrono::Local::now().format("%Y%m%d_%H%M%S")))
}

/// Appends formatted records to a file
pub struct FileSink<W: Write = BufWriter<File>> {
    writer: W,
    clock: TimeKeeper,
    sample_count: u64,
    finished: bool,
}

impl FileSink {
    /// Create (or truncate) `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        log::info!("Recording to {}", path.as_ref().display());
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write> FileSink<W> {
    /// Record into any writer; the clock starts now
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer,
            clock: TimeKeeper::new(),
            sample_count: 0,
            finished: false,
        }
    }

    /// Points written so far
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for FileSink<W> {
    fn name(&self) -> &'static str {
        "File"
    }

    fn deliver(&mut self, points: &[MeasurementPoint], received: Instant) -> Result<()> {
        let elapsed = self.clock.elapsed_secs_at(received);
        for point in points {
            self.sample_count += 1;
            let [ax, ay, az, gx, gy, gz] = point.raw_or_truncated();
            writeln!(
                self.writer,
                "{} {:.4} {} {} {} {} {} {}",
                self.sample_count, elapsed, ax, ay, az, gx, gy, gz
            )?;
        }
        self.writer.flush()?;
        log::debug!("Wrote {} points ({} total)", points.len(), self.sample_count);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        writeln!(
            self.writer,
            "{} recorded in {:.4} seconds",
            self.sample_count,
            self.clock.elapsed_secs()
        )?;
        self.writer.flush()?;
        Ok(())
    }
}

//! Pipeline supervisor
//!
//! Runs one acquisition loop and one sink on named threads sharing a
//! sample queue and a stop flag. Stopping is cooperative: both loops poll
//! the flag at their blocking boundaries, so in-flight bus transactions
//! and sends always complete.

use crate::acquisition::{AcquisitionLoop, AcquisitionStats};
use crate::error::{ImuError, Result};
use crate::queue::BatchConsumer;
use crate::sink::{run_sink, Sink, SinkSettings, SinkStats};
use crate::transport::RegisterBus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often `run` checks on its threads
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared cooperative stop flag
#[derive(Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every holder to stop
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Outcome of each supervised task
#[derive(Debug)]
pub struct SupervisorReport {
    pub acquisition: Result<AcquisitionStats>,
    pub sink: Result<SinkStats>,
    /// One task failed while the other kept running
    pub degraded: bool,
}

impl SupervisorReport {
    pub fn is_clean(&self) -> bool {
        self.acquisition.is_ok() && self.sink.is_ok()
    }
}

/// Owns the stop flag and the task threads
pub struct Supervisor {
    stop: StopSignal,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

struct Task<T> {
    name: &'static str,
    handle: Option<JoinHandle<Result<T>>>,
    outcome: Option<Result<T>>,
}

impl<T> Task<T> {
    fn spawn<F>(name: &'static str, f: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(f)?;
        Ok(Self {
            name,
            handle: Some(handle),
            outcome: None,
        })
    }

    fn is_running(&self) -> bool {
        self.outcome.is_none()
    }

    /// Join if the thread has ended; returns true when it just finished
    fn poll(&mut self) -> bool {
        let finished = self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(false);
        if finished {
            self.join();
        }
        finished
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.outcome = Some(match handle.join() {
                Ok(result) => result,
                Err(_) => {
                    log::error!("{} task panicked", self.name);
                    Err(ImuError::TaskPanicked(self.name))
                }
            });
        }
    }

    fn failed(&self) -> bool {
        matches!(self.outcome, Some(Err(_)))
    }

    fn into_outcome(mut self) -> Result<T> {
        self.join();
        self.outcome.unwrap_or(Err(ImuError::TaskPanicked(self.name)))
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            stop: StopSignal::new(),
        }
    }

    /// Handle on the shared stop flag
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Set the stop flag on Ctrl-C / SIGTERM
    ///
    /// Can only be installed once per process.
    pub fn install_termination_handler(&self) -> Result<()> {
        let stop = self.stop.clone();
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal");
            stop.stop();
        })
        .map_err(|e| ImuError::SignalHandler(e.to_string()))
    }

    /// Run the pipeline until both tasks have ended
    ///
    /// The sink is built on its own thread by `make_sink`, so a failed
    /// start-up (such as a refused TCP connect) ends only the sink task. A
    /// task that fails leaves the other running and marks the run degraded;
    /// a task that ends cleanly on its own (run limit reached) stops the
    /// whole pipeline.
    pub fn run<B, S, F>(
        &self,
        acquisition: AcquisitionLoop<B>,
        make_sink: F,
        consumer: BatchConsumer,
        settings: SinkSettings,
    ) -> Result<SupervisorReport>
    where
        B: RegisterBus + Send + 'static,
        S: Sink + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let acq_stop = self.stop.clone();
        let mut acq = Task::spawn("acquisition", move || acquisition.run(&acq_stop))?;

        let sink_stop = self.stop.clone();
        let sink_task = Task::spawn("sink", move || {
            let mut sink = make_sink()?;
            run_sink(&mut sink, &consumer, &settings, &sink_stop)
        });
        let mut sink = match sink_task {
            Ok(task) => task,
            Err(e) => {
                self.stop.stop();
                acq.join();
                return Err(e);
            }
        };

        let mut degraded = false;
        while acq.is_running() || sink.is_running() {
            if acq.poll() {
                self.task_ended(acq.name, acq.failed(), sink.is_running(), &mut degraded);
            }
            if sink.poll() {
                self.task_ended(sink.name, sink.failed(), acq.is_running(), &mut degraded);
            }
            if acq.is_running() || sink.is_running() {
                thread::sleep(WAIT_POLL_INTERVAL);
            }
        }

        Ok(SupervisorReport {
            acquisition: acq.into_outcome(),
            sink: sink.into_outcome(),
            degraded,
        })
    }

    fn task_ended(&self, name: &str, failed: bool, other_running: bool, degraded: &mut bool) {
        if failed {
            if other_running && !*degraded {
                log::warn!("{} task failed; pipeline is running degraded", name);
                *degraded = true;
            }
        } else if !self.stop.is_stopped() {
            log::info!("{} task finished; stopping pipeline", name);
            self.stop.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Icm20689;
    use crate::queue::sample_queue;
    use crate::registers::{AccelRange, GyroRange};
    use crate::sink::RecordingSink;
    use crate::transport::mock::MockBus;
    use std::time::Instant;

    fn pipeline(bus: &MockBus) -> (AcquisitionLoop<MockBus>, BatchConsumer) {
        let mut device = Icm20689::new(1, bus.clone()).unwrap();
        device.configure(AccelRange::G8, GyroRange::Dps2000, 100).unwrap();
        let (producer, consumer) = sample_queue();
        let acquisition = AcquisitionLoop::new(vec![device], producer).with_poll_interval(Duration::from_millis(2));
        (acquisition, consumer)
    }

    fn settings() -> SinkSettings {
        SinkSettings {
            pop_timeout: Duration::from_millis(100),
            coalesce_window: Duration::from_millis(20),
            max_duration: None,
        }
    }

    fn stop_after(stop: StopSignal, delay: Duration) -> JoinHandle<Instant> {
        thread::spawn(move || {
            thread::sleep(delay);
            stop.stop();
            Instant::now()
        })
    }

    #[test]
    fn test_stop_signal() {
        let signal = StopSignal::new();
        let other = signal.clone();
        assert!(!other.is_stopped());
        signal.stop();
        assert!(other.is_stopped());
    }

    #[test]
    fn test_streams_until_stopped() {
        let bus = MockBus::new();
        bus.push_fifo_words(&[100, 200, 300, 10, 20, 30]);
        let (acquisition, consumer) = pipeline(&bus);
        let sink = RecordingSink::default();
        let recorded = sink.clone();

        let supervisor = Supervisor::new();
        let stopper = stop_after(supervisor.stop_signal(), Duration::from_millis(200));
        let report = supervisor
            .run(acquisition, move || Ok(sink), consumer, settings())
            .unwrap();
        let stopped_at = stopper.join().unwrap();

        assert!(stopped_at.elapsed() <= Duration::from_millis(1200));
        assert!(report.is_clean());
        assert!(!report.degraded);
        assert_eq!(report.acquisition.unwrap().points, 1);
        assert_eq!(report.sink.unwrap().points, 1);

        let delivered = recorded.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0][0].raw.unwrap().accel, [100, 200, 300]);

        // Nothing touches the bus once both tasks are gone
        let operations = bus.operations();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(bus.operations(), operations);
    }

    #[test]
    fn test_sink_startup_failure_is_degraded() {
        let bus = MockBus::new();
        let (acquisition, consumer) = pipeline(&bus);

        let supervisor = Supervisor::new();
        let stopper = stop_after(supervisor.stop_signal(), Duration::from_millis(150));
        let report = supervisor
            .run(
                acquisition,
                || -> Result<RecordingSink> { Err(ImuError::Bus("no route".into())) },
                consumer,
                settings(),
            )
            .unwrap();
        stopper.join().unwrap();

        assert!(report.degraded);
        assert!(report.acquisition.is_ok());
        assert!(matches!(report.sink, Err(ImuError::Bus(_))));
    }

    #[test]
    fn test_panicking_sink_is_reported() {
        let bus = MockBus::new();
        let (acquisition, consumer) = pipeline(&bus);

        let supervisor = Supervisor::new();
        let stopper = stop_after(supervisor.stop_signal(), Duration::from_millis(150));
        let report = supervisor
            .run(
                acquisition,
                || -> Result<RecordingSink> { panic!("sink exploded") },
                consumer,
                settings(),
            )
            .unwrap();
        stopper.join().unwrap();

        assert!(matches!(report.sink, Err(ImuError::TaskPanicked("sink"))));
        assert!(report.degraded);
    }

    #[test]
    fn test_sink_run_limit_stops_pipeline() {
        let bus = MockBus::new();
        let (acquisition, consumer) = pipeline(&bus);
        let sink = RecordingSink::default();
        let limited = SinkSettings {
            max_duration: Some(Duration::from_millis(100)),
            ..settings()
        };

        let supervisor = Supervisor::new();
        let report = supervisor.run(acquisition, move || Ok(sink), consumer, limited).unwrap();

        assert!(supervisor.stop_signal().is_stopped());
        assert!(report.is_clean());
        assert!(!report.degraded);
    }
}

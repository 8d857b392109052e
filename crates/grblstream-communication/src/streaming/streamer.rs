//! G-code streaming engine
//!
//! Sends a [`GcodeProgram`] one line at a time over a [`CommandLink`]. The
//! next line goes out only after the previous one was answered with `ok`.
//! A job runs on its own thread and can be paused, resumed and stopped from
//! any other thread.

use super::program::GcodeProgram;
use crate::communication::{CommandLink, ResponseOutcome};
use crate::firmware::grbl::response_parser::is_accepted;
use grblstream_core::{ErrorKind, EventSink, Progress, RunState, StreamError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Point-in-time view of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobSnapshot {
    /// Lines acknowledged so far
    pub cursor: usize,
    /// Lines in the program
    pub total: usize,
    /// Current run state
    pub run_state: RunState,
    /// Identifier of the job, once one has started
    pub job_id: Option<Uuid>,
}

impl JobSnapshot {
    /// Progress implied by the snapshot
    pub fn progress(&self) -> Progress {
        Progress::new(self.cursor, self.total)
    }
}

#[derive(Debug, Default)]
struct JobState {
    snapshot: JobSnapshot,
    worker_alive: bool,
}

struct StreamerInner {
    job: Mutex<JobState>,
    changed: Condvar,
}

impl StreamerInner {
    /// Record a failure unless the job was already stopped.
    ///
    /// A paused job reports the failure at once but stays Paused; it turns
    /// Errored when resumed, or Stopped when stopped.
    fn fail(&self, sink: &dyn EventSink, kind: ErrorKind, message: &str) {
        let paused = {
            let mut job = self.job.lock();
            match job.snapshot.run_state {
                RunState::Running => {
                    job.snapshot.run_state = RunState::Errored;
                    false
                }
                RunState::Paused => true,
                _ => return,
            }
        };
        self.changed.notify_all();

        tracing::error!("Job halted: {}", message);
        sink.on_error(kind, message);

        if paused {
            let mut job = self.job.lock();
            while job.snapshot.run_state == RunState::Paused {
                self.changed.wait(&mut job);
            }
            if job.snapshot.run_state == RunState::Running {
                job.snapshot.run_state = RunState::Errored;
                drop(job);
                self.changed.notify_all();
            }
        }
    }
}

/// Drives one streaming job at a time over a link
pub struct GcodeStreamer {
    link: Arc<dyn CommandLink>,
    sink: Arc<dyn EventSink>,
    inner: Arc<StreamerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GcodeStreamer {
    /// Create an idle streamer
    pub fn new(link: Arc<dyn CommandLink>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            link,
            sink,
            inner: Arc::new(StreamerInner {
                job: Mutex::new(JobState::default()),
                changed: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start streaming `program`
    ///
    /// Refused when the program is empty, the link is down or a job is
    /// already running or paused. A refusal changes nothing.
    pub fn start(&self, program: GcodeProgram) -> Result<(), StreamError> {
        let mut worker = self.worker.lock();

        if self.is_active() {
            return Err(self.refuse("a job is already running"));
        }
        if program.is_empty() {
            return Err(self.refuse("no valid G-Code lines"));
        }
        if !self.link.is_connected() {
            return Err(self.refuse("not connected"));
        }

        if let Some(previous) = worker.take() {
            if previous.join().is_err() {
                tracing::error!("Previous streaming thread panicked");
            }
        }

        if !self.link.claim_stream() {
            let error = StreamError::AlreadyStreaming;
            tracing::warn!("{}", error);
            self.sink.on_error(ErrorKind::Usage, &error.to_string());
            return Err(error);
        }

        let job_id = Uuid::new_v4();
        let total = program.len();
        {
            let mut job = self.inner.job.lock();
            job.snapshot = JobSnapshot {
                cursor: 0,
                total,
                run_state: RunState::Running,
                job_id: Some(job_id),
            };
            job.worker_alive = true;
        }

        tracing::info!("Starting job {} ({} lines)", job_id, total);
        self.sink.on_log(&format!("Streaming {} lines", total));

        let spawned = {
            let inner = Arc::clone(&self.inner);
            let link = Arc::clone(&self.link);
            let sink = Arc::clone(&self.sink);
            thread::Builder::new()
                .name("gcode-streamer".to_string())
                .spawn(move || run_job(inner, link, sink, program))
        };

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.link.release_stream();
                {
                    let mut job = self.inner.job.lock();
                    job.snapshot.run_state = RunState::Errored;
                    job.worker_alive = false;
                }
                self.inner.changed.notify_all();
                Err(self.refuse(&e.to_string()))
            }
        }
    }

    fn refuse(&self, reason: &str) -> StreamError {
        let error = StreamError::CannotStart {
            reason: reason.to_string(),
        };
        tracing::warn!("{}", error);
        self.sink.on_error(ErrorKind::Usage, &error.to_string());
        error
    }

    /// Suspend sending after the line in flight. Only valid while running.
    pub fn pause(&self) {
        let paused = {
            let mut job = self.inner.job.lock();
            if job.snapshot.run_state == RunState::Running {
                job.snapshot.run_state = RunState::Paused;
                true
            } else {
                false
            }
        };
        if paused {
            tracing::info!("Job paused");
            self.sink.on_log("Paused");
        }
    }

    /// Continue a paused job
    pub fn resume(&self) {
        let resumed = {
            let mut job = self.inner.job.lock();
            if job.snapshot.run_state == RunState::Paused {
                job.snapshot.run_state = RunState::Running;
                true
            } else {
                false
            }
        };
        if resumed {
            self.inner.changed.notify_all();
            tracing::info!("Job resumed");
            self.sink.on_log("Resumed");
        }
    }

    /// Stop the job and wait for its thread to exit
    ///
    /// No line is sent and no progress is reported once this returns.
    pub fn stop(&self) {
        self.request_stop();
        self.join_worker();
        self.wait_for_worker();
    }

    /// Stop the job, waiting at most `timeout` for its thread to exit
    ///
    /// Returns false if the thread was still running when the time ran out.
    pub fn stop_within(&self, timeout: Duration) -> bool {
        self.request_stop();
        if self.wait_timeout(timeout).is_none() {
            tracing::warn!("Job did not stop within {:?}", timeout);
            return false;
        }
        self.join_worker();
        true
    }

    fn request_stop(&self) {
        let stopped = {
            let mut job = self.inner.job.lock();
            if job.snapshot.run_state.is_active() {
                job.snapshot.run_state = RunState::Stopped;
                true
            } else {
                false
            }
        };

        if stopped {
            self.inner.changed.notify_all();
            self.link.cancel_response();
            tracing::info!("Job stopped");
            self.sink.on_log("Stopped");
        }
    }

    fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Streaming thread panicked");
            }
        }
    }

    /// Block until the current job's thread exits, then return its final state
    pub fn wait(&self) -> JobSnapshot {
        self.wait_for_worker();
        self.snapshot()
    }

    /// Like [`GcodeStreamer::wait`], giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobSnapshot> {
        let deadline = Instant::now() + timeout;
        let mut job = self.inner.job.lock();
        while job.worker_alive {
            if self.inner.changed.wait_until(&mut job, deadline).timed_out() && job.worker_alive {
                return None;
            }
        }
        Some(job.snapshot)
    }

    fn wait_for_worker(&self) {
        let mut job = self.inner.job.lock();
        while job.worker_alive {
            self.inner.changed.wait(&mut job);
        }
    }

    /// Current run state
    pub fn run_state(&self) -> RunState {
        self.inner.job.lock().snapshot.run_state
    }

    /// Current job snapshot
    pub fn snapshot(&self) -> JobSnapshot {
        self.inner.job.lock().snapshot
    }

    /// Whether a job is running or paused
    pub fn is_active(&self) -> bool {
        self.run_state().is_active()
    }
}

fn run_job(
    inner: Arc<StreamerInner>,
    link: Arc<dyn CommandLink>,
    sink: Arc<dyn EventSink>,
    program: GcodeProgram,
) {
    let total = program.len();

    loop {
        let index = {
            let mut job = inner.job.lock();
            while job.snapshot.run_state == RunState::Paused {
                inner.changed.wait(&mut job);
            }
            if job.snapshot.run_state != RunState::Running {
                break;
            }
            if job.snapshot.cursor >= total {
                job.snapshot.run_state = RunState::Finished;
                None
            } else {
                Some(job.snapshot.cursor)
            }
        };

        let Some(index) = index else {
            inner.changed.notify_all();
            tracing::info!("Job finished ({} lines)", total);
            sink.on_log("Job finished");
            break;
        };

        let Some(line) = program.get(index) else {
            break;
        };
        let line_number = index + 1;

        link.expect_response();
        if let Err(e) = link.send_line(line) {
            inner.fail(
                sink.as_ref(),
                ErrorKind::Transport,
                &format!("Send failed on line {}: {}", line_number, e),
            );
            break;
        }

        match link.wait_response() {
            ResponseOutcome::Line(response) => {
                if !is_accepted(&response) {
                    let error = StreamError::Rejected {
                        line_number,
                        line: line.to_string(),
                        response,
                    };
                    inner.fail(sink.as_ref(), ErrorKind::Protocol, &error.to_string());
                    break;
                }
            }
            ResponseOutcome::LinkClosed => {
                let error = StreamError::LinkClosed { line_number };
                inner.fail(sink.as_ref(), ErrorKind::Transport, &error.to_string());
                break;
            }
            ResponseOutcome::Cancelled => break,
        }

        let progress = {
            let mut job = inner.job.lock();
            if !job.snapshot.run_state.is_active() {
                break;
            }
            // A paused job still counts the answered line; Finished is
            // only reached from Running at the top of the loop.
            job.snapshot.cursor += 1;
            job.snapshot.progress()
        };

        sink.on_progress(progress);
        sink.on_log(&format!("Progress: {}", progress));
    }

    link.release_stream();
    inner.job.lock().worker_alive = false;
    inner.changed.notify_all();
}

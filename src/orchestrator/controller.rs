//! Job lifecycle controller.
//!
//! Owns the single job slot and its state machine. The converter runs on a
//! worker task; everything the worker observes comes back as a
//! [`WorkerEvent`] and is applied here, on the control context, which is the
//! only place the presentation gateway is called from.

use super::classify::classify_line;
use super::gateway::PresentationGateway;
use crate::command::{build_argv, display_argv};
use crate::engine::{self, Terminator};
use crate::error::{JobError, SYNTHETIC_EXIT_CODE};
use crate::model::{FinalStatus, JobOptions, JobState, LineClass, OutputLine, ScriptInvocation};
use anyhow::Result;
use std::io;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const SEPARATOR_WIDTH: usize = 100;

/// How long a quitting application waits for a stopped converter before killing it.
const QUIT_GRACE: Duration = Duration::from_secs(5);

/// Commands emitted by presentation layers to control jobs.
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "tui"), allow(dead_code))]
pub(crate) enum UiCommand {
    Start(JobOptions),
    Cancel,
    Quit,
}

/// What the worker reports back. `Completed` is always the last event of a job.
enum WorkerEvent {
    Spawned(Terminator),
    Line(String),
    Completed(std::result::Result<i32, JobError>),
}

enum Pumped {
    Event(Option<WorkerEvent>),
    WorkerGone(std::result::Result<(), JoinError>),
}

/// Bookkeeping for the job occupying the slot.
struct ActiveJob {
    terminator: Option<Terminator>,
    handle: Option<JoinHandle<()>>,
    /// Set once `on_finished` has been called (cancellation reports early).
    outcome_reported: bool,
    started_at: Instant,
}

pub struct JobController<G> {
    invocation: ScriptInvocation,
    gateway: G,
    state: JobState,
    active: Option<ActiveJob>,
    worker_tx: UnboundedSender<WorkerEvent>,
    worker_rx: UnboundedReceiver<WorkerEvent>,
}

fn separator() -> String {
    "=".repeat(SEPARATOR_WIDTH)
}

impl<G: PresentationGateway> JobController<G> {
    pub fn new(invocation: ScriptInvocation, gateway: G) -> Self {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        Self {
            invocation,
            gateway,
            state: JobState::Idle,
            active: None,
            worker_tx,
            worker_rx,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == JobState::Idle
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn into_gateway(self) -> G {
        self.gateway
    }

    fn transition(&mut self, next: JobState) {
        debug!("Job state {} -> {}", self.state, next);
        self.state = next;
        self.gateway.on_status_changed(next);
    }

    fn emit(&mut self, text: impl Into<String>, class: LineClass) {
        self.gateway.on_line(OutputLine::new(text, class));
    }

    /// Validate `options` and launch a job. Rejected without side effects when
    /// a job is already active. Must be called from within a tokio runtime.
    pub fn start(&mut self, options: JobOptions) -> std::result::Result<(), JobError> {
        if self.state != JobState::Idle {
            warn!("Start ignored: a job is already {}", self.state);
            return Err(JobError::Busy(self.state));
        }
        if !options.input_dir.is_dir() {
            let err = JobError::Validation {
                path: options.input_dir.clone(),
            };
            warn!("Start rejected: {}", err);
            self.emit(format!("Error: {err}"), LineClass::Error);
            return Err(err);
        }

        self.transition(JobState::Starting);
        let argv = build_argv(&self.invocation, &options);
        let shown = display_argv(&argv);
        info!("Starting conversion: {}", shown);
        self.emit(format!("Executing: {shown}"), LineClass::Info);
        self.emit(separator(), LineClass::Plain);

        let handle = tokio::spawn(run_worker(argv, self.worker_tx.clone()));
        self.active = Some(ActiveJob {
            terminator: None,
            handle: Some(handle),
            outcome_reported: false,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Ask the running converter to stop. Reports `Stopped` immediately; the
    /// slot is released once the child has been reaped. No-op unless running.
    pub fn cancel(&mut self) {
        if self.state != JobState::Running {
            debug!("Cancel ignored while {}", self.state);
            return;
        }
        if let Some(job) = self.active.as_mut() {
            if let Some(terminator) = &job.terminator {
                terminator.terminate();
            }
            job.outcome_reported = true;
        }
        info!("Conversion stopped by user");
        self.transition(JobState::Stopping);
        self.emit("", LineClass::Plain);
        self.emit("Conversion stopped by user.", LineClass::Warning);
        self.gateway.on_finished(FinalStatus::Stopped, None);
    }

    /// Kill a converter that ignored the termination request.
    pub fn force_kill(&mut self) {
        let Some(terminator) = self.active.as_ref().and_then(|j| j.terminator.clone()) else {
            return;
        };
        if terminator.kill() {
            self.emit(
                "Converter did not stop in time; killing it.",
                LineClass::Warning,
            );
        }
    }

    /// Wait for and apply the next worker event. Returns `false` when no job
    /// is active. Cancel-safe.
    pub async fn pump(&mut self) -> bool {
        let Some(job) = self.active.as_mut() else {
            return false;
        };
        let worker_rx = &mut self.worker_rx;
        // Drain events before looking at the task: a worker that reported
        // completion has always queued `Completed` before it returns.
        let next = tokio::select! {
            biased;
            ev = worker_rx.recv() => Pumped::Event(ev),
            joined = async {
                match job.handle.as_mut() {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            } => Pumped::WorkerGone(joined),
        };

        match next {
            Pumped::Event(Some(ev)) => self.apply(ev),
            Pumped::Event(None) => {
                self.finish(Err(JobError::Stream(io::Error::other(
                    "worker channel closed",
                ))));
            }
            Pumped::WorkerGone(joined) => {
                if let Some(job) = self.active.as_mut() {
                    job.handle = None;
                }
                let reason = match joined {
                    Ok(()) => "worker exited without reporting completion".to_string(),
                    Err(e) => format!("worker task failed: {e}"),
                };
                error!("{}", reason);
                self.finish(Err(JobError::Stream(io::Error::other(reason))));
            }
        }
        true
    }

    /// Pump until the slot is free again.
    pub async fn run_until_idle(&mut self) {
        while self.pump().await {}
    }

    fn apply(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Spawned(terminator) => {
                if let Some(job) = self.active.as_mut() {
                    job.terminator = Some(terminator);
                }
                if self.state == JobState::Starting {
                    self.transition(JobState::Running);
                }
            }
            WorkerEvent::Line(text) => {
                let class = classify_line(&text);
                self.gateway.on_line(OutputLine::new(text, class));
            }
            WorkerEvent::Completed(result) => self.finish(result),
        }
    }

    fn finish(&mut self, result: std::result::Result<i32, JobError>) {
        let Some(job) = self.active.take() else {
            return;
        };
        let elapsed = job.started_at.elapsed();

        if job.outcome_reported {
            match &result {
                Ok(code) => info!("Stopped converter reaped (exit code {}) after {:?}", code, elapsed),
                Err(e) => warn!("Stopped converter ended with an error: {}", e),
            }
            self.transition(JobState::Finishing);
            self.transition(JobState::Idle);
            return;
        }

        match result {
            Ok(code) => {
                self.transition(JobState::Finishing);
                let status = FinalStatus::from_exit_code(code);
                info!("Conversion finished with exit code {} after {:?}", code, elapsed);
                self.emit("", LineClass::Plain);
                self.emit(separator(), LineClass::Plain);
                match status {
                    FinalStatus::Success => {
                        self.emit("Conversion completed successfully!", LineClass::Success)
                    }
                    _ => self.emit(
                        format!("Conversion failed with exit code {code}"),
                        LineClass::Error,
                    ),
                }
                self.gateway.on_finished(status, Some(code));
            }
            Err(err) => {
                error!("Conversion job failed: {}", err);
                if self.state == JobState::Running {
                    self.transition(JobState::Finishing);
                }
                self.emit("", LineClass::Plain);
                self.emit(format!("Error: {err}"), LineClass::Error);
                self.gateway
                    .on_finished(FinalStatus::Failure, Some(SYNTHETIC_EXIT_CODE));
            }
        }
        self.transition(JobState::Idle);
    }
}

/// Worker body: spawn, stream lines, reap. Runs off the control context.
async fn run_worker(argv: Vec<String>, tx: UnboundedSender<WorkerEvent>) {
    let mut process = match engine::start(&argv) {
        Ok(p) => p,
        Err(e) => {
            let _ = tx.send(WorkerEvent::Completed(Err(e)));
            return;
        }
    };
    debug!("Converter running as pid {:?}", process.pid());
    let _ = tx.send(WorkerEvent::Spawned(process.terminator()));

    let mut stream_error = None;
    while let Some(line) = process.next_line().await {
        match line {
            Ok(text) => {
                let _ = tx.send(WorkerEvent::Line(text));
            }
            Err(e) => {
                warn!("Reading converter output failed: {}", e);
                process.terminator().terminate();
                stream_error = Some(e);
                break;
            }
        }
    }

    let waited = process.wait().await;
    let result = match (stream_error, waited) {
        (Some(e), _) | (None, Err(e)) => Err(JobError::Stream(e)),
        (None, Ok(code)) => Ok(code),
    };
    let _ = tx.send(WorkerEvent::Completed(result));
}

/// Drive a controller from presentation-layer commands until `Quit`.
///
/// Quit cancels an active job and waits for the converter to be reaped,
/// killing it if it has not exited after a grace period.
#[cfg_attr(not(feature = "tui"), allow(dead_code))]
pub(crate) async fn run_controller<G: PresentationGateway>(
    controller: &mut JobController<G>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut quit_pending = false;
    let mut kill_deadline: Option<Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Start(options)) => {
                        // Rejections are already reported through the gateway.
                        let _ = controller.start(options);
                    }
                    Some(UiCommand::Cancel) => controller.cancel(),
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                        if controller.is_idle() {
                            break;
                        }
                        controller.cancel();
                        kill_deadline = Some(Instant::now() + QUIT_GRACE);
                    }
                }
            }
            _ = controller.pump(), if !controller.is_idle() => {
                if quit_pending {
                    if controller.is_idle() {
                        break;
                    }
                    // Covers a quit that arrived while the job was still starting.
                    controller.cancel();
                }
            }
            _ = watchdog.tick(), if kill_deadline.is_some() => {
                if kill_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    controller.force_kill();
                    kill_deadline = None;
                }
            }
            else => break,
        }
    }

    Ok(())
}

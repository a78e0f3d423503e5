use crate::command::build_argv;
use crate::model::{
    FinalStatus, JobOptions, JobState, LineClass, OutputLine, ScriptInvocation, AUDIO_CODECS,
    CONTAINER_FORMATS, MAX_PARALLELISM, MIN_PARALLELISM,
};
use crate::orchestrator::{JobController, PresentationGateway};
use crate::report::{JobRecorder, JobReport};
use anyhow::{anyhow, bail, Context, Result};
use clap::builder::PossibleValuesParser;
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Script looked up next to the executable when `--script` is not given.
pub const DEFAULT_SCRIPT_NAME: &str = "convert.sh";

/// Output line routing for stdout/stderr writer.
enum ConsoleLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<ConsoleLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ConsoleLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                ConsoleLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                ConsoleLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "audio-converter",
    version,
    about = "Batch-convert the audio tracks of video files with an external script, with optional TUI"
)]
pub struct Cli {
    /// Directory containing the videos to convert [default: ~/Videos, else the current directory]
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Directory for converted files [default: ~/Videos if it exists, else same as input]
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Target audio codec
    #[arg(
        short = 'a',
        long,
        default_value = "lpcm",
        value_parser = PossibleValuesParser::new(AUDIO_CODECS.iter().copied())
    )]
    pub audio_codec: String,

    /// Output container format
    #[arg(
        short = 'f',
        long,
        default_value = "mov",
        value_parser = PossibleValuesParser::new(CONTAINER_FORMATS.iter().copied())
    )]
    pub format: String,

    /// Number of files converted in parallel
    #[arg(
        short = 'j',
        long,
        default_value_t = MIN_PARALLELISM,
        value_parser = clap::value_parser!(u8).range(MIN_PARALLELISM as i64..=MAX_PARALLELISM as i64)
    )]
    pub jobs: u8,

    /// Only report what would be converted
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Keep the original files next to the converted ones
    #[arg(short = 'k', long)]
    pub keep_originals: bool,

    /// Overwrite existing output files
    #[arg(short = 'F', long)]
    pub force: bool,

    /// Path to the converter script [default: convert.sh next to this executable]
    #[arg(long, env = "AUDIO_CONVERTER_SCRIPT")]
    pub script: Option<PathBuf>,

    /// Program used to run the script
    #[arg(long, default_value = "bash")]
    pub interpreter: String,

    /// Run the job, print its output as text and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run the job and print a JSON report (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Start converting as soon as the TUI opens
    #[arg(long)]
    pub start_on_launch: bool,

    /// Where the TUI writes diagnostics [default: <data dir>/audio-converter/audio-converter.log]
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// True when no interactive front-end will own the terminal.
    pub fn is_non_tui(&self) -> bool {
        self.text || self.json || cfg!(not(feature = "tui"))
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let invocation = resolve_invocation(&args)?;
    info!(
        "Using converter script {} via {}",
        invocation.script.display(),
        invocation.interpreter
    );

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args, invocation).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args, invocation).await;
        }
    }

    if args.json {
        return run_json(args, invocation).await;
    }

    run_text(args, invocation).await
}

fn videos_dir() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join("Videos"))
        .filter(|p| p.is_dir())
}

/// `~/Videos` when it exists, otherwise the working directory.
pub fn default_input_dir() -> PathBuf {
    videos_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `~/Videos` when it exists; otherwise converted files land next to the inputs.
pub fn default_output_dir() -> Option<PathBuf> {
    videos_dir()
}

/// Default location of the TUI diagnostics log.
pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("audio-converter")
        .join("audio-converter.log")
}

/// Build `JobOptions` from CLI arguments.
pub fn build_options(args: &Cli) -> JobOptions {
    JobOptions {
        input_dir: args.input.clone().unwrap_or_else(default_input_dir),
        output_dir: args.output.clone().or_else(default_output_dir),
        audio_codec: args.audio_codec.clone(),
        container_format: args.format.clone(),
        parallelism: args.jobs,
        dry_run: args.dry_run,
        keep_originals: args.keep_originals,
        force: args.force,
    }
}

/// Locate the converter script. A missing script is fatal at startup.
pub fn resolve_invocation(args: &Cli) -> Result<ScriptInvocation> {
    let script = match &args.script {
        Some(path) => path.clone(),
        None => {
            let exe = std::env::current_exe().context("failed to locate the running executable")?;
            exe.parent()
                .map(|dir| dir.join(DEFAULT_SCRIPT_NAME))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPT_NAME))
        }
    };
    if !script.is_file() {
        bail!("converter script not found at {}", script.display());
    }
    Ok(ScriptInvocation::new(args.interpreter.clone(), script))
}

/// Ctrl-C handling for the line modes. The first interrupt stops the job
/// gracefully, one arriving while the job is stopping kills it.
#[derive(Debug, Default)]
struct Interrupts {
    /// An interrupt arrived before the converter was running.
    cancel_pending: bool,
}

impl Interrupts {
    /// React to one Ctrl-C. Returns `false` once further interrupts are moot.
    fn interrupt<G: PresentationGateway>(&mut self, controller: &mut JobController<G>) -> bool {
        match controller.state() {
            JobState::Starting => {
                self.cancel_pending = true;
                true
            }
            JobState::Running => {
                controller.cancel();
                true
            }
            JobState::Stopping => {
                controller.force_kill();
                false
            }
            JobState::Idle | JobState::Finishing => true,
        }
    }

    /// Apply an interrupt deferred while the job was starting.
    fn settle<G: PresentationGateway>(&mut self, controller: &mut JobController<G>) {
        if self.cancel_pending && controller.state() != JobState::Starting {
            self.cancel_pending = false;
            controller.cancel();
        }
    }
}

/// Pump a started job to completion, stopping it on Ctrl-C.
async fn drive_job<G: PresentationGateway>(controller: &mut JobController<G>) {
    let mut interrupts = Interrupts::default();
    let mut ctrl_c_armed = true;
    loop {
        tokio::select! {
            progressed = controller.pump() => {
                if !progressed {
                    break;
                }
                interrupts.settle(controller);
            }
            res = tokio::signal::ctrl_c(), if ctrl_c_armed => {
                match res {
                    Ok(()) => ctrl_c_armed = interrupts.interrupt(controller),
                    Err(e) => {
                        warn!("Cannot listen for Ctrl-C: {}", e);
                        ctrl_c_armed = false;
                    }
                }
            }
        }
    }
}

fn outcome_to_result(outcome: Option<(FinalStatus, Option<i32>)>) -> Result<()> {
    match outcome {
        Some((FinalStatus::Success, _)) => Ok(()),
        Some((status, code)) => Err(anyhow!(status.to_message(code))),
        None => Err(anyhow!("conversion did not finish")),
    }
}

/// Text-mode gateway: colours lines onto stdout, status onto stderr, and
/// keeps a recording for the closing summary.
struct ConsoleGateway {
    out_tx: mpsc::UnboundedSender<ConsoleLine>,
    recorder: JobRecorder,
}

impl ConsoleGateway {
    fn new(out_tx: mpsc::UnboundedSender<ConsoleLine>) -> Self {
        Self {
            out_tx,
            recorder: JobRecorder::default(),
        }
    }

    fn stderr(&self, msg: impl Into<String>) {
        let _ = self.out_tx.send(ConsoleLine::Stderr(msg.into()));
    }
}

fn colorize(line: &OutputLine) -> String {
    match line.class {
        LineClass::Plain => line.text.clone(),
        LineClass::Success => line.text.green().to_string(),
        LineClass::Error => line.text.red().to_string(),
        LineClass::Info => line.text.blue().to_string(),
        LineClass::Warning => line.text.yellow().to_string(),
    }
}

impl PresentationGateway for ConsoleGateway {
    fn on_line(&mut self, line: OutputLine) {
        let _ = self.out_tx.send(ConsoleLine::Stdout(colorize(&line)));
        self.recorder.on_line(line);
    }

    fn on_status_changed(&mut self, state: JobState) {
        if state != JobState::Idle {
            self.stderr(format!("== {state} ==").dimmed().to_string());
        }
        self.recorder.on_status_changed(state);
    }

    fn on_finished(&mut self, status: FinalStatus, exit_code: Option<i32>) {
        self.recorder.on_finished(status, exit_code);
    }
}

async fn run_text(args: Cli, invocation: ScriptInvocation) -> Result<()> {
    let options = build_options(&args);
    let argv = build_argv(&invocation, &options);
    let (out_tx, out_handle) = spawn_output_writer();

    let mut controller = JobController::new(invocation, ConsoleGateway::new(out_tx));
    let started_at = time::OffsetDateTime::now_utc();
    let clock = std::time::Instant::now();

    let started = controller.start(options);
    if started.is_ok() {
        drive_job(&mut controller).await;
    }

    let gateway = controller.into_gateway();
    let result = match started {
        Ok(()) => {
            let report = JobReport::from_recorder(&gateway.recorder, argv, started_at, clock.elapsed());
            for line in report.summary_lines() {
                gateway.stderr(line);
            }
            outcome_to_result(gateway.recorder.outcome())
        }
        Err(e) => Err(anyhow::Error::new(e)),
    };

    drop(gateway);
    let _ = out_handle.await;
    result
}

async fn run_json(args: Cli, invocation: ScriptInvocation) -> Result<()> {
    let options = build_options(&args);
    let argv = build_argv(&invocation, &options);
    let (out_tx, out_handle) = spawn_output_writer();

    let mut controller = JobController::new(invocation, JobRecorder::default());
    let started_at = time::OffsetDateTime::now_utc();
    let clock = std::time::Instant::now();

    controller
        .start(options)
        .context("failed to start conversion")?;
    drive_job(&mut controller).await;

    let recorder = controller.into_gateway();
    let report = JobReport::from_recorder(&recorder, argv, started_at, clock.elapsed());
    let out = serde_json::to_string_pretty(&report)?;
    let _ = out_tx.send(ConsoleLine::Stdout(out));

    drop(out_tx);
    let _ = out_handle.await;
    outcome_to_result(recorder.outcome())
}

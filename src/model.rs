use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Codecs offered by the presentation layers. The core passes any string through.
pub const AUDIO_CODECS: &[&str] = &["lpcm", "pcm_s16le", "ac3", "aac", "mp3", "opus"];

/// Container formats offered by the presentation layers.
pub const CONTAINER_FORMATS: &[&str] = &["mov", "mp4", "mkv", "avi"];

pub const MIN_PARALLELISM: u8 = 1;
pub const MAX_PARALLELISM: u8 = 16;

/// Everything the user chose for one conversion run, captured atomically at Start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub input_dir: PathBuf,
    /// `None` (or an empty path) means "write next to the inputs".
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    pub audio_codec: String,
    pub container_format: String,
    pub parallelism: u8,
    pub dry_run: bool,
    pub keep_originals: bool,
    pub force: bool,
}

impl JobOptions {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: None,
            audio_codec: "lpcm".into(),
            container_format: "mov".into(),
            parallelism: MIN_PARALLELISM,
            dry_run: false,
            keep_originals: false,
            force: false,
        }
    }

    /// Output directory, if one was given and is non-empty.
    pub fn effective_output_dir(&self) -> Option<&PathBuf> {
        self.output_dir
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// How the external script is invoked: `<interpreter> <script> <flags...>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInvocation {
    pub interpreter: String,
    pub script: PathBuf,
}

impl ScriptInvocation {
    pub fn new(interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
        }
    }
}

/// Job Controller lifecycle. `Idle` is both the initial and the per-job terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Starting,
    Running,
    Stopping,
    Finishing,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Stopping => "stopping",
            JobState::Finishing => "finishing",
        };
        f.write_str(s)
    }
}

/// Display tag attached to each output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineClass {
    Plain,
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub text: String,
    pub class: LineClass,
}

impl OutputLine {
    pub fn new(text: impl Into<String>, class: LineClass) -> Self {
        Self {
            text: text.into(),
            class,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, LineClass::Plain)
    }
}

/// Terminal outcome of a job, reported exactly once through `on_finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Success,
    Failure,
    Stopped,
}

impl FinalStatus {
    /// Success when the child exited with 0, failure (carrying the code) otherwise.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            FinalStatus::Success
        } else {
            FinalStatus::Failure
        }
    }
}

/// Events handed from the control context to presentation layers running elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    Line(OutputLine),
    StatusChanged(JobState),
    Finished {
        status: FinalStatus,
        exit_code: Option<i32>,
    },
}

impl FinalStatus {
    /// Render the status-bar text shown once the job is over.
    pub fn to_message(self, exit_code: Option<i32>) -> String {
        match (self, exit_code) {
            (FinalStatus::Success, _) => "Conversion completed successfully".into(),
            (FinalStatus::Failure, Some(code)) => {
                format!("Conversion failed (exit code {code})")
            }
            (FinalStatus::Failure, None) => "Conversion failed".into(),
            (FinalStatus::Stopped, _) => "Conversion stopped".into(),
        }
    }
}

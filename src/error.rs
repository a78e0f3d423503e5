//! Error taxonomy for the job controller and process runner.

use crate::model::JobState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

/// Exit code reported for launch and stream failures, which have no real code.
pub const SYNTHETIC_EXIT_CODE: i32 = -1;

/// Failures the core can hit before or while running a job.
///
/// A child that runs to completion with a non-zero code is not an error: it is
/// reported as `FinalStatus::Failure` with that code.
#[derive(Debug, Error)]
pub enum JobError {
    /// Bad options before launch; the user corrects them and starts again.
    #[error("input directory does not exist: {}", .path.display())]
    Validation { path: PathBuf },

    /// Start requested while another job still owns the slot.
    #[error("a conversion job is already {0}")]
    Busy(JobState),

    /// The converter process could not be spawned.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Reading the merged output stream, or reaping the child, failed.
    #[error("failed to read converter output: {0}")]
    Stream(#[source] io::Error),
}

impl JobError {
    pub fn launch(program: impl Into<String>, source: io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }
}

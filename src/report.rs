//! Job recording and end-of-run summaries for the non-interactive modes.
//!
//! [`JobRecorder`] is a presentation gateway that keeps every call in order;
//! [`JobReport`] turns a finished recording into JSON or text lines.

use crate::model::{FinalStatus, JobState, LineClass, OutputLine};
use crate::orchestrator::PresentationGateway;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One gateway invocation, as observed by the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Line(OutputLine),
    Status(JobState),
    Finished(FinalStatus, Option<i32>),
}

#[derive(Debug, Default)]
pub struct JobRecorder {
    calls: Vec<GatewayCall>,
}

impl JobRecorder {
    pub fn calls(&self) -> &[GatewayCall] {
        &self.calls
    }

    pub fn lines(&self) -> impl Iterator<Item = &OutputLine> + '_ {
        self.calls.iter().filter_map(|c| match c {
            GatewayCall::Line(line) => Some(line),
            _ => None,
        })
    }

    pub fn statuses(&self) -> Vec<JobState> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Status(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<(FinalStatus, Option<i32>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Finished(status, code) => Some((*status, *code)),
                _ => None,
            })
            .collect()
    }

    /// The most recent terminal outcome, if any job has finished.
    pub fn outcome(&self) -> Option<(FinalStatus, Option<i32>)> {
        self.finished().last().copied()
    }
}

impl PresentationGateway for JobRecorder {
    fn on_line(&mut self, line: OutputLine) {
        self.calls.push(GatewayCall::Line(line));
    }

    fn on_status_changed(&mut self, state: JobState) {
        self.calls.push(GatewayCall::Status(state));
    }

    fn on_finished(&mut self, status: FinalStatus, exit_code: Option<i32>) {
        self.calls.push(GatewayCall::Finished(status, exit_code));
    }
}

/// Serializable summary of one finished job (`--json` output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub started_at: String,
    pub argv: Vec<String>,
    pub status: Option<FinalStatus>,
    pub exit_code: Option<i32>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub line_counts: BTreeMap<String, usize>,
    pub lines: Vec<OutputLine>,
}

impl JobReport {
    pub fn from_recorder(
        recorder: &JobRecorder,
        argv: Vec<String>,
        started_at: time::OffsetDateTime,
        elapsed: Duration,
    ) -> Self {
        let (status, exit_code) = match recorder.outcome() {
            Some((status, code)) => (Some(status), code),
            None => (None, None),
        };

        let mut line_counts = BTreeMap::new();
        for line in recorder.lines() {
            *line_counts.entry(class_name(line.class).to_string()).or_insert(0) += 1;
        }

        Self {
            started_at: started_at
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            argv,
            status,
            exit_code,
            // Millisecond precision keeps the humantime rendering readable.
            elapsed: Duration::from_millis(elapsed.as_millis() as u64),
            line_counts,
            lines: recorder.lines().cloned().collect(),
        }
    }

    /// Human-readable closing lines for text mode.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let outcome = match self.status {
            Some(status) => status.to_message(self.exit_code),
            None => "Conversion did not finish".into(),
        };
        lines.push(format!("Status: {outcome}"));
        lines.push(format!("Elapsed: {}", humantime::format_duration(self.elapsed)));

        let count = |class: LineClass| self.line_counts.get(class_name(class)).copied().unwrap_or(0);
        lines.push(format!(
            "Lines: {} success, {} error, {} info, {} warning",
            count(LineClass::Success),
            count(LineClass::Error),
            count(LineClass::Info),
            count(LineClass::Warning),
        ));
        lines
    }
}

fn class_name(class: LineClass) -> &'static str {
    match class {
        LineClass::Plain => "plain",
        LineClass::Success => "success",
        LineClass::Error => "error",
        LineClass::Info => "info",
        LineClass::Warning => "warning",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded() -> JobRecorder {
        let mut r = JobRecorder::default();
        r.on_status_changed(JobState::Starting);
        r.on_line(OutputLine::new("Executing: bash convert.sh", LineClass::Info));
        r.on_status_changed(JobState::Running);
        r.on_line(OutputLine::new("Found: a.mov", LineClass::Info));
        r.on_line(OutputLine::new("✗ a.mov", LineClass::Error));
        r.on_line(OutputLine::plain("done"));
        r.on_status_changed(JobState::Finishing);
        r.on_finished(FinalStatus::Failure, Some(1));
        r.on_status_changed(JobState::Idle);
        r
    }

    #[test]
    fn recorder_splits_calls_by_kind() {
        let r = recorded();
        assert_eq!(r.calls().len(), 9);
        assert_eq!(r.lines().count(), 4);
        assert_eq!(
            r.statuses(),
            [
                JobState::Starting,
                JobState::Running,
                JobState::Finishing,
                JobState::Idle
            ]
        );
        assert_eq!(r.outcome(), Some((FinalStatus::Failure, Some(1))));
    }

    #[test]
    fn report_counts_lines_per_class() {
        let report = JobReport::from_recorder(
            &recorded(),
            vec!["bash".into(), "convert.sh".into()],
            time::macros::datetime!(2024-05-01 12:00 UTC),
            Duration::from_millis(1500),
        );

        assert_eq!(report.started_at, "2024-05-01T12:00:00Z");
        assert_eq!(report.status, Some(FinalStatus::Failure));
        assert_eq!(report.exit_code, Some(1));
        assert_eq!(report.line_counts.get("info"), Some(&2));
        assert_eq!(report.line_counts.get("error"), Some(&1));
        assert_eq!(report.line_counts.get("plain"), Some(&1));
        assert_eq!(report.line_counts.get("success"), None);

        let summary = report.summary_lines();
        assert_eq!(summary[0], "Status: Conversion failed (exit code 1)");
        assert_eq!(summary[1], "Elapsed: 1s 500ms");
        assert_eq!(summary[2], "Lines: 0 success, 1 error, 2 info, 0 warning");
    }

    #[test]
    fn report_serializes_with_readable_fields() {
        let report = JobReport::from_recorder(
            &recorded(),
            vec!["bash".into()],
            time::macros::datetime!(2024-05-01 12:00 UTC),
            Duration::from_secs(2),
        );
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["status"], "failure");
        assert_eq!(json["elapsed"], "2s");
        assert_eq!(json["lines"][2]["class"], "error");
    }

    #[test]
    fn empty_recording_has_no_outcome() {
        let report = JobReport::from_recorder(
            &JobRecorder::default(),
            Vec::new(),
            time::macros::datetime!(2024-05-01 12:00 UTC),
            Duration::ZERO,
        );
        assert_eq!(report.status, None);
        assert_eq!(report.summary_lines()[0], "Status: Conversion did not finish");
    }
}

//! Boundary between the job controller and whatever presents its output.

use crate::model::{FinalStatus, JobEvent, JobState, OutputLine};
use tokio::sync::mpsc::UnboundedSender;

/// Receives lines and status from the controller. Only ever called from the
/// control context that owns the [`JobController`](super::JobController).
pub trait PresentationGateway {
    /// One call per output line, in emission order.
    fn on_line(&mut self, line: OutputLine);

    /// Every state transition.
    fn on_status_changed(&mut self, state: JobState);

    /// Exactly once per job.
    fn on_finished(&mut self, status: FinalStatus, exit_code: Option<i32>);
}

/// Forwards gateway calls as [`JobEvent`]s to a presentation layer running
/// on another thread (the TUI).
#[cfg_attr(not(feature = "tui"), allow(dead_code))]
pub struct ChannelGateway {
    tx: UnboundedSender<JobEvent>,
}

#[cfg_attr(not(feature = "tui"), allow(dead_code))]
impl ChannelGateway {
    pub fn new(tx: UnboundedSender<JobEvent>) -> Self {
        Self { tx }
    }
}

impl PresentationGateway for ChannelGateway {
    fn on_line(&mut self, line: OutputLine) {
        let _ = self.tx.send(JobEvent::Line(line));
    }

    fn on_status_changed(&mut self, state: JobState) {
        let _ = self.tx.send(JobEvent::StatusChanged(state));
    }

    fn on_finished(&mut self, status: FinalStatus, exit_code: Option<i32>) {
        let _ = self.tx.send(JobEvent::Finished { status, exit_code });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineClass;

    #[test]
    fn channel_gateway_preserves_call_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut gateway = ChannelGateway::new(tx);

        gateway.on_status_changed(JobState::Starting);
        gateway.on_line(OutputLine::new("Found: a.mp4", LineClass::Info));
        gateway.on_finished(FinalStatus::Failure, Some(2));

        assert!(matches!(rx.try_recv(), Ok(JobEvent::StatusChanged(JobState::Starting))));
        match rx.try_recv() {
            Ok(JobEvent::Line(line)) => assert_eq!(line.text, "Found: a.mp4"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(JobEvent::Finished {
                status: FinalStatus::Failure,
                exit_code: Some(2)
            })
        ));
        assert!(rx.try_recv().is_err());
    }
}

use crate::model::{
    FinalStatus, JobEvent, JobOptions, JobState, LineClass, OutputLine, AUDIO_CODECS,
    CONTAINER_FORMATS, MAX_PARALLELISM, MIN_PARALLELISM,
};
use ratatui::style::{Color, Style};
use std::path::PathBuf;

/// Which path field is being typed into, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathField {
    Input,
    Output,
}

pub struct UiState {
    pub options: JobOptions,
    pub job_state: JobState,
    /// Status-bar text of the last finished job, shown once the slot is idle again.
    pub final_message: Option<String>,
    pub last_status: Option<FinalStatus>,
    pub log: Vec<OutputLine>,
    /// Lines scrolled up from the bottom; 0 follows new output.
    pub scroll_back: usize,
    pub show_help: bool,
    pub info: String,
    // Path editing
    pub editing: Option<PathField>,
    pub edit_buffer: String,
}

impl UiState {
    pub fn new(options: JobOptions) -> Self {
        Self {
            options,
            job_state: JobState::Idle,
            final_message: None,
            last_status: None,
            log: Vec::new(),
            scroll_back: 0,
            show_help: false,
            info: String::new(),
            editing: None,
            edit_buffer: String::new(),
        }
    }

    pub fn apply_event(&mut self, ev: JobEvent) {
        match ev {
            JobEvent::Line(line) => {
                if self.scroll_back > 0 {
                    // Keep the viewport anchored while the user reads back.
                    self.scroll_back += 1;
                }
                self.log.push(line);
            }
            JobEvent::StatusChanged(state) => {
                if state == JobState::Starting {
                    // Each run starts from an empty log; its "Executing:" line follows.
                    self.log.clear();
                    self.final_message = None;
                    self.last_status = None;
                    self.scroll_back = 0;
                }
                self.job_state = state;
            }
            JobEvent::Finished { status, exit_code } => {
                self.final_message = Some(status.to_message(exit_code));
                self.last_status = Some(status);
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.job_state == JobState::Idle
    }

    pub fn status_text(&self) -> String {
        match self.job_state {
            JobState::Idle => self.final_message.clone().unwrap_or_else(|| "Ready".into()),
            JobState::Starting | JobState::Running => "Running conversion...".into(),
            JobState::Stopping => "Stopping...".into(),
            JobState::Finishing => self
                .final_message
                .clone()
                .unwrap_or_else(|| "Finishing...".into()),
        }
    }

    pub fn status_style(&self) -> Style {
        match self.job_state {
            JobState::Starting | JobState::Running => Style::default().fg(Color::Cyan),
            JobState::Stopping => Style::default().fg(Color::Yellow),
            JobState::Idle | JobState::Finishing => match self.last_status {
                Some(FinalStatus::Success) => Style::default().fg(Color::Green),
                Some(FinalStatus::Failure) => Style::default().fg(Color::Red),
                Some(FinalStatus::Stopped) => Style::default().fg(Color::Yellow),
                None => Style::default(),
            },
        }
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.scroll_back = 0;
    }

    /// The whole log as plain text, one line per entry.
    pub fn log_text(&self) -> String {
        self.log
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn cycle_codec(&mut self) {
        self.options.audio_codec = next_choice(AUDIO_CODECS, &self.options.audio_codec);
    }

    pub fn cycle_format(&mut self) {
        self.options.container_format =
            next_choice(CONTAINER_FORMATS, &self.options.container_format);
    }

    pub fn adjust_jobs(&mut self, delta: i8) {
        let next = self.options.parallelism as i16 + delta as i16;
        self.options.parallelism = next.clamp(MIN_PARALLELISM as i16, MAX_PARALLELISM as i16) as u8;
    }

    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.log.len().saturating_sub(1);
        self.scroll_back = (self.scroll_back + lines).min(max);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_back = self.log.len().saturating_sub(1);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_back = 0;
    }

    pub fn begin_edit(&mut self, field: PathField) {
        let current = match field {
            PathField::Input => Some(&self.options.input_dir),
            PathField::Output => self.options.output_dir.as_ref(),
        };
        self.edit_buffer = current
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.editing = Some(field);
    }

    /// Commit the edit buffer into the options. An empty output path clears it.
    pub fn commit_edit(&mut self) {
        let Some(field) = self.editing.take() else {
            return;
        };
        let text = std::mem::take(&mut self.edit_buffer);
        let text = text.trim();
        match field {
            PathField::Input => {
                if !text.is_empty() {
                    self.options.input_dir = expand_home(text);
                }
            }
            PathField::Output => {
                self.options.output_dir = if text.is_empty() {
                    None
                } else {
                    Some(expand_home(text))
                };
            }
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.edit_buffer.clear();
    }
}

fn next_choice(choices: &[&str], current: &str) -> String {
    let next = choices
        .iter()
        .position(|c| *c == current)
        .map(|i| (i + 1) % choices.len())
        .unwrap_or(0);
    choices.get(next).copied().unwrap_or(current).to_string()
}

fn expand_home(text: &str) -> PathBuf {
    match text.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(text)),
        None => PathBuf::from(text),
    }
}

pub fn line_style(class: LineClass) -> Style {
    match class {
        LineClass::Plain => Style::default(),
        LineClass::Success => Style::default().fg(Color::Green),
        LineClass::Error => Style::default().fg(Color::Red),
        LineClass::Info => Style::default().fg(Color::Blue),
        LineClass::Warning => Style::default().fg(Color::Yellow),
    }
}

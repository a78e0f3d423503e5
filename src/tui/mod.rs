mod clipboard;
mod help;
mod state;

use crate::cli::{build_options, Cli};
use crate::model::{JobEvent, JobOptions, ScriptInvocation};
use crate::orchestrator::{self, ChannelGateway, JobController, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use state::{line_style, PathField, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

const PAGE: usize = 10;

pub async fn run(args: Cli, invocation: ScriptInvocation) -> Result<()> {
    // Unbounded channels keep the controller from ever waiting on the UI.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<JobEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let options = build_options(&args);
    if args.start_on_launch {
        let _ = cmd_tx.send(UiCommand::Start(options.clone()));
    }

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(options, event_rx, cmd_tx));

    let mut controller = JobController::new(invocation, ChannelGateway::new(event_tx));
    let res = orchestrator::run_controller(&mut controller, cmd_rx).await;
    // Closing the event channel tells the UI thread the controller is done.
    drop(controller);

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    options: JobOptions,
    mut event_rx: UnboundedReceiver<JobEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(options);
    let mut quitting = false;

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        let controller_gone = loop {
            match event_rx.try_recv() {
                Ok(ev) => state.apply_event(ev),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if controller_gone {
            debug!("Controller closed its event channel; leaving the TUI");
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if quitting {
                    // A second quit leaves immediately; the controller still reaps the job.
                    if is_quit_key(&k) {
                        break Ok(());
                    }
                    continue;
                }
                if handle_key(&mut state, k, &cmd_tx) {
                    quitting = true;
                    if !state.is_idle() {
                        state.info = "Waiting for the converter to stop...".into();
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn is_quit_key(k: &KeyEvent) -> bool {
    matches!(
        (k.modifiers, k.code),
        (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c'))
    )
}

/// Apply one key press. Returns `true` once the user asked to quit.
fn handle_key(state: &mut UiState, k: KeyEvent, cmd_tx: &UnboundedSender<UiCommand>) -> bool {
    if let Some(field) = state.editing {
        match k.code {
            KeyCode::Enter => {
                state.commit_edit();
                state.info = match field {
                    PathField::Input => "Input directory updated".into(),
                    PathField::Output => "Output directory updated".into(),
                };
            }
            KeyCode::Esc => state.cancel_edit(),
            KeyCode::Backspace => {
                state.edit_buffer.pop();
            }
            KeyCode::Char(c) => state.edit_buffer.push(c),
            _ => {}
        }
        return false;
    }

    if is_quit_key(&k) {
        info!("Quit requested from the TUI");
        let _ = cmd_tx.send(UiCommand::Quit);
        return true;
    }

    match k.code {
        KeyCode::Enter => {
            if state.is_idle() {
                let _ = cmd_tx.send(UiCommand::Start(state.options.clone()));
                state.info.clear();
            } else {
                state.info = "A conversion is already running".into();
            }
        }
        KeyCode::Esc if state.show_help => state.show_help = false,
        KeyCode::Char('s') | KeyCode::Esc => {
            if state.is_idle() {
                state.info = "No conversion is running".into();
            } else {
                let _ = cmd_tx.send(UiCommand::Cancel);
            }
        }
        KeyCode::Char('c') => {
            state.clear_log();
            state.info = "Log cleared".into();
        }
        KeyCode::Char('y') => {
            if state.log.is_empty() {
                state.info = "Log is empty; nothing to copy".into();
            } else {
                state.info = match clipboard::copy_to_clipboard(&state.log_text()) {
                    Ok(()) => format!("✓ Copied {} lines to clipboard", state.log.len()),
                    Err(e) => format!("Clipboard copy failed: {e:#}"),
                };
            }
        }
        KeyCode::Char('?') => state.show_help = !state.show_help,
        KeyCode::PageUp => state.scroll_up(PAGE),
        KeyCode::PageDown => state.scroll_down(PAGE),
        KeyCode::Up => state.scroll_up(1),
        KeyCode::Down => state.scroll_down(1),
        KeyCode::Home => state.scroll_to_top(),
        KeyCode::End => state.scroll_to_bottom(),
        KeyCode::Char(c @ ('a' | 'f' | '+' | '=' | '-' | 'n' | 'k' | 'F' | 'i' | 'o')) => {
            if !state.is_idle() {
                state.info = "Stop the conversion before changing options".into();
                return false;
            }
            match c {
                'a' => state.cycle_codec(),
                'f' => state.cycle_format(),
                '+' | '=' => state.adjust_jobs(1),
                '-' => state.adjust_jobs(-1),
                'n' => state.options.dry_run = !state.options.dry_run,
                'k' => state.options.keep_originals = !state.options.keep_originals,
                'F' => state.options.force = !state.options.force,
                'i' => state.begin_edit(PathField::Input),
                'o' => state.begin_edit(PathField::Output),
                _ => {}
            }
        }
        _ => {}
    }
    false
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(6),
                Constraint::Min(3),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    draw_options(chunks[0], f, state);
    draw_log(chunks[1], f, state);
    draw_status(chunks[2], f, state);

    if state.show_help {
        help::draw_help(centered(chunks[1], 60, 20), f);
    }
}

fn push_wrapped_kv(out: &mut Vec<Line<'static>>, label: &str, value: &str, width: u16) {
    // Account for borders (2 chars on each side)
    let usable_width = width.saturating_sub(4).max(1);
    let label_text = format!("{label:<7}");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    loop {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
        if remaining.is_empty() {
            break;
        }
    }
}

fn flag_span(label: &str, on: bool) -> Span<'static> {
    let style = if on {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(format!("[{}] {label}", if on { "x" } else { " " }), style)
}

fn draw_options(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
        .split(area);

    let opts = &state.options;
    let mut paths = Vec::new();
    let input = match state.editing {
        Some(PathField::Input) => format!("{}_", state.edit_buffer),
        _ => opts.input_dir.display().to_string(),
    };
    let output = match state.editing {
        Some(PathField::Output) => format!("{}_", state.edit_buffer),
        _ => opts
            .effective_output_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(same as input)".into()),
    };
    push_wrapped_kv(&mut paths, "Input:", &input, cols[0].width);
    push_wrapped_kv(&mut paths, "Output:", &output, cols[0].width);
    let title = if state.editing.is_some() {
        "Directories (Enter to apply, Esc to cancel)"
    } else {
        "Directories"
    };
    let paths = Paragraph::new(paths).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(paths, cols[0]);

    let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::Gray));
    let value = |s: String| Span::styled(s, Style::default().fg(Color::Cyan));
    let settings = vec![
        Line::from(vec![
            label("Codec: "),
            value(opts.audio_codec.clone()),
            Span::raw("   "),
            label("Format: "),
            value(opts.container_format.clone()),
        ]),
        Line::from(vec![label("Parallel jobs: "), value(opts.parallelism.to_string())]),
        Line::from(vec![
            flag_span("Dry run", opts.dry_run),
            Span::raw("  "),
            flag_span("Keep", opts.keep_originals),
            Span::raw("  "),
            flag_span("Force", opts.force),
        ]),
    ];
    let settings = Paragraph::new(settings).block(
        Block::default()
            .borders(Borders::ALL)
            .title("audio-converter"),
    );
    f.render_widget(settings, cols[1]);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let height = area.height.saturating_sub(2) as usize;
    let end = state.log.len().saturating_sub(state.scroll_back);
    let start = end.saturating_sub(height);

    let lines: Vec<Line> = state.log[start..end]
        .iter()
        .map(|l| Line::from(Span::styled(l.text.as_str(), line_style(l.class))))
        .collect();

    let title = if state.scroll_back > 0 {
        format!(
            "Conversion Log ({}-{} of {}, End to follow)",
            start + 1,
            end,
            state.log.len()
        )
    } else {
        "Conversion Log".to_string()
    };
    let log = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(log, area);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = vec![Span::styled(state.status_text(), state.status_style())];
    if !state.info.is_empty() {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(
            state.info.clone(),
            Style::default().fg(Color::Gray),
        ));
    }
    let hint = if state.is_idle() {
        "Enter start  ? help  q quit"
    } else {
        "s stop  ? help  q quit"
    };
    let status = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Status")
            .title_bottom(Line::from(hint).right_aligned()),
    );
    f.render_widget(status, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobState, OutputLine};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn setup() -> (UiState, UnboundedSender<UiCommand>, UnboundedReceiver<UiCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (UiState::new(JobOptions::new("/videos")), tx, rx)
    }

    #[test]
    fn enter_starts_with_current_options() {
        let (mut state, tx, mut rx) = setup();
        handle_key(&mut state, key(KeyCode::Char('a')), &tx);
        handle_key(&mut state, key(KeyCode::Char('+')), &tx);
        handle_key(&mut state, key(KeyCode::Char('n')), &tx);
        handle_key(&mut state, key(KeyCode::Enter), &tx);

        match rx.try_recv() {
            Ok(UiCommand::Start(options)) => {
                assert_eq!(options.audio_codec, "pcm_s16le");
                assert_eq!(options.parallelism, 2);
                assert!(options.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn options_are_locked_while_running() {
        let (mut state, tx, mut rx) = setup();
        state.apply_event(JobEvent::StatusChanged(JobState::Running));
        let before = state.options.clone();

        for c in ['a', 'f', '+', 'n', 'k', 'F', 'i'] {
            handle_key(&mut state, key(KeyCode::Char(c)), &tx);
        }
        handle_key(&mut state, key(KeyCode::Enter), &tx);

        assert_eq!(state.options, before);
        assert_eq!(state.editing, None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_only_sent_for_active_job() {
        let (mut state, tx, mut rx) = setup();
        handle_key(&mut state, key(KeyCode::Char('s')), &tx);
        assert!(rx.try_recv().is_err());

        state.apply_event(JobEvent::StatusChanged(JobState::Running));
        handle_key(&mut state, key(KeyCode::Esc), &tx);
        assert!(matches!(rx.try_recv(), Ok(UiCommand::Cancel)));
    }

    #[test]
    fn esc_closes_help_before_stopping() {
        let (mut state, tx, mut rx) = setup();
        state.apply_event(JobEvent::StatusChanged(JobState::Running));
        handle_key(&mut state, key(KeyCode::Char('?')), &tx);
        assert!(state.show_help);
        handle_key(&mut state, key(KeyCode::Esc), &tx);
        assert!(!state.show_help);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn typing_edits_the_input_path() {
        let (mut state, tx, mut rx) = setup();
        handle_key(&mut state, key(KeyCode::Char('i')), &tx);
        for _ in 0.."/videos".len() {
            handle_key(&mut state, key(KeyCode::Backspace), &tx);
        }
        // Keys that normally act (q, s) are plain text while editing.
        for c in "/mnt/qs".chars() {
            handle_key(&mut state, key(KeyCode::Char(c)), &tx);
        }
        handle_key(&mut state, key(KeyCode::Enter), &tx);

        assert_eq!(state.options.input_dir, std::path::PathBuf::from("/mnt/qs"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn quit_keys_send_quit() {
        let (mut state, tx, mut rx) = setup();
        assert!(handle_key(&mut state, key(KeyCode::Char('q')), &tx));
        assert!(matches!(rx.try_recv(), Ok(UiCommand::Quit)));

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(handle_key(&mut state, ctrl_c, &tx));
        assert!(state.log.is_empty());
    }

    #[test]
    fn clear_key_empties_the_log() {
        let (mut state, tx, _rx) = setup();
        state.apply_event(JobEvent::Line(OutputLine::plain("hello")));
        handle_key(&mut state, key(KeyCode::Char('c')), &tx);
        assert!(state.log.is_empty());
    }
}

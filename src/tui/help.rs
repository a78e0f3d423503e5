use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const KEYBINDS: &[(&str, &str)] = &[
    ("Enter", "Start conversion"),
    ("s / Esc", "Stop conversion"),
    ("c", "Clear log"),
    ("y", "Copy log to clipboard"),
    ("i / o", "Edit input / output directory"),
    ("a / f", "Cycle audio codec / container format"),
    ("+ / -", "More / fewer parallel jobs"),
    ("n", "Toggle dry run"),
    ("k", "Toggle keep originals"),
    ("F", "Toggle force overwrite"),
    ("PgUp / PgDn", "Scroll log"),
    ("Home / End", "Jump to top / follow output"),
    ("?", "Show or hide this help"),
    ("q / Ctrl-C", "Quit"),
];

fn key_line(key: &str, action: &str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(action.to_string()),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![Line::from("Keybinds:")];
    lines.extend(KEYBINDS.iter().map(|(key, action)| key_line(key, action)));
    lines.push(Line::from(""));
    lines.push(Line::from(
        "Options can only be changed while no conversion is running.",
    ));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, InputMode};
use crate::form::{FormRow, FormSynchronizer, Presentation};
use crate::model::{Field, FieldKind, FieldState, FieldValue, Severity};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let source = app
        .document()
        .path()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "unsaved".to_string());

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " 󱃾 labcfg ", Color::White, PL_A, PL_C);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(&source, 48)),
        Color::White,
        PL_C,
        BG,
    );
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(26), Constraint::Min(20)])
        .split(area);

    render_form_list(frame, chunks[0], app);
    match app.active_form() {
        Some(form) => render_form(frame, chunks[1], app, form),
        None => {
            let empty = Paragraph::new("No apps to configure.")
                .style(Style::default().fg(MUTED))
                .block(panel_block("Apps".to_string(), false));
            frame.render_widget(empty, chunks[1]);
        }
    }
}

fn render_form_list(frame: &mut Frame, area: Rect, app: &App) {
    let lines = app
        .forms()
        .iter()
        .enumerate()
        .map(|(index, form)| {
            let active = index == app.active_form_index();
            let marker = match form.presentation() {
                Presentation::Collapsible { collapsed: true } => "▸",
                Presentation::Collapsible { collapsed: false } => "▾",
                Presentation::Flat => "•",
            };
            let invalid = form.rows().iter().any(|row| match row {
                FormRow::Field(field) => field.is_invalid(),
                FormRow::AddField => false,
            });
            let style = if active {
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else if invalid || !form.rejected().is_empty() {
                Style::default().fg(WARN)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(
                format!(" {marker} {}", compact_text(form.owner_id(), 20)),
                style,
            ))
        })
        .collect::<Vec<_>>();

    frame.render_widget(
        Paragraph::new(lines).block(panel_block(format!("Apps ({})", app.forms().len()), false)),
        area,
    );
}

fn render_form(frame: &mut Frame, area: Rect, app: &App, form: &FormSynchronizer) {
    let title = match form.presentation() {
        Presentation::Collapsible { collapsed: true } => format!("▸ {}", form.title()),
        Presentation::Collapsible { collapsed: false } => format!("▾ {}", form.title()),
        Presentation::Flat => String::new(),
    };
    let block = panel_block(title, true);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if form.is_collapsed() {
        frame.render_widget(
            Paragraph::new("collapsed, press c to expand").style(Style::default().fg(MUTED)),
            inner,
        );
        return;
    }

    let header_height = u16::from(form.presentation() == Presentation::Flat);
    let rejected_height = form.rejected().len().min(3) as u16;
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(header_height),
            Constraint::Min(1),
            Constraint::Length(rejected_height),
            Constraint::Length(3),
        ])
        .split(inner);

    if header_height > 0 {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                form.title().to_string(),
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ))),
            sections[0],
        );
    }

    let rows = form.rows().iter().map(|row| match row {
        FormRow::Field(field) => field_row(app, field),
        FormRow::AddField => Row::new(vec![
            Cell::from(""),
            Cell::from("➕ new field").style(Style::default().fg(ACCENT)),
            Cell::from(""),
        ]),
    });
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(30),
            Constraint::Min(10),
            Constraint::Length(2),
        ],
    )
    .column_spacing(1)
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(24, 36, 58))
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("󰜴 ");
    let mut state = TableState::default();
    state.select(app.selected().map(|_| app.selected_row()));
    frame.render_stateful_widget(table, sections[1], &mut state);

    if rejected_height > 0 {
        let lines = form
            .rejected()
            .iter()
            .take(3)
            .map(|rejected| {
                Line::from(Span::styled(
                    format!("skipped {}: {}", rejected.name, rejected.error),
                    Style::default().fg(ERROR),
                ))
            })
            .collect::<Vec<_>>();
        frame.render_widget(Paragraph::new(lines), sections[2]);
    }

    let help = match app.selected() {
        Some(FormRow::Field(field)) => selected_help_line(field),
        Some(FormRow::AddField) => "Adding new fields is not available yet.".to_string(),
        None => String::new(),
    };
    frame.render_widget(
        Paragraph::new(help)
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(MUTED))
            .block(Block::default().borders(Borders::TOP).border_style(Style::default().fg(MUTED))),
        sections[3],
    );
}

fn field_row(app: &App, field: &Field) -> Row<'static> {
    let editing = app.editing_field() == Some(field.name.as_str());
    let value_cell = if editing {
        let shown = if app.input_masked() {
            mask(app.input())
        } else {
            app.input().to_string()
        };
        Cell::from(format!("{shown}▏")).style(Style::default().fg(Color::Black).bg(WARN))
    } else {
        value_cell(field)
    };

    let (marker, marker_style) = match &field.state {
        FieldState::Invalid(_) => ("✗", Style::default().fg(ERROR)),
        FieldState::Valid => ("✓", Style::default().fg(ACCENT)),
        FieldState::Unvalidated => (" ", Style::default()),
    };
    let label_style = if field.is_invalid() {
        Style::default().fg(ERROR)
    } else {
        Style::default().fg(Color::White)
    };

    Row::new(vec![
        Cell::from(format!("{}:", field.label)).style(label_style),
        value_cell,
        Cell::from(marker).style(marker_style),
    ])
}

fn value_cell(field: &Field) -> Cell<'static> {
    match (&field.kind, &field.value) {
        (FieldKind::Switch, FieldValue::Flag(true)) => {
            Cell::from("[x] on").style(Style::default().fg(ACCENT))
        }
        (FieldKind::Switch, _) => Cell::from("[ ] off").style(Style::default().fg(MUTED)),
        (FieldKind::Input, FieldValue::Absent) => {
            Cell::from(field.placeholder.clone()).style(Style::default().fg(MUTED))
        }
        (FieldKind::Input, value) if field.is_sensitive => {
            Cell::from(mask(value.as_text())).style(Style::default().fg(Color::White))
        }
        (FieldKind::Input, value) => {
            Cell::from(value.as_text().to_string()).style(Style::default().fg(Color::White))
        }
    }
}

fn selected_help_line(field: &Field) -> String {
    match &field.state {
        FieldState::Invalid(failures) => format!("{} {}", failures.join(" "), field.help_text),
        _ => field.help_text.clone(),
    }
}

fn mask(value: &str) -> String {
    "•".repeat(value.chars().count())
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let (mode_label, mode_bg) = match app.mode() {
        InputMode::Normal => (" 󰘳 nrm ", PL_A),
        InputMode::Editing => (" 󰏫 edit ", WARN),
    };
    let mode_fg = if app.mode() == InputMode::Editing {
        Color::Black
    } else {
        Color::White
    };
    let severity = app.last_notice().map(|stamped| stamped.notice.severity);
    let (status_bg, status_fg) = match severity {
        Some(Severity::Error) => (ERROR, Color::Black),
        Some(Severity::Warning) => (WARN, Color::Black),
        _ => (PL_B, Color::White),
    };
    let status_text = app.status();

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, mode_label, mode_fg, mode_bg, status_bg);
    let status_width_hint = area.width.saturating_sub(40).min(120) as usize;
    push_powerline_segment(
        &mut spans,
        format!(
            " {} {} ",
            footer_status_icon(status_text),
            compact_text(status_text, status_width_hint.max(24))
        ),
        status_fg,
        status_bg,
        BG,
    );

    let mut right = Vec::new();
    if !app.sensitive().is_empty() {
        right.push(Span::styled(
            format!("󰌾 {} cached ", app.sensitive().len()),
            Style::default().fg(WARN),
        ));
    }
    if let Some(stamped) = app.last_notice() {
        right.push(Span::styled(
            format!("{} ", stamped.at.format("%H:%M:%S")),
            Style::default().fg(MUTED),
        ));
    }
    right.push(Span::styled("? help ", Style::default().fg(MUTED)));

    let right_width = (spans_width(&right) as u16).min(area.width / 2);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(right))
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn footer_status_icon(status_text: &str) -> &'static str {
    let status = status_text.to_ascii_lowercase();
    let has_failure = ["failed", "error", "must be", "skipped"]
        .iter()
        .any(|needle| status.contains(needle));
    if has_failure { "󰅚" } else { "󰄬" }
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "labcfg help  mode:{}  app:{}",
            help_mode_label(app.mode()),
            app.active_form().map(FormSynchronizer::owner_id).unwrap_or("-")
        )),
        Line::from(""),
    ];
    for line in [
        "Tab / Shift+Tab   next / previous app",
        "j k / arrows      move between rows",
        "Enter             edit a value, toggle a switch",
        "Space             toggle a switch",
        "c                 fold or unfold the app form",
        "q b Esc           quit",
        "",
        "While editing: Enter saves, Esc cancels, Ctrl+U clears.",
        "Values need at least 2 characters. Commas store a list.",
        "Secret values stay in memory for this session and are never written to the file.",
    ] {
        lines.push(Line::from(line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(modal, area);
}

fn help_mode_label(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Normal => "normal",
        InputMode::Editing => "editing",
    }
}

fn panel_block(title: String, focused: bool) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        })
        .style(Style::default().bg(PANEL))
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{compact_text, mask, render};
    use crate::app::{App, AppOptions};
    use crate::config::ConfigDocument;
    use crate::input::Action;
    use crate::secret::{SecretRef, SecretResolver};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    struct StaticSecrets;

    impl SecretResolver for StaticSecrets {
        fn resolve(&self, _reference: &SecretRef) -> Result<String, String> {
            Ok("topsecret".to_string())
        }
    }

    fn screen_text(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
    }

    fn lab_app() -> App {
        let document = ConfigDocument::from_yaml(
            "apps:\n  vouch:\n    init:\n      values:\n        domains: lab.local\n        client_secret:\n          value_from:\n            env: X\n",
        )
        .unwrap();
        App::new(document, Box::new(StaticSecrets), AppOptions::default())
    }

    #[test]
    fn form_rows_render_with_masked_secrets() {
        let text = screen_text(&lab_app());
        assert!(text.contains("domains:"));
        assert!(text.contains("lab.local"));
        assert!(text.contains("client secret:"));
        assert!(!text.contains("topsecret"));
    }

    #[test]
    fn collapsed_form_hides_rows() {
        let mut app = lab_app();
        app.apply_action(Action::ToggleCollapse);
        let text = screen_text(&app);
        assert!(text.contains("collapsed, press c to expand"));
        assert!(!text.contains("lab.local"));
    }

    #[test]
    fn add_field_help_line_matches_its_notice() {
        let document = ConfigDocument::from_yaml(
            "apps:\n  argo_cd:\n    init:\n      values:\n        hostname: argo.lab\ntui:\n  allow_new_fields: true\n",
        )
        .unwrap();
        let mut app = App::new(document, Box::new(StaticSecrets), AppOptions::default());
        app.apply_action(Action::Bottom);
        let text = screen_text(&app);
        assert!(text.contains("Adding new fields is not available yet."));
    }

    #[test]
    fn mask_keeps_length() {
        assert_eq!(mask("abc"), "•••");
    }

    #[test]
    fn compact_text_truncates_with_ellipsis() {
        assert_eq!(compact_text("abcdef", 4), "abc…");
        assert_eq!(compact_text("abc", 4), "abc");
    }
}

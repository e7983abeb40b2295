use crate::snapshot::DashboardSnapshot;
use ratatui::backend::TestBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::Terminal;

pub fn render_dashboard(snapshot: &DashboardSnapshot, width: u16, height: u16) -> String {
    let backend = TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend).expect("terminal");
    terminal
        .draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Length(3),
                    Constraint::Min(4),
                    Constraint::Min(4),
                ])
                .split(frame.size());

            let header = Paragraph::new(header_line(snapshot))
                .block(Block::default().borders(Borders::ALL).title("Ralph"));
            frame.render_widget(header, chunks[0]);

            let progress = Paragraph::new(progress_line(snapshot))
                .block(Block::default().borders(Borders::ALL).title("Stories"));
            frame.render_widget(progress, chunks[1]);

            let story_items = current_story_rows(snapshot)
                .into_iter()
                .map(|(marker, text)| {
                    ListItem::new(Line::from(vec![
                        Span::styled(marker, Style::default().fg(Color::Cyan)),
                        Span::raw(" "),
                        Span::raw(text),
                    ]))
                })
                .collect::<Vec<_>>();
            frame.render_widget(
                List::new(story_items)
                    .block(Block::default().borders(Borders::ALL).title("Current story")),
                chunks[2],
            );

            let tail_rows = chunks[3].height.saturating_sub(2) as usize;
            let tail = output_tail(snapshot, tail_rows).join("\n");
            frame.render_widget(
                Paragraph::new(tail).block(Block::default().borders(Borders::ALL).title("Output")),
                chunks[3],
            );
        })
        .expect("draw");

    let mut out = String::new();
    let buffer = terminal.backend().buffer().clone();
    for y in 0..height {
        for x in 0..width {
            out.push_str(buffer.get(x, y).symbol());
        }
        out.push('\n');
    }
    out
}

pub fn header_line(snapshot: &DashboardSnapshot) -> String {
    let mode = snapshot.mode.as_str();
    match &snapshot.run {
        Some(run) if run.is_running => {
            format!("[{mode}] running iteration={} model={}", run.iteration, run.model)
        }
        Some(run) => match (run.exit_code, run.last_error.as_deref()) {
            (_, Some(error)) => format!("[{mode}] stopped error={error}"),
            (Some(code), None) => format!("[{mode}] stopped exit={code}"),
            (None, None) => format!("[{mode}] stopped"),
        },
        None => format!("[{mode}] not running"),
    }
}

pub fn progress_line(snapshot: &DashboardSnapshot) -> String {
    match &snapshot.stats {
        Some(stats) => format!(
            "stories {}/{} done pending={} blocked={} | criteria {}/{} | next={}",
            stats.completed,
            stats.total,
            stats.pending,
            stats.blocked,
            stats.checked_criteria,
            stats.total_criteria,
            stats.next_story_id.as_deref().unwrap_or("-"),
        ),
        None => "no data".to_string(),
    }
}

fn current_story_rows(snapshot: &DashboardSnapshot) -> Vec<(String, String)> {
    let Some(story) = snapshot.stats.as_ref().and_then(|s| s.current_story.as_ref()) else {
        return vec![("-".to_string(), "no active story".to_string())];
    };
    let mut rows = vec![(">".to_string(), format!("{} {}", story.id, story.title))];
    for criterion in &story.acceptance_criteria {
        let marker = if criterion.checked { "[x]" } else { "[ ]" };
        rows.push((marker.to_string(), criterion.text.clone()));
    }
    rows
}

fn output_tail(snapshot: &DashboardSnapshot, rows: usize) -> Vec<String> {
    let lines = &snapshot.output.stripped_lines;
    let skip = lines.len().saturating_sub(rows);
    lines.iter().skip(skip).cloned().collect()
}

pub fn handle_key(key: char) -> &'static str {
    match key {
        'q' => "quit",
        'c' => "clear-output",
        _ => "noop",
    }
}

/// `--once` output: the same composed snapshot as plain lines for pipes and
/// smoke tests.
pub fn render_plain(snapshot: &DashboardSnapshot) -> String {
    let mut lines = vec![header_line(snapshot), progress_line(snapshot)];
    for (marker, text) in current_story_rows(snapshot) {
        lines.push(format!("{marker} {text}"));
    }
    lines.join("\n")
}

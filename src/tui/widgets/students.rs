use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::{accuracy_color, format_date};
use crate::truncate;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Students ({}) ", app.students.items.len()))
        .title_style(Style::default().fg(Color::Cyan));

    if app.students.items.is_empty() {
        let paragraph = Paragraph::new("No students yet. Start a session with `quizbank session start`.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(paragraph, area);
        return;
    }

    let items: Vec<ListItem> = app
        .students
        .items
        .iter()
        .map(|s| {
            let last = s
                .last_activity
                .as_deref()
                .map(format_date)
                .unwrap_or_else(|| "-".to_string());

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<12}", truncate(&s.student.student_number, 11)),
                    Style::default().fg(Color::Yellow),
                ),
                Span::styled(
                    format!("{:<24}", truncate(s.student.name.as_deref().unwrap_or("-"), 22)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:<10}", format!("{}/{}", s.stats.completed_sessions, s.stats.total_sessions)),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(
                    format!("{:<9}", s.stats.total_answers),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:<9}", format!("{:.1}%", s.stats.accuracy)),
                    Style::default().fg(accuracy_color(s.stats.accuracy)),
                ),
                Span::styled(last, Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let header_style = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let header = Line::from(vec![
        Span::styled(format!("  {:<12}", "Number"), header_style),
        Span::styled(format!("{:<24}", "Name"), header_style),
        Span::styled(format!("{:<10}", "Done"), header_style),
        Span::styled(format!("{:<9}", "Answers"), header_style),
        Span::styled(format!("{:<9}", "Accuracy"), header_style),
        Span::styled("Last", header_style),
    ]);

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.students.selected);

    let header_area = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: 1,
    };
    f.render_widget(Paragraph::new(header), header_area);

    let list_area = Rect {
        x: area.x,
        y: area.y + 1,
        width: area.width,
        height: area.height.saturating_sub(1),
    };

    f.render_stateful_widget(list, list_area, &mut state);
}

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use super::{accuracy_color, format_date};
use crate::truncate;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9), // Stats + bank row
            Constraint::Min(0),    // Themes + recent sessions
        ])
        .split(area);

    let top_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let bottom_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);

    draw_stats(f, app, top_chunks[0]);
    draw_bank(f, app, top_chunks[1]);
    draw_themes(f, app, bottom_chunks[0]);
    draw_recent_activity(f, app, bottom_chunks[1]);
}

fn stat_line(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let stats = &app.stats;

    let text = vec![
        Line::from(vec![
            Span::styled("Students: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", stats.total_students),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" ({} active this week)", stats.active_students),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        stat_line(
            "Sessions",
            format!("{} ({} completed)", stats.total_sessions, stats.completed_sessions),
            Color::White,
        ),
        stat_line(
            "Answers",
            format!("{}", stats.total_questions_answered),
            Color::White,
        ),
        stat_line("Correct", format!("{}", stats.correct_answers), Color::Green),
        stat_line(
            "Accuracy",
            format!("{:.2}%", stats.average_accuracy),
            accuracy_color(stats.average_accuracy),
        ),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Class ")
        .title_style(Style::default().fg(Color::Cyan));

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_bank(f: &mut Frame, app: &App, area: Rect) {
    let bank = app.bank();
    let report = bank.report();
    let topic_count = bank.topics(None).len();

    let text = vec![
        stat_line("Questions", format!("{}", bank.len()), Color::White),
        stat_line("Topics", format!("{}", topic_count), Color::Cyan),
        stat_line("Blocks seen", format!("{}", report.blocks_seen), Color::White),
        stat_line(
            "Malformed",
            format!("{}", report.malformed),
            if report.malformed > 0 { Color::Red } else { Color::White },
        ),
        stat_line(
            "Duplicate ids",
            format!("{}", report.duplicates),
            if report.duplicates > 0 { Color::Yellow } else { Color::White },
        ),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Question Bank ")
        .title_style(Style::default().fg(Color::Yellow));

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_themes(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .themes
        .iter()
        .map(|t| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<20}", truncate(&t.theme, 18)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:>4} ", t.total_questions),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:>6.1}%", t.accuracy),
                    Style::default().fg(accuracy_color(t.accuracy)),
                ),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Themes ")
        .title_style(Style::default().fg(Color::Green));

    if items.is_empty() {
        let paragraph = Paragraph::new("No answers recorded yet.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(paragraph, area);
    } else {
        f.render_widget(List::new(items).block(block), area);
    }
}

fn draw_recent_activity(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .recent_activity
        .iter()
        .map(|item| {
            let session = &item.session;
            let who = item
                .student_name
                .as_deref()
                .unwrap_or(&item.student_number);
            let status_color = match session.status {
                quizbank::models::SessionStatus::Completed => Color::Green,
                quizbank::models::SessionStatus::Abandoned => Color::DarkGray,
                quizbank::models::SessionStatus::InProgress => Color::Cyan,
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<8}", format_date(&session.started_at)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:<18}", truncate(who, 16)),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("wk {:<3}", session.week),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(
                    format!("{:<12}", session.status.label()),
                    Style::default().fg(status_color),
                ),
                Span::raw(format!(
                    "{}/{}",
                    session.correct_answers, session.total_questions
                )),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Recent Sessions ")
        .title_style(Style::default().fg(Color::Magenta));

    f.render_widget(List::new(items).block(block), area);
}

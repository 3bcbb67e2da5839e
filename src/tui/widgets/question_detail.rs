use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use super::difficulty_bar;
use crate::tui::{App, QuestionDetail};

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let Some(detail) = &app.selected_question else {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Question ");
        let paragraph = Paragraph::new("No question selected").block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Metadata
            Constraint::Min(0),    // Stem and options
        ])
        .split(area);

    draw_header(f, detail, chunks[0]);
    draw_body(f, detail, chunks[1]);
}

fn draw_header(f: &mut Frame, detail: &QuestionDetail, area: Rect) {
    let q = &detail.question;
    let topics = if q.topics.is_empty() {
        "None".to_string()
    } else {
        q.topic_label().replace(',', ", ")
    };

    let text = vec![
        Line::from(vec![
            Span::styled("Topics: ", Style::default().fg(Color::Gray)),
            Span::styled(topics, Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::styled("Week: ", Style::default().fg(Color::Gray)),
            Span::styled(format!("{}", q.week), Style::default().fg(Color::White)),
            Span::raw("  "),
            Span::styled("Difficulty: ", Style::default().fg(Color::Gray)),
            Span::styled(difficulty_bar(q.difficulty), Style::default().fg(Color::Green)),
            Span::styled(
                format!(" {}", q.difficulty),
                Style::default().fg(Color::Yellow),
            ),
        ]),
        Line::from(vec![
            Span::styled("Answer: ", Style::default().fg(Color::Gray)),
            Span::styled(
                q.accepted_answers.join(", "),
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Question {} ", q.id))
        .title_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_body(f: &mut Frame, detail: &QuestionDetail, area: Rect) {
    let correct = detail.question.correct_answer().unwrap_or_default();
    let marker = format!("  {}) ", correct.trim().to_lowercase());

    let lines: Vec<Line> = detail
        .text
        .lines()
        .map(|line| {
            if !correct.is_empty() && line.starts_with(&marker) {
                Line::from(Span::styled(line, Style::default().fg(Color::Green)))
            } else {
                Line::from(line)
            }
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Statement ")
        .title_style(Style::default().fg(Color::Magenta));

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

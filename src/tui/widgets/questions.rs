use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::difficulty_bar;
use crate::truncate;
use crate::tui::App;

fn title(app: &App) -> String {
    let mut filters = Vec::new();
    if let Some(week) = app.filter_week {
        filters.push(format!("week <= {}", week));
    }
    if let Some(topic) = &app.filter_topic {
        filters.push(topic.clone());
    }

    if filters.is_empty() {
        format!(" Questions ({}) ", app.questions.items.len())
    } else {
        format!(
            " Questions ({}, {}) ",
            app.questions.items.len(),
            filters.join(", ")
        )
    }
}

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .questions
        .items
        .iter()
        .map(|q| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<6}", q.id), Style::default().fg(Color::Yellow)),
                Span::styled(
                    format!("{:<6}", q.week),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(difficulty_bar(q.difficulty), Style::default().fg(Color::Green)),
                Span::raw("  "),
                Span::styled(
                    format!("{:<34}", truncate(&q.topic_label(), 32)),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(
                    truncate(&q.raw_body.replace('\n', " "), 40),
                    Style::default().fg(Color::White),
                ),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title(app))
        .title_style(Style::default().fg(Color::Cyan));

    let header_style = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let header = Line::from(vec![
        Span::styled(format!("  {:<6}", "ID"), header_style),
        Span::styled(format!("{:<6}", "Week"), header_style),
        Span::styled(format!("{:<7}", "Diff"), header_style),
        Span::styled(format!("{:<34}", "Topics"), header_style),
        Span::styled("Stem", header_style),
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
    state.select(app.questions.selected);

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

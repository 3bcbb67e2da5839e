use chrono::DateTime;
use ratatui::style::Color;

pub mod dashboard;
pub mod question_detail;
pub mod questions;
pub mod students;

fn format_date(date_str: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        dt.format("%b %d").to_string()
    } else {
        date_str.chars().take(10).collect()
    }
}

fn accuracy_color(accuracy: f64) -> Color {
    if accuracy >= 70.0 {
        Color::Green
    } else if accuracy >= 50.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn difficulty_bar(level: u32) -> String {
    let filled = level.min(5) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(5 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_date_rfc3339() {
        assert_eq!(format_date("2026-03-09T10:00:00+00:00"), "Mar 09");
    }

    #[test]
    fn format_date_falls_back_to_prefix() {
        assert_eq!(format_date("2026-03-09 10:00:00"), "2026-03-09");
    }

    #[test]
    fn difficulty_bar_caps_at_five() {
        assert_eq!(difficulty_bar(2), "██░░░");
        assert_eq!(difficulty_bar(9), "█████");
    }

    #[test]
    fn accuracy_colors() {
        assert_eq!(accuracy_color(80.0), Color::Green);
        assert_eq!(accuracy_color(55.0), Color::Yellow);
        assert_eq!(accuracy_color(10.0), Color::Red);
    }
}

mod ui;
mod widgets;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use quizbank::bank::{QuestionBank, QuestionFilter};
use quizbank::db::Database;
use quizbank::error::Result;
use quizbank::models::{DashboardStats, QuestionRecord, SessionActivity, StudentSummary, ThemeStat};
use quizbank::render;

const RECENT_LIMIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Questions,
    QuestionDetail,
    Students,
}

impl View {
    fn next(&self) -> Self {
        match self {
            View::Dashboard => View::Questions,
            View::Questions => View::Students,
            View::QuestionDetail => View::Questions,
            View::Students => View::Dashboard,
        }
    }

    fn prev(&self) -> Self {
        match self {
            View::Dashboard => View::Students,
            View::Questions => View::Dashboard,
            View::QuestionDetail => View::Questions,
            View::Students => View::Questions,
        }
    }
}

pub struct StatefulList<T> {
    pub items: Vec<T>,
    pub selected: Option<usize>,
}

impl<T> StatefulList<T> {
    fn with_items(items: Vec<T>) -> Self {
        let selected = if items.is_empty() { None } else { Some(0) };
        Self { items, selected }
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) if i + 1 < self.items.len() => i + 1,
            _ => 0,
        };
        self.selected = Some(i);
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(0) | None => self.items.len() - 1,
            Some(i) => i - 1,
        };
        self.selected = Some(i);
    }

    fn first(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(0);
        }
    }

    fn last(&mut self) {
        if !self.items.is_empty() {
            self.selected = Some(self.items.len() - 1);
        }
    }

    fn selected_item(&self) -> Option<&T> {
        self.selected.and_then(|i| self.items.get(i))
    }
}

// A question plus its terminal rendition, computed when opened.
pub struct QuestionDetail {
    pub question: QuestionRecord,
    pub text: String,
}

pub struct App {
    bank: QuestionBank,
    db: Database,
    pub view: View,
    pub questions: StatefulList<QuestionRecord>,
    pub students: StatefulList<StudentSummary>,
    pub selected_question: Option<QuestionDetail>,
    pub stats: DashboardStats,
    pub themes: Vec<ThemeStat>,
    pub recent_activity: Vec<SessionActivity>,
    pub filter_week: Option<u32>,
    pub filter_topic: Option<String>,
    pub filter_input: String,
    pub filter_mode: bool,
    pub message: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(bank: QuestionBank, db: Database) -> Result<Self> {
        let questions = bank.iter().cloned().collect();
        let mut app = Self {
            bank,
            db,
            view: View::Dashboard,
            questions: StatefulList::with_items(questions),
            students: StatefulList::with_items(Vec::new()),
            selected_question: None,
            stats: DashboardStats::default(),
            themes: Vec::new(),
            recent_activity: Vec::new(),
            filter_week: None,
            filter_topic: None,
            filter_input: String::new(),
            filter_mode: false,
            message: None,
            should_quit: false,
        };
        app.refresh_data()?;
        Ok(app)
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn refresh_data(&mut self) -> Result<()> {
        self.stats = self.db.get_dashboard_stats()?;
        self.themes = self.db.theme_stats()?;
        self.recent_activity = self.db.recent_activity(RECENT_LIMIT)?;
        self.students = StatefulList::with_items(self.db.list_students_with_stats()?);
        Ok(())
    }

    fn question_filter(&self) -> QuestionFilter {
        QuestionFilter {
            week: self.filter_week,
            topics: self.filter_topic.iter().cloned().collect(),
            ..Default::default()
        }
    }

    fn apply_filter(&mut self) {
        let filter = self.question_filter();
        self.questions = StatefulList::with_items(self.bank.filter(&filter).cloned().collect());
    }

    fn apply_week_input(&mut self) {
        let input = self.filter_input.trim();
        if input.is_empty() {
            self.filter_week = None;
        } else {
            match input.parse::<u32>() {
                Ok(week) => self.filter_week = Some(week),
                Err(_) => {
                    self.message = Some(format!("Not a week number: {}", input));
                    return;
                }
            }
        }
        self.apply_filter();
    }

    // Steps through the topics visible under the week filter, then back to none.
    fn cycle_topic(&mut self) {
        let topics = self.bank.topics(self.filter_week);
        self.filter_topic = match &self.filter_topic {
            None => topics.first().cloned(),
            Some(current) => topics
                .iter()
                .position(|t| t == current)
                .and_then(|i| topics.get(i + 1))
                .cloned(),
        };
        self.apply_filter();
    }

    fn clear_filters(&mut self) {
        self.filter_week = None;
        self.filter_topic = None;
        self.filter_input.clear();
        self.apply_filter();
    }

    fn select_question(&mut self) {
        if let Some(q) = self.questions.selected_item() {
            self.selected_question = Some(QuestionDetail {
                question: q.clone(),
                text: render::question_text(q),
            });
            self.view = View::QuestionDetail;
        }
    }

    fn close_detail(&mut self) {
        self.view = View::Questions;
        self.selected_question = None;
    }

    fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) -> Result<()> {
        self.message = None;

        if self.filter_mode {
            match key {
                KeyCode::Esc => {
                    self.filter_mode = false;
                    self.filter_input.clear();
                }
                KeyCode::Enter => {
                    self.filter_mode = false;
                    self.apply_week_input();
                }
                KeyCode::Backspace => {
                    self.filter_input.pop();
                }
                KeyCode::Char(c) if c.is_ascii_digit() => {
                    self.filter_input.push(c);
                }
                _ => {}
            }
            return Ok(());
        }

        match key {
            KeyCode::Char('q') => self.should_quit = true,

            KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.refresh_data()?;
            }

            // Week filter
            KeyCode::Char('/') if self.view == View::Questions => {
                self.filter_mode = true;
                self.filter_input.clear();
            }

            KeyCode::Char('t') if self.view == View::Questions => self.cycle_topic(),

            KeyCode::Esc => match self.view {
                View::QuestionDetail => self.close_detail(),
                View::Questions if self.filter_week.is_some() || self.filter_topic.is_some() => {
                    self.clear_filters();
                }
                _ => {}
            },

            KeyCode::Char('h') | KeyCode::Left => match self.view {
                View::QuestionDetail => self.close_detail(),
                _ => self.view = self.view.prev(),
            },
            KeyCode::Char('l') | KeyCode::Right => match self.view {
                View::Questions => self.select_question(),
                View::QuestionDetail => {}
                _ => self.view = self.view.next(),
            },

            KeyCode::Tab => {
                if modifiers.contains(KeyModifiers::SHIFT) {
                    self.view = self.view.prev();
                } else {
                    self.view = self.view.next();
                }
            }
            KeyCode::BackTab => {
                self.view = self.view.prev();
            }

            KeyCode::Char('j') | KeyCode::Down => match self.view {
                View::Questions => self.questions.next(),
                View::Students => self.students.next(),
                _ => {}
            },
            KeyCode::Char('k') | KeyCode::Up => match self.view {
                View::Questions => self.questions.previous(),
                View::Students => self.students.previous(),
                _ => {}
            },

            KeyCode::Char('g') => match self.view {
                View::Questions => self.questions.first(),
                View::Students => self.students.first(),
                _ => {}
            },
            KeyCode::Char('G') => match self.view {
                View::Questions => self.questions.last(),
                View::Students => self.students.last(),
                _ => {}
            },

            KeyCode::Enter if self.view == View::Questions => self.select_question(),

            _ => {}
        }
        Ok(())
    }
}

pub fn run(bank: QuestionBank, db: Database) -> Result<()> {
    let mut app = App::new(bank, db)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key.code, key.modifiers)?;
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r"
\begin{question}{1}{Lógica}{1}{a}{1}{Uno
\begin{enumerate}
  \item a) sí
  \item b) no
\end{enumerate}
}\end{question}
\begin{question}{2}{Conjuntos}{2}{b}{2}{Dos}\end{question}
\begin{question}{3}{Lógica}{2}{a}{5}{Tres}\end{question}
";

    fn setup_app() -> App {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        App::new(QuestionBank::parse(BANK), db).expect("app should start")
    }

    fn press(app: &mut App, key: KeyCode) {
        app.handle_key(key, KeyModifiers::NONE).unwrap();
    }

    fn listed_ids(app: &App) -> Vec<u32> {
        app.questions.items.iter().map(|q| q.id).collect()
    }

    mod list_tests {
        use super::*;

        #[test]
        fn next_and_previous_wrap() {
            let mut list = StatefulList::with_items(vec![1, 2, 3]);
            assert_eq!(list.selected_item(), Some(&1));
            list.previous();
            assert_eq!(list.selected_item(), Some(&3));
            list.next();
            assert_eq!(list.selected_item(), Some(&1));
            list.last();
            assert_eq!(list.selected, Some(2));
            list.first();
            assert_eq!(list.selected, Some(0));
        }

        #[test]
        fn empty_list_has_no_selection() {
            let mut list: StatefulList<u32> = StatefulList::with_items(vec![]);
            list.next();
            list.previous();
            list.last();
            assert!(list.selected_item().is_none());
        }
    }

    mod view_tests {
        use super::*;

        #[test]
        fn next_and_prev_cycle_tabs() {
            assert_eq!(View::Dashboard.next(), View::Questions);
            assert_eq!(View::Students.next(), View::Dashboard);
            assert_eq!(View::Dashboard.prev(), View::Students);
            assert_eq!(View::QuestionDetail.prev(), View::Questions);
        }
    }

    mod app_tests {
        use super::*;

        #[test]
        fn starts_on_dashboard_with_all_questions() {
            let app = setup_app();
            assert_eq!(app.view, View::Dashboard);
            assert_eq!(listed_ids(&app), vec![1, 2, 3]);
            assert_eq!(app.stats.total_students, 0);
        }

        #[test]
        fn week_filter_hides_later_questions() {
            let mut app = setup_app();
            press(&mut app, KeyCode::Char('l'));
            assert_eq!(app.view, View::Questions);

            press(&mut app, KeyCode::Char('/'));
            assert!(app.filter_mode);
            press(&mut app, KeyCode::Char('2'));
            press(&mut app, KeyCode::Char('x'));
            press(&mut app, KeyCode::Enter);

            assert!(!app.filter_mode);
            assert_eq!(app.filter_week, Some(2));
            assert_eq!(listed_ids(&app), vec![1, 2]);

            press(&mut app, KeyCode::Esc);
            assert_eq!(app.filter_week, None);
            assert_eq!(listed_ids(&app), vec![1, 2, 3]);
        }

        #[test]
        fn topic_cycle_then_clear() {
            let mut app = setup_app();
            app.view = View::Questions;

            press(&mut app, KeyCode::Char('t'));
            assert_eq!(app.filter_topic.as_deref(), Some("Conjuntos"));
            assert_eq!(listed_ids(&app), vec![2]);

            press(&mut app, KeyCode::Char('t'));
            assert_eq!(app.filter_topic.as_deref(), Some("Lógica"));
            assert_eq!(listed_ids(&app), vec![1, 3]);

            press(&mut app, KeyCode::Char('t'));
            assert!(app.filter_topic.is_none());
            assert_eq!(listed_ids(&app).len(), 3);
        }

        #[test]
        fn open_and_close_question_detail() {
            let mut app = setup_app();
            app.view = View::Questions;

            press(&mut app, KeyCode::Enter);
            assert_eq!(app.view, View::QuestionDetail);
            let detail = app.selected_question.as_ref().unwrap();
            assert_eq!(detail.question.id, 1);
            assert!(detail.text.contains("a) sí"));

            press(&mut app, KeyCode::Char('h'));
            assert_eq!(app.view, View::Questions);
            assert!(app.selected_question.is_none());
        }

        #[test]
        fn invalid_week_input_keeps_filter() {
            let mut app = setup_app();
            app.view = View::Questions;
            app.filter_input = "abc".to_string();
            app.apply_week_input();
            assert_eq!(app.filter_week, None);
            assert!(app.message.is_some());
        }

        #[test]
        fn quit_key() {
            let mut app = setup_app();
            press(&mut app, KeyCode::Char('q'));
            assert!(app.should_quit);
        }
    }
}

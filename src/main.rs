mod tui;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

use quizbank::bank::{QuestionBank, QuestionFilter};
use quizbank::config::{self, Config};
use quizbank::db::Database;
use quizbank::error::{Error, Result};
use quizbank::models::{normalize_answer, JsonOutput, QuizSession, Role, SessionStatus};
use quizbank::{render, topics};

#[derive(Parser)]
#[command(name = "quizbank")]
#[command(about = "Weekly quizzes served from a LaTeX question bank")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to the LaTeX question bank
    #[arg(long, global = true)]
    bank: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Only warnings and errors on stderr
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Parse the question bank and report what was skipped
    Check,

    /// Browse questions
    #[command(subcommand)]
    Question(QuestionCommands),

    /// List topics available in the bank
    Topics {
        /// Only topics visible in this week
        #[arg(long, short)]
        week: Option<u32>,

        /// List the canonical topic vocabulary instead
        #[arg(long)]
        vocabulary: bool,
    },

    /// List difficulty levels available in the bank
    Difficulties {
        /// Only questions visible in this week
        #[arg(long, short)]
        week: Option<u32>,

        /// Restrict to these topics (repeatable)
        #[arg(long = "topic", short)]
        topics: Vec<String>,
    },

    /// Count questions matching a filter
    Count {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Run a quiz session
    #[command(subcommand)]
    Session(SessionCommands),

    /// List quiz sessions
    Sessions {
        /// Only sessions of this student number
        #[arg(long, short)]
        student: Option<String>,
    },

    /// Class analytics
    #[command(subcommand)]
    Teacher(TeacherCommands),

    /// Launch interactive terminal UI
    Tui,
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Curriculum week; later questions are hidden
    #[arg(long, short)]
    week: Option<u32>,

    /// Topic (repeatable; any match)
    #[arg(long = "topic", short)]
    topics: Vec<String>,

    /// Difficulty level
    #[arg(long, short)]
    difficulty: Option<u32>,
}

impl FilterArgs {
    fn to_filter(&self) -> QuestionFilter {
        QuestionFilter {
            week: self.week,
            topics: self.topics.clone(),
            difficulty: self.difficulty,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum QuestionCommands {
    /// List questions
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show one question as text
    Show {
        /// Question ID
        id: u32,

        /// Print the LaTeX source instead of the rendered text
        #[arg(long)]
        raw: bool,
    },

    /// Print the HTML rendition of one question
    Html {
        /// Question ID
        id: u32,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a session for a student
    Start {
        /// Student number
        student: String,

        /// Student display name (stored on first use)
        #[arg(long, short)]
        name: Option<String>,

        /// Current curriculum week
        #[arg(long, short)]
        week: u32,

        /// Restrict to one topic
        #[arg(long, short)]
        topic: Option<String>,

        /// Restrict to one difficulty level
        #[arg(long, short)]
        difficulty: Option<u32>,
    },

    /// Draw a random unanswered question for a session
    Next {
        /// Session ID
        session: i64,
    },

    /// Answer a question within a session
    Answer {
        /// Session ID
        session: i64,

        /// Question ID
        question: u32,

        /// Chosen option letter
        answer: String,
    },

    /// Mark a session as completed
    Complete {
        /// Session ID
        session: i64,
    },

    /// Abandon a session
    Abandon {
        /// Session ID
        session: i64,
    },

    /// Show a session and its answers
    Show {
        /// Session ID
        session: i64,
    },
}

#[derive(Subcommand)]
enum TeacherCommands {
    /// Overall class statistics
    Stats,

    /// Students with their totals
    Students,

    /// Performance of one student
    Student {
        /// Student number
        number: String,
    },

    /// Accuracy per session theme
    Themes,

    /// Accuracy per difficulty level
    Difficulties,

    /// Most recent sessions
    Activity {
        /// Number of sessions to show
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    config::init_logging(cli.verbose, cli.quiet);

    let json = cli.json;
    if let Err(e) = run(cli) {
        if json {
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                println!("{}", out);
            }
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.bank.clone());
    debug!(bank = %config.bank_path.display(), db = %config.db_path.display(), "resolved paths");

    match cli.command {
        Commands::Init => {
            let db = Database::open(&config.db_path)?;
            db.init()?;
            if cli.json {
                print_json(())?;
            } else {
                println!("Database initialized at: {}", config.db_path.display());
            }
        }

        Commands::Check => {
            let bank = QuestionBank::load(&config.bank_path)?;
            let report = bank.report();
            if cli.json {
                print_json(serde_json::json!({
                    "path": config.bank_path.display().to_string(),
                    "questions": bank.len(),
                    "report": report,
                }))?;
            } else {
                println!("Question bank: {}", config.bank_path.display());
                println!("Questions loaded: {}", bank.len());
                println!("Blocks seen: {}", report.blocks_seen);
                println!("Malformed blocks: {}", report.malformed);
                println!("Duplicate ids: {}", report.duplicates);
            }
        }

        Commands::Question(question_cmd) => {
            let bank = QuestionBank::load(&config.bank_path)?;
            match question_cmd {
                QuestionCommands::List { filter } => {
                    let filter = filter.to_filter();
                    let questions: Vec<_> = bank.filter(&filter).collect();
                    if cli.json {
                        print_json(&questions)?;
                    } else if questions.is_empty() {
                        println!("No questions found.");
                    } else {
                        println!("{:<6} {:<5} {:<5} {:<40} ANSWER", "ID", "WEEK", "DIFF", "TOPICS");
                        println!("{}", "-".repeat(70));
                        for q in questions {
                            println!(
                                "{:<6} {:<5} {:<5} {:<40} {}",
                                q.id,
                                q.week,
                                q.difficulty,
                                truncate(&q.topic_label(), 38),
                                q.correct_answer().unwrap_or("-")
                            );
                        }
                    }
                }

                QuestionCommands::Show { id, raw } => {
                    let q = bank
                        .get(id)
                        .ok_or_else(|| Error::not_found(format!("question {}", id)))?;

                    if cli.json {
                        let html = if raw { None } else { Some(render::render_question(q)) };
                        print_json(serde_json::json!({ "question": q, "html": html }))?;
                    } else {
                        println!("Question {} (week {}, difficulty {})", q.id, q.week, q.difficulty);
                        println!("Topics: {}", q.topic_label());
                        println!("Answer: {}", q.accepted_answers.join(", "));
                        println!();
                        if raw {
                            println!("{}", q.raw_body);
                            for (letter, text) in &q.options {
                                println!("  {}) {}", letter, text);
                            }
                        } else {
                            println!("{}", render::question_text(q));
                        }
                    }
                }

                QuestionCommands::Html { id } => {
                    let q = bank
                        .get(id)
                        .ok_or_else(|| Error::not_found(format!("question {}", id)))?;
                    let html = render::try_render_question(q)?;
                    if cli.json {
                        print_json(serde_json::json!({ "id": q.id, "html": html }))?;
                    } else {
                        println!("{}", html);
                    }
                }
            }
        }

        Commands::Topics { week, vocabulary } => {
            let names: Vec<String> = if vocabulary {
                topics::vocabulary().into_iter().map(str::to_string).collect()
            } else {
                QuestionBank::load(&config.bank_path)?.topics(week)
            };

            if cli.json {
                print_json(&names)?;
            } else if names.is_empty() {
                println!("No topics found.");
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }

        Commands::Difficulties { week, topics } => {
            let bank = QuestionBank::load(&config.bank_path)?;
            let levels = bank.difficulties(week, &topics);
            if cli.json {
                print_json(&levels)?;
            } else if levels.is_empty() {
                println!("No questions match.");
            } else {
                let labels: Vec<String> = levels.iter().map(u32::to_string).collect();
                println!("Difficulties: {}", labels.join(", "));
            }
        }

        Commands::Count { filter } => {
            let bank = QuestionBank::load(&config.bank_path)?;
            let count = bank.count(&filter.to_filter());
            if cli.json {
                print_json(serde_json::json!({ "count": count }))?;
            } else {
                println!("{}", count);
            }
        }

        Commands::Session(session_cmd) => {
            let db = Database::open(&config.db_path)?;
            run_session(session_cmd, &db, &config, cli.json)?;
        }

        Commands::Sessions { student } => {
            let db = Database::open(&config.db_path)?;
            let student_id = match student {
                Some(number) => Some(
                    db.get_student_by_number(&number)?
                        .ok_or_else(|| Error::not_found(format!("student {}", number)))?
                        .id,
                ),
                None => None,
            };

            let sessions = db.list_sessions(student_id)?;
            if cli.json {
                print_json(&sessions)?;
            } else if sessions.is_empty() {
                println!("No sessions found.");
            } else {
                print_session_table(&sessions);
            }
        }

        Commands::Teacher(teacher_cmd) => {
            let db = Database::open(&config.db_path)?;
            run_teacher(teacher_cmd, &db, cli.json)?;
        }

        Commands::Tui => {
            let bank = QuestionBank::load(&config.bank_path)?;
            let db = Database::open(&config.db_path)?;
            tui::run(bank, db)?;
        }
    }

    Ok(())
}

fn run_session(cmd: SessionCommands, db: &Database, config: &Config, json: bool) -> Result<()> {
    match cmd {
        SessionCommands::Start {
            student,
            name,
            week,
            topic,
            difficulty,
        } => {
            let student = db.get_or_create_student(&student, name.as_deref(), Role::Student)?;
            let theme = topic.map(|t| topics::canonicalize(&t)).filter(|t| !t.is_empty());
            let id = db.start_session(student.id, week, theme.as_deref(), difficulty)?;
            info!(session = id, student = %student.student_number, week, "session started");

            if json {
                print_json(serde_json::json!({
                    "id": id,
                    "student": student.student_number,
                    "week": week,
                    "theme": theme,
                    "difficulty": difficulty,
                }))?;
            } else {
                println!("Started session {} for {} (week {}).", id, student.student_number, week);
                println!("Draw a question with:");
                println!("  quizbank session next {}", id);
            }
        }

        SessionCommands::Next { session } => {
            let bank = QuestionBank::load(&config.bank_path)?;
            let quiz = open_session(db, session)?;
            let mut filter = session_filter(&quiz);
            filter.exclude = db.answered_question_ids(session)?.into_iter().collect();

            let mut rng = rand::thread_rng();
            match bank.pick(&filter, &mut rng) {
                Some(q) => {
                    debug!(session, question = q.id, "question drawn");
                    if json {
                        print_json(serde_json::json!({
                            "id": q.id,
                            "topics": q.topics,
                            "difficulty": q.difficulty,
                            "week": q.week,
                            "html": render::render_question(q),
                        }))?;
                    } else {
                        println!("=== Question {} ===", q.id);
                        println!("Topics: {}  Difficulty: {}", q.topic_label(), q.difficulty);
                        println!();
                        println!("{}", render::question_text(q));
                        println!();
                        println!("Answer with:");
                        println!("  quizbank session answer {} {} <letter>", session, q.id);
                    }
                }
                None if json => print_json(())?,
                None => {
                    println!("No unanswered questions left for this session.");
                    println!("Finish with: quizbank session complete {}", session);
                }
            }
        }

        SessionCommands::Answer {
            session,
            question,
            answer,
        } => {
            let bank = QuestionBank::load(&config.bank_path)?;
            let quiz = open_session(db, session)?;
            let q = bank
                .get(question)
                .ok_or_else(|| Error::not_found(format!("question {}", question)))?;

            if !session_filter(&quiz).matches(q) {
                return Err(Error::invalid_input(format!(
                    "question {} is not available in session {}",
                    question, session
                )));
            }

            let letter = normalize_answer(&answer);
            if !q.options.is_empty() && !q.options.contains_key(&letter) {
                let mut letters: Vec<&str> = q.options.keys().map(String::as_str).collect();
                letters.sort();
                return Err(Error::invalid_input(format!(
                    "'{}' is not an option; choose one of {}",
                    answer,
                    letters.join(", ")
                )));
            }

            let correct = q.is_correct(&letter);
            db.record_answer(session, question, &letter, correct)?
                .ok_or_else(|| {
                    Error::invalid_input(format!(
                        "question {} was already answered in session {}",
                        question, session
                    ))
                })?;
            info!(session, question, correct, "answer recorded");

            if json {
                print_json(serde_json::json!({
                    "correct": correct,
                    "correct_answer": q.correct_answer(),
                }))?;
            } else if correct {
                println!("Correct!");
            } else {
                println!(
                    "Incorrect. The answer was {}.",
                    q.correct_answer().unwrap_or("-")
                );
            }
        }

        SessionCommands::Complete { session } => {
            close_session(db, session, SessionStatus::Completed, json)?;
        }

        SessionCommands::Abandon { session } => {
            close_session(db, session, SessionStatus::Abandoned, json)?;
        }

        SessionCommands::Show { session } => {
            let quiz = db
                .get_session(session)?
                .ok_or_else(|| Error::not_found(format!("session {}", session)))?;
            let answers = db.get_session_answers(session)?;

            if json {
                print_json(serde_json::json!({ "session": quiz, "answers": answers }))?;
            } else {
                println!("Session {} ({})", quiz.id, quiz.status.label());
                println!("Week: {}", quiz.week);
                println!("Theme: {}", quiz.theme.as_deref().unwrap_or("-"));
                println!(
                    "Difficulty: {}",
                    quiz.difficulty.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
                );
                println!("Started: {}", quiz.started_at);
                if let Some(done) = &quiz.completed_at {
                    println!("Closed: {}", done);
                }
                println!(
                    "Score: {}/{} ({:.0}%)",
                    quiz.correct_answers,
                    quiz.total_questions,
                    quiz.accuracy()
                );

                if !answers.is_empty() {
                    println!();
                    println!("{:<10} {:<8} RESULT", "QUESTION", "ANSWER");
                    for a in answers {
                        println!(
                            "{:<10} {:<8} {}",
                            a.question_id,
                            a.user_answer,
                            if a.is_correct { "correct" } else { "wrong" }
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

fn run_teacher(cmd: TeacherCommands, db: &Database, json: bool) -> Result<()> {
    match cmd {
        TeacherCommands::Stats => {
            let stats = db.get_dashboard_stats()?;
            if json {
                print_json(&stats)?;
            } else {
                println!("=== Class Statistics ===");
                println!("Students: {} ({} active this week)", stats.total_students, stats.active_students);
                println!("Sessions: {} ({} completed)", stats.total_sessions, stats.completed_sessions);
                println!("Answers: {} ({} correct)", stats.total_questions_answered, stats.correct_answers);
                println!("Accuracy: {:.2}%", stats.average_accuracy);
            }
        }

        TeacherCommands::Students => {
            let students = db.list_students_with_stats()?;
            if json {
                print_json(&students)?;
            } else if students.is_empty() {
                println!("No students yet.");
            } else {
                println!(
                    "{:<12} {:<24} {:<9} {:<8} {:<9} LAST ACTIVE",
                    "NUMBER", "NAME", "SESSIONS", "ANSWERS", "ACCURACY"
                );
                println!("{}", "-".repeat(80));
                for s in students {
                    println!(
                        "{:<12} {:<24} {:<9} {:<8} {:<9} {}",
                        s.student.student_number,
                        truncate(s.student.name.as_deref().unwrap_or("-"), 22),
                        s.stats.total_sessions,
                        s.stats.total_answers,
                        format!("{:.1}%", s.stats.accuracy),
                        s.last_activity.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        TeacherCommands::Student { number } => {
            let student = db
                .get_student_by_number(&number)?
                .ok_or_else(|| Error::not_found(format!("student {}", number)))?;
            let performance = db.student_performance(student.id)?;
            let sessions = db.list_sessions(Some(student.id))?;

            if json {
                print_json(serde_json::json!({
                    "student": student,
                    "performance": performance,
                    "sessions": sessions,
                }))?;
            } else {
                println!("Student: {}", student.student_number);
                if let Some(name) = &student.name {
                    println!("Name: {}", name);
                }
                println!();
                println!("--- By theme ---");
                for t in &performance.by_theme {
                    println!("{:<30} {:>4} answers {:>7.2}%", truncate(&t.theme, 28), t.total_questions, t.accuracy);
                }
                println!();
                println!("--- By difficulty ---");
                for d in &performance.by_difficulty {
                    println!("Level {:<24} {:>4} answers {:>7.2}%", d.difficulty, d.total_questions, d.accuracy);
                }
                if !sessions.is_empty() {
                    println!();
                    print_session_table(&sessions);
                }
            }
        }

        TeacherCommands::Themes => {
            let themes = db.theme_stats()?;
            if json {
                print_json(&themes)?;
            } else if themes.is_empty() {
                println!("No answers recorded yet.");
            } else {
                println!("{:<30} {:<8} {:<8} {:<9} STUDENTS", "THEME", "ANSWERS", "CORRECT", "ACCURACY");
                println!("{}", "-".repeat(70));
                for t in themes {
                    println!(
                        "{:<30} {:<8} {:<8} {:<9} {}",
                        truncate(&t.theme, 28),
                        t.total_questions,
                        t.correct_answers,
                        format!("{:.1}%", t.accuracy),
                        t.students_attempted
                    );
                }
            }
        }

        TeacherCommands::Difficulties => {
            let levels = db.difficulty_stats()?;
            if json {
                print_json(&levels)?;
            } else if levels.is_empty() {
                println!("No answers recorded yet.");
            } else {
                println!("{:<12} {:<8} {:<8} ACCURACY", "DIFFICULTY", "ANSWERS", "CORRECT");
                println!("{}", "-".repeat(40));
                for d in levels {
                    println!(
                        "{:<12} {:<8} {:<8} {:.1}%",
                        d.difficulty, d.total_questions, d.correct_answers, d.accuracy
                    );
                }
            }
        }

        TeacherCommands::Activity { limit } => {
            let activity = db.recent_activity(limit)?;
            if json {
                print_json(&activity)?;
            } else if activity.is_empty() {
                println!("No sessions yet.");
            } else {
                for item in activity {
                    let s = &item.session;
                    println!(
                        "{:<26} {:<12} week {:<3} {:<12} {}/{}",
                        s.started_at,
                        item.student_number,
                        s.week,
                        s.status.label(),
                        s.correct_answers,
                        s.total_questions
                    );
                }
            }
        }
    }

    Ok(())
}

fn open_session(db: &Database, session_id: i64) -> Result<QuizSession> {
    let quiz = db
        .get_session(session_id)?
        .ok_or_else(|| Error::not_found(format!("session {}", session_id)))?;
    if quiz.status != SessionStatus::InProgress {
        return Err(Error::invalid_input(format!(
            "session {} is {}",
            session_id,
            quiz.status.label().to_lowercase()
        )));
    }
    Ok(quiz)
}

fn close_session(db: &Database, session_id: i64, status: SessionStatus, json: bool) -> Result<()> {
    let closed = match status {
        SessionStatus::Abandoned => db.abandon_session(session_id)?,
        _ => db.complete_session(session_id)?,
    };
    if !closed {
        // Distinguish a missing session from one that is already closed.
        open_session(db, session_id)?;
    }

    let quiz = db
        .get_session(session_id)?
        .ok_or_else(|| Error::not_found(format!("session {}", session_id)))?;
    info!(session = session_id, status = status.as_str(), "session closed");

    if json {
        print_json(&quiz)?;
    } else {
        println!(
            "Session {} {}: {}/{} correct ({:.0}%).",
            quiz.id,
            quiz.status.label().to_lowercase(),
            quiz.correct_answers,
            quiz.total_questions,
            quiz.accuracy()
        );
    }
    Ok(())
}

// Questions a session may draw from, before excluding answered ones.
fn session_filter(session: &QuizSession) -> QuestionFilter {
    QuestionFilter {
        week: Some(session.week),
        topics: session.theme.iter().cloned().collect(),
        difficulty: session.difficulty,
        ..Default::default()
    }
}

fn print_session_table(sessions: &[QuizSession]) {
    println!(
        "{:<5} {:<5} {:<20} {:<5} {:<12} {:<8} STARTED",
        "ID", "WEEK", "THEME", "DIFF", "STATUS", "SCORE"
    );
    println!("{}", "-".repeat(80));
    for s in sessions {
        println!(
            "{:<5} {:<5} {:<20} {:<5} {:<12} {:<8} {}",
            s.id,
            s.week,
            truncate(s.theme.as_deref().unwrap_or("-"), 18),
            s.difficulty.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            s.status.label(),
            format!("{}/{}", s.correct_answers, s.total_questions),
            s.started_at
        );
    }
}

fn print_json<T: Serialize>(data: T) -> Result<()> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

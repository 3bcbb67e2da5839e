use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One question parsed from the bank. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: u32,
    pub topics: BTreeSet<String>,
    pub difficulty: u32,
    // First entry is the scoring key.
    pub accepted_answers: Vec<String>,
    pub week: u32,
    pub raw_body: String,
    pub options: IndexMap<String, String>,
}

impl QuestionRecord {
    /// Comma-joined, sorted topic list ("Conjuntos,Lógica").
    pub fn topic_label(&self) -> String {
        self.topics.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }

    pub fn correct_answer(&self) -> Option<&str> {
        self.accepted_answers.first().map(String::as_str)
    }

    /// Scores a submitted option letter against the first accepted answer.
    pub fn is_correct(&self, answer: &str) -> bool {
        self.correct_answer()
            .map(|key| normalize_answer(key) == normalize_answer(answer))
            .unwrap_or(false)
    }

    pub fn is_visible_in(&self, week: u32) -> bool {
        self.week <= week
    }
}

pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "student" | "s" => Some(Role::Student),
            "teacher" | "t" => Some(Role::Teacher),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub student_number: String,
    pub name: Option<String>,
    pub role: Role,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "in_progress" | "in-progress" | "active" => Some(SessionStatus::InProgress),
            "completed" | "complete" | "done" => Some(SessionStatus::Completed),
            "abandoned" | "quit" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "In Progress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Abandoned => "Abandoned",
        }
    }
}

// A quiz session; totals are computed from its answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSession {
    pub id: i64,
    pub student_id: i64,
    pub week: u32,
    pub theme: Option<String>,
    pub difficulty: Option<u32>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: SessionStatus,
    pub total_questions: i64,
    pub correct_answers: i64,
}

impl QuizSession {
    pub fn accuracy(&self) -> f64 {
        accuracy(self.correct_answers, self.total_questions)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub session_id: i64,
    pub question_id: u32,
    pub user_answer: String,
    pub is_correct: bool,
    pub answered_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentStats {
    pub total_sessions: i64,
    pub completed_sessions: i64,
    pub total_answers: i64,
    pub correct_answers: i64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSummary {
    pub student: Student,
    pub stats: StudentStats,
    pub last_activity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_students: i64,
    pub active_students: i64,
    pub total_sessions: i64,
    pub completed_sessions: i64,
    pub total_questions_answered: i64,
    pub correct_answers: i64,
    pub average_accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeStat {
    pub theme: String,
    pub total_questions: i64,
    pub correct_answers: i64,
    pub accuracy: f64,
    pub students_attempted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyStat {
    pub difficulty: u32,
    pub total_questions: i64,
    pub correct_answers: i64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentPerformance {
    pub by_theme: Vec<ThemeStat>,
    pub by_difficulty: Vec<DifficultyStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionActivity {
    pub session: QuizSession,
    pub student_number: String,
    pub student_name: Option<String>,
}

/// Percentage of correct answers, rounded to two decimals.
pub fn accuracy(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        ((correct as f64 / total as f64) * 10_000.0).round() / 100.0
    }
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

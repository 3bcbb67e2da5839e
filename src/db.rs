use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use std::path::Path;

use crate::models::{
    accuracy, Answer, DashboardStats, DifficultyStat, QuizSession, Role, SessionActivity,
    SessionStatus, Student, StudentPerformance, StudentStats, StudentSummary, ThemeStat,
};

// Sessions without a theme are grouped under this label in the analytics.
pub const MIXED_THEME: &str = "Mixed";

const ACTIVE_WINDOW_DAYS: i64 = 7;

const SESSION_COLUMNS: &str = r#"
    s.id, s.student_id, s.week, s.theme, s.difficulty, s.started_at, s.completed_at, s.status,
    COUNT(a.id), COALESCE(SUM(a.is_correct), 0)
"#;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_number TEXT NOT NULL UNIQUE,
                name TEXT,
                role TEXT NOT NULL DEFAULT 'student' CHECK(role IN ('student', 'teacher')),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS quiz_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                week INTEGER NOT NULL,
                theme TEXT,
                difficulty INTEGER,
                started_at TEXT NOT NULL DEFAULT (datetime('now')),
                completed_at TEXT,
                status TEXT NOT NULL DEFAULT 'in_progress' CHECK(status IN ('in_progress', 'completed', 'abandoned')),
                FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE
            );

            -- One answer per question per session
            CREATE TABLE IF NOT EXISTS answers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                question_id INTEGER NOT NULL,
                user_answer TEXT NOT NULL,
                is_correct INTEGER NOT NULL DEFAULT 0,
                answered_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (session_id, question_id),
                FOREIGN KEY (session_id) REFERENCES quiz_sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_student ON quiz_sessions(student_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON quiz_sessions(status);
            CREATE INDEX IF NOT EXISTS idx_sessions_started ON quiz_sessions(started_at);
            CREATE INDEX IF NOT EXISTS idx_answers_session ON answers(session_id);
            CREATE INDEX IF NOT EXISTS idx_answers_question ON answers(question_id);
            "#,
        )?;

        Ok(())
    }

    // Student operations
    pub fn get_or_create_student(
        &self,
        student_number: &str,
        name: Option<&str>,
        role: Role,
    ) -> Result<Student> {
        if let Some(student) = self.get_student_by_number(student_number)? {
            return Ok(student);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO students (student_number, name, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![student_number, name, role.as_str(), now],
        )?;

        Ok(Student {
            id: self.conn.last_insert_rowid(),
            student_number: student_number.to_string(),
            name: name.map(str::to_string),
            role,
            created_at: now,
        })
    }

    pub fn get_student_by_number(&self, student_number: &str) -> Result<Option<Student>> {
        self.conn
            .query_row(
                "SELECT id, student_number, name, role, created_at FROM students WHERE student_number = ?1",
                params![student_number],
                student_from_row,
            )
            .optional()
    }

    pub fn list_students_with_stats(&self) -> Result<Vec<StudentSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT st.id, st.student_number, st.name, st.role, st.created_at,
                   (SELECT COUNT(*) FROM quiz_sessions s WHERE s.student_id = st.id),
                   (SELECT COUNT(*) FROM quiz_sessions s
                     WHERE s.student_id = st.id AND s.status = 'completed'),
                   (SELECT COUNT(*) FROM answers a
                     JOIN quiz_sessions s ON a.session_id = s.id
                     WHERE s.student_id = st.id),
                   (SELECT COALESCE(SUM(a.is_correct), 0) FROM answers a
                     JOIN quiz_sessions s ON a.session_id = s.id
                     WHERE s.student_id = st.id),
                   (SELECT MAX(COALESCE(a.answered_at, s.started_at)) FROM quiz_sessions s
                     LEFT JOIN answers a ON a.session_id = s.id
                     WHERE s.student_id = st.id)
            FROM students st
            WHERE st.role = 'student'
            ORDER BY st.student_number
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let total_answers: i64 = row.get(7)?;
            let correct_answers: i64 = row.get(8)?;
            Ok(StudentSummary {
                student: student_from_row(row)?,
                stats: StudentStats {
                    total_sessions: row.get(5)?,
                    completed_sessions: row.get(6)?,
                    total_answers,
                    correct_answers,
                    accuracy: accuracy(correct_answers, total_answers),
                },
                last_activity: row.get(9)?,
            })
        })?;

        rows.collect()
    }

    // Quiz session operations
    pub fn start_session(
        &self,
        student_id: i64,
        week: u32,
        theme: Option<&str>,
        difficulty: Option<u32>,
    ) -> Result<i64> {
        let now = Utc::now();
        self.conn.execute(
            r#"
            INSERT INTO quiz_sessions (student_id, week, theme, difficulty, started_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![student_id, week, theme, difficulty, now.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_session(&self, session_id: i64) -> Result<Option<QuizSession>> {
        let query = format!(
            r#"
            SELECT {}
            FROM quiz_sessions s
            LEFT JOIN answers a ON a.session_id = s.id
            WHERE s.id = ?1
            GROUP BY s.id
            "#,
            SESSION_COLUMNS
        );

        self.conn
            .query_row(&query, params![session_id], session_from_row)
            .optional()
    }

    pub fn complete_session(&self, session_id: i64) -> Result<bool> {
        self.finish_session(session_id, SessionStatus::Completed)
    }

    pub fn abandon_session(&self, session_id: i64) -> Result<bool> {
        self.finish_session(session_id, SessionStatus::Abandoned)
    }

    // Only in-progress sessions can be closed
    fn finish_session(&self, session_id: i64, status: SessionStatus) -> Result<bool> {
        let now = Utc::now();
        let rows = self.conn.execute(
            r#"
            UPDATE quiz_sessions
            SET status = ?1, completed_at = ?2
            WHERE id = ?3 AND status = 'in_progress'
            "#,
            params![status.as_str(), now.to_rfc3339(), session_id],
        )?;
        Ok(rows > 0)
    }

    pub fn list_sessions(&self, student_id: Option<i64>) -> Result<Vec<QuizSession>> {
        let (filter, params_vec): (&str, Vec<Box<dyn rusqlite::ToSql>>) = match student_id {
            Some(sid) => ("WHERE s.student_id = ?1", vec![Box::new(sid)]),
            None => ("", vec![]),
        };

        let query = format!(
            r#"
            SELECT {}
            FROM quiz_sessions s
            LEFT JOIN answers a ON a.session_id = s.id
            {}
            GROUP BY s.id
            ORDER BY s.started_at DESC, s.id DESC
            "#,
            SESSION_COLUMNS, filter
        );

        let mut stmt = self.conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), session_from_row)?;
        rows.collect()
    }

    pub fn answered_question_ids(&self, session_id: i64) -> Result<Vec<u32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT question_id FROM answers WHERE session_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![session_id], |row| row.get(0))?;
        rows.collect()
    }

    // Answer operations

    /// Returns `None` when the session is missing, already closed, or the
    /// question was answered before in this session.
    pub fn record_answer(
        &self,
        session_id: i64,
        question_id: u32,
        user_answer: &str,
        is_correct: bool,
    ) -> Result<Option<i64>> {
        match self.get_session(session_id)? {
            Some(session) if session.status == SessionStatus::InProgress => {}
            _ => return Ok(None),
        }

        let now = Utc::now();
        let rows = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO answers (session_id, question_id, user_answer, is_correct, answered_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![session_id, question_id, user_answer, is_correct, now.to_rfc3339()],
        )?;

        if rows == 0 {
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    pub fn get_session_answers(&self, session_id: i64) -> Result<Vec<Answer>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, session_id, question_id, user_answer, is_correct, answered_at
            FROM answers
            WHERE session_id = ?1
            ORDER BY answered_at ASC, id ASC
            "#,
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok(Answer {
                id: row.get(0)?,
                session_id: row.get(1)?,
                question_id: row.get(2)?,
                user_answer: row.get(3)?,
                is_correct: row.get::<_, i32>(4)? != 0,
                answered_at: row.get(5)?,
            })
        })?;

        rows.collect()
    }

    // Analytics
    pub fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        let total_students: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM students WHERE role = 'student'",
            [],
            |row| row.get(0),
        )?;

        let cutoff = (Utc::now() - Duration::days(ACTIVE_WINDOW_DAYS)).to_rfc3339();
        let active_students: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT student_id) FROM quiz_sessions WHERE started_at >= ?1",
            params![cutoff],
            |row| row.get(0),
        )?;

        let (total_sessions, completed_sessions): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0)
            FROM quiz_sessions
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (total_questions_answered, correct_answers): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_correct), 0) FROM answers",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DashboardStats {
            total_students,
            active_students,
            total_sessions,
            completed_sessions,
            total_questions_answered,
            correct_answers,
            average_accuracy: accuracy(correct_answers, total_questions_answered),
        })
    }

    pub fn theme_stats(&self) -> Result<Vec<ThemeStat>> {
        self.theme_stats_for(None)
    }

    pub fn difficulty_stats(&self) -> Result<Vec<DifficultyStat>> {
        self.difficulty_stats_for(None)
    }

    pub fn student_performance(&self, student_id: i64) -> Result<StudentPerformance> {
        Ok(StudentPerformance {
            by_theme: self.theme_stats_for(Some(student_id))?,
            by_difficulty: self.difficulty_stats_for(Some(student_id))?,
        })
    }

    fn theme_stats_for(&self, student_id: Option<i64>) -> Result<Vec<ThemeStat>> {
        let (filter, params_vec): (&str, Vec<Box<dyn rusqlite::ToSql>>) = match student_id {
            Some(sid) => ("WHERE s.student_id = ?2", vec![Box::new(sid)]),
            None => ("", vec![]),
        };

        let query = format!(
            r#"
            SELECT COALESCE(s.theme, ?1) AS theme_label,
                   COUNT(a.id) AS total,
                   COALESCE(SUM(a.is_correct), 0),
                   COUNT(DISTINCT s.student_id)
            FROM answers a
            JOIN quiz_sessions s ON a.session_id = s.id
            {}
            GROUP BY theme_label
            ORDER BY total DESC, theme_label ASC
            "#,
            filter
        );

        let mut stmt = self.conn.prepare(&query)?;
        let mut params_refs: Vec<&dyn rusqlite::ToSql> = vec![&MIXED_THEME];
        params_refs.extend(params_vec.iter().map(|b| b.as_ref()));

        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            let total_questions: i64 = row.get(1)?;
            let correct_answers: i64 = row.get(2)?;
            Ok(ThemeStat {
                theme: row.get(0)?,
                total_questions,
                correct_answers,
                accuracy: accuracy(correct_answers, total_questions),
                students_attempted: row.get(3)?,
            })
        })?;

        rows.collect()
    }

    // Sessions without a difficulty filter do not contribute
    fn difficulty_stats_for(&self, student_id: Option<i64>) -> Result<Vec<DifficultyStat>> {
        let (filter, params_vec): (&str, Vec<Box<dyn rusqlite::ToSql>>) = match student_id {
            Some(sid) => ("AND s.student_id = ?1", vec![Box::new(sid)]),
            None => ("", vec![]),
        };

        let query = format!(
            r#"
            SELECT s.difficulty, COUNT(a.id), COALESCE(SUM(a.is_correct), 0)
            FROM answers a
            JOIN quiz_sessions s ON a.session_id = s.id
            WHERE s.difficulty IS NOT NULL {}
            GROUP BY s.difficulty
            ORDER BY s.difficulty ASC
            "#,
            filter
        );

        let mut stmt = self.conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            let total_questions: i64 = row.get(1)?;
            let correct_answers: i64 = row.get(2)?;
            Ok(DifficultyStat {
                difficulty: row.get(0)?,
                total_questions,
                correct_answers,
                accuracy: accuracy(correct_answers, total_questions),
            })
        })?;

        rows.collect()
    }

    pub fn recent_activity(&self, limit: usize) -> Result<Vec<SessionActivity>> {
        let query = format!(
            r#"
            SELECT {}, st.student_number, st.name
            FROM quiz_sessions s
            JOIN students st ON st.id = s.student_id
            LEFT JOIN answers a ON a.session_id = s.id
            GROUP BY s.id
            ORDER BY s.started_at DESC, s.id DESC
            LIMIT ?1
            "#,
            SESSION_COLUMNS
        );

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SessionActivity {
                session: session_from_row(row)?,
                student_number: row.get(10)?,
                student_name: row.get(11)?,
            })
        })?;

        rows.collect()
    }
}

fn student_from_row(row: &Row) -> Result<Student> {
    let role_str: String = row.get(3)?;
    Ok(Student {
        id: row.get(0)?,
        student_number: row.get(1)?,
        name: row.get(2)?,
        role: Role::from_str(&role_str).unwrap_or(Role::Student),
        created_at: row.get(4)?,
    })
}

// Expects the SESSION_COLUMNS layout
fn session_from_row(row: &Row) -> Result<QuizSession> {
    let status_str: String = row.get(7)?;
    Ok(QuizSession {
        id: row.get(0)?,
        student_id: row.get(1)?,
        week: row.get(2)?,
        theme: row.get(3)?,
        difficulty: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        status: SessionStatus::from_str(&status_str).unwrap_or(SessionStatus::InProgress),
        total_questions: row.get(8)?,
        correct_answers: row.get(9)?,
    })
}

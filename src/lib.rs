//! LaTeX question bank, quiz sessions and teacher analytics.
//!
//! The core is three modules used in this order:
//!
//! - [`topics`] canonicalizes free-text topic labels.
//! - [`bank`] parses the question bank once into a read-only table.
//! - [`render`] converts one stored question to HTML on demand.
//!
//! [`db`] persists students, sessions and answers for the host CLI.

pub mod bank;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod render;
pub mod topics;

pub use bank::{LoadReport, QuestionBank, QuestionFilter};
pub use error::{Error, LoadError, RenderError, Result};
pub use models::QuestionRecord;
pub use render::{render_question, try_render_question};

use std::path::PathBuf;

use thiserror::Error;

/// Failure to load the question bank source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read question bank {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("question bank pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failure while converting one question's markup to HTML.
///
/// Never escapes the renderer: `render_question` turns it into a visible
/// error fragment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("unterminated math delimiter '{delimiter}' at byte {offset}")]
    UnterminatedMath {
        delimiter: &'static str,
        offset: usize,
    },

    #[error("command nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("render pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// Host-level errors for the CLI and TUI.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

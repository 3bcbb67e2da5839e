//! Path and logging configuration.
//!
//! Bank path priority: `--bank` flag, `QUIZBANK_BANK`, `./Preguntas.tex`.
//! Database path priority: `QUIZBANK_DB`, `<config dir>/quizbank/quizbank.db`.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

pub const BANK_ENV: &str = "QUIZBANK_BANK";
pub const DB_ENV: &str = "QUIZBANK_DB";
pub const DEFAULT_BANK_NAME: &str = "Preguntas.tex";
pub const DEFAULT_DB_NAME: &str = "quizbank.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bank_path: PathBuf,
    pub db_path: PathBuf,
}

impl Config {
    pub fn resolve(bank_flag: Option<PathBuf>) -> Self {
        Self {
            bank_path: bank_path(bank_flag),
            db_path: db_path(),
        }
    }
}

pub fn bank_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = std::env::var(BANK_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_BANK_NAME)
}

pub fn db_path() -> PathBuf {
    if let Ok(path) = std::env::var(DB_ENV) {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quizbank");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

/// `RUST_LOG` wins; otherwise the verbosity flags pick the level.
pub fn log_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Installs the stderr subscriber. A subscriber that is already set (tests)
/// is left in place.
pub fn init_logging(verbose: bool, quiet: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, quiet))
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Env-var tests share process state, so they run as one test.
    #[test]
    fn path_resolution_priority() {
        env::remove_var(BANK_ENV);
        assert_eq!(bank_path(None), PathBuf::from(DEFAULT_BANK_NAME));

        env::set_var(BANK_ENV, "/tmp/bank_from_env.tex");
        assert_eq!(bank_path(None), PathBuf::from("/tmp/bank_from_env.tex"));
        assert_eq!(
            bank_path(Some(PathBuf::from("flag.tex"))),
            PathBuf::from("flag.tex")
        );
        env::remove_var(BANK_ENV);

        env::set_var(DB_ENV, "/tmp/test_quizbank.db");
        assert_eq!(db_path(), PathBuf::from("/tmp/test_quizbank.db"));
        let config = Config::resolve(Some(PathBuf::from("b.tex")));
        assert_eq!(config.bank_path, PathBuf::from("b.tex"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/test_quizbank.db"));
        env::remove_var(DB_ENV);

        let path = db_path();
        assert!(path.ends_with("quizbank/quizbank.db"));
    }
}

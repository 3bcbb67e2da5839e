//! Question bank loading.
//!
//! The bank is one LaTeX document holding any number of blocks of the form
//!
//! ```text
//! \begin{question}{ID}{TOPICS}{DIFFICULTY}{ANSWERS}{WEEK}{
//!   stem ...
//!   \begin{enumerate}
//!     \item a) first option
//!     \item b) second option
//!   \end{enumerate}
//! }\end{question}
//! ```
//!
//! Parsing happens once; the resulting [`QuestionBank`] is read-only and can
//! be shared between threads by reference. Markup is left unconverted until
//! [`crate::render`] is asked for a question.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::models::QuestionRecord;
use crate::topics::{canonicalize, lookup_key};

struct Patterns {
    block: Regex,
    fields: Regex,
    enumerate: Regex,
    item_head: Regex,
    letter_prefix: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            block: Regex::new(r"(?s)\\begin\{question\}.*?\\end\{question\}")?,
            fields: Regex::new(
                r"(?s)\A\\begin\{question\}\{(\d+)\}\{([^}]+)\}\{(\d+)\}\{([^}]+)\}\{(\d+)\}\{(.+?)\}\s*\\end\{question\}\z",
            )?,
            enumerate: Regex::new(r"(?s)\\begin\{enumerate\}(.+?)\\end\{enumerate\}")?,
            item_head: Regex::new(r"(?s)\A\s*([A-Za-z])\)\s*(.*)\z")?,
            letter_prefix: Regex::new(r"\A[A-Za-z]\)\s*")?,
        })
    }
}

static PATTERNS: OnceLock<Result<Patterns, regex::Error>> = OnceLock::new();

fn patterns() -> Result<&'static Patterns, regex::Error> {
    PATTERNS
        .get_or_init(Patterns::compile)
        .as_ref()
        .map_err(Clone::clone)
}

/// Diagnostics collected while parsing one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// `\begin{question}...\end{question}` spans found.
    pub blocks_seen: usize,
    /// Spans that did not match the six-field grammar and were dropped.
    pub malformed: usize,
    /// Well-formed blocks whose id had already been seen (later one wins).
    pub duplicates: usize,
}

/// Read-only table of questions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: BTreeMap<u32, QuestionRecord>,
    report: LoadReport,
}

impl QuestionBank {
    /// Reads and parses the bank at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let bank = Self::try_parse(&source)?;
        info!(
            path = %path.display(),
            questions = bank.len(),
            malformed = bank.report.malformed,
            "loaded question bank"
        );
        Ok(bank)
    }

    /// Parses a source document. Malformed blocks are skipped and counted.
    pub fn try_parse(source: &str) -> Result<Self, LoadError> {
        let patterns = patterns()?;
        let mut bank = QuestionBank::default();

        for span in patterns.block.find_iter(source) {
            bank.report.blocks_seen += 1;

            let Some(record) = parse_block(patterns, span.as_str()) else {
                bank.report.malformed += 1;
                debug!(offset = span.start(), "skipping malformed question block");
                continue;
            };

            if bank.questions.insert(record.id, record).is_some() {
                bank.report.duplicates += 1;
            }
        }

        if bank.report.malformed > 0 {
            warn!(
                malformed = bank.report.malformed,
                "question blocks dropped by the parser"
            );
        }

        Ok(bank)
    }

    /// Like [`QuestionBank::try_parse`], falling back to an empty bank if the
    /// grammar itself is unavailable.
    pub fn parse(source: &str) -> Self {
        Self::try_parse(source).unwrap_or_else(|e| {
            warn!(error = %e, "question bank parser unavailable");
            Self::default()
        })
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn get(&self, id: u32) -> Option<&QuestionRecord> {
        self.questions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Questions in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &QuestionRecord> {
        self.questions.values()
    }

    pub fn filter<'s: 'f, 'f>(
        &'s self,
        filter: &'f QuestionFilter,
    ) -> impl Iterator<Item = &'s QuestionRecord> + 'f {
        let prepared = filter.prepare();
        self.iter().filter(move |q| prepared.matches(q))
    }

    pub fn count(&self, filter: &QuestionFilter) -> usize {
        self.filter(filter).count()
    }

    /// Uniformly random question among those matching `filter`.
    pub fn pick<R: Rng + ?Sized>(&self, filter: &QuestionFilter, rng: &mut R) -> Option<&QuestionRecord> {
        let candidates: Vec<&QuestionRecord> = self.filter(filter).collect();
        candidates.choose(rng).copied()
    }

    /// Sorted topics of questions visible in `week` (all questions if `None`).
    pub fn topics(&self, week: Option<u32>) -> Vec<String> {
        let topics: BTreeSet<&String> = self
            .iter()
            .filter(|q| week.map_or(true, |w| q.is_visible_in(w)))
            .flat_map(|q| q.topics.iter())
            .collect();
        topics.into_iter().cloned().collect()
    }

    /// Sorted difficulties of visible questions touching any of `topics`.
    pub fn difficulties(&self, week: Option<u32>, topics: &[String]) -> Vec<u32> {
        let filter = QuestionFilter {
            week,
            topics: topics.to_vec(),
            ..QuestionFilter::default()
        };
        let difficulties: BTreeSet<u32> = self.filter(&filter).map(|q| q.difficulty).collect();
        difficulties.into_iter().collect()
    }
}

/// Host-side selection criteria.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    /// Curriculum gate: only questions with `week <= self.week`.
    pub week: Option<u32>,
    /// Any-of match, compared by lookup key.
    pub topics: Vec<String>,
    pub difficulty: Option<u32>,
    pub exclude: HashSet<u32>,
}

impl QuestionFilter {
    pub fn matches(&self, question: &QuestionRecord) -> bool {
        self.prepare().matches(question)
    }

    fn prepare(&self) -> PreparedFilter<'_> {
        PreparedFilter {
            filter: self,
            wanted: self.topics.iter().map(|t| lookup_key(t)).collect(),
        }
    }
}

/// A filter with its topic lookup keys computed once per scan.
struct PreparedFilter<'a> {
    filter: &'a QuestionFilter,
    wanted: HashSet<String>,
}

impl PreparedFilter<'_> {
    fn matches(&self, question: &QuestionRecord) -> bool {
        if let Some(week) = self.filter.week {
            if !question.is_visible_in(week) {
                return false;
            }
        }

        if self.filter.exclude.contains(&question.id) {
            return false;
        }

        if let Some(difficulty) = self.filter.difficulty {
            if question.difficulty != difficulty {
                return false;
            }
        }

        if !self.wanted.is_empty()
            && !question.topics.iter().any(|t| self.wanted.contains(&lookup_key(t)))
        {
            return false;
        }

        true
    }
}

fn parse_block(patterns: &Patterns, block: &str) -> Option<QuestionRecord> {
    let caps = patterns.fields.captures(block)?;

    let id: u32 = caps[1].parse().ok()?;
    let difficulty: u32 = caps[3].parse().ok()?;
    let week: u32 = caps[5].parse().ok()?;

    let topics: BTreeSet<String> = caps[2]
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(canonicalize)
        .filter(|t| !t.is_empty())
        .collect();

    let accepted_answers: Vec<String> = caps[4]
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect();
    if accepted_answers.is_empty() {
        return None;
    }

    let body = &caps[6];
    let options = match patterns.enumerate.captures(body) {
        Some(enumerate) => parse_options(patterns, &enumerate[1]),
        None => IndexMap::new(),
    };
    let raw_body = patterns.enumerate.replace_all(body, "").trim().to_string();

    Some(QuestionRecord {
        id,
        topics,
        difficulty,
        accepted_answers,
        week,
        raw_body,
        options,
    })
}

fn parse_options(patterns: &Patterns, enumerate: &str) -> IndexMap<String, String> {
    let mut options = IndexMap::new();

    // The text before the first \item is not an option.
    for segment in enumerate.split("\\item").skip(1) {
        let Some(caps) = patterns.item_head.captures(segment) else {
            continue;
        };

        let letter = caps[1].to_lowercase();
        let text = patterns.letter_prefix.replace(caps[2].trim(), "");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        options.insert(letter, text);
    }

    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn block(id: u32, topics: &str, dif: u32, answers: &str, week: u32, body: &str) -> String {
        format!(
            "\\begin{{question}}{{{id}}}{{{topics}}}{{{dif}}}{{{answers}}}{{{week}}}{{{body}}}\\end{{question}}\n"
        )
    }

    const ROUND_TRIP: &str = r"
\begin{question}{42}{logica, Conjuntos}{2}{b}{3}{
Sea \textbf{A} un conjunto y \(x \in A\).
\begin{enumerate}
  \item a) $x = 1$
  \item b) $x = 2$
\end{enumerate}
}
\end{question}
";

    mod parse_tests {
        use super::*;

        #[test]
        fn round_trip_block() {
            let bank = QuestionBank::parse(ROUND_TRIP);
            assert_eq!(bank.len(), 1);

            let q = bank.get(42).unwrap();
            assert_eq!(q.topic_label(), "Conjuntos,Lógica");
            assert_eq!(q.difficulty, 2);
            assert_eq!(q.accepted_answers, vec!["b".to_string()]);
            assert_eq!(q.week, 3);
            assert_eq!(q.options.len(), 2);
            assert_eq!(q.options["a"], "$x = 1$");
            assert_eq!(q.options["b"], "$x = 2$");
            assert_eq!(q.raw_body, r"Sea \textbf{A} un conjunto y \(x \in A\).");
        }

        #[test]
        fn parsed_block_renders_to_html() {
            let bank = QuestionBank::parse(ROUND_TRIP);
            let html = crate::render::render_question(bank.get(42).unwrap());
            assert_eq!(
                html,
                r"Sea <strong>A</strong> un conjunto y $x \in A$.<ol type='a' class='options-list'><li>$x = 1$</li><li>$x = 2$</li></ol>"
            );
        }

        #[test]
        fn empty_source() {
            let bank = QuestionBank::parse("");
            assert!(bank.is_empty());
            assert_eq!(bank.report(), &LoadReport::default());
        }

        #[test]
        fn one_record_per_id_and_no_foreign_ids() {
            let src = [
                block(1, "logica", 1, "a", 1, "uno"),
                block(2, "conjuntos", 1, "b", 1, "dos"),
                block(7, "funciones", 2, "c", 2, "siete"),
            ]
            .concat();
            let bank = QuestionBank::parse(&src);

            let ids: Vec<u32> = bank.iter().map(|q| q.id).collect();
            assert_eq!(ids, vec![1, 2, 7]);
            assert!(bank.get(3).is_none());
        }

        #[test]
        fn duplicate_id_keeps_last_block() {
            let src = [
                block(5, "logica", 1, "a", 1, "first"),
                block(5, "logica", 1, "a", 1, "second"),
            ]
            .concat();
            let bank = QuestionBank::parse(&src);

            assert_eq!(bank.len(), 1);
            assert_eq!(bank.get(5).unwrap().raw_body, "second");
            assert_eq!(bank.report().duplicates, 1);
        }

        #[test]
        fn malformed_blocks_are_skipped_and_counted() {
            let src = [
                block(1, "logica", 1, "a", 1, "ok"),
                // non-numeric difficulty
                "\\begin{question}{2}{logica}{hard}{a}{1}{bad}\\end{question}\n".to_string(),
                // missing week field
                "\\begin{question}{3}{logica}{1}{a}{body}\\end{question}\n".to_string(),
                block(4, "logica", 1, "a", 1, "also ok"),
            ]
            .concat();
            let bank = QuestionBank::parse(&src);

            assert_eq!(bank.len(), 2);
            assert!(bank.get(1).is_some());
            assert!(bank.get(4).is_some());
            assert_eq!(bank.report().blocks_seen, 4);
            assert_eq!(bank.report().malformed, 2);
        }

        #[test]
        fn malformed_block_does_not_swallow_its_neighbour() {
            let src = format!(
                "\\begin{{question}}{{x}}{{a}}{{1}}{{a}}{{1}}{{b}}\\end{{question}}\n{}",
                block(9, "logica", 1, "a", 1, "survivor")
            );
            let bank = QuestionBank::parse(&src);
            assert_eq!(bank.get(9).unwrap().raw_body, "survivor");
        }

        #[test]
        fn overflowing_id_is_malformed() {
            let src = block(1, "logica", 1, "a", 1, "x").replace("{1}{logica}", "{99999999999}{logica}");
            let bank = QuestionBank::parse(&src);
            assert!(bank.is_empty());
            assert_eq!(bank.report().malformed, 1);
        }

        #[test]
        fn answer_list_of_only_commas_is_malformed() {
            let bank = QuestionBank::parse(&block(1, "logica", 1, " , ", 1, "x"));
            assert!(bank.is_empty());
        }

        #[test]
        fn body_spans_lines_and_nested_groups() {
            let body = "Si $f(x) = \\frac{1}{x}$\nentonces {\\bf algo}\n\\\\ fin";
            let bank = QuestionBank::parse(&block(3, "funciones", 1, "a", 1, body));
            assert_eq!(bank.get(3).unwrap().raw_body, body);
        }

        #[test]
        fn whitespace_between_body_and_end_marker() {
            let src = "\\begin{question}{8}{logica}{1}{a}{1}{cuerpo}  \n\t\\end{question}";
            let bank = QuestionBank::parse(src);
            assert_eq!(bank.get(8).unwrap().raw_body, "cuerpo");
        }

        #[test]
        fn answers_are_trimmed_but_keep_case() {
            let bank = QuestionBank::parse(&block(1, "logica", 1, " B , c ", 1, "x"));
            assert_eq!(bank.get(1).unwrap().accepted_answers, vec!["B", "c"]);
        }

        #[test]
        fn topic_order_does_not_change_serialization() {
            let a = QuestionBank::parse(&block(1, "logica, Conjuntos, funciones", 1, "a", 1, "x"));
            let b = QuestionBank::parse(&block(1, "funciones,conjunto ,LÓGICA", 1, "a", 1, "x"));
            assert_eq!(a.get(1).unwrap().topic_label(), b.get(1).unwrap().topic_label());
            assert_eq!(a.get(1).unwrap().topic_label(), "Conjuntos,Funciones,Lógica");
        }

        #[test]
        fn topics_deduplicate_after_canonicalization() {
            let bank = QuestionBank::parse(&block(1, "logica, Lógica, LOGICA", 1, "a", 1, "x"));
            assert_eq!(bank.get(1).unwrap().topic_label(), "Lógica");
        }

        #[test]
        fn blank_topic_entries_are_discarded() {
            let bank = QuestionBank::parse(&block(1, " , ,", 1, "a", 1, "x"));
            assert!(bank.get(1).unwrap().topics.is_empty());
        }
    }

    mod option_tests {
        use super::*;

        fn options_of(enumerate: &str) -> IndexMap<String, String> {
            let body = format!("Stem\n\\begin{{enumerate}}{enumerate}\\end{{enumerate}}");
            let bank = QuestionBank::parse(&block(1, "logica", 1, "a", 1, &body));
            bank.get(1).unwrap().options.clone()
        }

        #[test]
        fn no_enumerate_means_no_options() {
            let bank = QuestionBank::parse(&block(1, "logica", 1, "a", 1, "Explique."));
            let q = bank.get(1).unwrap();
            assert!(q.options.is_empty());
            assert_eq!(q.raw_body, "Explique.");
        }

        #[test]
        fn uppercase_letters_are_stored_lowercase() {
            let options = options_of("\n\\item A) uno\n\\item B) dos\n");
            assert_eq!(options.get("a").map(String::as_str), Some("uno"));
            assert_eq!(options.get("b").map(String::as_str), Some("dos"));
            assert!(options.get("A").is_none());
        }

        #[test]
        fn duplicated_letter_prefix_is_stripped() {
            let options = options_of("\\item a) a) repetido \\item b) b)otro");
            assert_eq!(options["a"], "repetido");
            assert_eq!(options["b"], "otro");
        }

        #[test]
        fn whitespace_runs_collapse() {
            let options = options_of("\\item a)  uno\n   dos\t\ttres  ");
            assert_eq!(options["a"], "uno dos tres");
        }

        #[test]
        fn insertion_order_follows_source() {
            let options = options_of("\\item c) tres \\item a) uno \\item b) dos");
            let keys: Vec<&str> = options.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["c", "a", "b"]);
        }

        #[test]
        fn duplicate_letter_overwrites() {
            let options = options_of("\\item a) primero \\item b) dos \\item a) ultimo");
            assert_eq!(options["a"], "ultimo");
            assert_eq!(options.len(), 2);
        }

        #[test]
        fn items_without_letter_end_the_previous_option() {
            let options = options_of("\\item a) uno \\item sin letra \\item b) dos");
            assert_eq!(options["a"], "uno");
            assert_eq!(options["b"], "dos");
            assert_eq!(options.len(), 2);
        }

        #[test]
        fn option_text_keeps_math_and_commands() {
            let options = options_of("\\item a) \\textbf{Sí}, $p \\lor q$");
            assert_eq!(options["a"], "\\textbf{Sí}, $p \\lor q$");
        }

        #[test]
        fn enumerate_removed_from_body() {
            let body = "Antes\n\\begin{enumerate}\\item a) x\\end{enumerate}\nDespués";
            let bank = QuestionBank::parse(&block(1, "logica", 1, "a", 1, body));
            assert_eq!(bank.get(1).unwrap().raw_body, "Antes\n\nDespués");
        }
    }

    mod filter_tests {
        use super::*;

        fn sample_bank() -> QuestionBank {
            let src = [
                block(1, "logica", 1, "a", 1, "q1"),
                block(2, "conjuntos", 2, "a", 3, "q2"),
                block(3, "logica, funciones", 2, "a", 5, "q3"),
                block(4, "indices", 3, "a", 8, "q4"),
            ]
            .concat();
            QuestionBank::parse(&src)
        }

        fn ids(bank: &QuestionBank, filter: &QuestionFilter) -> Vec<u32> {
            bank.filter(filter).map(|q| q.id).collect()
        }

        #[test]
        fn week_gate_excludes_later_weeks() {
            let bank = sample_bank();
            let week = |w| QuestionFilter {
                week: Some(w),
                ..QuestionFilter::default()
            };
            assert!(!ids(&bank, &week(3)).contains(&3));
            assert!(ids(&bank, &week(5)).contains(&3));
            assert!(ids(&bank, &week(10)).contains(&3));
            assert_eq!(ids(&bank, &week(3)), vec![1, 2]);
        }

        #[test]
        fn no_filter_matches_all() {
            let bank = sample_bank();
            assert_eq!(bank.count(&QuestionFilter::default()), 4);
        }

        #[test]
        fn topic_match_ignores_accents_and_case() {
            let bank = sample_bank();
            let filter = QuestionFilter {
                topics: vec!["LOGICA".to_string()],
                ..QuestionFilter::default()
            };
            assert_eq!(ids(&bank, &filter), vec![1, 3]);

            let filter = QuestionFilter {
                topics: vec!["índices".to_string(), "conjuntos".to_string()],
                ..QuestionFilter::default()
            };
            assert_eq!(ids(&bank, &filter), vec![2, 4]);
        }

        #[test]
        fn prepared_filter_folds_topics_once() {
            let bank = sample_bank();
            let filter = QuestionFilter {
                topics: vec!["LÓGICA".to_string(), "logica".to_string()],
                ..QuestionFilter::default()
            };
            let prepared = filter.prepare();
            assert_eq!(prepared.wanted.len(), 1);
            assert!(prepared.wanted.contains(&lookup_key("Lógica")));
            assert!(prepared.matches(bank.get(3).unwrap()));
            assert!(!prepared.matches(bank.get(2).unwrap()));
        }

        #[test]
        fn difficulty_is_equality() {
            let bank = sample_bank();
            let filter = QuestionFilter {
                difficulty: Some(2),
                ..QuestionFilter::default()
            };
            assert_eq!(ids(&bank, &filter), vec![2, 3]);
        }

        #[test]
        fn exclude_skips_answered_ids() {
            let bank = sample_bank();
            let filter = QuestionFilter {
                exclude: [1, 2].into_iter().collect(),
                ..QuestionFilter::default()
            };
            assert_eq!(ids(&bank, &filter), vec![3, 4]);
        }

        #[test]
        fn topics_listing() {
            let bank = sample_bank();
            assert_eq!(
                bank.topics(None),
                vec!["Conjuntos", "Funciones", "Lógica", "Índices"]
            );
            assert_eq!(bank.topics(Some(3)), vec!["Conjuntos", "Lógica"]);
        }

        #[test]
        fn difficulties_listing() {
            let bank = sample_bank();
            assert_eq!(bank.difficulties(None, &[]), vec![1, 2, 3]);
            assert_eq!(bank.difficulties(Some(3), &[]), vec![1, 2]);
            assert_eq!(
                bank.difficulties(None, &["funciones".to_string()]),
                vec![2]
            );
        }

        #[test]
        fn pick_respects_filter() {
            let bank = sample_bank();
            let mut rng = StdRng::seed_from_u64(7);
            let filter = QuestionFilter {
                week: Some(3),
                exclude: [1].into_iter().collect(),
                ..QuestionFilter::default()
            };
            for _ in 0..20 {
                assert_eq!(bank.pick(&filter, &mut rng).map(|q| q.id), Some(2));
            }
        }

        #[test]
        fn pick_with_no_candidates() {
            let bank = sample_bank();
            let mut rng = StdRng::seed_from_u64(1);
            let filter = QuestionFilter {
                week: Some(0),
                ..QuestionFilter::default()
            };
            assert!(bank.pick(&filter, &mut rng).is_none());
        }
    }

    mod load_tests {
        use super::*;

        #[test]
        fn load_reads_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(ROUND_TRIP.as_bytes()).unwrap();

            let bank = QuestionBank::load(file.path()).unwrap();
            assert_eq!(bank.len(), 1);
            assert!(bank.get(42).is_some());
        }

        #[test]
        fn load_missing_file_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("Preguntas.tex");

            let err = QuestionBank::load(&path).unwrap_err();
            assert!(matches!(err, LoadError::Io { .. }));
            assert!(err.to_string().contains("Preguntas.tex"));
        }

        #[test]
        fn bank_is_shareable_across_threads() {
            let bank = std::sync::Arc::new(QuestionBank::parse(ROUND_TRIP));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let bank = std::sync::Arc::clone(&bank);
                    std::thread::spawn(move || bank.get(42).map(|q| q.week))
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), Some(3));
            }
        }
    }
}

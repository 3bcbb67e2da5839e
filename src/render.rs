//! LaTeX fragment to HTML conversion.
//!
//! Conversion is lazy and uncached: the host calls [`render_question`] every
//! time a question is served. Math is handed to the client typesetter as
//! `$...$` / `$$...$$` spans whose content is never rewritten.

use std::borrow::Cow;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::error::RenderError;
use crate::models::QuestionRecord;

// Private-use code points; stripped from input so they cannot collide.
const TOKEN_OPEN: char = '\u{E000}';
const TOKEN_CLOSE: char = '\u{E001}';

const MAX_NESTING: usize = 32;

struct Patterns {
    styled: Regex,
    declared: Regex,
    skip: Regex,
    line_break: Regex,
    token: Regex,
    one_arg: Regex,
    zero_arg: Regex,
    tag: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            styled: Regex::new(r"\\(textbf|textit|emph|underline)\{([^{}]*)\}")?,
            declared: Regex::new(r"\{\\(bf|it|em)\s+([^{}]*)\}")?,
            skip: Regex::new(r"\\(smallskip|medskip|bigskip|newline)\b")?,
            line_break: Regex::new(r"\\\\(?:\[[^\]]*\])?")?,
            token: Regex::new("\u{E000}(\\d+)\u{E001}")?,
            one_arg: Regex::new(r"\\[a-zA-Z]+\*?(?:\[[^\]]*\])?\{([^{}]*)\}")?,
            zero_arg: Regex::new(r"\\(?:[a-zA-Z]+\*?|[,;:! ])")?,
            tag: Regex::new(r"<[^>]*>")?,
        })
    }
}

static PATTERNS: OnceLock<Result<Patterns, regex::Error>> = OnceLock::new();

fn patterns() -> Result<&'static Patterns, RenderError> {
    PATTERNS
        .get_or_init(Patterns::compile)
        .as_ref()
        .map_err(|e| RenderError::Pattern(e.clone()))
}

/// Math spans lifted out of one fragment. Lives for a single conversion.
#[derive(Default)]
struct MathArena {
    spans: Vec<String>,
}

impl MathArena {
    fn stash(&mut self, out: &mut String, span: String) {
        out.push(TOKEN_OPEN);
        out.push_str(&self.spans.len().to_string());
        out.push(TOKEN_CLOSE);
        self.spans.push(span);
    }

    fn restore(&self, patterns: &Patterns, text: &str) -> String {
        patterns
            .token
            .replace_all(text, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.spans.get(i))
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// Renders a question stem followed by its options as an ordered list.
///
/// Never fails: a conversion error is logged and replaced by a short error
/// fragment so one broken question cannot break the endpoint serving it.
pub fn render_question(question: &QuestionRecord) -> String {
    match try_render_question(question) {
        Ok(html) => html,
        Err(e) => {
            warn!(question = question.id, error = %e, "failed to render question");
            error_fragment(&e)
        }
    }
}

pub fn try_render_question(question: &QuestionRecord) -> Result<String, RenderError> {
    let mut html = render_fragment(&question.raw_body)?;
    html.push_str(&render_options(&question.options)?);
    Ok(html)
}

/// `<ol type='a'>` of the options in ascending letter order. An option that
/// fails to convert shows an inline error span in its own item. Empty for
/// open-ended questions.
pub fn render_options(options: &IndexMap<String, String>) -> Result<String, RenderError> {
    if options.is_empty() {
        return Ok(String::new());
    }

    let mut letters: Vec<&String> = options.keys().collect();
    letters.sort();

    let mut html = String::from("<ol type='a' class='options-list'>");
    for (position, letter) in letters.into_iter().enumerate() {
        let item = match render_fragment(&options[letter]) {
            Ok(item) => item,
            Err(e @ RenderError::Pattern(_)) => return Err(e),
            Err(e) => {
                warn!(option = %letter, error = %e, "failed to render option");
                option_error_fragment(&e)
            }
        };
        match letter_ordinal(letter) {
            Some(ordinal) if ordinal != position + 1 => {
                html.push_str(&format!("<li value='{ordinal}'>{item}</li>"));
            }
            _ => html.push_str(&format!("<li>{item}</li>")),
        }
    }
    html.push_str("</ol>");

    Ok(html)
}

fn letter_ordinal(letter: &str) -> Option<usize> {
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => Some((c as u8 - b'a') as usize + 1),
        _ => None,
    }
}

/// Converts one LaTeX fragment to HTML.
pub fn render_fragment(src: &str) -> Result<String, RenderError> {
    let patterns = patterns()?;
    let src = sanitize_fragment(src);

    let mut arena = MathArena::default();
    let text = lift_math(&src, &mut arena)?;

    let text = rewrite_styles(patterns, &text)?;
    let text = patterns.skip.replace_all(&text, |caps: &Captures| match &caps[1] {
        "medskip" => "<br><br>",
        "bigskip" => "<br><br><br>",
        _ => "<br>",
    });
    let text = patterns.line_break.replace_all(&text, "<br>");

    // Commands nobody handled lose their syntax but keep their text.
    let text = rewrite_nested(&patterns.one_arg, &text, |caps| caps[1].to_string())?;
    let text = patterns.zero_arg.replace_all(&text, " ");
    let text: String = text.chars().filter(|c| *c != '{' && *c != '}').collect();

    let html = arena.restore(patterns, &text);
    Ok(html.trim().to_string())
}

/// Normalizes line endings and drops surplus closing braces at the end of a
/// fragment, a common leftover of the block grammar. A dangling unescaped `$`
/// at the end is dropped while the `$` count is odd.
pub fn sanitize_fragment(src: &str) -> String {
    let mut s = src.replace("\r\n", "\n").trim().to_string();

    let opens = s.matches('{').count();
    let mut closes = s.matches('}').count();
    while closes > opens && s.ends_with('}') {
        s.pop();
        s.truncate(s.trim_end().len());
        closes -= 1;
    }

    let mut dollars = unescaped_dollars(&s);
    while dollars % 2 == 1 && s.ends_with('$') && !s.ends_with("\\$") {
        s.pop();
        s.truncate(s.trim_end().len());
        dollars -= 1;
    }

    s
}

fn unescaped_dollars(s: &str) -> usize {
    let mut count = 0;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '$' => count += 1,
            _ => {}
        }
    }
    count
}

/// Best-effort text rendition of an HTML fragment for terminal display.
pub fn plain_text(html: &str) -> String {
    let Ok(patterns) = patterns() else {
        return html.to_string();
    };

    let text = html
        .replace("<br>", "\n")
        .replace("</li>", "\n")
        .replace("</ol>", "\n");
    let text = patterns.tag.replace_all(&text, "");

    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#36;", "$")
        .replace("&#123;", "{")
        .replace("&#125;", "}")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Terminal rendition of a question: stem, then one `x) ...` line per option.
pub fn question_text(question: &QuestionRecord) -> String {
    let stem = match render_fragment(&question.raw_body) {
        Ok(html) => plain_text(&html),
        Err(e) => format!("[{}]", e),
    };

    let mut letters: Vec<&String> = question.options.keys().collect();
    letters.sort();

    let mut lines = vec![stem];
    for letter in letters {
        let text = render_fragment(&question.options[letter])
            .map(|html| plain_text(&html))
            .unwrap_or_else(|e| format!("[{}]", e));
        lines.push(format!("  {}) {}", letter, text));
    }
    lines.join("\n")
}

fn error_fragment(err: &RenderError) -> String {
    let mut msg = String::new();
    push_escaped(&mut msg, &err.to_string());
    format!("<p class='render-error'>Error rendering question: {msg}</p>")
}

fn option_error_fragment(err: &RenderError) -> String {
    let mut msg = String::new();
    push_escaped(&mut msg, &err.to_string());
    format!("<span class='render-error'>{msg}</span>")
}

// `\textbf{..}` and `{\bf ..}` nest inside each other, so both run in one
// loop until neither changes the text.
fn rewrite_styles(patterns: &Patterns, text: &str) -> Result<String, RenderError> {
    let mut current = text.to_string();
    for _ in 0..MAX_NESTING {
        let next = {
            let styled = patterns.styled.replace_all(&current, |caps: &Captures| {
                let tag = match &caps[1] {
                    "textbf" => "strong",
                    "underline" => "u",
                    _ => "em",
                };
                format!("<{tag}>{}</{tag}>", &caps[2])
            });
            patterns
                .declared
                .replace_all(&styled, |caps: &Captures| {
                    let tag = if &caps[1] == "bf" { "strong" } else { "em" };
                    format!("<{tag}>{}</{tag}>", &caps[2])
                })
                .into_owned()
        };
        if next == current {
            return Ok(current);
        }
        current = next;
    }

    if patterns.styled.is_match(&current) || patterns.declared.is_match(&current) {
        Err(RenderError::NestingTooDeep(MAX_NESTING))
    } else {
        Ok(current)
    }
}

/// Applies `rule` until the text stops changing, innermost groups first.
fn rewrite_nested<F>(pattern: &Regex, text: &str, mut rule: F) -> Result<String, RenderError>
where
    F: FnMut(&Captures) -> String,
{
    let mut current = text.to_string();
    for _ in 0..MAX_NESTING {
        let next = match pattern.replace_all(&current, |caps: &Captures| rule(caps)) {
            Cow::Borrowed(_) => None,
            Cow::Owned(next) => Some(next),
        };
        match next {
            Some(next) => current = next,
            None => return Ok(current),
        }
    }

    if pattern.is_match(&current) {
        Err(RenderError::NestingTooDeep(MAX_NESTING))
    } else {
        Ok(current)
    }
}

/// Moves every math span into `arena`, HTML-escapes the remaining text and
/// resolves escaped LaTeX specials. `\(..\)` becomes `$..$` and `\[..\]`
/// becomes `$$..$$`.
fn lift_math(src: &str, arena: &mut MathArena) -> Result<String, RenderError> {
    let mut out = String::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        let rest = &src[i..];

        let (open, close, wrap) = if rest.starts_with("\\(") {
            ("\\(", "\\)", "$")
        } else if rest.starts_with("\\[") {
            ("\\[", "\\]", "$$")
        } else if rest.starts_with("$$") {
            ("$$", "$$", "$$")
        } else if rest.starts_with('$') {
            ("$", "$", "$")
        } else {
            i += push_text(&mut out, rest);
            continue;
        };

        let body_start = i + open.len();
        let Some(len) = find_closing(&src[body_start..], close) else {
            return Err(RenderError::UnterminatedMath {
                delimiter: open,
                offset: i,
            });
        };

        let mut span = String::from(wrap);
        push_escaped(&mut span, &src[body_start..body_start + len]);
        span.push_str(wrap);
        arena.stash(&mut out, span);

        i = body_start + len + close.len();
    }

    Ok(out)
}

// Emits the text token at the start of `rest`; returns the bytes consumed.
fn push_text(out: &mut String, rest: &str) -> usize {
    let mut chars = rest.chars();
    let Some(c) = chars.next() else {
        return 0;
    };

    if c == '\\' {
        if let Some(next) = chars.next() {
            let literal = match next {
                '\\' => Some("\\\\"),
                '$' => Some("&#36;"),
                '%' => Some("%"),
                '&' => Some("&amp;"),
                '#' => Some("#"),
                '_' => Some("_"),
                '{' => Some("&#123;"),
                '}' => Some("&#125;"),
                _ => None,
            };
            if let Some(literal) = literal {
                out.push_str(literal);
                return 2;
            }
            if let Some(mark) = combining_accent(next) {
                return push_accented(out, rest, mark);
            }
        }
    }

    push_escaped(out, &rest[..c.len_utf8()]);
    c.len_utf8()
}

fn combining_accent(c: char) -> Option<char> {
    match c {
        '\'' => Some('\u{301}'),
        '`' => Some('\u{300}'),
        '^' => Some('\u{302}'),
        '"' => Some('\u{308}'),
        '~' => Some('\u{303}'),
        _ => None,
    }
}

// `\'e` and `\'{e}` become the precomposed letter. An accent with no letter
// to sit on keeps only its mark character.
fn push_accented(out: &mut String, rest: &str, mark: char) -> usize {
    let after = &rest[2..];
    let mut chars = after.chars();
    let base = match chars.next() {
        Some('{') => match (chars.next(), chars.next()) {
            (Some(base), Some('}')) if base.is_alphabetic() => Some((base, base.len_utf8() + 2)),
            _ => None,
        },
        Some(base) if base.is_alphabetic() => Some((base, base.len_utf8())),
        _ => None,
    };

    match base {
        Some((base, len)) => {
            out.extend([base, mark].into_iter().nfc());
            2 + len
        }
        None => {
            push_escaped(out, &rest[1..2]);
            2
        }
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            TOKEN_OPEN | TOKEN_CLOSE => {}
            _ => out.push(c),
        }
    }
}

// Byte offset of `close` in `haystack`, skipping backslash escapes.
fn find_closing(haystack: &str, close: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut j = 0;
    while j < bytes.len() {
        if haystack[j..].starts_with(close) {
            return Some(j);
        }
        j += if bytes[j] == b'\\' { 2 } else { 1 };
        while j < bytes.len() && !haystack.is_char_boundary(j) {
            j += 1;
        }
    }
    None
}

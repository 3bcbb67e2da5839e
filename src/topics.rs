//! Topic canonicalization.
//!
//! Authors tag questions with free-text topic labels ("logica", "Lógica",
//! "LÓGICA", "conjunto"). Every label is reduced to a lookup key (no
//! diacritics, lowercase) and mapped onto a fixed display vocabulary.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

// Keys are stored without accents and in lowercase.
const VOCABULARY: &[(&str, &str)] = &[
    ("conjunto", "Conjuntos"),
    ("conjuntos", "Conjuntos"),
    ("logica", "Lógica"),
    ("proposiciones", "Proposiciones"),
    ("proposiciones2", "Proposiciones"),
    ("argumentos", "Argumentación"),
    ("argumentacion", "Argumentación"),
    ("cuantificadores", "Cuantificadores"),
    ("demostraciones", "Demostraciones"),
    ("exploracion", "Exploración"),
    ("funciones", "Funciones"),
    ("implicaciones", "Implicaciones"),
    ("indices", "Índices"),
    ("sumatorias", "Sumatorias"),
    ("traducciones", "Traducciones"),
    ("preferencias", "Preferencias"),
    ("utilidad", "Utilidad"),
];

pub fn strip_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Lookup key for a topic label: trimmed, accents removed, lowercase.
pub fn lookup_key(raw: &str) -> String {
    strip_accents(raw.trim()).to_lowercase()
}

/// Maps a raw topic label to its display form.
///
/// Empty input yields an empty string, which callers treat as "no topic".
/// Labels outside the vocabulary get the first character uppercased and the
/// rest lowercased, so "teoria de grafos" becomes "Teoria de grafos".
pub fn canonicalize(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }

    let key = lookup_key(s);
    if let Some((_, display)) = VOCABULARY.iter().find(|(k, _)| *k == key) {
        return (*display).to_string();
    }

    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Display strings of the fixed vocabulary, sorted and deduplicated.
pub fn vocabulary() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = VOCABULARY.iter().map(|(_, display)| *display).collect();
    names.sort_unstable();
    names.dedup();
    names
}

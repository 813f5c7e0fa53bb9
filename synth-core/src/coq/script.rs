//! Sentence-level utilities for Coq proof scripts.
//!
//! This module splits `.v` sources into sentences and classifies sentences
//! by shape: focus markers, proof start and end markers, theorem-like
//! statements. It never interprets tactic semantics.

use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// Sentence shapes
// ============================================================================

/// Focus braces (`{`, `}`, `2: {`) and bullets (`-`, `++`, `***`).
static FOCUS_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:\d+\s*:\s*)?\{|\}|-+|\++|\*+)$").expect("Invalid regex")
});

/// `Proof.`, `Proof with auto.`, `Proof using x y.`
static PROOF_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Proof(?:\s+(?:with|using)\b[^.]*(?:\.[^\s.][^.]*)*)?\s*\.$")
        .expect("Invalid regex")
});

/// Sentences that leave proof mode.
static PROOF_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Qed|Defined|Admitted|Save\s+\S+|Abort(?:\s+\S+)?)\s*\.$")
        .expect("Invalid regex")
});

/// Unresolved existential variables (`?x`, `?Goal0`).
static EVAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?[A-Za-z_]").expect("Invalid regex"));

/// Theorem-like statements, capturing the declared name.
static STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:Local|Global|Program|Polymorphic|Monomorphic)\s+)*(?P<kind>Lemma|Theorem|Remark|Fact|Corollary|Proposition|Example|Definition|Instance|Fixpoint|CoFixpoint)\s+(?P<name>[A-Za-z_][\w'.]*)",
    )
    .expect("Invalid regex")
});

/// Goal selectors preceding a brace, e.g. `2: {`.
static GOAL_SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*:\s*\{").expect("Invalid regex"));

// ============================================================================
// Splitting
// ============================================================================

/// Split a Coq source into sentences.
///
/// Leading whitespace and comments stay attached to the sentence that
/// follows them, so concatenating the result reproduces `text` exactly.
/// Bullets and focus braces at the start of a sentence are sentences of
/// their own. A trailing fragment without a terminator is returned as the
/// last element.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut has_content = false;
    let mut comment_depth = 0usize;
    let mut in_string = false;
    let mut i = 0usize;

    let byte_after = |idx: usize| -> usize {
        chars
            .get(idx + 1)
            .map(|(b, _)| *b)
            .unwrap_or(text.len())
    };

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, n)| *n);

        if in_string {
            if c == '"' {
                if next == Some('"') {
                    i += 2;
                    continue;
                }
                in_string = false;
            }
            i += 1;
            continue;
        }

        if c == '(' && next == Some('*') {
            comment_depth += 1;
            i += 2;
            continue;
        }
        if comment_depth > 0 {
            if c == '*' && next == Some(')') {
                comment_depth -= 1;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if !has_content {
            if c == '{' || c == '}' {
                let end = byte_after(i);
                sentences.push(text[start..end].to_string());
                start = end;
                i += 1;
                continue;
            }
            if matches!(c, '-' | '+' | '*') {
                let mut j = i;
                while j + 1 < chars.len() && chars[j + 1].1 == c {
                    j += 1;
                }
                let end = byte_after(j);
                sentences.push(text[start..end].to_string());
                start = end;
                i = j + 1;
                continue;
            }
            if c.is_ascii_digit() {
                if let Some(m) = GOAL_SELECTOR.find(&text[pos..]) {
                    let end = pos + m.end();
                    sentences.push(text[start..end].to_string());
                    start = end;
                    while i < chars.len() && chars[i].0 < end {
                        i += 1;
                    }
                    continue;
                }
            }
        }

        if c == '"' {
            in_string = true;
            has_content = true;
        } else if c == '.' && next.map_or(true, char::is_whitespace) {
            let end = byte_after(i);
            sentences.push(text[start..end].to_string());
            start = end;
            has_content = false;
        } else if !c.is_whitespace() {
            has_content = true;
        }
        i += 1;
    }

    if start < text.len() {
        sentences.push(text[start..].to_string());
    }
    sentences
}

/// Remove (nested) comments, leaving string literals intact.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut in_string = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '(' && chars.peek() == Some(&'*') {
            chars.next();
            depth += 1;
            continue;
        }
        if depth > 0 {
            if c == '*' && chars.peek() == Some(&')') {
                chars.next();
                depth -= 1;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The sentence as sent to the backend: comments removed, whitespace trimmed.
pub fn sentence_body(sentence: &str) -> String {
    strip_comments(sentence).trim().to_string()
}

/// Strip the one trailing `.` terminator from a sentence.
///
/// `split...` keeps its `..` since it stands for `split` followed by the
/// `Proof with` tactic.
pub fn strip_terminator(sentence: &str) -> &str {
    let sentence = sentence.trim_end();
    sentence.strip_suffix('.').unwrap_or(sentence).trim_end()
}

// ============================================================================
// Classification
// ============================================================================

/// Whether the sentence is a focus brace or a bullet.
pub fn is_focus_marker(sentence: &str) -> bool {
    FOCUS_MARKER.is_match(&sentence_body(sentence))
}

/// Whether the sentence is a `Proof` marker.
pub fn is_proof_start(sentence: &str) -> bool {
    PROOF_START.is_match(&sentence_body(sentence))
}

/// Whether the sentence ends a proof.
pub fn is_proof_end(sentence: &str) -> bool {
    PROOF_END.is_match(&sentence_body(sentence))
}

/// Whether the text mentions an unresolved existential variable.
pub fn has_evar(text: &str) -> bool {
    EVAR.is_match(text)
}

/// Extract the declared name from a theorem-like statement.
pub fn lemma_name_from_statement(statement: &str) -> Option<String> {
    STATEMENT
        .captures(&strip_comments(statement))
        .and_then(|caps| caps.name("name"))
        .map(|m| m.as_str().to_string())
}

/// Names of every statement in the script that opens an interactive proof.
///
/// Statements with an inline `:=` body are definitions, not proofs.
pub fn lemmas_in_script(sentences: &[String]) -> Vec<String> {
    sentences
        .iter()
        .map(|s| sentence_body(s))
        .filter(|s| !s.contains(":="))
        .filter_map(|s| lemma_name_from_statement(&s))
        .collect()
}

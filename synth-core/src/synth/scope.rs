//! Section-local declarations visible to every proof in scope.
//!
//! `Variable`, `Hypothesis`, `Context` and `Let` declarations inside a
//! `Section` show up in every goal's context. They are already available to
//! a synthetic lemma declared in the same section, so the builder must not
//! quantify over them.

use regex::Regex;
use std::sync::LazyLock;

use crate::coq::script::sentence_body;
use crate::coq::{Hypothesis, ProofBackend};
use crate::error::{Error, Result};

/// `Variable x y : T.`, `Hypotheses (H1 : P) (H2 : Q).`, `Context {A : Type}.`
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^(?:Variables?|Hypothes[ie]s|Parameters?|Context)\s+(?P<rest>.+?)\s*\.$",
    )
    .expect("Invalid regex")
});

/// `Let x : T := body.`, `Let x := body.`
static LET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^Let\s+(?P<name>[A-Za-z_][\w']*)\s*(?::\s*(?P<ty>.+?))?\s*:=.*\.$",
    )
    .expect("Invalid regex")
});

/// `Section X.`, `Module X.`, `Module Type X.`, `Module Import X.`
static SCOPE_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:Section|Module(?:\s+Type)?(?:\s+(?:Import|Export))?)\s+(?P<name>[A-Za-z_][\w']*)[^=]*\.$",
    )
    .expect("Invalid regex")
});

/// `End X.`
static SCOPE_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^End\s+(?P<name>[A-Za-z_][\w']*)\s*\.$").expect("Invalid regex")
});

/// Declarations collected while one block is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFrame {
    /// Name of the section or module.
    pub name: String,
    /// Declared hypotheses, oldest first.
    pub hypotheses: Vec<Hypothesis>,
}

/// Stack of open sections and modules.
#[derive(Debug, Clone, Default)]
pub struct ScopeTracker {
    frames: Vec<ScopeFrame>,
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the stack after `command` has been executed.
    ///
    /// Declared names are resolved through `backend` so that later
    /// comparisons see the elaborated type. Closing a block with none open
    /// is a `MalformedScope` error; any other unrecognized sentence is
    /// ignored.
    pub fn observe<B>(&mut self, command: &str, backend: &mut B) -> Result<()>
    where
        B: ProofBackend + ?Sized,
    {
        let body = sentence_body(command);
        if body.is_empty() {
            return Ok(());
        }

        if let Some(caps) = SCOPE_CLOSE.captures(&body) {
            let frame = self
                .frames
                .pop()
                .ok_or_else(|| Error::malformed_scope(body.clone()))?;
            if frame.name != caps["name"] {
                tracing::warn!(
                    open = %frame.name,
                    closed = &caps["name"],
                    "Scope closed under a different name"
                );
            }
            return Ok(());
        }

        if let Some(caps) = SCOPE_OPEN.captures(&body) {
            if !body.contains(":=") {
                tracing::debug!(
                    name = &caps["name"],
                    depth = self.frames.len() + 1,
                    "Scope opened"
                );
                self.frames.push(ScopeFrame {
                    name: caps["name"].to_string(),
                    hypotheses: Vec::new(),
                });
            }
            return Ok(());
        }

        let groups = if let Some(caps) = LET.captures(&body) {
            vec![(
                vec![caps["name"].to_string()],
                caps.name("ty").map(|m| m.as_str().to_string()),
            )]
        } else if let Some(caps) = DECLARATION.captures(&body) {
            declaration_groups(&caps["rest"])
        } else {
            return Ok(());
        };

        if self.frames.is_empty() {
            tracing::debug!(command = %body, "Declaration outside any section ignored");
            return Ok(());
        }

        let mut declared = Vec::new();
        for (names, surface) in groups {
            declared.extend(resolve_group(&names, surface.as_deref(), backend)?);
        }
        if let Some(top) = self.frames.last_mut() {
            top.hypotheses.extend(declared);
        }
        Ok(())
    }

    /// Every hypothesis declared in an open block, outermost first.
    pub fn visible_set(&self) -> Vec<Hypothesis> {
        self.frames
            .iter()
            .flat_map(|f| f.hypotheses.iter().cloned())
            .collect()
    }

    /// Number of open blocks.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[ScopeFrame] {
        &self.frames
    }
}

/// Split the declaration body into `(names, surface type)` groups.
///
/// Handles both `a b : T` and binder lists such as `(a b : T) {c : U}`.
/// A group without a `:` only declares something when it is a single
/// identifier; a generalized binder such as `` `{EqDec A} `` names no
/// variable at all.
fn declaration_groups(rest: &str) -> Vec<(Vec<String>, Option<String>)> {
    let rest = rest.trim();
    if !rest.starts_with(['(', '{', '[', '`']) {
        return declared_group(rest, false).into_iter().collect();
    }

    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut generalized = false;
    let mut prev = None;
    for (i, c) in rest.char_indices() {
        match c {
            '(' | '{' | '[' => {
                if depth == 0 {
                    start = Some(i + c.len_utf8());
                    generalized = prev == Some('`');
                }
                depth += 1;
            }
            ')' | '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(s) = start.take() {
                        groups.extend(declared_group(&rest[s..i], generalized));
                    }
                }
            }
            _ => {}
        }
        prev = Some(c);
    }
    groups
}

fn declared_group(group: &str, generalized: bool) -> Option<(Vec<String>, Option<String>)> {
    let (names, ty) = split_group(group);
    match ty {
        Some(_) => Some((names, ty)),
        None if generalized || names.len() != 1 => {
            tracing::debug!(group = %group.trim(), "Binder without a declared name ignored");
            None
        }
        None => Some((names, ty)),
    }
}

fn split_group(group: &str) -> (Vec<String>, Option<String>) {
    let (names, ty) = match group.split_once(':') {
        Some((names, ty)) => (names, Some(ty.trim().to_string())),
        None => (group, None),
    };
    let names = names
        .split_whitespace()
        .map(|n| n.trim_start_matches('!').to_string())
        .filter(|n| !n.is_empty())
        .collect();
    (names, ty.filter(|t| !t.is_empty()))
}

/// Resolve each name and group consecutive names that share a type.
fn resolve_group<B: ProofBackend + ?Sized>(
    names: &[String],
    surface: Option<&str>,
    backend: &mut B,
) -> Result<Vec<Hypothesis>> {
    let mut out: Vec<Hypothesis> = Vec::new();
    for name in names {
        let ty = match backend.check_type(name)? {
            Some(ty) => ty,
            None => match surface {
                Some(ty) => {
                    tracing::warn!(
                        name = %name,
                        "Could not resolve declared type; using surface type"
                    );
                    ty.to_string()
                }
                None => {
                    tracing::warn!(name = %name, "Could not resolve declared type; skipping");
                    continue;
                }
            },
        };
        match out.last_mut() {
            Some(last) if last.ty == ty => last.names.push(name.clone()),
            _ => out.push(Hypothesis::new([name.clone()], ty)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coq::ScriptedBackend;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_section_variables_are_visible_until_end() {
        let mut backend = ScriptedBackend::new()
            .with_type("A", "Type")
            .with_type("x", "A")
            .with_type("y", "A");
        let mut scope = ScopeTracker::new();
        for sentence in ["Section S.", "Variable A : Type.", "Variables x y : A."] {
            scope.observe(sentence, &mut backend).unwrap();
        }
        assert_eq!(
            scope.visible_set(),
            vec![Hypothesis::new(["A"], "Type"), Hypothesis::new(["x", "y"], "A")]
        );
        scope.observe("End S.", &mut backend).unwrap();
        assert!(scope.visible_set().is_empty());
        assert_eq!(scope.depth(), 0);
    }

    #[test]
    fn test_elaborated_type_wins_over_surface_type() {
        let mut backend = ScriptedBackend::new().with_type("H", "forall n : nat, n = n");
        let mut scope = ScopeTracker::new();
        scope.observe("Section S.", &mut backend).unwrap();
        scope.observe("Hypothesis H : forall n, n = n.", &mut backend).unwrap();
        assert_eq!(scope.visible_set()[0].ty, "forall n : nat, n = n");
    }

    #[test]
    fn test_binder_groups_and_surface_fallback() {
        let mut backend = ScriptedBackend::new();
        let mut scope = ScopeTracker::new();
        scope.observe("Section S.", &mut backend).unwrap();
        scope
            .observe("Hypotheses (H1 : P) (H2 H3 : Q).", &mut backend)
            .unwrap();
        scope.observe("Context {A : Type}.", &mut backend).unwrap();
        assert_eq!(
            scope.visible_set(),
            vec![
                Hypothesis::new(["H1"], "P"),
                Hypothesis::new(["H2", "H3"], "Q"),
                Hypothesis::new(["A"], "Type"),
            ]
        );
    }

    #[test]
    fn test_generalized_binders_without_names_are_ignored() {
        let mut backend = ScriptedBackend::new()
            .with_type("EqDec", "Type -> Type")
            .with_type("A", "Type")
            .with_type("H", "EqDec A");
        let mut scope = ScopeTracker::new();
        scope.observe("Section S.", &mut backend).unwrap();
        scope.observe("Context `{EqDec A}.", &mut backend).unwrap();
        assert!(scope.visible_set().is_empty());

        scope
            .observe("Context {A : Type} `{EqDec A} `{H : EqDec A}.", &mut backend)
            .unwrap();
        assert_eq!(
            scope.visible_set(),
            vec![Hypothesis::new(["A"], "Type"), Hypothesis::new(["H"], "EqDec A")]
        );
    }

    #[test]
    fn test_let_declaration() {
        let mut backend = ScriptedBackend::new().with_type("two", "nat");
        let mut scope = ScopeTracker::new();
        scope.observe("Section S.", &mut backend).unwrap();
        scope.observe("Let two := 2.", &mut backend).unwrap();
        assert_eq!(scope.visible_set(), vec![Hypothesis::new(["two"], "nat")]);
    }

    #[test]
    fn test_nested_frames_flatten_outermost_first() {
        let mut backend = ScriptedBackend::new();
        let mut scope = ScopeTracker::new();
        scope.observe("Section Outer.", &mut backend).unwrap();
        scope.observe("Variable a : nat.", &mut backend).unwrap();
        scope.observe("Section Inner.", &mut backend).unwrap();
        scope.observe("Variable b : bool.", &mut backend).unwrap();
        assert_eq!(scope.depth(), 2);
        assert_eq!(
            scope.visible_set(),
            vec![Hypothesis::new(["a"], "nat"), Hypothesis::new(["b"], "bool")]
        );
        scope.observe("End Inner.", &mut backend).unwrap();
        assert_eq!(scope.visible_set(), vec![Hypothesis::new(["a"], "nat")]);
    }

    #[test]
    fn test_unmatched_end_is_malformed() {
        let mut backend = ScriptedBackend::new();
        let mut scope = ScopeTracker::new();
        let err = scope.observe("End S.", &mut backend).unwrap_err();
        assert!(matches!(err, Error::MalformedScope { .. }));
        assert!(err.is_structural());
    }

    #[test]
    fn test_module_definitions_do_not_open_scopes() {
        let mut backend = ScriptedBackend::new();
        let mut scope = ScopeTracker::new();
        scope.observe("Module M := Nat.", &mut backend).unwrap();
        scope.observe("Module Type T.", &mut backend).unwrap();
        assert_eq!(scope.depth(), 1);
        assert_eq!(scope.frames()[0].name, "T");
    }

    #[test]
    fn test_declarations_outside_sections_and_other_sentences_are_ignored() {
        let mut backend = ScriptedBackend::new();
        let mut scope = ScopeTracker::new();
        scope.observe("Variable z : nat.", &mut backend).unwrap();
        scope.observe("Require Import Arith.", &mut backend).unwrap();
        scope.observe("(* comment *)", &mut backend).unwrap();
        assert!(scope.visible_set().is_empty());
    }
}

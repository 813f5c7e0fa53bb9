//! Hypothesis differencing between two proof states.

use crate::coq::Hypothesis;

/// Hypotheses of `hyps` that are not already present in `subtract`.
///
/// Grouped hypotheses are split per name. A name is unchanged, and dropped,
/// when `subtract` declares it with the same type up to whitespace. Surviving
/// names that still collide with a name of `subtract` get `'` appended until
/// they are fresh. Hypotheses with at least one surviving name are returned
/// newest first.
pub fn diff(subtract: &[Hypothesis], hyps: &[Hypothesis]) -> Vec<Hypothesis> {
    let mut out = Vec::new();

    for hyp in hyps {
        let kept: Vec<String> = hyp
            .names
            .iter()
            .filter(|name| {
                !subtract
                    .iter()
                    .any(|s| s.declares(name) && s.same_type(hyp))
            })
            .map(|name| fresh_name(name, subtract, hyps))
            .collect();

        if !kept.is_empty() {
            out.push(Hypothesis::new(kept, hyp.ty.clone()));
        }
    }

    out.reverse();
    out
}

fn fresh_name(name: &str, subtract: &[Hypothesis], hyps: &[Hypothesis]) -> String {
    if !subtract.iter().any(|s| s.declares(name)) {
        return name.to_string();
    }
    let mut candidate = format!("{}'", name);
    while subtract
        .iter()
        .chain(hyps)
        .any(|h| h.declares(&candidate))
    {
        candidate.push('\'');
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hyp(line: &str) -> Hypothesis {
        Hypothesis::parse(line).unwrap()
    }

    #[test]
    fn test_identical_lists_yield_nothing() {
        let a = vec![hyp("n : nat"), hyp("H : n > 0")];
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_grouped_hypothesis_keeps_only_new_names() {
        let before = vec![hyp("x : nat")];
        let after = vec![hyp("x, y : nat")];
        assert_eq!(diff(&before, &after), vec![hyp("y : nat")]);
    }

    #[test]
    fn test_whitespace_differences_are_ignored() {
        let before = vec![hyp("H : forall n,  n = n")];
        let after = vec![hyp("H : forall n,\n n = n")];
        assert!(diff(&before, &after).is_empty());
    }

    #[test]
    fn test_result_is_newest_first() {
        let before = vec![hyp("n : nat")];
        let after = vec![hyp("n : nat"), hyp("m : nat"), hyp("IHm : P m")];
        assert_eq!(diff(&before, &after), vec![hyp("IHm : P m"), hyp("m : nat")]);
    }

    #[test]
    fn test_retyped_name_is_primed() {
        let before = vec![hyp("n : nat"), hyp("n' : bool")];
        let after = vec![hyp("n : list nat")];
        assert_eq!(diff(&before, &after), vec![hyp("n'' : list nat")]);
    }

    #[test]
    fn test_empty_subtract_returns_everything_reversed() {
        let after = vec![hyp("a : A"), hyp("b : B")];
        assert_eq!(diff(&[], &after), vec![hyp("b : B"), hyp("a : A")]);
    }
}

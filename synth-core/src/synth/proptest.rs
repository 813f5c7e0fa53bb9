//! Property-based tests for hypothesis differencing and statement building.
//!
//! These tests check the invariants the synthesized statements rely on:
//!
//! - Differencing a context against itself finds nothing new
//! - Only genuinely new names survive a difference
//! - Quantifiers are emitted only for referenced variables
//! - Lemma names never collide within a run

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet, HashSet};

    use crate::coq::Hypothesis;
    use crate::synth::builder::{mentions, subgoal_body};
    use crate::synth::diff::diff;
    use crate::synth::types::SynthLemma;

    fn var(i: usize) -> String {
        format!("v{}", i)
    }

    fn simple_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("nat".to_string()),
            Just("bool".to_string()),
            Just("list  nat".to_string()),
            Just("forall n : nat, n = n".to_string()),
        ]
    }

    // Contexts with unique names, possibly grouped.
    fn context() -> impl Strategy<Value = Vec<Hypothesis>> {
        prop::collection::btree_map(0usize..12, simple_type(), 0..8).prop_map(|m| {
            let mut out: Vec<Hypothesis> = Vec::new();
            for (i, ty) in m {
                match out.last_mut() {
                    Some(last) if last.ty == ty => last.names.push(var(i)),
                    _ => out.push(Hypothesis::new([var(i)], ty)),
                }
            }
            out
        })
    }

    // Hypotheses whose types mention other variables, and a goal mentioning some.
    fn dependent_hyps() -> impl Strategy<Value = (Vec<Hypothesis>, String)> {
        (
            prop::collection::btree_map(
                0usize..8,
                prop::collection::btree_set(0usize..8, 0..3),
                1..6,
            ),
            prop::collection::btree_set(0usize..8, 0..4),
        )
            .prop_map(|(hyps, goal_refs): (BTreeMap<usize, BTreeSet<usize>>, BTreeSet<usize>)| {
                let hyps = hyps
                    .into_iter()
                    .map(|(i, refs)| {
                        let ty = if refs.is_empty() {
                            "nat".to_string()
                        } else {
                            let args: Vec<String> = refs.into_iter().map(var).collect();
                            format!("R {}", args.join(" "))
                        };
                        Hypothesis::new([var(i)], ty)
                    })
                    .collect();
                let args: Vec<String> = goal_refs.into_iter().map(var).collect();
                (hyps, format!("G {}", args.join(" ")).trim_end().to_string())
            })
    }

    // =========================================================================
    // Differencing
    // =========================================================================

    proptest! {
        /// A context differenced against itself yields nothing.
        #[test]
        fn diff_of_identical_contexts_is_empty(ctx in context()) {
            prop_assert!(diff(&ctx, &ctx).is_empty());
        }

        /// Appending one fresh hypothesis yields exactly that hypothesis.
        #[test]
        fn diff_finds_appended_hypothesis(ctx in context(), ty in simple_type()) {
            let fresh = Hypothesis::new(["fresh"], ty);
            let mut after = ctx.clone();
            after.push(fresh.clone());
            prop_assert_eq!(diff(&ctx, &after), vec![fresh]);
        }

        /// Whitespace inside types never makes a hypothesis look new.
        #[test]
        fn diff_ignores_type_whitespace(ctx in context()) {
            let spaced: Vec<Hypothesis> = ctx
                .iter()
                .map(|h| Hypothesis::new(h.names.clone(), h.ty.replace(' ', "\n  ")))
                .collect();
            prop_assert!(diff(&ctx, &spaced).is_empty());
        }

        /// Surviving names never collide with names of the subtracted context.
        #[test]
        fn diff_output_names_are_fresh(before in context(), after in context()) {
            let taken: HashSet<&str> = before
                .iter()
                .flat_map(|h| h.names.iter().map(String::as_str))
                .collect();
            for hyp in diff(&before, &after) {
                for name in &hyp.names {
                    prop_assert!(!taken.contains(name.as_str()), "{} collides", name);
                }
            }
        }
    }

    // =========================================================================
    // Statement building
    // =========================================================================

    proptest! {
        /// A variable mentioned nowhere is never quantified.
        #[test]
        fn unreferenced_variables_are_not_quantified((hyps, goal) in dependent_hyps()) {
            let body = subgoal_body(&hyps, &goal);
            let prefix = body.strip_suffix(goal.as_str()).unwrap_or_default();
            for hyp in &hyps {
                for name in &hyp.names {
                    let used = mentions(&goal, name)
                        || hyps.iter().any(|h| mentions(&h.ty, name));
                    if !used {
                        prop_assert!(!mentions(prefix, name), "{} quantified in {}", name, body);
                    }
                }
            }
        }

        /// A variable the goal mentions is always quantified.
        #[test]
        fn goal_variables_are_quantified((hyps, goal) in dependent_hyps()) {
            let body = subgoal_body(&hyps, &goal);
            prop_assert!(body.ends_with(goal.as_str()));
            let prefix = &body[..body.len() - goal.len()];
            for hyp in &hyps {
                for name in &hyp.names {
                    if mentions(&goal, name) {
                        prop_assert!(mentions(prefix, name), "{} missing from {}", name, body);
                    }
                }
            }
        }

        /// Lemma names are unique across every (lemma, step) pair.
        #[test]
        fn lemma_names_are_unique(lemmas in 1usize..30, steps in 1usize..30) {
            let mut seen = HashSet::new();
            for i in 0..lemmas {
                for j in 0..steps {
                    prop_assert!(seen.insert(SynthLemma::name_for(i, j)));
                }
            }
            prop_assert_eq!(seen.len(), lemmas * steps);
        }
    }
}

//! Size and identifier metrics over serialized kernel terms.
//!
//! SerAPI serializes `Constr.t` as S-expressions such as
//! `(App (Const ((Constant (MPfile (DirPath ((Id Nat) (Id Init) (Id Coq)))) (Id add)) (Instance ()))) ...)`.
//! `TermShape::classify` maps one node onto a closed set of shapes; every
//! metric is written as one handler per shape. Unknown shapes are an error,
//! never silently skipped.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

use super::sexp::Sexpr;

/// The node shapes the metrics understand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TermShape<'a> {
    /// `(Ind ((mutind idx) univ))`
    Ind { mutind: &'a Sexpr },
    /// `(Prod binder ty body)`
    Prod { ty: &'a Sexpr, body: &'a Sexpr },
    /// `(Const (constant univ))`
    Const { constant: &'a Sexpr },
    /// `(App f (args...))`
    App { func: &'a Sexpr, args: &'a [Sexpr] },
    /// `(LetIn binder ty value body)`
    LetIn {
        ty: &'a Sexpr,
        value: &'a Sexpr,
        body: &'a Sexpr,
    },
    /// `(Lambda binder ty body)`
    Lambda { ty: &'a Sexpr, body: &'a Sexpr },
    /// `(Construct (((mutind idx) ctor) univ))`
    Construct { mutind: &'a Sexpr },
    /// `(Case info ret scrutinee (branches...))`
    Case {
        mutind: &'a Sexpr,
        ret: &'a Sexpr,
        scrutinee: &'a Sexpr,
        branches: &'a [Sexpr],
    },
    /// `(MutInd modpath label)`
    MutInd { path: &'a Sexpr, label: &'a Sexpr },
    /// `(Constant modpath label)`
    Constant { path: &'a Sexpr, label: &'a Sexpr },
    /// `Rel`, `Var`, `Sort` and bound module paths.
    Leaf,
    /// Bare strings and integers.
    Literal,
}

impl<'a> TermShape<'a> {
    /// Classify one term node.
    pub fn classify(term: &'a Sexpr) -> Result<Self> {
        let items = match term {
            Sexpr::Str(_) | Sexpr::Int(_) => return Ok(Self::Literal),
            Sexpr::Atom(_) => return Err(unhandled(term)),
            Sexpr::List(items) => items.as_slice(),
        };
        let Some(head) = items.first().and_then(Sexpr::as_text) else {
            return Err(unhandled(term));
        };

        let shape = match (head, &items[1..]) {
            ("Ind", [inner, ..]) => Self::Ind {
                mutind: nth(nth(inner, 0)?, 0)?,
            },
            ("Prod", [_, ty, body]) => Self::Prod { ty, body },
            ("Const", [inner]) => Self::Const {
                constant: nth(inner, 0)?,
            },
            ("App", [func, Sexpr::List(args)]) => Self::App { func, args },
            ("LetIn", [_, ty, value, body]) => Self::LetIn { ty, value, body },
            ("Lambda", [_, ty, body]) => Self::Lambda { ty, body },
            ("Construct", [inner, ..]) => Self::Construct {
                mutind: nth(nth(nth(inner, 0)?, 0)?, 0)?,
            },
            ("Case", [info, ret, scrutinee, Sexpr::List(branches)]) => Self::Case {
                mutind: nth(nth(nth(info, 0)?, 1)?, 0)?,
                ret,
                scrutinee,
                branches,
            },
            ("MutInd", [path, label, ..]) => Self::MutInd { path, label },
            ("Constant", [path, label, ..]) => Self::Constant { path, label },
            ("Rel" | "Var" | "Sort" | "MPbound", _) => Self::Leaf,
            _ => return Err(unhandled(term)),
        };
        Ok(shape)
    }
}

/// Number of nodes: atoms count one, lists count one plus their children.
pub fn nested_size(term: &Sexpr) -> usize {
    match term {
        Sexpr::List(items) => 1 + items.iter().map(nested_size).sum::<usize>(),
        _ => 1,
    }
}

/// Number of distinct global identifiers referenced by a `(CoqConstr t)` term.
///
/// Terms not wrapped in `CoqConstr` have no identifiers.
pub fn ident_size(term: &Sexpr) -> Result<usize> {
    match strip_toplevel(term) {
        Some(inner) => Ok(gather_idents(inner)?.len()),
        None => Ok(0),
    }
}

/// Unwrap `(CoqConstr t)`.
pub fn strip_toplevel(term: &Sexpr) -> Option<&Sexpr> {
    match term.as_list()? {
        [head, inner] if head.is_atom("CoqConstr") => Some(inner),
        _ => None,
    }
}

/// Fully qualified names of the constants and inductives a term references.
pub fn gather_idents(term: &Sexpr) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    match TermShape::classify(term)? {
        TermShape::Ind { mutind } | TermShape::Construct { mutind } => {
            out.extend(gather_idents(mutind)?);
        }
        TermShape::Prod { ty, body } | TermShape::Lambda { ty, body } => {
            out.extend(gather_idents(ty)?);
            out.extend(gather_idents(body)?);
        }
        TermShape::Const { constant } => out.extend(gather_idents(constant)?),
        TermShape::App { func, args } => {
            out.extend(gather_idents(func)?);
            for arg in args {
                out.extend(gather_idents(arg)?);
            }
        }
        TermShape::LetIn { ty, value, body } => {
            out.extend(gather_idents(ty)?);
            out.extend(gather_idents(value)?);
            out.extend(gather_idents(body)?);
        }
        TermShape::Case {
            mutind,
            ret,
            scrutinee,
            branches,
        } => {
            out.extend(gather_idents(mutind)?);
            out.extend(gather_idents(ret)?);
            out.extend(gather_idents(scrutinee)?);
            for branch in branches {
                out.extend(gather_idents(branch)?);
            }
        }
        TermShape::MutInd { path, label } | TermShape::Constant { path, label } => {
            if let Some(prefix) = join_module(path)? {
                if let Some(id) = conv_id(label) {
                    out.insert(format!("{}.{}", prefix, id));
                }
            }
        }
        TermShape::Leaf | TermShape::Literal => {}
    }
    Ok(out)
}

/// Render a module path as a dotted prefix; bound (functor) paths have none.
fn join_module(path: &Sexpr) -> Result<Option<String>> {
    let items = path.as_list().ok_or_else(|| unhandled(path))?;
    match items {
        [head, dirpath] if head.is_atom("MPfile") => {
            let ids = match dirpath.as_list() {
                Some([tag, ids]) if tag.is_atom("DirPath") => ids,
                _ => return Err(unhandled(path)),
            };
            let parts: Vec<String> = ids
                .as_list()
                .unwrap_or_default()
                .iter()
                .filter_map(conv_id)
                .collect();
            Ok(Some(parts.join(".")))
        }
        [head, inner, label] if head.is_atom("MPdot") => {
            let prefix = join_module(inner)?.unwrap_or_default();
            Ok(Some(format!("{}.{}", prefix, conv_id(label).unwrap_or_default())))
        }
        [head, ..] if head.is_atom("MPbound") => Ok(None),
        _ => Err(unhandled(path)),
    }
}

/// `(Id name)` to `name`.
fn conv_id(id: &Sexpr) -> Option<String> {
    match id.as_list()? {
        [tag, Sexpr::Atom(name)] if tag.is_atom("Id") => Some(name.clone()),
        _ => None,
    }
}

fn nth(term: &Sexpr, index: usize) -> Result<&Sexpr> {
    term.as_list()
        .and_then(|items| items.get(index))
        .ok_or_else(|| unhandled(term))
}

fn unhandled(term: &Sexpr) -> Error {
    Error::UnhandledTerm(term.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAT_ADD: &str = "(Const ((Constant (MPfile (DirPath ((Id Nat) (Id Init) (Id Coq)))) (Id add)) (Instance ())))";
    const NAT: &str = "(Ind (((MutInd (MPfile (DirPath ((Id Datatypes) (Id Init) (Id Coq)))) (Id nat)) 0) (Instance ())))";

    fn parse(s: &str) -> Sexpr {
        Sexpr::parse(s).unwrap()
    }

    #[test]
    fn test_nested_size() {
        assert_eq!(nested_size(&parse("a")), 1);
        assert_eq!(nested_size(&parse("(a b)")), 3);
        assert_eq!(nested_size(&parse("(a (b c))")), 5);
    }

    #[test]
    fn test_gather_idents_through_prod_and_app() {
        let term = parse(&format!(
            "(Prod (binder) {nat} (App {add} ((Rel 1) (Rel 1))))",
            nat = NAT,
            add = NAT_ADD
        ));
        let idents = gather_idents(&term).unwrap();
        assert_eq!(
            idents.into_iter().collect::<Vec<_>>(),
            vec!["Datatypes.Init.Coq.nat", "Nat.Init.Coq.add"]
        );
    }

    #[test]
    fn test_ident_size_requires_coq_constr_wrapper() {
        let wrapped = parse(&format!("(CoqConstr {})", NAT));
        assert_eq!(ident_size(&wrapped).unwrap(), 1);
        assert_eq!(ident_size(&parse(NAT)).unwrap(), 0);
    }

    #[test]
    fn test_bound_module_paths_contribute_nothing() {
        let term = parse("(Const ((Constant (MPbound x) (Id f)) (Instance ())))");
        assert!(gather_idents(&term).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_shape_is_an_error() {
        let err = gather_idents(&parse("(Fix stuff)")).unwrap_err();
        assert!(matches!(err, Error::UnhandledTerm(_)));
        assert!(TermShape::classify(&parse("Prod")).is_err());
    }

    #[test]
    fn test_classify_leaf_and_literal() {
        assert_eq!(TermShape::classify(&parse("(Rel 3)")).unwrap(), TermShape::Leaf);
        assert_eq!(TermShape::classify(&parse("42")).unwrap(), TermShape::Literal);
    }
}

//! Substitution rewriting over IR expressions.
//!
//! Used by the cross-dialect bridge to splice a nested sub-module's bindings
//! into the primary build: every reference to a shadow variable is replaced
//! by the corresponding primary value, and every reference to a sub-module
//! helper by its registration in the primary module. The rewrite always
//! produces a fresh expression; the source is never mutated, so the nested
//! sub-build stays independent of the context it is spliced into.

use std::collections::HashMap;

use super::{Expr, Var};

/// Name-keyed substitution maps applied during a rewrite.
pub struct Substitution<'a> {
    /// Variable name → replacement variable.
    pub vars: &'a HashMap<String, Var>,
    /// Helper function name → replacement helper name.
    pub helpers: &'a HashMap<String, String>,
}

impl Substitution<'_> {
    fn var(&self, var: &Var) -> Var {
        self.vars.get(&var.name).cloned().unwrap_or_else(|| var.clone())
    }

    fn helper(&self, name: &str) -> String {
        self.helpers
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Reconstruct `expr` with the substitution applied at every occurrence.
pub fn rewrite_expr(expr: &Expr, subst: &Substitution<'_>) -> Expr {
    match expr {
        Expr::Const(data) => Expr::Const(data.clone()),
        Expr::Call { op, attrs, args } => Expr::Call {
            op: op.clone(),
            attrs: attrs.clone(),
            args: args.iter().map(|a| subst.var(a)).collect(),
        },
        Expr::CallHelper {
            helper,
            attrs,
            args,
        } => Expr::CallHelper {
            helper: subst.helper(helper),
            attrs: attrs.clone(),
            args: args.iter().map(|a| subst.var(a)).collect(),
        },
        Expr::Tuple(vars) => Expr::Tuple(vars.iter().map(|v| subst.var(v)).collect()),
        Expr::TupleGetItem { tuple, index } => Expr::TupleGetItem {
            tuple: subst.var(tuple),
            index: *index,
        },
        Expr::Var(var) => Expr::Var(subst.var(var)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockBuilder, Type};

    fn subst_maps() -> (HashMap<String, Var>, HashMap<String, String>) {
        let mut bb = BlockBuilder::new();
        let replacement = bb.named_var("primary_in", Type::unknown_tensor());
        let mut vars = HashMap::new();
        vars.insert("shadow".to_string(), replacement);
        let mut helpers = HashMap::new();
        helpers.insert("kernel_a".to_string(), "kernel_b".to_string());
        (vars, helpers)
    }

    fn shadow_var() -> Var {
        Var {
            id: 0,
            name: "shadow".to_string(),
            ty: Type::unknown_tensor(),
            value: None,
        }
    }

    #[test]
    fn variables_are_replaced_at_every_occurrence() {
        let (vars, helpers) = subst_maps();
        let subst = Substitution {
            vars: &vars,
            helpers: &helpers,
        };
        let expr = Expr::Tuple(vec![shadow_var(), shadow_var()]);
        match rewrite_expr(&expr, &subst) {
            Expr::Tuple(elems) => {
                assert!(elems.iter().all(|v| v.name == "primary_in"));
            }
            other => panic!("expected tuple, got {other:?}"),
        }
    }

    #[test]
    fn helper_references_are_remapped() {
        let (vars, helpers) = subst_maps();
        let subst = Substitution {
            vars: &vars,
            helpers: &helpers,
        };
        let expr = Expr::CallHelper {
            helper: "kernel_a".to_string(),
            attrs: Vec::new(),
            args: vec![shadow_var()],
        };
        match rewrite_expr(&expr, &subst) {
            Expr::CallHelper { helper, args, .. } => {
                assert_eq!(helper, "kernel_b");
                assert_eq!(args[0].name, "primary_in");
            }
            other => panic!("expected helper call, got {other:?}"),
        }
    }

    #[test]
    fn unmapped_names_pass_through_unchanged() {
        let vars = HashMap::new();
        let helpers = HashMap::new();
        let subst = Substitution {
            vars: &vars,
            helpers: &helpers,
        };
        let expr = Expr::Var(shadow_var());
        match rewrite_expr(&expr, &subst) {
            Expr::Var(v) => assert_eq!(v.name, "shadow"),
            other => panic!("expected var, got {other:?}"),
        }
    }
}

//! The classic operator-conversion dialect.
//!
//! A body of operator conversions predates the SSA IR and was written
//! against a tree-shaped expression dialect. Rather than reimplementing
//! those conversions, the importer keeps them as-is: a classic conversion
//! builds a `ClassicExpr` tree, and `lower_function` translates that tree
//! into a standalone SSA sub-module that the bridge then splices into the
//! primary build.

use std::collections::HashMap;

use crate::error::ImportError;
use crate::import::Target;
use crate::ir::{BlockBuilder, Expr, HelperFn, Module, OpAttrs, Ret, TensorType, Type, Var};
use crate::tensor::TensorData;

/// A named tensor variable of the classic dialect. Identity is by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicVar {
    pub name: String,
    pub ty: TensorType,
}

/// A classic-dialect expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassicExpr {
    Var(ClassicVar),
    Const(TensorData),
    Call {
        op: String,
        attrs: OpAttrs,
        args: Vec<ClassicExpr>,
    },
    Tuple(Vec<ClassicExpr>),
    TupleGetItem(Box<ClassicExpr>, usize),
}

impl ClassicExpr {
    pub fn call(op: &str, args: Vec<ClassicExpr>) -> Self {
        ClassicExpr::Call {
            op: op.to_string(),
            attrs: Vec::new(),
            args,
        }
    }

    pub fn call_with(op: &str, attrs: OpAttrs, args: Vec<ClassicExpr>) -> Self {
        ClassicExpr::Call {
            op: op.to_string(),
            attrs,
            args,
        }
    }

    /// Constant payload, when this expression is a literal.
    pub fn constant_value(&self) -> Option<&TensorData> {
        match self {
            ClassicExpr::Const(data) => Some(data),
            _ => None,
        }
    }
}

/// A classic-dialect function: the unit the bridge lowers.
#[derive(Debug, Clone)]
pub struct ClassicFunction {
    pub params: Vec<ClassicVar>,
    pub body: ClassicExpr,
}

/// Ordered classic-conversion inputs with explicit absence.
///
/// Indexing never panics: out-of-bounds and declared-absent slots both read
/// as `None`.
pub struct ClassicInputs(Vec<Option<ClassicExpr>>);

impl ClassicInputs {
    pub fn new(slots: Vec<Option<ClassicExpr>>) -> Self {
        Self(slots)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClassicExpr> {
        self.0.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn require(&self, index: usize, op: &str) -> Result<&ClassicExpr, ImportError> {
        self.get(index).ok_or_else(|| ImportError::NonVariableInput {
            op: op.to_string(),
            index,
        })
    }
}

/// Lower a classic function into a standalone SSA sub-module.
///
/// The sub-module is built with its own `BlockBuilder`; nothing of the
/// caller's build context is observed or mutated. Its `main` carries one
/// parameter per classic parameter (same names, so the bridge can key its
/// substitution on them), ANF bindings for the body, and a final alias
/// binding for the return value. Every operator call becomes a call to a
/// helper function registered in the sub-module, one per distinct operator.
pub fn lower_function(func: &ClassicFunction, target: &Target) -> Result<Module, ImportError> {
    let mut lowering = Lowering {
        bb: BlockBuilder::new(),
        env: HashMap::new(),
        memo: Vec::new(),
        target,
    };
    let mut params = Vec::with_capacity(func.params.len());
    for param in &func.params {
        let var = lowering
            .bb
            .named_var(&param.name, Type::Tensor(param.ty.clone()));
        lowering.env.insert(param.name.clone(), var.clone());
        params.push(var);
    }

    let out = lowering.lower(&func.body)?;
    let ret = lowering.bb.emit(Expr::Var(out));
    Ok(lowering.bb.finish("main", params, Ret::Single(ret)))
}

struct Lowering<'a> {
    bb: BlockBuilder,
    env: HashMap<String, Var>,
    /// Classic expressions share subexpressions by value; lowering each
    /// occurrence once restores that sharing in the SSA form.
    memo: Vec<(ClassicExpr, Var)>,
    target: &'a Target,
}

impl Lowering<'_> {
    fn lower(&mut self, expr: &ClassicExpr) -> Result<Var, ImportError> {
        match expr {
            ClassicExpr::Var(var) => self
                .env
                .get(&var.name)
                .cloned()
                .ok_or_else(|| ImportError::UndefinedReference(var.name.clone())),
            ClassicExpr::Const(data) => Ok(self.bb.constant(data.clone())),
            ClassicExpr::Call { op, attrs, args } => {
                if let Some(var) = self.lookup_memo(expr) {
                    return Ok(var);
                }
                let mut arg_vars = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vars.push(self.lower(arg)?);
                }
                let helper = self.bb.add_helper(HelperFn {
                    name: op.clone(),
                    op: op.clone(),
                    arity: arg_vars.len(),
                    target: self.target.name.clone(),
                })?;
                let var = self.bb.emit_typed(
                    Expr::CallHelper {
                        helper,
                        attrs: attrs.clone(),
                        args: arg_vars,
                    },
                    Type::unknown_tensor(),
                );
                self.memo.push((expr.clone(), var.clone()));
                Ok(var)
            }
            ClassicExpr::Tuple(elems) => {
                let mut elem_vars = Vec::with_capacity(elems.len());
                for elem in elems {
                    elem_vars.push(self.lower(elem)?);
                }
                Ok(self.bb.emit(Expr::Tuple(elem_vars)))
            }
            ClassicExpr::TupleGetItem(tuple, index) => {
                if let Some(var) = self.lookup_memo(expr) {
                    return Ok(var);
                }
                let tuple_var = self.lower(tuple)?;
                let var = self.bb.emit(Expr::TupleGetItem {
                    tuple: tuple_var,
                    index: *index,
                });
                self.memo.push((expr.clone(), var.clone()));
                Ok(var)
            }
        }
    }

    fn lookup_memo(&self, expr: &ClassicExpr) -> Option<Var> {
        self.memo
            .iter()
            .find(|(seen, _)| seen == expr)
            .map(|(_, var)| var.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::ElementType;

    fn var(name: &str) -> ClassicVar {
        ClassicVar {
            name: name.to_string(),
            ty: TensorType::with_dtype(Some(ElementType::Float32)),
        }
    }

    fn target() -> Target {
        Target::default()
    }

    #[test]
    fn scalar_body_ends_in_a_single_alias_binding() {
        let func = ClassicFunction {
            params: vec![var("a"), var("b")],
            body: ClassicExpr::call(
                "matmul",
                vec![
                    ClassicExpr::Var(var("a")),
                    ClassicExpr::Var(var("b")),
                ],
            ),
        };
        let module = lower_function(&func, &target()).unwrap();
        let main = module.main();

        assert_eq!(main.params.len(), 2);
        assert_eq!(main.params[0].name, "a");
        assert_eq!(main.bindings.len(), 2);
        assert!(matches!(main.bindings[0].expr, Expr::CallHelper { .. }));
        assert!(matches!(main.bindings[1].expr, Expr::Var(_)));
        assert!(module.helper("matmul").is_some());
    }

    #[test]
    fn tuple_body_ends_in_construction_plus_alias() {
        let call = ClassicExpr::call("batch_norm", vec![ClassicExpr::Var(var("x"))]);
        let func = ClassicFunction {
            params: vec![var("x")],
            body: ClassicExpr::Tuple(vec![
                ClassicExpr::TupleGetItem(Box::new(call.clone()), 0),
                ClassicExpr::TupleGetItem(Box::new(call), 1),
            ]),
        };
        let module = lower_function(&func, &target()).unwrap();
        let main = module.main();

        let n = main.bindings.len();
        assert!(matches!(main.bindings[n - 2].expr, Expr::Tuple(_)));
        assert!(matches!(main.bindings[n - 1].expr, Expr::Var(_)));
        match &main.ret {
            Ret::Single(v) => assert_eq!(v.ty.tuple_arity(), Some(2)),
            other => panic!("expected single return, got {other:?}"),
        }
        // Two calls to the same operator share one helper registration.
        assert_eq!(module.helpers.len(), 1);
    }

    #[test]
    fn inputs_accessor_reads_absent_and_out_of_bounds_as_none() {
        let inputs = ClassicInputs::new(vec![Some(ClassicExpr::Var(var("x"))), None]);
        assert!(inputs.get(0).is_some());
        assert!(inputs.get(1).is_none());
        assert!(inputs.get(5).is_none());
        assert!(matches!(
            inputs.require(1, "MaxPool"),
            Err(ImportError::NonVariableInput { index: 1, .. })
        ));
    }
}

//! Splicing classic-catalog conversions into the primary build.
//!
//! A classic conversion produces an expression tree in the classic dialect.
//! To reuse it, the bridge mirrors the node's primary inputs as shadow
//! classic values, runs the conversion, lowers its result into a standalone
//! sub-module with an independent nested build context, and then rewrites
//! the sub-module's bindings into the primary context: shadow variables are
//! substituted with the primary inputs they mirror, and helper functions are
//! re-registered in the primary module, deduplicated by name.
//!
//! Binding order is preserved exactly, since later bindings reference
//! earlier ones. The sub-module's return bindings are withheld rather than
//! re-emitted: for a tuple-returning conversion the tuple-construction
//! binding becomes the bridge's return value, for a scalar-returning one the
//! single final binding does. This relies on the shape the classic lowering
//! always produces (a trailing alias binding, preceded by the tuple
//! construction when the return type is an aggregate).

use std::collections::HashMap;

use crate::classic::{self, ClassicExpr, ClassicFunction, ClassicInputs, ClassicVar};
use crate::error::ImportError;
use crate::from_model::{GraphBuilder, Inputs, Lowered};
use crate::ir::rewrite::{rewrite_expr, Substitution};
use crate::ir::{Attributes, Expr, Ret, Type, Var};
use crate::registry::{ClassicFn, NodeType};

/// Run a classic conversion for one node and splice the result into the
/// primary build context.
pub fn splice(
    ctx: &mut GraphBuilder<'_>,
    converter: ClassicFn,
    tag: &NodeType,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    // Mirror each primary input as a shadow classic value: constants map to
    // classic constants by value, runtime values to fresh classic variables
    // carrying the same name, shape and dtype.
    let mut shadow_slots = Vec::with_capacity(inputs.len());
    let mut shadow_params = Vec::new();
    let mut var_map: HashMap<String, Var> = HashMap::new();
    for (index, slot) in inputs.slots().iter().enumerate() {
        match slot {
            None => shadow_slots.push(None),
            Some(var) => {
                if let Some(value) = &var.value {
                    shadow_slots.push(Some(ClassicExpr::Const(value.clone())));
                    continue;
                }
                let ty = match &var.ty {
                    Type::Tensor(tensor) => tensor.clone(),
                    Type::Tuple(_) => {
                        return Err(ImportError::NonVariableInput {
                            op: tag.to_string(),
                            index,
                        });
                    }
                };
                let shadow = ClassicVar {
                    name: var.name.clone(),
                    ty,
                };
                shadow_params.push(shadow.clone());
                var_map.insert(var.name.clone(), var.clone());
                shadow_slots.push(Some(ClassicExpr::Var(shadow)));
            }
        }
    }

    let body = converter(&ClassicInputs::new(shadow_slots), attrs).map_err(|err| {
        ImportError::BridgeTranslationFailed {
            op: tag.to_string(),
            reason: err.to_string(),
        }
    })?;

    // Lower into a standalone sub-module. The nested context neither
    // observes nor mutates the primary one; on failure nothing has leaked
    // into the primary build.
    let function = ClassicFunction {
        params: shadow_params,
        body,
    };
    let sub_module = classic::lower_function(&function, ctx.target)?;

    // Register the sub-module's helpers into the primary function set,
    // deduplicated by name.
    let mut helper_map: HashMap<String, String> = HashMap::new();
    for helper in &sub_module.helpers {
        let registered = ctx.bb.add_helper(helper.clone())?;
        helper_map.insert(helper.name.clone(), registered);
    }

    let main = sub_module.main();
    let returns_tuple = match &main.ret {
        Ret::Single(var) => var.ty.tuple_arity().is_some(),
        Ret::Tuple(_) => true,
    };

    // The classic lowering ends with an alias binding, preceded by the
    // tuple construction when the return is an aggregate. Those return
    // bindings are withheld; everything before them is re-emitted verbatim,
    // in order.
    let total = main.bindings.len();
    let withheld = if returns_tuple { 2 } else { 1 };
    debug_assert!(total >= withheld);
    let (spliced, ret_binding) = (
        &main.bindings[..total - withheld],
        &main.bindings[total - withheld],
    );

    for binding in spliced {
        let expr = rewrite_expr(
            &binding.expr,
            &Substitution {
                vars: &var_map,
                helpers: &helper_map,
            },
        );
        let emitted = ctx.bb.emit_typed(expr, binding.var.ty.clone());
        var_map.insert(binding.var.name.clone(), emitted);
    }

    let ret_expr = rewrite_expr(
        &ret_binding.expr,
        &Substitution {
            vars: &var_map,
            helpers: &helper_map,
        },
    );
    match ret_expr {
        Expr::Tuple(elements) => Ok(Lowered::Tuple(elements)),
        Expr::Var(var) => Ok(Lowered::Single(var)),
        other => {
            let var = ctx.bb.emit_typed(other, ret_binding.var.ty.clone());
            Ok(Lowered::Single(var))
        }
    }
}

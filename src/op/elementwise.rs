//! Element-wise operator conversions.

use crate::error::ImportError;
use crate::from_model::{GraphBuilder, Inputs, Lowered};
use crate::ir::{AttributeValue, Attributes, Type, Var};
use crate::tensor::ElementType;

use super::attr_i64;

fn binary(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    tag: &str,
    op: &str,
) -> Result<Lowered, ImportError> {
    let a = inputs.require(0, tag)?.clone();
    let b = inputs.require(1, tag)?.clone();
    let ty = a.ty.clone();
    Ok(Lowered::Single(ctx.bb.call_op(op, &[a, b], Vec::new(), ty)))
}

fn unary(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    tag: &str,
    op: &str,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, tag)?.clone();
    let ty = x.ty.clone();
    Ok(Lowered::Single(ctx.bb.call_op(op, &[x], Vec::new(), ty)))
}

/// Same dims as `v`, element type replaced.
fn like_with_dtype(v: &Var, dtype: ElementType) -> Type {
    let dims = v.ty.as_tensor().and_then(|t| t.dims.clone());
    Type::tensor(dims, Some(dtype))
}

pub(crate) fn add(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    binary(ctx, inputs, "Add", "add")
}

pub(crate) fn sub(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    binary(ctx, inputs, "Sub", "subtract")
}

pub(crate) fn mul(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    binary(ctx, inputs, "Mul", "multiply")
}

pub(crate) fn div(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    binary(ctx, inputs, "Div", "divide")
}

pub(crate) fn pow(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    binary(ctx, inputs, "Pow", "power")
}

pub(crate) fn sqrt(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    unary(ctx, inputs, "Sqrt", "sqrt")
}

pub(crate) fn erf(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    unary(ctx, inputs, "Erf", "erf")
}

pub(crate) fn tanh(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    unary(ctx, inputs, "Tanh", "tanh")
}

pub(crate) fn relu(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    unary(ctx, inputs, "Relu", "relu")
}

pub(crate) fn sigmoid(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    unary(ctx, inputs, "Sigmoid", "sigmoid")
}

pub(crate) fn not(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, "Not")?.clone();
    let ty = like_with_dtype(&x, ElementType::Bool);
    Ok(Lowered::Single(
        ctx.bb.call_op("logical_not", &[x], Vec::new(), ty),
    ))
}

pub(crate) fn equal(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let a = inputs.require(0, "Equal")?.clone();
    let b = inputs.require(1, "Equal")?.clone();
    let ty = like_with_dtype(&a, ElementType::Bool);
    Ok(Lowered::Single(
        ctx.bb.call_op("equal", &[a, b], Vec::new(), ty),
    ))
}

pub(crate) fn where_op(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let cond = inputs.require(0, "Where")?.clone();
    let a = inputs.require(1, "Where")?.clone();
    let b = inputs.require(2, "Where")?.clone();
    let ty = a.ty.clone();
    Ok(Lowered::Single(
        ctx.bb.call_op("where", &[cond, a, b], Vec::new(), ty),
    ))
}

/// Clip lowers to a maximum/minimum chain; with neither bound present the
/// input passes through untouched.
pub(crate) fn clip(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let mut result = inputs.require(0, "Clip")?.clone();
    if let Some(min) = inputs.get(1) {
        let ty = result.ty.clone();
        result = ctx
            .bb
            .call_op("maximum", &[result, min.clone()], Vec::new(), ty);
    }
    if let Some(max) = inputs.get(2) {
        let ty = result.ty.clone();
        result = ctx
            .bb
            .call_op("minimum", &[result, max.clone()], Vec::new(), ty);
    }
    Ok(Lowered::Single(result))
}

pub(crate) fn cast(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, "Cast")?.clone();
    let code = attr_i64(attrs, "to").ok_or_else(|| ImportError::MalformedAttribute {
        name: "to".to_string(),
        reason: "Cast requires a target type".to_string(),
    })?;
    let dtype = ElementType::from_wire(code as i32).ok_or_else(|| {
        ImportError::UnsupportedFeature(format!("element type code {code} in Cast"))
    })?;
    let ty = like_with_dtype(&x, dtype);
    Ok(Lowered::Single(ctx.bb.call_op(
        "cast",
        &[x],
        vec![(
            "dtype".to_string(),
            AttributeValue::String(dtype.to_string()),
        )],
        ty,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::Target;
    use crate::ir::{Dim, Expr};

    fn float_var(ctx: &mut GraphBuilder<'_>, name: &str) -> Var {
        ctx.bb.named_var(
            name,
            Type::tensor(Some(vec![Dim::Static(4)]), Some(ElementType::Float32)),
        )
    }

    #[test]
    fn binary_conversions_emit_one_call() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let a = float_var(&mut ctx, "a");
        let b = float_var(&mut ctx, "b");
        let inputs = Inputs::new(vec![Some(a), Some(b)]);
        let lowered = add(&mut ctx, &inputs, &Attributes::new()).unwrap();
        assert_eq!(ctx.bb.bindings().len(), 1);
        assert!(matches!(lowered, Lowered::Single(_)));
        assert!(matches!(
            &ctx.bb.bindings()[0].expr,
            Expr::Call { op, .. } if op == "add"
        ));
    }

    #[test]
    fn clip_without_bounds_is_the_identity() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let x = float_var(&mut ctx, "x");
        let inputs = Inputs::new(vec![Some(x.clone()), None, None]);
        let lowered = clip(&mut ctx, &inputs, &Attributes::new()).unwrap();
        assert!(ctx.bb.bindings().is_empty());
        match lowered {
            Lowered::Single(v) => assert_eq!(v.name, x.name),
            other => panic!("expected passthrough, got {other:?}"),
        }
    }

    #[test]
    fn clip_with_both_bounds_chains_maximum_minimum() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let x = float_var(&mut ctx, "x");
        let lo = float_var(&mut ctx, "lo");
        let hi = float_var(&mut ctx, "hi");
        let inputs = Inputs::new(vec![Some(x), Some(lo), Some(hi)]);
        clip(&mut ctx, &inputs, &Attributes::new()).unwrap();
        let ops: Vec<_> = ctx
            .bb
            .bindings()
            .iter()
            .map(|b| match &b.expr {
                Expr::Call { op, .. } => op.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(ops, vec!["maximum", "minimum"]);
    }

    #[test]
    fn cast_requires_a_known_type_code() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let x = float_var(&mut ctx, "x");
        let inputs = Inputs::new(vec![Some(x)]);

        let mut attrs = Attributes::new();
        attrs.insert("to".to_string(), AttributeValue::Int64(7));
        let lowered = cast(&mut ctx, &inputs, &attrs).unwrap();
        match lowered {
            Lowered::Single(v) => assert_eq!(v.ty.dtype(), Some(ElementType::Int64)),
            other => panic!("expected single result, got {other:?}"),
        }

        let mut attrs = Attributes::new();
        attrs.insert("to".to_string(), AttributeValue::Int64(999));
        assert!(matches!(
            cast(&mut ctx, &inputs, &attrs),
            Err(ImportError::UnsupportedFeature(_))
        ));
    }
}

//! Matrix product conversions: Gemm in the direct catalog, MatMul through
//! the classic catalog.

use crate::classic::{ClassicExpr, ClassicInputs};
use crate::error::ImportError;
use crate::from_model::{GraphBuilder, Inputs, Lowered};
use crate::ir::{AttributeValue, Attributes, TensorType, Type};
use crate::tensor::{ElementType, TensorData};

use super::{attr_f32, attr_i64};

/// Gemm computes `Y = alpha * A x B + beta * C` as a multiply/matmul/add
/// chain, skipping the scaling steps when no factor is given.
pub(crate) fn gemm(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let alpha = attr_f32(attrs, "alpha");
    let beta = attr_f32(attrs, "beta");
    let trans_a = attr_i64(attrs, "transA").unwrap_or(0) != 0;
    let trans_b = attr_i64(attrs, "transB").unwrap_or(0) != 0;

    let mut a = inputs.require(0, "Gemm")?.clone();
    let b = inputs.require(1, "Gemm")?.clone();
    let c = inputs.get(2).cloned();
    let dtype = a.ty.dtype().unwrap_or(ElementType::Float32);

    if let Some(alpha) = alpha {
        let factor = ctx.bb.constant(TensorData::scalar(alpha as f64, dtype));
        let ty = a.ty.clone();
        a = ctx.bb.call_op("multiply", &[a, factor], Vec::new(), ty);
    }

    let out_ty = Type::Tensor(TensorType::with_dtype(Some(dtype)));
    let mut y = ctx.bb.call_op(
        "matmul",
        &[a, b],
        vec![
            (
                "transpose_a".to_string(),
                AttributeValue::Int64(trans_a as i64),
            ),
            (
                "transpose_b".to_string(),
                AttributeValue::Int64(trans_b as i64),
            ),
        ],
        out_ty.clone(),
    );

    if let Some(mut c) = c {
        if let Some(beta) = beta {
            let factor = ctx.bb.constant(TensorData::scalar(beta as f64, dtype));
            let ty = c.ty.clone();
            c = ctx.bb.call_op("multiply", &[c, factor], Vec::new(), ty);
        }
        y = ctx.bb.call_op("add", &[y, c], Vec::new(), out_ty);
    }

    Ok(Lowered::Single(y))
}

pub(crate) fn matmul(
    inputs: &ClassicInputs,
    _attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    Ok(ClassicExpr::call(
        "matmul",
        vec![
            inputs.require(0, "MatMul")?.clone(),
            inputs.require(1, "MatMul")?.clone(),
        ],
    ))
}

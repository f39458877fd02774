//! Operator conversion catalogs.
//!
//! Each submodule holds the conversions for one family of operators. The
//! conversions themselves are thin: they validate their parameters and call
//! out to the tensor-operator library, either directly (direct catalog) or
//! by building a classic-dialect expression (classic catalog).

pub(crate) mod constant;
pub(crate) mod elementwise;
pub(crate) mod matmul;
pub(crate) mod nn;
pub(crate) mod reduce;
pub(crate) mod shape_ops;

use std::collections::HashMap;

use crate::error::ImportError;
use crate::from_model::{Inputs, NUM_OUTPUTS_KEY};
use crate::ir::{AttributeValue, Attributes};
use crate::registry::{ClassicFn, DirectFn, NodeType, OpConverter, Registry};
use crate::tensor::TensorData;

/// Build the process-wide conversion table. Called once through
/// `Registry::global`.
pub(crate) fn build_registry() -> Registry {
    use NodeType::*;

    let mut map: HashMap<NodeType, OpConverter> = HashMap::new();

    let mut direct = |tag: NodeType, impls: Vec<(i64, DirectFn)>| {
        map.insert(tag, OpConverter::Direct(impls));
    };
    direct(Add, vec![(13, elementwise::add as DirectFn)]);
    direct(Sub, vec![(13, elementwise::sub as DirectFn)]);
    direct(Mul, vec![(13, elementwise::mul as DirectFn)]);
    direct(Div, vec![(14, elementwise::div as DirectFn)]);
    direct(Pow, vec![(13, elementwise::pow as DirectFn)]);
    direct(Sqrt, vec![(13, elementwise::sqrt as DirectFn)]);
    direct(Erf, vec![(13, elementwise::erf as DirectFn)]);
    direct(Tanh, vec![(13, elementwise::tanh as DirectFn)]);
    direct(Relu, vec![(13, elementwise::relu as DirectFn)]);
    direct(Sigmoid, vec![(13, elementwise::sigmoid as DirectFn)]);
    direct(Not, vec![(13, elementwise::not as DirectFn)]);
    direct(Equal, vec![(13, elementwise::equal as DirectFn)]);
    direct(Where, vec![(16, elementwise::where_op as DirectFn)]);
    direct(Clip, vec![(13, elementwise::clip as DirectFn)]);
    direct(Cast, vec![(13, elementwise::cast as DirectFn)]);
    direct(Gemm, vec![(13, matmul::gemm as DirectFn)]);
    direct(Softmax, vec![(13, nn::softmax as DirectFn)]);
    direct(Gelu, vec![(1, nn::gelu as DirectFn)]);
    direct(BiasGelu, vec![(1, nn::bias_gelu as DirectFn)]);
    direct(Transpose, vec![(13, shape_ops::transpose as DirectFn)]);
    direct(Concat, vec![(13, shape_ops::concat as DirectFn)]);
    direct(Gather, vec![(13, shape_ops::gather as DirectFn)]);
    direct(Shape, vec![(13, shape_ops::shape_of as DirectFn)]);
    direct(CumSum, vec![(13, shape_ops::cumsum as DirectFn)]);
    direct(Squeeze, vec![(13, shape_ops::squeeze as DirectFn)]);
    direct(Unsqueeze, vec![(13, shape_ops::unsqueeze as DirectFn)]);
    direct(Reshape, vec![(13, shape_ops::reshape as DirectFn)]);
    direct(Slice, vec![(13, shape_ops::slice as DirectFn)]);
    direct(Pad, vec![(11, shape_ops::pad as DirectFn)]);
    direct(Tile, vec![(13, shape_ops::tile as DirectFn)]);
    direct(Expand, vec![(13, shape_ops::expand as DirectFn)]);
    direct(
        Split,
        vec![
            (1, shape_ops::split_v1 as DirectFn),
            (13, shape_ops::split_v13 as DirectFn),
        ],
    );
    direct(Constant, vec![(13, constant::constant as DirectFn)]);
    direct(
        ConstantOfShape,
        vec![(9, constant::constant_of_shape as DirectFn)],
    );

    let mut classic = |tag: NodeType, impls: Vec<(i64, ClassicFn)>| {
        map.insert(tag, OpConverter::Classic(impls));
    };
    classic(MatMul, vec![(1, matmul::matmul as ClassicFn)]);
    classic(Conv, vec![(1, nn::conv as ClassicFn)]);
    classic(Flatten, vec![(1, nn::flatten as ClassicFn)]);
    classic(
        MaxPool,
        vec![
            (1, nn::max_pool_v1 as ClassicFn),
            (8, nn::max_pool_v8 as ClassicFn),
        ],
    );
    classic(
        GlobalAveragePool,
        vec![(1, nn::global_average_pool as ClassicFn)],
    );
    classic(BatchNormalization, vec![(1, nn::batch_norm as ClassicFn)]);
    classic(LayerNormalization, vec![(1, nn::layer_norm as ClassicFn)]);
    classic(ReduceMax, vec![(1, reduce::reduce_max as ClassicFn)]);
    classic(ReduceMin, vec![(1, reduce::reduce_min as ClassicFn)]);
    classic(
        ReduceSum,
        vec![
            (1, reduce::reduce_sum as ClassicFn),
            (13, reduce::reduce_sum_v13 as ClassicFn),
        ],
    );
    classic(ReduceMean, vec![(1, reduce::reduce_mean as ClassicFn)]);
    classic(ReduceProd, vec![(1, reduce::reduce_prod as ClassicFn)]);
    classic(ReduceL1, vec![(1, reduce::reduce_l1 as ClassicFn)]);
    classic(ReduceL2, vec![(1, reduce::reduce_l2 as ClassicFn)]);
    classic(ReduceLogSum, vec![(1, reduce::reduce_log_sum as ClassicFn)]);
    classic(
        ReduceLogSumExp,
        vec![(1, reduce::reduce_log_sum_exp as ClassicFn)],
    );
    classic(
        ReduceSumSquare,
        vec![(1, reduce::reduce_sum_square as ClassicFn)],
    );

    Registry::from_map(map)
}

pub(crate) fn attr_f32(attrs: &Attributes, key: &str) -> Option<f32> {
    attrs.get(key).and_then(AttributeValue::as_f32)
}

pub(crate) fn attr_i64(attrs: &Attributes, key: &str) -> Option<i64> {
    attrs.get(key).and_then(AttributeValue::as_i64)
}

pub(crate) fn attr_str<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(AttributeValue::as_str)
}

pub(crate) fn attr_i64s(attrs: &Attributes, key: &str) -> Option<Vec<i64>> {
    attrs
        .get(key)
        .and_then(AttributeValue::as_i64s)
        .map(|v| v.to_vec())
}

pub(crate) fn attr_tensor<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a TensorData> {
    attrs.get(key).and_then(AttributeValue::as_tensor)
}

/// Declared output count of the node being lowered, carried through the
/// private bookkeeping key.
pub(crate) fn num_outputs(attrs: &Attributes) -> usize {
    attr_i64(attrs, NUM_OUTPUTS_KEY).unwrap_or(1) as usize
}

/// Integer-list parameter passed as a node input. Absent is fine; a present
/// but runtime-valued input fails fast, these lowerings need the list at
/// compile time.
pub(crate) fn optional_const_i64s(
    inputs: &Inputs,
    index: usize,
    op: &str,
    what: &str,
) -> Result<Option<Vec<i64>>, ImportError> {
    match inputs.get(index) {
        None => Ok(None),
        Some(var) => {
            let data = var.value.as_ref().ok_or_else(|| {
                ImportError::UnsupportedDynamicParameter {
                    op: op.to_string(),
                    input: what.to_string(),
                }
            })?;
            let values =
                data.to_i64_vec()
                    .ok_or_else(|| ImportError::UnsupportedDynamicParameter {
                        op: op.to_string(),
                        input: what.to_string(),
                    })?;
            Ok(Some(values))
        }
    }
}

/// Like `optional_const_i64s`, but the input must be present.
pub(crate) fn require_const_i64s(
    inputs: &Inputs,
    index: usize,
    op: &str,
    what: &str,
) -> Result<Vec<i64>, ImportError> {
    optional_const_i64s(inputs, index, op, what)?.ok_or_else(|| {
        ImportError::NonVariableInput {
            op: op.to_string(),
            index,
        }
    })
}

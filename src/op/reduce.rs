//! Reduction conversions, all through the classic catalog.

use crate::classic::{ClassicExpr, ClassicInputs};
use crate::error::ImportError;
use crate::ir::{AttributeValue, Attributes, OpAttrs};

use super::{attr_i64, attr_i64s};

fn reduce(
    op: &str,
    tag: &str,
    inputs: &ClassicInputs,
    attrs: &Attributes,
    axes: Option<Vec<i64>>,
) -> Result<ClassicExpr, ImportError> {
    let data = inputs.require(0, tag)?.clone();
    let mut op_attrs: OpAttrs = Vec::new();
    if let Some(axes) = axes {
        op_attrs.push(("axes".to_string(), AttributeValue::Int64s(axes)));
    }
    let keepdims = attr_i64(attrs, "keepdims").unwrap_or(1);
    op_attrs.push(("keepdims".to_string(), AttributeValue::Int64(keepdims)));
    Ok(ClassicExpr::call_with(op, op_attrs, vec![data]))
}

/// Reductions up to opset 13 carry their axes as an attribute.
fn reduce_with_attr_axes(
    op: &str,
    tag: &str,
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce(op, tag, inputs, attrs, attr_i64s(attrs, "axes"))
}

pub(crate) fn reduce_max(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_max", "ReduceMax", inputs, attrs)
}

pub(crate) fn reduce_min(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_min", "ReduceMin", inputs, attrs)
}

pub(crate) fn reduce_sum(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_sum", "ReduceSum", inputs, attrs)
}

/// From opset 13 ReduceSum takes its axes as a second input, which must be
/// a compile-time constant.
pub(crate) fn reduce_sum_v13(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    let axes = match inputs.get(1) {
        None => None,
        Some(expr) => {
            let data = expr.constant_value().ok_or_else(|| {
                ImportError::UnsupportedDynamicParameter {
                    op: "ReduceSum".to_string(),
                    input: "axes".to_string(),
                }
            })?;
            Some(data.to_i64_vec().ok_or_else(|| {
                ImportError::UnsupportedDynamicParameter {
                    op: "ReduceSum".to_string(),
                    input: "axes".to_string(),
                }
            })?)
        }
    };
    reduce("reduce_sum", "ReduceSum", inputs, attrs, axes)
}

pub(crate) fn reduce_mean(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_mean", "ReduceMean", inputs, attrs)
}

pub(crate) fn reduce_prod(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_prod", "ReduceProd", inputs, attrs)
}

pub(crate) fn reduce_l1(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_l1", "ReduceL1", inputs, attrs)
}

pub(crate) fn reduce_l2(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_l2", "ReduceL2", inputs, attrs)
}

pub(crate) fn reduce_log_sum(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_log_sum", "ReduceLogSum", inputs, attrs)
}

pub(crate) fn reduce_log_sum_exp(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_log_sum_exp", "ReduceLogSumExp", inputs, attrs)
}

pub(crate) fn reduce_sum_square(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    reduce_with_attr_axes("reduce_sum_square", "ReduceSumSquare", inputs, attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classic::ClassicVar;
    use crate::ir::TensorType;
    use crate::tensor::{Data, ElementType, TensorData};

    fn data_input() -> ClassicExpr {
        ClassicExpr::Var(ClassicVar {
            name: "x".to_string(),
            ty: TensorType::with_dtype(Some(ElementType::Float32)),
        })
    }

    #[test]
    fn axes_attribute_is_forwarded() {
        let inputs = ClassicInputs::new(vec![Some(data_input())]);
        let mut attrs = Attributes::new();
        attrs.insert("axes".to_string(), AttributeValue::Int64s(vec![0, 2]));
        attrs.insert("keepdims".to_string(), AttributeValue::Int64(0));
        match reduce_mean(&inputs, &attrs).unwrap() {
            ClassicExpr::Call { op, attrs, .. } => {
                assert_eq!(op, "reduce_mean");
                assert!(attrs
                    .iter()
                    .any(|(k, v)| k == "axes" && *v == AttributeValue::Int64s(vec![0, 2])));
                assert!(attrs
                    .iter()
                    .any(|(k, v)| k == "keepdims" && *v == AttributeValue::Int64(0)));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn reduce_sum_v13_reads_constant_axes_input() {
        let axes = ClassicExpr::Const(TensorData::new(vec![1], Data::Int64(vec![1])));
        let inputs = ClassicInputs::new(vec![Some(data_input()), Some(axes)]);
        match reduce_sum_v13(&inputs, &Attributes::new()).unwrap() {
            ClassicExpr::Call { attrs, .. } => {
                assert!(attrs
                    .iter()
                    .any(|(k, v)| k == "axes" && *v == AttributeValue::Int64s(vec![1])));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn reduce_sum_v13_rejects_runtime_axes() {
        let axes = data_input();
        let inputs = ClassicInputs::new(vec![Some(data_input()), Some(axes)]);
        assert!(matches!(
            reduce_sum_v13(&inputs, &Attributes::new()),
            Err(ImportError::UnsupportedDynamicParameter { .. })
        ));
    }
}

//! Shape- and layout-manipulating conversions.
//!
//! Most of these need auxiliary parameters (axes, sizes, pad widths) at
//! compile time. A runtime value there fails fast instead of guessing.

use crate::error::ImportError;
use crate::from_model::{GraphBuilder, Inputs, Lowered};
use crate::ir::{AttributeValue, Attributes, Dim, OpAttrs, TensorType, Type};
use crate::tensor::ElementType;

use super::{attr_i64, attr_i64s, attr_str, num_outputs, optional_const_i64s, require_const_i64s};

/// Dims-erased copy of the input type: rank may change, dtype survives.
fn erased(ty: &Type) -> Type {
    Type::Tensor(TensorType::with_dtype(ty.dtype()))
}

pub(crate) fn transpose(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, "Transpose")?.clone();
    let mut op_attrs: OpAttrs = Vec::new();
    if let Some(perm) = attr_i64s(attrs, "perm") {
        op_attrs.push(("axes".to_string(), AttributeValue::Int64s(perm)));
    }
    let ty = erased(&x.ty);
    Ok(Lowered::Single(
        ctx.bb.call_op("transpose", &[x], op_attrs, ty),
    ))
}

pub(crate) fn concat(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let args: Vec<_> = inputs.present().cloned().collect();
    if args.is_empty() {
        return Err(ImportError::NonVariableInput {
            op: "Concat".to_string(),
            index: 0,
        });
    }
    let axis = attr_i64(attrs, "axis").unwrap_or(0);
    let ty = erased(&args[0].ty);
    Ok(Lowered::Single(ctx.bb.call_op(
        "concatenate",
        &args,
        vec![("axis".to_string(), AttributeValue::Int64(axis))],
        ty,
    )))
}

pub(crate) fn gather(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let data = inputs.require(0, "Gather")?.clone();
    let indices = inputs.require(1, "Gather")?.clone();
    let axis = attr_i64(attrs, "axis").unwrap_or(0);
    let ty = erased(&data.ty);
    Ok(Lowered::Single(ctx.bb.call_op(
        "take",
        &[data, indices],
        vec![("axis".to_string(), AttributeValue::Int64(axis))],
        ty,
    )))
}

pub(crate) fn shape_of(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, "Shape")?.clone();
    let rank = x
        .ty
        .as_tensor()
        .and_then(|t| t.dims.as_ref().map(|d| d.len() as i64));
    let ty = Type::tensor(
        rank.map(|r| vec![Dim::Static(r)]),
        Some(ElementType::Int64),
    );
    Ok(Lowered::Single(
        ctx.bb.call_op("shape_of", &[x], Vec::new(), ty),
    ))
}

pub(crate) fn cumsum(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let mut data = inputs.require(0, "CumSum")?.clone();
    let axis = match inputs.get(1) {
        None => None,
        Some(var) => Some(
            var.value
                .as_ref()
                .and_then(|v| v.scalar_i64())
                .ok_or_else(|| ImportError::UnsupportedDynamicParameter {
                    op: "CumSum".to_string(),
                    input: "axis".to_string(),
                })?,
        ),
    };
    let reverse = attr_i64(attrs, "reverse").unwrap_or(0) != 0;
    let flip_axis = axis.unwrap_or(0);

    if reverse {
        let ty = data.ty.clone();
        data = ctx.bb.call_op(
            "flip",
            &[data],
            vec![("axis".to_string(), AttributeValue::Int64(flip_axis))],
            ty,
        );
    }

    let mut op_attrs: OpAttrs = Vec::new();
    if let Some(axis) = axis {
        op_attrs.push(("axis".to_string(), AttributeValue::Int64(axis)));
    }
    if let Some(exclusive) = attr_i64(attrs, "exclusive") {
        op_attrs.push(("exclusive".to_string(), AttributeValue::Int64(exclusive)));
    }
    let ty = data.ty.clone();
    let mut result = ctx.bb.call_op("cumsum", &[data], op_attrs, ty);

    if reverse {
        let ty = result.ty.clone();
        result = ctx.bb.call_op(
            "flip",
            &[result],
            vec![("axis".to_string(), AttributeValue::Int64(flip_axis))],
            ty,
        );
    }
    Ok(Lowered::Single(result))
}

pub(crate) fn squeeze(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, "Squeeze")?.clone();
    let mut op_attrs: OpAttrs = Vec::new();
    if let Some(axes) = optional_const_i64s(inputs, 1, "Squeeze", "axes")? {
        op_attrs.push(("axes".to_string(), AttributeValue::Int64s(axes)));
    }
    let ty = erased(&x.ty);
    Ok(Lowered::Single(ctx.bb.call_op("squeeze", &[x], op_attrs, ty)))
}

/// Unsqueeze expands one axis at a time, smallest axis first.
pub(crate) fn unsqueeze(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let mut data = inputs.require(0, "Unsqueeze")?.clone();
    let mut axes = require_const_i64s(inputs, 1, "Unsqueeze", "axes")?;
    axes.sort_unstable();
    for axis in axes {
        let ty = erased(&data.ty);
        data = ctx.bb.call_op(
            "expand_dims",
            &[data],
            vec![
                ("axis".to_string(), AttributeValue::Int64(axis)),
                ("num_newaxis".to_string(), AttributeValue::Int64(1)),
            ],
            ty,
        );
    }
    Ok(Lowered::Single(data))
}

pub(crate) fn reshape(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let data = inputs.require(0, "Reshape")?.clone();
    let mut new_shape = require_const_i64s(inputs, 1, "Reshape", "shape")?;

    // A -1 extent is inferred from the remaining element count, which needs
    // the data shape to be fully static.
    if new_shape.contains(&-1) {
        let data_shape = data
            .ty
            .as_tensor()
            .and_then(TensorType::static_shape)
            .ok_or_else(|| ImportError::UnsupportedDynamicParameter {
                op: "Reshape".to_string(),
                input: "shape".to_string(),
            })?;
        let total: i64 = data_shape.iter().product();
        let known: i64 = new_shape.iter().filter(|d| **d > 0).product();
        for dim in new_shape.iter_mut() {
            if *dim == -1 {
                *dim = total / known;
            }
        }
    }

    let ty = Type::tensor(
        Some(new_shape.iter().map(|d| Dim::Static(*d)).collect()),
        data.ty.dtype(),
    );
    Ok(Lowered::Single(ctx.bb.call_op(
        "reshape",
        &[data],
        vec![("shape".to_string(), AttributeValue::Int64s(new_shape))],
        ty,
    )))
}

pub(crate) fn slice(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let data = inputs.require(0, "Slice")?.clone();
    let starts = require_const_i64s(inputs, 1, "Slice", "starts")?;
    let ends = require_const_i64s(inputs, 2, "Slice", "ends")?;
    let axes = optional_const_i64s(inputs, 3, "Slice", "axes")?.unwrap_or_else(|| vec![0]);
    let steps =
        optional_const_i64s(inputs, 4, "Slice", "steps")?.unwrap_or_else(|| vec![1; axes.len()]);

    let ty = erased(&data.ty);
    Ok(Lowered::Single(ctx.bb.call_op(
        "strided_slice",
        &[data],
        vec![
            ("begin".to_string(), AttributeValue::Int64s(starts)),
            ("end".to_string(), AttributeValue::Int64s(ends)),
            ("strides".to_string(), AttributeValue::Int64s(steps)),
            ("axes".to_string(), AttributeValue::Int64s(axes)),
        ],
        ty,
    )))
}

pub(crate) fn pad(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let data = inputs.require(0, "Pad")?.clone();
    let pads = require_const_i64s(inputs, 1, "Pad", "pads")?;
    let constant_value = match inputs.get(2) {
        None => 0.0,
        Some(var) => var
            .value
            .as_ref()
            .and_then(|v| v.scalar_f64())
            .ok_or_else(|| ImportError::UnsupportedDynamicParameter {
                op: "Pad".to_string(),
                input: "constant_value".to_string(),
            })?,
    };

    let half = pads.len() / 2;
    let pad_before = pads[..half].to_vec();
    let pad_after = pads[half..].to_vec();

    let mode = attr_str(attrs, "mode").unwrap_or("constant");
    let ty = erased(&data.ty);
    let result = match mode {
        "constant" => ctx.bb.call_op(
            "pad",
            &[data],
            vec![
                ("pad_before".to_string(), AttributeValue::Int64s(pad_before)),
                ("pad_after".to_string(), AttributeValue::Int64s(pad_after)),
                (
                    "pad_value".to_string(),
                    AttributeValue::Float32(constant_value as f32),
                ),
            ],
            ty,
        ),
        "reflect" => ctx.bb.call_op(
            "mirror_pad",
            &[data],
            vec![
                ("pad_before".to_string(), AttributeValue::Int64s(pad_before)),
                ("pad_after".to_string(), AttributeValue::Int64s(pad_after)),
                (
                    "mode".to_string(),
                    AttributeValue::String("REFLECT".to_string()),
                ),
            ],
            ty,
        ),
        "edge" => {
            return Err(ImportError::UnsupportedFeature(
                "Pad mode edge".to_string(),
            ));
        }
        other => {
            return Err(ImportError::MalformedAttribute {
                name: "mode".to_string(),
                reason: format!("value {other} is invalid for operator Pad"),
            });
        }
    };
    Ok(Lowered::Single(result))
}

pub(crate) fn tile(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let data = inputs.require(0, "Tile")?.clone();
    let reps = require_const_i64s(inputs, 1, "Tile", "repeats")?;
    let ty = erased(&data.ty);
    Ok(Lowered::Single(ctx.bb.call_op(
        "tile",
        &[data],
        vec![("reps".to_string(), AttributeValue::Int64s(reps))],
        ty,
    )))
}

pub(crate) fn expand(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let data = inputs.require(0, "Expand")?.clone();
    let shape = require_const_i64s(inputs, 1, "Expand", "shape")?;
    let ty = Type::tensor(
        Some(shape.iter().map(|d| Dim::Static(*d)).collect()),
        data.ty.dtype(),
    );
    Ok(Lowered::Single(ctx.bb.call_op(
        "broadcast_to",
        &[data],
        vec![("shape".to_string(), AttributeValue::Int64s(shape))],
        ty,
    )))
}

fn split_sizes_to_indices(sizes: &[i64]) -> Vec<i64> {
    let mut indices = Vec::with_capacity(sizes.len().saturating_sub(1));
    let mut index = 0;
    for size in &sizes[..sizes.len() - 1] {
        index += size;
        indices.push(index);
    }
    indices
}

fn emit_split(
    ctx: &mut GraphBuilder<'_>,
    data: crate::ir::Var,
    sections: usize,
    indices: Option<Vec<i64>>,
    axis: i64,
) -> Lowered {
    let mut op_attrs: OpAttrs = vec![("axis".to_string(), AttributeValue::Int64(axis))];
    match indices {
        Some(indices) => {
            op_attrs.push(("indices".to_string(), AttributeValue::Int64s(indices)));
        }
        None => {
            op_attrs.push((
                "sections".to_string(),
                AttributeValue::Int64(sections as i64),
            ));
        }
    }
    let piece = erased(&data.ty);
    let ty = Type::Tuple(vec![piece; sections]);
    Lowered::Single(ctx.bb.call_op("split", &[data], op_attrs, ty))
}

/// Split with sizes in the `split` attribute; with no sizes the output
/// count divides the axis evenly.
pub(crate) fn split_v1(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let data = inputs.require(0, "Split")?.clone();
    let axis = attr_i64(attrs, "axis").unwrap_or(0);
    match attr_i64s(attrs, "split") {
        Some(sizes) if sizes.len() > 1 => {
            let indices = split_sizes_to_indices(&sizes);
            Ok(emit_split(ctx, data, sizes.len(), Some(indices), axis))
        }
        _ => {
            let sections = num_outputs(attrs);
            Ok(emit_split(ctx, data, sections, None, axis))
        }
    }
}

/// From opset 13 the sizes arrive as a second input, which must be constant.
pub(crate) fn split_v13(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let data = inputs.require(0, "Split")?.clone();
    let axis = attr_i64(attrs, "axis").unwrap_or(0);
    match optional_const_i64s(inputs, 1, "Split", "split")? {
        Some(sizes) if !sizes.is_empty() => {
            let indices = split_sizes_to_indices(&sizes);
            Ok(emit_split(ctx, data, sizes.len(), Some(indices), axis))
        }
        _ => {
            let sections = num_outputs(attrs);
            Ok(emit_split(ctx, data, sections, None, axis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::Target;
    use crate::ir::Expr;
    use crate::tensor::{Data, TensorData};

    fn float_var(ctx: &mut GraphBuilder<'_>, name: &str, dims: Vec<i64>) -> crate::ir::Var {
        ctx.bb.named_var(
            name,
            Type::tensor(
                Some(dims.into_iter().map(Dim::Static).collect()),
                Some(ElementType::Float32),
            ),
        )
    }

    #[test]
    fn reshape_resolves_negative_one_against_static_shape() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let data = float_var(&mut ctx, "x", vec![2, 6]);
        let shape = ctx
            .bb
            .constant(TensorData::new(vec![2], Data::Int64(vec![4, -1])));
        let inputs = Inputs::new(vec![Some(data), Some(shape)]);
        let lowered = reshape(&mut ctx, &inputs, &Attributes::new()).unwrap();
        match lowered {
            Lowered::Single(var) => {
                assert_eq!(
                    var.ty.as_tensor().unwrap().static_shape(),
                    Some(vec![4, 3])
                );
            }
            other => panic!("expected single result, got {other:?}"),
        }
    }

    #[test]
    fn reshape_with_runtime_shape_fails_fast() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let data = float_var(&mut ctx, "x", vec![2, 6]);
        let shape = ctx.bb.named_var(
            "s",
            Type::tensor(Some(vec![Dim::Static(2)]), Some(ElementType::Int64)),
        );
        let inputs = Inputs::new(vec![Some(data), Some(shape)]);
        assert!(matches!(
            reshape(&mut ctx, &inputs, &Attributes::new()),
            Err(ImportError::UnsupportedDynamicParameter { .. })
        ));
    }

    #[test]
    fn unsqueeze_expands_axes_in_ascending_order() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let data = float_var(&mut ctx, "x", vec![4]);
        let axes = ctx
            .bb
            .constant(TensorData::new(vec![2], Data::Int64(vec![2, 0])));
        let inputs = Inputs::new(vec![Some(data), Some(axes)]);
        unsqueeze(&mut ctx, &inputs, &Attributes::new()).unwrap();
        let emitted_axes: Vec<i64> = ctx
            .bb
            .bindings()
            .iter()
            .filter_map(|b| match &b.expr {
                Expr::Call { op, attrs, .. } if op == "expand_dims" => attrs
                    .iter()
                    .find(|(k, _)| k == "axis")
                    .and_then(|(_, v)| v.as_i64()),
                _ => None,
            })
            .collect();
        assert_eq!(emitted_axes, vec![0, 2]);
    }

    #[test]
    fn explicit_split_sizes_become_indices() {
        assert_eq!(split_sizes_to_indices(&[2, 3, 1]), vec![2, 5]);
    }

    #[test]
    fn split_result_is_an_aggregate_of_declared_arity() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let data = float_var(&mut ctx, "x", vec![6]);
        let inputs = Inputs::new(vec![Some(data)]);
        let mut attrs = Attributes::new();
        attrs.insert("split".to_string(), AttributeValue::Int64s(vec![2, 4]));
        let lowered = split_v1(&mut ctx, &inputs, &attrs).unwrap();
        match lowered {
            Lowered::Single(var) => assert_eq!(var.ty.tuple_arity(), Some(2)),
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn pad_rejects_unknown_modes() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let data = float_var(&mut ctx, "x", vec![4]);
        let pads = ctx
            .bb
            .constant(TensorData::new(vec![2], Data::Int64(vec![1, 1])));
        let inputs = Inputs::new(vec![Some(data), Some(pads)]);
        let mut attrs = Attributes::new();
        attrs.insert(
            "mode".to_string(),
            AttributeValue::String("wrap".to_string()),
        );
        assert!(matches!(
            pad(&mut ctx, &inputs, &attrs),
            Err(ImportError::MalformedAttribute { .. })
        ));

        attrs.insert(
            "mode".to_string(),
            AttributeValue::String("edge".to_string()),
        );
        assert!(matches!(
            pad(&mut ctx, &inputs, &attrs),
            Err(ImportError::UnsupportedFeature(_))
        ));
    }
}

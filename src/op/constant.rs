//! Constant-producing conversions.

use crate::error::ImportError;
use crate::from_model::{GraphBuilder, Inputs, Lowered};
use crate::ir::{AttributeValue, Attributes, Dim, Type};
use crate::tensor::{Data, ElementType, TensorData};

use super::{attr_tensor, require_const_i64s};

/// A value can be stored in any of these attribute keys.
const VALUE_KEYS: [&str; 5] = [
    "value",
    "value_float",
    "value_floats",
    "value_int",
    "value_ints",
];

pub(crate) fn constant(
    ctx: &mut GraphBuilder<'_>,
    _inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let value = VALUE_KEYS
        .iter()
        .find_map(|&key| attrs.get(key))
        .ok_or_else(|| ImportError::MalformedAttribute {
            name: "value".to_string(),
            reason: "Constant node carries no value".to_string(),
        })?;

    let data = match value {
        AttributeValue::Tensor(tensor) => tensor.clone(),
        AttributeValue::Float32(v) => TensorData::scalar(*v as f64, ElementType::Float32),
        AttributeValue::Int64(v) => TensorData::scalar(*v as f64, ElementType::Int64),
        AttributeValue::Float32s(v) => {
            TensorData::new(vec![v.len() as i64], Data::Float32(v.clone()))
        }
        AttributeValue::Int64s(v) => TensorData::new(vec![v.len() as i64], Data::Int64(v.clone())),
        // String constants occasionally appear in models exported from
        // other frameworks and are never actually consumed; a zero-valued
        // constant keeps the graph importable.
        AttributeValue::String(_) | AttributeValue::Strings(_) => {
            TensorData::scalar(0.0, ElementType::Int64)
        }
        other => {
            return Err(ImportError::MalformedAttribute {
                name: "value".to_string(),
                reason: format!("unsupported constant payload {other:?}"),
            });
        }
    };

    Ok(Lowered::Single(ctx.bb.constant(data)))
}

/// ConstantOfShape broadcasts a fill value to a compile-time-known shape.
pub(crate) fn constant_of_shape(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let shape = require_const_i64s(inputs, 0, "ConstantOfShape", "shape")?;
    let fill = attr_tensor(attrs, "value")
        .cloned()
        .unwrap_or_else(|| TensorData::scalar(0.0, ElementType::Float32));
    let dtype = fill.elem_type();

    let fill_var = ctx.bb.constant(fill);
    let ty = Type::tensor(
        Some(shape.iter().map(|d| Dim::Static(*d)).collect()),
        Some(dtype),
    );
    Ok(Lowered::Single(ctx.bb.call_op(
        "broadcast_to",
        &[fill_var],
        vec![("shape".to_string(), AttributeValue::Int64s(shape))],
        ty,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::Target;

    #[test]
    fn tensor_valued_constant_binds_its_payload() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let mut attrs = Attributes::new();
        let data = TensorData::new(vec![3], Data::Int64(vec![1, 2, 3]));
        attrs.insert("value".to_string(), AttributeValue::Tensor(data.clone()));
        let lowered = constant(&mut ctx, &Inputs::new(vec![]), &attrs).unwrap();
        match lowered {
            Lowered::Single(var) => assert_eq!(var.value, Some(data)),
            other => panic!("expected constant var, got {other:?}"),
        }
    }

    #[test]
    fn missing_value_is_malformed() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        assert!(matches!(
            constant(&mut ctx, &Inputs::new(vec![]), &Attributes::new()),
            Err(ImportError::MalformedAttribute { .. })
        ));
    }

    #[test]
    fn constant_of_shape_requires_a_static_shape() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let dynamic = ctx.bb.named_var("shape", Type::unknown_tensor());
        let inputs = Inputs::new(vec![Some(dynamic)]);
        assert!(matches!(
            constant_of_shape(&mut ctx, &inputs, &Attributes::new()),
            Err(ImportError::UnsupportedDynamicParameter { .. })
        ));
    }

    #[test]
    fn constant_of_shape_broadcasts_the_fill_value() {
        let target = Target::default();
        let mut ctx = GraphBuilder::new(13, &target);
        let shape = ctx
            .bb
            .constant(TensorData::new(vec![2], Data::Int64(vec![2, 3])));
        let inputs = Inputs::new(vec![Some(shape)]);
        let lowered = constant_of_shape(&mut ctx, &inputs, &Attributes::new()).unwrap();
        match lowered {
            Lowered::Single(var) => {
                let tensor = var.ty.as_tensor().unwrap();
                assert_eq!(
                    tensor.dims,
                    Some(vec![Dim::Static(2), Dim::Static(3)])
                );
                assert_eq!(tensor.dtype, Some(ElementType::Float32));
            }
            other => panic!("expected single result, got {other:?}"),
        }
    }
}

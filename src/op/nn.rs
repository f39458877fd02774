//! Neural-network layer conversions. Softmax and the Gelu family live in
//! the direct catalog; convolution, pooling and normalization reuse the
//! classic catalog through the bridge.

use crate::classic::{ClassicExpr, ClassicInputs};
use crate::error::ImportError;
use crate::from_model::{GraphBuilder, Inputs, Lowered};
use crate::ir::{AttributeValue, Attributes, OpAttrs};
use crate::tensor::{ElementType, TensorData};

use super::{attr_f32, attr_i64, attr_i64s, attr_str, num_outputs};

pub(crate) fn softmax(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, "Softmax")?.clone();
    let axis = attr_i64(attrs, "axis").unwrap_or(-1);
    let ty = x.ty.clone();
    Ok(Lowered::Single(ctx.bb.call_op(
        "softmax",
        &[x],
        vec![("axis".to_string(), AttributeValue::Int64(axis))],
        ty,
    )))
}

/// gelu(x) = 0.5 * x * (1 + erf(x / sqrt(2)))
pub(crate) fn gelu(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    _attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, "Gelu")?.clone();
    let dtype = x.ty.dtype().unwrap_or(ElementType::Float32);

    let half = ctx.bb.constant(TensorData::scalar(0.5, dtype));
    let one = ctx.bb.constant(TensorData::scalar(1.0, dtype));
    let sqrt2 = ctx
        .bb
        .constant(TensorData::scalar(std::f64::consts::SQRT_2, dtype));

    let ty = x.ty.clone();
    let term1 = ctx
        .bb
        .call_op("multiply", &[half, x.clone()], Vec::new(), ty.clone());
    let scaled = ctx
        .bb
        .call_op("divide", &[x, sqrt2], Vec::new(), ty.clone());
    let erf = ctx.bb.call_op("erf", &[scaled], Vec::new(), ty.clone());
    let term2 = ctx.bb.call_op("add", &[one, erf], Vec::new(), ty.clone());
    Ok(Lowered::Single(ctx.bb.call_op(
        "multiply",
        &[term1, term2],
        Vec::new(),
        ty,
    )))
}

/// bias_gelu(x, b) = gelu(x + b) with a 1-D bias term.
pub(crate) fn bias_gelu(
    ctx: &mut GraphBuilder<'_>,
    inputs: &Inputs,
    attrs: &Attributes,
) -> Result<Lowered, ImportError> {
    let x = inputs.require(0, "BiasGelu")?.clone();
    let b = inputs.require(1, "BiasGelu")?.clone();

    let bias_rank = b.ty.as_tensor().and_then(|t| t.dims.as_ref().map(Vec::len));
    if bias_rank != Some(1) {
        return Err(ImportError::UnsupportedFeature(
            "BiasGelu bias term must be a 1D tensor".to_string(),
        ));
    }

    let ty = x.ty.clone();
    let sum = ctx.bb.call_op("add", &[x, b], Vec::new(), ty);
    gelu(ctx, &Inputs::new(vec![Some(sum)]), attrs)
}

pub(crate) fn conv(inputs: &ClassicInputs, attrs: &Attributes) -> Result<ClassicExpr, ImportError> {
    if let Some(auto_pad) = attr_str(attrs, "auto_pad") {
        if auto_pad != "NOTSET" {
            return Err(ImportError::UnsupportedFeature(format!(
                "Conv auto_pad mode {auto_pad}"
            )));
        }
    }

    let data = inputs.require(0, "Conv")?.clone();
    let weight = inputs.require(1, "Conv")?.clone();

    let mut op_attrs: OpAttrs = Vec::new();
    if let Some(strides) = attr_i64s(attrs, "strides") {
        op_attrs.push(("strides".to_string(), AttributeValue::Int64s(strides)));
    }
    if let Some(pads) = attr_i64s(attrs, "pads") {
        op_attrs.push(("padding".to_string(), AttributeValue::Int64s(pads)));
    }
    if let Some(dilations) = attr_i64s(attrs, "dilations") {
        op_attrs.push(("dilation".to_string(), AttributeValue::Int64s(dilations)));
    }
    if let Some(group) = attr_i64(attrs, "group") {
        op_attrs.push(("groups".to_string(), AttributeValue::Int64(group)));
    }

    let conv = ClassicExpr::call_with("conv2d", op_attrs, vec![data, weight]);
    match inputs.get(2) {
        Some(bias) => Ok(ClassicExpr::call("bias_add", vec![conv, bias.clone()])),
        None => Ok(conv),
    }
}

pub(crate) fn flatten(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    let data = inputs.require(0, "Flatten")?.clone();
    let axis = attr_i64(attrs, "axis").unwrap_or(1);
    Ok(ClassicExpr::call_with(
        "flatten",
        vec![("axis".to_string(), AttributeValue::Int64(axis))],
        vec![data],
    ))
}

fn max_pool(
    inputs: &ClassicInputs,
    attrs: &Attributes,
    ceil_mode: bool,
) -> Result<ClassicExpr, ImportError> {
    let data = inputs.require(0, "MaxPool")?.clone();
    let kernel = attr_i64s(attrs, "kernel_shape").ok_or_else(|| {
        ImportError::MalformedAttribute {
            name: "kernel_shape".to_string(),
            reason: "MaxPool requires a kernel shape".to_string(),
        }
    })?;

    let mut op_attrs: OpAttrs = vec![(
        "pool_size".to_string(),
        AttributeValue::Int64s(kernel),
    )];
    if let Some(strides) = attr_i64s(attrs, "strides") {
        op_attrs.push(("strides".to_string(), AttributeValue::Int64s(strides)));
    }
    if let Some(pads) = attr_i64s(attrs, "pads") {
        op_attrs.push(("padding".to_string(), AttributeValue::Int64s(pads)));
    }
    if ceil_mode && attr_i64(attrs, "ceil_mode").unwrap_or(0) != 0 {
        op_attrs.push(("ceil_mode".to_string(), AttributeValue::Int64(1)));
    }
    Ok(ClassicExpr::call_with("max_pool2d", op_attrs, vec![data]))
}

pub(crate) fn max_pool_v1(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    max_pool(inputs, attrs, false)
}

pub(crate) fn max_pool_v8(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    max_pool(inputs, attrs, true)
}

pub(crate) fn global_average_pool(
    inputs: &ClassicInputs,
    _attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    let data = inputs.require(0, "GlobalAveragePool")?.clone();
    Ok(ClassicExpr::call("global_avg_pool2d", vec![data]))
}

/// BatchNormalization yields the normalized tensor plus running statistics.
/// Nodes usually declare only the first output; the full triple is exposed
/// when the node asks for it.
pub(crate) fn batch_norm(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    let data = inputs.require(0, "BatchNormalization")?.clone();
    let scale = inputs.require(1, "BatchNormalization")?.clone();
    let bias = inputs.require(2, "BatchNormalization")?.clone();
    let mean = inputs.require(3, "BatchNormalization")?.clone();
    let var = inputs.require(4, "BatchNormalization")?.clone();

    let epsilon = attr_f32(attrs, "epsilon").unwrap_or(1e-5);
    let call = ClassicExpr::call_with(
        "batch_norm",
        vec![("epsilon".to_string(), AttributeValue::Float32(epsilon))],
        vec![data, scale, bias, mean, var],
    );

    if num_outputs(attrs) > 1 {
        Ok(ClassicExpr::Tuple(vec![
            ClassicExpr::TupleGetItem(Box::new(call.clone()), 0),
            ClassicExpr::TupleGetItem(Box::new(call.clone()), 1),
            ClassicExpr::TupleGetItem(Box::new(call), 2),
        ]))
    } else {
        Ok(ClassicExpr::TupleGetItem(Box::new(call), 0))
    }
}

pub(crate) fn layer_norm(
    inputs: &ClassicInputs,
    attrs: &Attributes,
) -> Result<ClassicExpr, ImportError> {
    let data = inputs.require(0, "LayerNormalization")?.clone();
    let scale = inputs.require(1, "LayerNormalization")?.clone();

    let axis = attr_i64(attrs, "axis").unwrap_or(-1);
    let epsilon = attr_f32(attrs, "epsilon").unwrap_or(1e-5);
    let op_attrs: OpAttrs = vec![
        ("axis".to_string(), AttributeValue::Int64(axis)),
        ("epsilon".to_string(), AttributeValue::Float32(epsilon)),
    ];

    let mut args = vec![data, scale];
    if let Some(bias) = inputs.get(2) {
        args.push(bias.clone());
    }
    Ok(ClassicExpr::call_with("layer_norm", op_attrs, args))
}

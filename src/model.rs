//! In-memory records of the exchange format.
//!
//! These are the already-deserialized model structures handed to the
//! importer. Decoding the wire encoding into these records is the loader's
//! job, not this crate's. Everything here is read-only to the import pass.

use crate::tensor::TensorData;

/// A serialized model: one graph plus its operator-set imports.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub graph: Graph,
    pub opset_imports: Vec<OpsetImport>,
}

/// One operator-set import declaration.
#[derive(Debug, Clone)]
pub struct OpsetImport {
    /// Operator namespace; the default namespace is the empty string.
    pub domain: String,
    pub version: i64,
}

/// A computation graph: nodes in producer-before-consumer order, declared
/// inputs and outputs, and bundled constant tensors (trained parameters).
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<NodeRecord>,
    pub inputs: Vec<ValueDescriptor>,
    pub outputs: Vec<ValueDescriptor>,
    pub initializers: Vec<(String, TensorData)>,
}

/// One operator application.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub op_type: String,
    pub name: String,
    /// Input references; an empty string marks a declared-absent input.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: Vec<AttributeRecord>,
}

/// A raw attribute record. Exactly one variant field may be populated; the
/// decoder rejects anything else.
#[derive(Debug, Clone, Default)]
pub struct AttributeRecord {
    pub name: String,
    pub f: Option<f32>,
    pub i: Option<i64>,
    pub s: Option<String>,
    pub t: Option<TensorData>,
    pub g: Option<Box<Graph>>,
    pub floats: Vec<f32>,
    pub ints: Vec<i64>,
    pub strings: Vec<String>,
    pub tensors: Vec<TensorData>,
    pub graphs: Vec<Graph>,
}

/// Declared name, shape and element type of a graph input or output.
#[derive(Debug, Clone)]
pub struct ValueDescriptor {
    pub name: String,
    pub dims: Vec<DimRecord>,
    /// Wire type code; `None` when the model leaves the type undeclared.
    pub elem_type: Option<i32>,
}

/// One declared dimension: a concrete extent or a named placeholder.
#[derive(Debug, Clone)]
pub enum DimRecord {
    /// Concrete extent. Zero is treated as unknown, as some exporters emit
    /// it for dynamic dimensions.
    Value(i64),
    /// Symbolic placeholder with its declared name (possibly empty).
    Param(String),
}

impl AttributeRecord {
    /// Scalar integer attribute, the most common kind in practice.
    pub fn int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            i: Some(value),
            ..Default::default()
        }
    }

    /// Integer-list attribute.
    pub fn ints(name: &str, values: Vec<i64>) -> Self {
        Self {
            name: name.to_string(),
            ints: values,
            ..Default::default()
        }
    }

    /// Scalar float attribute.
    pub fn float(name: &str, value: f32) -> Self {
        Self {
            name: name.to_string(),
            f: Some(value),
            ..Default::default()
        }
    }

    /// String attribute.
    pub fn string(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            s: Some(value.to_string()),
            ..Default::default()
        }
    }

    /// Tensor attribute.
    pub fn tensor(name: &str, value: TensorData) -> Self {
        Self {
            name: name.to_string(),
            t: Some(value),
            ..Default::default()
        }
    }
}

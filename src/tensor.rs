//! Tensor payloads attached to initializers, constants and attributes.

use core::fmt;
use std::fmt::Formatter;

use half::f16;

/// Canonical element types, mapped from the exchange format's wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Float16,
    Float32,
    Float64,
    Int32,
    Int64,
    Bool,
    String,
}

impl ElementType {
    /// Map the format's integer type code to a canonical element type.
    pub fn from_wire(code: i32) -> Option<ElementType> {
        match code {
            1 => Some(ElementType::Float32),
            6 => Some(ElementType::Int32),
            7 => Some(ElementType::Int64),
            8 => Some(ElementType::String),
            9 => Some(ElementType::Bool),
            10 => Some(ElementType::Float16),
            11 => Some(ElementType::Float64),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Float16 => "float16",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::Bool => "bool",
            ElementType::String => "string",
        };
        write!(f, "{name}")
    }
}

/// Typed element storage of a tensor.
#[derive(Clone, PartialEq)]
pub enum Data {
    Float16(Vec<f16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

/// A literal tensor: a shape plus typed element storage.
#[derive(Clone, PartialEq)]
pub struct TensorData {
    pub shape: Vec<i64>,
    pub data: Data,
}

impl TensorData {
    pub fn new(shape: Vec<i64>, data: Data) -> Self {
        Self { shape, data }
    }

    /// Rank-0 tensor holding a single value of the given element type.
    pub fn scalar(value: f64, elem_type: ElementType) -> Self {
        let data = match elem_type {
            ElementType::Float16 => Data::Float16(vec![f16::from_f64(value)]),
            ElementType::Float32 => Data::Float32(vec![value as f32]),
            ElementType::Float64 => Data::Float64(vec![value]),
            ElementType::Int32 => Data::Int32(vec![value as i32]),
            ElementType::Int64 => Data::Int64(vec![value as i64]),
            ElementType::Bool => Data::Bool(vec![value != 0.0]),
            ElementType::String => Data::String(vec![value.to_string()]),
        };
        Self { shape: vec![], data }
    }

    pub fn elem_type(&self) -> ElementType {
        match self.data {
            Data::Float16(_) => ElementType::Float16,
            Data::Float32(_) => ElementType::Float32,
            Data::Float64(_) => ElementType::Float64,
            Data::Int32(_) => ElementType::Int32,
            Data::Int64(_) => ElementType::Int64,
            Data::Bool(_) => ElementType::Bool,
            Data::String(_) => ElementType::String,
        }
    }

    pub fn num_elements(&self) -> usize {
        match &self.data {
            Data::Float16(v) => v.len(),
            Data::Float32(v) => v.len(),
            Data::Float64(v) => v.len(),
            Data::Int32(v) => v.len(),
            Data::Int64(v) => v.len(),
            Data::Bool(v) => v.len(),
            Data::String(v) => v.len(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty() || self.num_elements() == 1
    }

    /// First element widened to i64, when the payload is integral.
    pub fn scalar_i64(&self) -> Option<i64> {
        match &self.data {
            Data::Int32(v) => v.first().map(|x| *x as i64),
            Data::Int64(v) => v.first().copied(),
            _ => None,
        }
    }

    /// First element widened to f64 for the numeric payload types.
    pub fn scalar_f64(&self) -> Option<f64> {
        match &self.data {
            Data::Float16(v) => v.first().map(|x| f64::from(f32::from(*x))),
            Data::Float32(v) => v.first().map(|x| *x as f64),
            Data::Float64(v) => v.first().copied(),
            Data::Int32(v) => v.first().map(|x| *x as f64),
            Data::Int64(v) => v.first().map(|x| *x as f64),
            _ => None,
        }
    }

    /// Full payload widened to i64, used for axes, split sizes, pads and
    /// other integer parameter lists.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match &self.data {
            Data::Int32(v) => Some(v.iter().map(|x| *x as i64).collect()),
            Data::Int64(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Truncate the vector display for debug output.
fn trunc<T: fmt::Display>(v: &[T]) -> String {
    const MAX_LEN: usize = 5;
    let mut s = String::new();
    s.push('[');
    for (i, item) in v.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        s.push_str(&format!("{item}"));
        if i > MAX_LEN {
            s.push_str(", ...");
            break;
        }
    }
    s.push(']');
    s
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Data::Float16(v) => write!(f, "Float16({})", trunc(v)),
            Data::Float32(v) => write!(f, "Float32({})", trunc(v)),
            Data::Float64(v) => write!(f, "Float64({})", trunc(v)),
            Data::Int32(v) => write!(f, "Int32({})", trunc(v)),
            Data::Int64(v) => write!(f, "Int64({})", trunc(v)),
            Data::Bool(v) => write!(f, "Bool({})", trunc(v)),
            Data::String(v) => write!(f, "String({})", trunc(v)),
        }
    }
}

impl fmt::Debug for TensorData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorData")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_map_to_element_types() {
        assert_eq!(ElementType::from_wire(1), Some(ElementType::Float32));
        assert_eq!(ElementType::from_wire(7), Some(ElementType::Int64));
        assert_eq!(ElementType::from_wire(10), Some(ElementType::Float16));
        assert_eq!(ElementType::from_wire(0), None);
        assert_eq!(ElementType::from_wire(99), None);
    }

    #[test]
    fn scalar_accessors_widen() {
        let t = TensorData::new(vec![], Data::Int32(vec![42]));
        assert_eq!(t.scalar_i64(), Some(42));
        assert_eq!(t.scalar_f64(), Some(42.0));
        assert!(t.is_scalar());

        let f = TensorData::scalar(0.5, ElementType::Float32);
        assert_eq!(f.scalar_f64(), Some(0.5));
        assert_eq!(f.scalar_i64(), None);
    }

    #[test]
    fn i64_vec_accepts_both_integer_widths() {
        let t = TensorData::new(vec![3], Data::Int32(vec![1, 2, 3]));
        assert_eq!(t.to_i64_vec(), Some(vec![1, 2, 3]));
        let t = TensorData::new(vec![2], Data::Float32(vec![1.0, 2.0]));
        assert_eq!(t.to_i64_vec(), None);
    }
}

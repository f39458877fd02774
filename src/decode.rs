//! Decoding of raw model records into typed values: node attributes and
//! value-descriptor shapes/types.

use crate::error::ImportError;
use crate::ir::{Attributes, AttributeValue, BlockBuilder, Dim};
use crate::model::{AttributeRecord, DimRecord, ValueDescriptor};
use crate::tensor::ElementType;

/// Convert a node's attribute records to a name-keyed map.
///
/// Exactly one variant field of each record must be populated. Nested-graph
/// attributes are rejected: subgraph-carrying operators are out of scope.
pub fn decode_attributes(records: &[AttributeRecord]) -> Result<Attributes, ImportError> {
    let mut attrs = Attributes::new();
    for record in records {
        if record.g.is_some() || !record.graphs.is_empty() {
            return Err(ImportError::UnsupportedFeature(format!(
                "nested graph attribute '{}'",
                record.name
            )));
        }

        let mut values = Vec::new();
        if let Some(v) = record.f {
            values.push(AttributeValue::Float32(v));
        }
        if let Some(v) = record.i {
            values.push(AttributeValue::Int64(v));
        }
        if let Some(v) = &record.s {
            values.push(AttributeValue::String(v.clone()));
        }
        if let Some(v) = &record.t {
            values.push(AttributeValue::Tensor(v.clone()));
        }
        if !record.floats.is_empty() {
            values.push(AttributeValue::Float32s(record.floats.clone()));
        }
        if !record.ints.is_empty() {
            values.push(AttributeValue::Int64s(record.ints.clone()));
        }
        if !record.strings.is_empty() {
            values.push(AttributeValue::Strings(record.strings.clone()));
        }
        if !record.tensors.is_empty() {
            values.push(AttributeValue::Tensors(record.tensors.clone()));
        }

        let value = match values.len() {
            0 => {
                return Err(ImportError::MalformedAttribute {
                    name: record.name.clone(),
                    reason: "no populated variant".to_string(),
                });
            }
            1 => values.pop().unwrap(),
            n => {
                return Err(ImportError::MalformedAttribute {
                    name: record.name.clone(),
                    reason: format!("{n} populated variants, only one is allowed"),
                });
            }
        };
        attrs.insert(record.name.clone(), value);
    }
    Ok(attrs)
}

/// A value descriptor resolved into IR terms.
#[derive(Debug, Clone)]
pub struct ValueInfo {
    pub name: String,
    pub dims: Vec<Dim>,
    pub dtype: Option<ElementType>,
    /// Per-dimension diagnostic names: the extent for concrete dimensions,
    /// the declared placeholder name (possibly empty) for symbolic ones.
    pub dim_hints: Vec<String>,
}

impl ValueInfo {
    /// Whether any dimension stayed symbolic.
    pub fn has_unknown_dims(&self) -> bool {
        self.dims.iter().any(|d| matches!(d, Dim::Sym { .. }))
    }
}

/// Extract name, dimensions and element type from a value descriptor.
///
/// Unknown dimensions become fresh symbolic dimension variables allocated
/// from the build context. An absent element type stays `None` and must be
/// filled by the caller's override table.
pub fn resolve_value_info(
    descriptor: &ValueDescriptor,
    bb: &mut BlockBuilder,
) -> Result<ValueInfo, ImportError> {
    let mut dims = Vec::with_capacity(descriptor.dims.len());
    let mut dim_hints = Vec::with_capacity(descriptor.dims.len());
    for dim in &descriptor.dims {
        match dim {
            DimRecord::Value(v) if *v > 0 => {
                dims.push(Dim::Static(*v));
                dim_hints.push(v.to_string());
            }
            DimRecord::Value(_) => {
                dims.push(bb.fresh_dim(""));
                dim_hints.push(String::new());
            }
            DimRecord::Param(name) => {
                dims.push(bb.fresh_dim(name));
                dim_hints.push(name.clone());
            }
        }
    }

    let dtype = match descriptor.elem_type {
        None => None,
        Some(code) => Some(ElementType::from_wire(code).ok_or_else(|| {
            ImportError::UnsupportedFeature(format!(
                "element type code {code} of value '{}'",
                descriptor.name
            ))
        })?),
    };

    Ok(ValueInfo {
        name: descriptor.name.clone(),
        dims,
        dtype,
        dim_hints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Data, TensorData};

    #[test]
    fn single_variant_records_decode() {
        let records = vec![
            AttributeRecord::int("axis", -1),
            AttributeRecord::float("alpha", 0.5),
            AttributeRecord::ints("perm", vec![1, 0]),
            AttributeRecord::string("mode", "constant"),
        ];
        let attrs = decode_attributes(&records).unwrap();
        assert_eq!(attrs["axis"].as_i64(), Some(-1));
        assert_eq!(attrs["alpha"].as_f32(), Some(0.5));
        assert_eq!(attrs["perm"].as_i64s(), Some(&[1, 0][..]));
        assert_eq!(attrs["mode"].as_str(), Some("constant"));
    }

    #[test]
    fn tensor_attributes_are_preserved_opaquely() {
        let tensor = TensorData::new(vec![2], Data::Float32(vec![1.0, 2.0]));
        let attrs =
            decode_attributes(&[AttributeRecord::tensor("value", tensor.clone())]).unwrap();
        assert_eq!(attrs["value"].as_tensor(), Some(&tensor));
    }

    #[test]
    fn empty_record_is_rejected() {
        let record = AttributeRecord {
            name: "broken".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            decode_attributes(&[record]),
            Err(ImportError::MalformedAttribute { name, .. }) if name == "broken"
        ));
    }

    #[test]
    fn multiple_populated_variants_are_rejected() {
        let record = AttributeRecord {
            name: "both".to_string(),
            i: Some(1),
            ints: vec![1, 2],
            ..Default::default()
        };
        assert!(matches!(
            decode_attributes(&[record]),
            Err(ImportError::MalformedAttribute { .. })
        ));
    }

    #[test]
    fn graph_attributes_are_unsupported() {
        let record = AttributeRecord {
            name: "body".to_string(),
            g: Some(Box::default()),
            ..Default::default()
        };
        assert!(matches!(
            decode_attributes(&[record]),
            Err(ImportError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn unknown_dims_become_fresh_symbols() {
        let descriptor = ValueDescriptor {
            name: "x".to_string(),
            dims: vec![
                DimRecord::Param("batch".to_string()),
                DimRecord::Value(0),
                DimRecord::Value(128),
            ],
            elem_type: Some(1),
        };
        let mut bb = BlockBuilder::new();
        let info = resolve_value_info(&descriptor, &mut bb).unwrap();
        assert_eq!(info.dtype, Some(ElementType::Float32));
        assert!(info.has_unknown_dims());
        assert_eq!(info.dim_hints, vec!["batch", "", "128"]);
        match (&info.dims[0], &info.dims[1]) {
            (Dim::Sym { id: a, hint }, Dim::Sym { id: b, .. }) => {
                assert_ne!(a, b);
                assert_eq!(hint, "batch");
            }
            other => panic!("expected symbolic dims, got {other:?}"),
        }
        assert_eq!(info.dims[2], Dim::Static(128));
    }

    #[test]
    fn missing_element_type_stays_unresolved() {
        let descriptor = ValueDescriptor {
            name: "x".to_string(),
            dims: vec![DimRecord::Value(4)],
            elem_type: None,
        };
        let mut bb = BlockBuilder::new();
        let info = resolve_value_info(&descriptor, &mut bb).unwrap();
        assert_eq!(info.dtype, None);
    }
}

//! Top-level model import: opset detection, parameter registration, the
//! unsupported-operator pre-check, node construction and final assembly.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::decode::resolve_value_info;
use crate::error::ImportError;
use crate::from_model::GraphBuilder;
use crate::ir::{Dim, Module, Ret, Type, Var};
use crate::model::{Graph, Model};
use crate::registry::Registry;
use crate::tensor::ElementType;

/// Compilation target forwarded to classic lowering; helper functions are
/// tagged with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
}

impl Target {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new("llvm")
    }
}

/// Element-type overrides for inputs whose declared type is missing or
/// wrong.
#[derive(Debug, Clone)]
pub enum DtypeOverrides {
    /// Fallback element type for inputs that declare none.
    Uniform(ElementType),
    /// Per-input overrides, taking precedence over the declared type.
    PerName(HashMap<String, ElementType>),
}

impl Default for DtypeOverrides {
    fn default() -> Self {
        DtypeOverrides::Uniform(ElementType::Float32)
    }
}

/// Caller-supplied import configuration.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Static shapes for inputs whose declared shape is symbolic.
    pub shape_overrides: HashMap<String, Vec<i64>>,
    pub dtype_overrides: DtypeOverrides,
    /// Takes precedence over the opset detected from the model.
    pub opset_override: Option<i64>,
    pub target: Target,
}

/// Import a model into a module holding one `main` function.
///
/// The function's parameter list is the used initializers followed by the
/// declared inputs, each group in first-seen order; its return value is the
/// graph's single declared output, or an aggregate of them in declared
/// order.
pub fn import_model(model: &Model, options: &ImportOptions) -> Result<Module, ImportError> {
    // The format's own checker is overly strict, so a failure here only
    // warns and the import proceeds.
    if let Err(reason) = validate_model(model) {
        log::warn!("model failed structural validation: {reason}");
    }

    let opset = detect_opset(model, options);
    log::debug!("importing graph at opset version {opset}");

    let graph = &model.graph;
    let mut builder = GraphBuilder::new(opset, &options.target);

    // Names consumed by some node or declared as a graph output decide
    // which initializers end up in the parameter list.
    let used_names: HashSet<&str> = graph
        .nodes
        .iter()
        .flat_map(|node| node.inputs.iter())
        .map(String::as_str)
        .chain(graph.outputs.iter().map(|o| o.name.as_str()))
        .collect();

    // Initializers become parameters carrying their constant payload.
    let mut init_params: Vec<Var> = Vec::new();
    for (name, tensor) in &graph.initializers {
        if name.trim().is_empty() {
            return Err(ImportError::DuplicateOrEmptyName(name.clone()));
        }
        let dims = tensor.shape.iter().map(|d| Dim::Static(*d)).collect();
        let ty = Type::tensor(Some(dims), Some(tensor.elem_type()));
        let mut var = builder.bb.named_var(name, ty);
        var.value = Some(tensor.clone());
        builder.bind(name, var.clone())?;
        if used_names.contains(name.as_str()) {
            init_params.push(var);
        }
    }

    // Declared inputs not already bound by an initializer become plain
    // parameters.
    let mut input_params: Vec<Var> = Vec::new();
    for descriptor in &graph.inputs {
        let info = resolve_value_info(descriptor, &mut builder.bb)?;
        if builder.lookup(&info.name).is_some() {
            continue;
        }

        let dims = match options.shape_overrides.get(&info.name) {
            Some(shape) => shape.iter().map(|d| Dim::Static(*d)).collect(),
            None => {
                if info.has_unknown_dims() {
                    log::warn!(
                        "input {} has unknown dimension shapes: {:?}; \
                         specifying static values may improve performance",
                        info.name,
                        info.dim_hints
                    );
                }
                info.dims.clone()
            }
        };

        let dtype = match &options.dtype_overrides {
            DtypeOverrides::PerName(map) => map.get(&info.name).copied().or(info.dtype),
            DtypeOverrides::Uniform(fallback) => info.dtype.or(Some(*fallback)),
        };

        let var = builder
            .bb
            .named_var(&info.name, Type::tensor(Some(dims), dtype));
        builder.bind(&info.name, var.clone())?;
        input_params.push(var);
    }

    check_for_unsupported_ops(graph)?;

    builder.construct(graph)?;

    // Collect declared outputs from the environment.
    let mut output_vars = Vec::with_capacity(graph.outputs.len());
    for descriptor in &graph.outputs {
        let var = builder
            .lookup(&descriptor.name)
            .cloned()
            .ok_or_else(|| ImportError::UndefinedReference(descriptor.name.clone()))?;
        output_vars.push(var);
    }
    let ret = if output_vars.len() == 1 {
        Ret::Single(output_vars.pop().unwrap())
    } else {
        Ret::Tuple(output_vars)
    };

    let mut params = init_params;
    params.extend(input_params);
    Ok(builder.bb.finish("main", params, ret))
}

/// Scan the whole graph for operators without a registered conversion and
/// report them in one aggregated failure.
fn check_for_unsupported_ops(graph: &Graph) -> Result<(), ImportError> {
    let registry = Registry::global();
    let mut unsupported = BTreeSet::new();
    for node in &graph.nodes {
        if !registry.supports(&node.op_type) && node.op_type != "Constant" {
            unsupported.insert(node.op_type.clone());
        }
    }
    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(ImportError::UnsupportedOperators {
            names: unsupported.into_iter().collect(),
        })
    }
}

/// Determine the working opset: the first import of the default namespace,
/// version 1 when the model declares none, overridden by the caller when
/// requested.
fn detect_opset(model: &Model, options: &ImportOptions) -> i64 {
    let mut detected = 1;
    for import in &model.opset_imports {
        if import.domain.is_empty() || import.domain == "ai.onnx" {
            detected = import.version;
            break;
        }
    }

    match options.opset_override {
        None => detected,
        Some(requested) => {
            if requested < detected {
                log::warn!(
                    "overriding model opset version {detected} with lower version {requested}; \
                     conversion may be unreliable"
                );
            }
            requested
        }
    }
}

/// Strict structural checks over the raw model. Callers treat a failure as
/// a warning, not an error.
fn validate_model(model: &Model) -> Result<(), String> {
    let graph = &model.graph;
    if graph.outputs.is_empty() {
        return Err("graph declares no outputs".to_string());
    }

    let mut defined: HashSet<&str> = graph
        .inputs
        .iter()
        .map(|d| d.name.as_str())
        .chain(graph.initializers.iter().map(|(name, _)| name.as_str()))
        .collect();

    for node in &graph.nodes {
        if node.op_type.is_empty() {
            return Err(format!("node '{}' has no operator type", node.name));
        }
        for input in &node.inputs {
            if !input.is_empty() && !defined.contains(input.as_str()) {
                return Err(format!(
                    "node '{}' consumes '{input}' before it is produced",
                    node.name
                ));
            }
        }
        for output in &node.outputs {
            if !output.is_empty() && !defined.insert(output) {
                return Err(format!("value '{output}' is produced more than once"));
            }
        }
    }

    for descriptor in &graph.inputs {
        if descriptor.elem_type.is_none() {
            return Err(format!("input '{}' declares no element type", descriptor.name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeRecord, OpsetImport, ValueDescriptor};

    fn model_with_opsets(imports: Vec<OpsetImport>) -> Model {
        Model {
            graph: Graph::default(),
            opset_imports: imports,
        }
    }

    #[test]
    fn opset_defaults_to_one_without_imports() {
        let model = model_with_opsets(vec![]);
        assert_eq!(detect_opset(&model, &ImportOptions::default()), 1);
    }

    #[test]
    fn first_default_namespace_import_wins() {
        let model = model_with_opsets(vec![
            OpsetImport {
                domain: "com.custom".to_string(),
                version: 4,
            },
            OpsetImport {
                domain: String::new(),
                version: 14,
            },
            OpsetImport {
                domain: "ai.onnx".to_string(),
                version: 9,
            },
        ]);
        assert_eq!(detect_opset(&model, &ImportOptions::default()), 14);
    }

    #[test]
    fn caller_override_takes_precedence() {
        let model = model_with_opsets(vec![OpsetImport {
            domain: String::new(),
            version: 14,
        }]);
        let options = ImportOptions {
            opset_override: Some(11),
            ..Default::default()
        };
        assert_eq!(detect_opset(&model, &options), 11);
    }

    #[test]
    fn validation_flags_out_of_order_consumption() {
        let model = Model {
            graph: Graph {
                nodes: vec![NodeRecord {
                    op_type: "Relu".to_string(),
                    name: "relu1".to_string(),
                    inputs: vec!["later".to_string()],
                    outputs: vec!["y".to_string()],
                    attributes: vec![],
                }],
                inputs: vec![],
                outputs: vec![ValueDescriptor {
                    name: "y".to_string(),
                    dims: vec![],
                    elem_type: Some(1),
                }],
                initializers: vec![],
            },
            opset_imports: vec![],
        };
        assert!(validate_model(&model).is_err());
    }
}

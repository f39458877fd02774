//! Sequential SSA construction over a graph's node list.
//!
//! Nodes are lowered in file order; the format guarantees producers precede
//! consumers, so no topological re-sort happens here. The builder owns the
//! symbol environment mapping node-output names to IR variables. The
//! environment is append-only for the lifetime of one import: rebinding a
//! name would break single assignment and is rejected.

use std::collections::HashMap;
use std::str::FromStr;

use crate::bridge;
use crate::decode::decode_attributes;
use crate::error::ImportError;
use crate::import::Target;
use crate::ir::{AttributeValue, BlockBuilder, Expr, Var};
use crate::model::{Graph, NodeRecord};
use crate::registry::{resolve_version, NodeType, OpConverter, Registry};

/// Private attribute key carrying the node's declared name.
pub(crate) const NODE_NAME_KEY: &str = "__node_name";
/// Private attribute key carrying the node's declared output count. Needed
/// by converters that fall back on the output count, such as an even split
/// with no explicit sizes.
pub(crate) const NUM_OUTPUTS_KEY: &str = "__num_outputs";

/// What a conversion produced: one value, or an explicit aggregate.
#[derive(Debug, Clone)]
pub enum Lowered {
    Single(Var),
    Tuple(Vec<Var>),
}

/// Ordered, resolved node inputs with explicit absence.
///
/// Requesting an index past the end or a declared-absent slot yields `None`
/// instead of panicking; converters that cannot work without the input use
/// `require`.
pub struct Inputs(Vec<Option<Var>>);

impl Inputs {
    pub fn new(slots: Vec<Option<Var>>) -> Self {
        Self(slots)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Var> {
        self.0.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn require(&self, index: usize, op: &str) -> Result<&Var, ImportError> {
        self.get(index).ok_or_else(|| ImportError::NonVariableInput {
            op: op.to_string(),
            index,
        })
    }

    /// The raw slots, absent inputs included.
    pub fn slots(&self) -> &[Option<Var>] {
        &self.0
    }

    /// Only the present inputs, in order. Used by variadic operators.
    pub fn present(&self) -> impl Iterator<Item = &Var> {
        self.0.iter().flatten()
    }
}

/// Drives node-by-node lowering and owns the symbol environment.
pub struct GraphBuilder<'a> {
    /// The live build context converters emit into.
    pub bb: BlockBuilder,
    /// The working operator-set version.
    pub opset: i64,
    /// Compilation target forwarded to classic lowering.
    pub target: &'a Target,
    env: HashMap<String, Var>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(opset: i64, target: &'a Target) -> Self {
        Self {
            bb: BlockBuilder::new(),
            opset,
            target,
            env: HashMap::new(),
        }
    }

    /// Bind a name to a value. Names bind exactly once per import.
    pub fn bind(&mut self, name: &str, var: Var) -> Result<(), ImportError> {
        if name.trim().is_empty() || self.env.contains_key(name) {
            return Err(ImportError::DuplicateOrEmptyName(name.to_string()));
        }
        self.env.insert(name.to_string(), var);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Var> {
        self.env.get(name)
    }

    /// Lower every node of the graph, in declaration order.
    pub fn construct(&mut self, graph: &Graph) -> Result<(), ImportError> {
        for node in &graph.nodes {
            self.lower_node(node)?;
        }
        Ok(())
    }

    fn lower_node(&mut self, node: &NodeRecord) -> Result<(), ImportError> {
        log::debug!("lowering node '{}' ({})", node.name, node.op_type);

        let mut attrs = decode_attributes(&node.attributes)?;
        attrs.insert(
            NODE_NAME_KEY.to_string(),
            AttributeValue::String(node.name.clone()),
        );
        attrs.insert(
            NUM_OUTPUTS_KEY.to_string(),
            AttributeValue::Int64(node.outputs.len() as i64),
        );

        let inputs = self.resolve_inputs(node)?;

        let tag = NodeType::from_str(&node.op_type).map_err(|_| {
            ImportError::UnsupportedOperators {
                names: vec![node.op_type.clone()],
            }
        })?;
        let converter =
            Registry::global()
                .get(&tag)
                .ok_or_else(|| ImportError::UnsupportedOperators {
                    names: vec![node.op_type.clone()],
                })?;

        let lowered = match converter {
            OpConverter::Direct(impls) => {
                let imp = resolve_version(&tag, impls, self.opset)?;
                imp(self, &inputs, &attrs)?
            }
            OpConverter::Classic(impls) => {
                let imp = resolve_version(&tag, impls, self.opset)?;
                bridge::splice(self, imp, &tag, &inputs, &attrs)?
            }
        };

        self.bind_outputs(node, lowered)
    }

    fn resolve_inputs(&mut self, node: &NodeRecord) -> Result<Inputs, ImportError> {
        let mut slots = Vec::with_capacity(node.inputs.len());
        for name in &node.inputs {
            if name.is_empty() {
                slots.push(None);
            } else {
                let var = self
                    .env
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ImportError::UndefinedReference(name.clone()))?;
                slots.push(Some(var));
            }
        }
        Ok(Inputs::new(slots))
    }

    fn bind_outputs(&mut self, node: &NodeRecord, lowered: Lowered) -> Result<(), ImportError> {
        let declared = node.outputs.len();
        let values = match lowered {
            Lowered::Single(var) => match var.ty.tuple_arity() {
                // A single value of aggregate type is unpacked into as many
                // values as the node declares outputs.
                Some(arity) => {
                    if arity < declared {
                        return Err(ImportError::OutputArityMismatch {
                            node: node.name.clone(),
                            expected: declared,
                            actual: arity,
                        });
                    }
                    (0..declared)
                        .map(|index| {
                            self.bb.emit(Expr::TupleGetItem {
                                tuple: var.clone(),
                                index,
                            })
                        })
                        .collect()
                }
                None => vec![var],
            },
            Lowered::Tuple(vars) => vars,
        };

        if values.len() < declared {
            return Err(ImportError::OutputArityMismatch {
                node: node.name.clone(),
                expected: declared,
                actual: values.len(),
            });
        }

        for (name, value) in node.outputs.iter().zip(values) {
            if name.is_empty() {
                continue;
            }
            self.bind(name, value)?;
        }
        Ok(())
    }
}

//! Operator-conversion registry.
//!
//! A process-wide table built once at first use maps each operator tag to an
//! ordered list of versioned implementations, owned by either the direct
//! (SSA) catalog or the classic catalog. Version resolution follows the
//! floor rule: the greatest registered version not exceeding the requested
//! operator-set version.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;

use strum::{Display, EnumString};

use crate::classic::{ClassicExpr, ClassicInputs};
use crate::error::ImportError;
use crate::from_model::{GraphBuilder, Inputs, Lowered};
use crate::ir::Attributes;
use crate::op;

/// Operator tags with a registered conversion.
#[derive(Debug, Hash, Eq, PartialEq, EnumString, Clone, Display)]
pub enum NodeType {
    Add,
    BatchNormalization,
    BiasGelu,
    Cast,
    Clip,
    Concat,
    Constant,
    ConstantOfShape,
    Conv,
    CumSum,
    Div,
    Equal,
    Erf,
    Expand,
    Flatten,
    Gather,
    Gelu,
    Gemm,
    GlobalAveragePool,
    LayerNormalization,
    MatMul,
    MaxPool,
    Mul,
    Not,
    Pad,
    Pow,
    ReduceL1,
    ReduceL2,
    ReduceLogSum,
    ReduceLogSumExp,
    ReduceMax,
    ReduceMean,
    ReduceMin,
    ReduceProd,
    ReduceSum,
    ReduceSumSquare,
    Relu,
    Reshape,
    Shape,
    Sigmoid,
    Slice,
    Softmax,
    Split,
    Sqrt,
    Squeeze,
    Sub,
    Tanh,
    Tile,
    Transpose,
    Unsqueeze,
    Where,
}

/// A conversion of the direct catalog: runs against the live build context.
pub type DirectFn = fn(&mut GraphBuilder, &Inputs, &Attributes) -> Result<Lowered, ImportError>;

/// A conversion of the classic catalog: builds a classic expression tree,
/// spliced into the primary build by the bridge.
pub type ClassicFn = fn(&ClassicInputs, &Attributes) -> Result<ClassicExpr, ImportError>;

/// Versioned implementations of one operator, tagged with the catalog that
/// owns it. Each list is ordered by ascending minimum version.
pub enum OpConverter {
    Direct(Vec<(i64, DirectFn)>),
    Classic(Vec<(i64, ClassicFn)>),
}

/// The conversion table. Read-only after registration.
pub struct Registry {
    map: HashMap<NodeType, OpConverter>,
}

impl Registry {
    pub(crate) fn from_map(map: HashMap<NodeType, OpConverter>) -> Self {
        Self { map }
    }

    /// The process-wide registry, built on first use.
    pub fn global() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(op::build_registry)
    }

    pub fn get(&self, tag: &NodeType) -> Option<&OpConverter> {
        self.map.get(tag)
    }

    /// Whether a raw operator tag has any registered conversion.
    pub fn supports(&self, tag: &str) -> bool {
        NodeType::from_str(tag)
            .map(|t| self.map.contains_key(&t))
            .unwrap_or(false)
    }
}

/// Select the implementation with the greatest registered version not
/// exceeding `requested`. A graph built against a newer operator set reuses
/// the most recent implementation not newer than that set; requesting below
/// the oldest registered version fails.
pub fn resolve_version<F: Copy>(
    tag: &NodeType,
    impls: &[(i64, F)],
    requested: i64,
) -> Result<F, ImportError> {
    impls
        .iter()
        .filter(|(version, _)| *version <= requested)
        .max_by_key(|(version, _)| *version)
        .map(|(_, imp)| *imp)
        .ok_or_else(|| ImportError::UnimplementedOperatorVersion {
            tag: tag.to_string(),
            version: requested,
        })
}

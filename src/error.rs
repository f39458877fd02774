//! Import failure taxonomy.
//!
//! Every error here is a hard failure: an import either completes or aborts.
//! Conditions that do not stop the build (unresolved symbolic dimensions,
//! a caller-forced opset below the model's own, a failing structural
//! pre-check) are surfaced through `log::warn!` instead.

/// Errors raised while importing a graph.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// An attribute record has zero or more than one populated variant.
    #[error("malformed attribute '{name}': {reason}")]
    MalformedAttribute { name: String, reason: String },

    /// The model uses a construct this importer does not handle, such as a
    /// nested-graph attribute.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A node input references a name that was never bound.
    #[error("reference to undefined value '{0}'")]
    UndefinedReference(String),

    /// Operators with no registered conversion, aggregated over the whole
    /// graph so the caller sees every blocker at once.
    #[error("the following operators are not supported: {}", names.join(", "))]
    UnsupportedOperators { names: Vec<String> },

    /// The operator is known but has no implementation applicable at or
    /// below the resolved opset version.
    #[error("opset version {version} of {tag} not implemented")]
    UnimplementedOperatorVersion { tag: String, version: i64 },

    /// A converter produced fewer values than the node declares outputs.
    #[error("node '{node}' declares {expected} outputs but conversion produced {actual}")]
    OutputArityMismatch {
        node: String,
        expected: usize,
        actual: usize,
    },

    /// An operator whose lowering needs a compile-time constant received a
    /// runtime value.
    #[error("{op} requires a compile-time constant for input '{input}'")]
    UnsupportedDynamicParameter { op: String, input: String },

    /// The legacy-dialect conversion itself failed.
    #[error("cross-dialect conversion of {op} failed: {reason}")]
    BridgeTranslationFailed { op: String, reason: String },

    /// A helper function spliced out of a legacy sub-module collides with an
    /// incompatible registration of the same name.
    #[error("helper function '{0}' collides with an incompatible registration")]
    UnresolvedGlobalReference(String),

    /// An input handed to the bridge is neither a constant nor a plain named
    /// tensor value, so it cannot be mirrored into the legacy dialect.
    #[error("input {index} of {op} is neither a constant nor a plain named value")]
    NonVariableInput { op: String, index: usize },

    /// A blank or colliding initializer/parameter name.
    #[error("initializer or parameter name '{0}' is empty or already bound")]
    DuplicateOrEmptyName(String),
}

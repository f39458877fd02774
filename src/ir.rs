//! The SSA intermediate representation produced by the importer.
//!
//! The IR is deliberately small: a module holds one function (plus helper
//! functions registered by cross-dialect splicing), a function is an ordered
//! list of single-assignment bindings, and every operand is a variable.
//! Constants are bindings whose variable carries its literal payload, so a
//! converter can tell a compile-time-constant input from a runtime one by
//! looking at `Var::value`.

use std::collections::HashMap;
use std::fmt;

use crate::error::ImportError;
use crate::tensor::{ElementType, TensorData};

pub mod rewrite;

/// A decoded node attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Float32(f32),
    Int64(i64),
    String(String),
    Tensor(TensorData),
    Float32s(Vec<f32>),
    Int64s(Vec<i64>),
    Strings(Vec<String>),
    Tensors(Vec<TensorData>),
}

pub type Attributes = HashMap<String, AttributeValue>;

impl AttributeValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            AttributeValue::Float32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64s(&self) -> Option<&[i64]> {
        match self {
            AttributeValue::Int64s(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorData> {
        match self {
            AttributeValue::Tensor(v) => Some(v),
            _ => None,
        }
    }
}

/// One dimension of a tensor type.
#[derive(Debug, Clone, PartialEq)]
pub enum Dim {
    /// Compile-time-known extent.
    Static(i64),
    /// Fresh symbolic dimension variable; `hint` keeps the name the model
    /// declared for it (possibly empty) for diagnostics.
    Sym { id: usize, hint: String },
}

/// Shape and element type of a tensor value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TensorType {
    /// `None` when even the rank is unknown.
    pub dims: Option<Vec<Dim>>,
    pub dtype: Option<ElementType>,
}

impl TensorType {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_dtype(dtype: Option<ElementType>) -> Self {
        Self { dims: None, dtype }
    }

    /// All-static shape, when every dimension is known.
    pub fn static_shape(&self) -> Option<Vec<i64>> {
        let dims = self.dims.as_ref()?;
        dims.iter()
            .map(|d| match d {
                Dim::Static(v) => Some(*v),
                Dim::Sym { .. } => None,
            })
            .collect()
    }
}

/// Type of an IR value.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Tensor(TensorType),
    Tuple(Vec<Type>),
}

impl Type {
    pub fn unknown_tensor() -> Self {
        Type::Tensor(TensorType::unknown())
    }

    pub fn tensor(dims: Option<Vec<Dim>>, dtype: Option<ElementType>) -> Self {
        Type::Tensor(TensorType { dims, dtype })
    }

    pub fn dtype(&self) -> Option<ElementType> {
        match self {
            Type::Tensor(t) => t.dtype,
            Type::Tuple(_) => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Type::Tensor(t) => Some(t),
            Type::Tuple(_) => None,
        }
    }

    /// Number of fields when this is an aggregate type.
    pub fn tuple_arity(&self) -> Option<usize> {
        match self {
            Type::Tuple(fields) => Some(fields.len()),
            Type::Tensor(_) => None,
        }
    }
}

/// An SSA variable: bound exactly once, either as a function parameter or by
/// a single binding.
#[derive(Clone, PartialEq)]
pub struct Var {
    pub id: usize,
    pub name: String,
    pub ty: Type,
    /// Literal payload when the variable is a compile-time constant
    /// (initializer data or the result of a constant-producing node).
    pub value: Option<TensorData>,
}

impl Var {
    pub fn is_const(&self) -> bool {
        self.value.is_some()
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("const", &self.value.is_some())
            .finish()
    }
}

/// Attribute payload forwarded to a tensor-operator-library call.
pub type OpAttrs = Vec<(String, AttributeValue)>;

/// Right-hand side of a binding.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal tensor.
    Const(TensorData),
    /// Direct call into the tensor-operator library.
    Call {
        op: String,
        attrs: OpAttrs,
        args: Vec<Var>,
    },
    /// Call through a module-level helper function. Operator parameters
    /// ride at the call site; the helper names the kernel.
    CallHelper {
        helper: String,
        attrs: OpAttrs,
        args: Vec<Var>,
    },
    /// Aggregate construction.
    Tuple(Vec<Var>),
    /// Aggregate field projection.
    TupleGetItem { tuple: Var, index: usize },
    /// Alias of an existing variable.
    Var(Var),
}

/// A single-assignment binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub var: Var,
    pub expr: Expr,
}

/// Function return value.
#[derive(Debug, Clone)]
pub enum Ret {
    Single(Var),
    Tuple(Vec<Var>),
}

/// An SSA function: parameters, ordered bindings, return value.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Var>,
    pub bindings: Vec<Binding>,
    pub ret: Ret,
}

/// A lowered operator kernel registered at module level and referenced from
/// bindings through `Expr::CallHelper`. The kernel body lives in the tensor
/// operator library; the IR records only its interface.
#[derive(Debug, Clone, PartialEq)]
pub struct HelperFn {
    pub name: String,
    pub op: String,
    pub arity: usize,
    pub target: String,
}

/// A module: the imported function plus any helper functions.
#[derive(Debug, Clone)]
pub struct Module {
    pub functions: Vec<Function>,
    pub helpers: Vec<HelperFn>,
}

impl Module {
    /// The entry function. Importing always produces exactly one.
    pub fn main(&self) -> &Function {
        &self.functions[0]
    }

    pub fn helper(&self, name: &str) -> Option<&HelperFn> {
        self.helpers.iter().find(|h| h.name == name)
    }
}

/// Build context for one function.
///
/// Each construction pass owns its builder; nested lowering (the bridge)
/// creates an independent builder and discards it, so no state is shared
/// between the primary build and a nested one.
#[derive(Default)]
pub struct BlockBuilder {
    next_var: usize,
    next_sym: usize,
    bindings: Vec<Binding>,
    helpers: Vec<HelperFn>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A variable with an explicit name, used for function parameters.
    pub fn named_var(&mut self, name: &str, ty: Type) -> Var {
        let id = self.next_var;
        self.next_var += 1;
        Var {
            id,
            name: name.to_string(),
            ty,
            value: None,
        }
    }

    fn fresh_var(&mut self, ty: Type) -> Var {
        let id = self.next_var;
        self.next_var += 1;
        Var {
            id,
            name: format!("lv{id}"),
            ty,
            value: None,
        }
    }

    /// A fresh symbolic dimension variable.
    pub fn fresh_dim(&mut self, hint: &str) -> Dim {
        let id = self.next_sym;
        self.next_sym += 1;
        Dim::Sym {
            id,
            hint: hint.to_string(),
        }
    }

    /// Emit a binding, inferring the structural type of the expression.
    /// Calls get an unknown tensor type; use `emit_typed` when the converter
    /// knows better.
    pub fn emit(&mut self, expr: Expr) -> Var {
        let ty = self.infer(&expr);
        self.emit_typed(expr, ty)
    }

    /// Emit a binding with an explicit result type.
    pub fn emit_typed(&mut self, expr: Expr, ty: Type) -> Var {
        let mut var = self.fresh_var(ty);
        // Constant payloads stay visible through the variable so later
        // converters can require compile-time values.
        var.value = match &expr {
            Expr::Const(data) => Some(data.clone()),
            Expr::Var(inner) => inner.value.clone(),
            _ => None,
        };
        self.bindings.push(Binding {
            var: var.clone(),
            expr,
        });
        var
    }

    /// Emit a literal tensor binding.
    pub fn constant(&mut self, data: TensorData) -> Var {
        let dims = data.shape.iter().map(|d| Dim::Static(*d)).collect();
        let ty = Type::tensor(Some(dims), Some(data.elem_type()));
        self.emit_typed(Expr::Const(data), ty)
    }

    /// Emit a direct operator-library call.
    pub fn call_op(&mut self, op: &str, args: &[Var], attrs: OpAttrs, ty: Type) -> Var {
        self.emit_typed(
            Expr::Call {
                op: op.to_string(),
                attrs,
                args: args.to_vec(),
            },
            ty,
        )
    }

    /// Register a helper function, deduplicated by name. Re-registering the
    /// same interface is a no-op; a different interface under the same name
    /// is an unresolvable collision.
    pub fn add_helper(&mut self, helper: HelperFn) -> Result<String, ImportError> {
        if let Some(existing) = self.helpers.iter().find(|h| h.name == helper.name) {
            if *existing == helper {
                return Ok(helper.name);
            }
            return Err(ImportError::UnresolvedGlobalReference(helper.name));
        }
        let name = helper.name.clone();
        self.helpers.push(helper);
        Ok(name)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    fn infer(&self, expr: &Expr) -> Type {
        match expr {
            Expr::Const(data) => Type::tensor(
                Some(data.shape.iter().map(|d| Dim::Static(*d)).collect()),
                Some(data.elem_type()),
            ),
            Expr::Var(v) => v.ty.clone(),
            Expr::Tuple(vars) => Type::Tuple(vars.iter().map(|v| v.ty.clone()).collect()),
            Expr::TupleGetItem { tuple, index } => match &tuple.ty {
                Type::Tuple(fields) => fields
                    .get(*index)
                    .cloned()
                    .unwrap_or_else(Type::unknown_tensor),
                Type::Tensor(_) => Type::unknown_tensor(),
            },
            Expr::Call { .. } | Expr::CallHelper { .. } => Type::unknown_tensor(),
        }
    }

    /// Assemble the function and wrap it in a module together with the
    /// helpers registered during the build.
    pub fn finish(self, name: &str, params: Vec<Var>, ret: Ret) -> Module {
        Module {
            functions: vec![Function {
                name: name.to_string(),
                params,
                bindings: self.bindings,
                ret,
            }],
            helpers: self.helpers,
        }
    }
}

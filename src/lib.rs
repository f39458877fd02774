#![allow(clippy::single_match)]

//! `onnx-ssa` converts an ONNX-style computation graph into a module holding
//! one static-single-assignment function, ready for downstream compilation.
//!
//! The importer resolves trained parameters against declared inputs,
//! dispatches every node to a version-appropriate conversion, and bridges a
//! classic operator-conversion catalog into the SSA dialect so conversions
//! written against either catalog are usable interchangeably. Kernel math is
//! never defined here: conversions emit calls into a tensor-operator
//! library and the produced IR records only those call interfaces.

pub mod bridge;
pub mod classic;
pub mod decode;
pub mod error;
pub mod from_model;
pub mod import;
pub mod ir;
pub mod model;
mod op;
pub mod registry;
pub mod tensor;

pub use error::ImportError;
pub use import::{import_model, DtypeOverrides, ImportOptions, Target};
pub use ir::{Binding, Expr, Function, Module, Ret, Var};
pub use model::{AttributeRecord, DimRecord, Graph, Model, NodeRecord, OpsetImport, ValueDescriptor};
pub use tensor::{Data, ElementType, TensorData};

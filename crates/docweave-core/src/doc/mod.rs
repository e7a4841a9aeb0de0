//! The documentation model and how it is built
//!
//! A [`Session`] loads modules, reflects them and merges in docstrings found in
//! the syntax tree. The result is a [`Documentation`] of [`Module`]s whose
//! members can be cross-referenced with a [`Resolver`]. Type stubs (`.pyi`)
//! override signatures and annotations.

mod builder;
mod crosslink;
mod extractor;
mod hierarchy;
mod mro;
mod project;
mod session;
mod stubs;
mod types;

pub use crosslink::{relative_link, Reference, ReferenceSpan, Resolver};
pub use extractor::{AstExtractor, AstInfo, ScopedName};
pub use mro::{depth_first, linearize, BaseGraph, MroError};
pub use project::{Documentation, Target};
pub use session::Session;
pub use types::{
    Ancestor, Binding, Class, DocInfo, Function, Member, Module, Parameter, SourceLocation,
    SubmoduleRef, Variable, VariableScope, Visibility,
};

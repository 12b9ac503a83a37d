use alloc::vec::Vec;
use core::any::TypeId;

use crate::{any::TypeInfo, binding::Binding, key::Key};

#[derive(thiserror::Error, Debug)]
pub enum BindingErrorKind {
    #[error("No such binding: {key}")]
    NoSuchBinding { key: Key },
    #[error("Already bound: {binding}")]
    AlreadyBound { binding: Binding },
    #[error("Multiple bindings for {key} in modules {modules:?}")]
    MultipleBindings { key: Key, modules: Vec<TypeInfo> },
    #[error("Bound instance has incorrect type. Expected: {}, actual: {actual:?}", expected.name)]
    IncorrectType { expected: TypeInfo, actual: Option<TypeId> },
}

#![no_std]

extern crate alloc;

pub(crate) mod any;
pub(crate) mod binding;
pub(crate) mod container;
pub(crate) mod errors;
pub(crate) mod graph;
pub(crate) mod injector;
pub(crate) mod instance;
pub(crate) mod key;
pub(crate) mod marker;
pub(crate) mod metadata;
pub(crate) mod provider;
pub(crate) mod registry;
pub(crate) mod scoping;

pub use any::TypeInfo;
pub use binding::Binding;
pub use container::{Container, ContainerBuilder};
pub use errors::{BindingErrorKind, ConstructionErrorKind, DependencyErrorKind, InjectErrorKind, ScopeErrorKind};
pub use injector::Injector;
pub use instance::Instance;
pub use key::{Key, Qualifier, TypeDescriptor};
pub use marker::{Marker, ScopeMarker, Singleton};
pub use metadata::{
    ConstructorMetadata, FieldMetadata, Injectable, MethodMetadata, Module, ModuleId, ModuleMetadata, ProviderMetadata,
    TypeMetadata,
};
pub use provider::{provider_fn, BoxedCloneProvider};
pub use scoping::{NoScoping, Scoping, ScopingFactory, SingletonScoping, SingletonScopingFactory};

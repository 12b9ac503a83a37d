use alloc::{sync::Arc, vec::Vec};
use core::{
    cmp::Ordering,
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
};

use crate::{any::TypeInfo, errors::ConstructionErrorKind, instance::Instance, key::Key, marker::ScopeMarker};

/// Identity of a module type.
///
/// Carries the metadata thunk alongside the type identity so that any
/// holder of the id (a dependency edge, a source qualifier) can lazily
/// realize the module. Equality and ordering ignore the thunk.
#[derive(Clone, Copy)]
pub struct ModuleId {
    type_info: TypeInfo,
    metadata: fn() -> ModuleMetadata,
}

impl ModuleId {
    #[inline]
    #[must_use]
    pub fn of<M: Module>() -> Self {
        Self {
            type_info: TypeInfo::of::<M>(),
            metadata: M::metadata,
        }
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub(crate) fn metadata(&self) -> ModuleMetadata {
        (self.metadata)()
    }
}

impl PartialEq for ModuleId {
    fn eq(&self, other: &Self) -> bool {
        self.type_info == other.type_info
    }
}

impl Eq for ModuleId {}

impl PartialOrd for ModuleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_info.cmp(&other.type_info)
    }
}

impl Hash for ModuleId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_info.hash(state);
    }
}

impl Debug for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleId").field(&self.type_info.name).finish()
    }
}

/// A configuration unit: declares its dependency modules and provider
/// methods through metadata.
pub trait Module: Send + Sync + 'static {
    #[must_use]
    fn metadata() -> ModuleMetadata;
}

/// A type constructible and member-injectable through metadata, the typed
/// entry into [`crate::Injector::new_instance`] and the member-injection
/// methods.
pub trait Injectable: Send + Sync + 'static {
    #[must_use]
    fn metadata() -> TypeMetadata;
}

pub(crate) type ConstructFn = Arc<dyn Fn(&[Instance]) -> anyhow::Result<Instance> + Send + Sync>;
pub(crate) type AssignFn = Arc<dyn Fn(Instance, Instance) -> anyhow::Result<()> + Send + Sync>;
pub(crate) type InvokeFn = Arc<dyn Fn(Instance, Vec<Instance>) -> anyhow::Result<Instance> + Send + Sync>;

/// Description of one constructor: its parameter keys and the mechanical
/// construction closure supplied by the introspection layer.
#[derive(Clone)]
pub struct ConstructorMetadata {
    name: &'static str,
    injectable: bool,
    parameters: Vec<Key>,
    construct: ConstructFn,
}

impl ConstructorMetadata {
    #[must_use]
    pub fn new<F>(name: &'static str, parameters: Vec<Key>, construct: F) -> Self
    where
        F: Fn(&[Instance]) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self {
            name,
            injectable: false,
            parameters,
            construct: Arc::new(construct),
        }
    }

    /// Marks the constructor as explicitly injectable, the tie-breaker when
    /// a type declares several constructors.
    #[must_use]
    pub fn injectable(mut self) -> Self {
        self.injectable = true;
        self
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub const fn is_injectable(&self) -> bool {
        self.injectable
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &[Key] {
        &self.parameters
    }

    pub(crate) fn construct(&self, arguments: &[Instance]) -> anyhow::Result<Instance> {
        (self.construct)(arguments)
    }
}

/// Description of one injectable field: its target key and the assignment
/// closure (host handle, resolved value). Interior mutability of the host
/// is the introspection layer's concern.
#[derive(Clone)]
pub struct FieldMetadata {
    name: &'static str,
    key: Key,
    assign: AssignFn,
}

impl FieldMetadata {
    #[must_use]
    pub fn new<F>(name: &'static str, key: Key, assign: F) -> Self
    where
        F: Fn(Instance, Instance) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name,
            key,
            assign: Arc::new(assign),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub const fn key(&self) -> &Key {
        &self.key
    }

    pub(crate) fn assign(&self, host: Instance, value: Instance) -> anyhow::Result<()> {
        (self.assign)(host, value)
    }
}

/// Description of one injectable method: one key per parameter, in
/// declaration order, and the invocation closure. The invocation result is
/// surfaced to the caller; unit-returning methods yield an absent instance.
#[derive(Clone)]
pub struct MethodMetadata {
    name: &'static str,
    parameters: Vec<Key>,
    invoke: InvokeFn,
}

impl MethodMetadata {
    #[must_use]
    pub fn new<F>(name: &'static str, parameters: Vec<Key>, invoke: F) -> Self
    where
        F: Fn(Instance, Vec<Instance>) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self {
            name,
            parameters,
            invoke: Arc::new(invoke),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &[Key] {
        &self.parameters
    }

    pub(crate) fn invoke(&self, host: Instance, arguments: Vec<Instance>) -> anyhow::Result<Instance> {
        (self.invoke)(host, arguments)
    }
}

/// Per-type introspection metadata: constructors, injectable fields and
/// methods, and an optional base-type chain injected most-base first.
#[derive(Clone)]
pub struct TypeMetadata {
    type_info: TypeInfo,
    base: Option<fn() -> TypeMetadata>,
    constructors: Vec<ConstructorMetadata>,
    fields: Vec<FieldMetadata>,
    methods: Vec<MethodMetadata>,
}

impl TypeMetadata {
    #[must_use]
    pub fn new<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            type_info: TypeInfo::of::<T>(),
            base: None,
            constructors: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn base(mut self, base: fn() -> TypeMetadata) -> Self {
        self.base = Some(base);
        self
    }

    #[must_use]
    pub fn constructor(mut self, constructor: ConstructorMetadata) -> Self {
        self.constructors.push(constructor);
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn method(mut self, method: MethodMetadata) -> Self {
        self.methods.push(method);
        self
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub fn constructors(&self) -> &[ConstructorMetadata] {
        &self.constructors
    }

    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[FieldMetadata] {
        &self.fields
    }

    #[inline]
    #[must_use]
    pub fn methods(&self) -> &[MethodMetadata] {
        &self.methods
    }

    /// Metadata chain, most-base first.
    #[must_use]
    pub(crate) fn hierarchy(&self) -> Vec<TypeMetadata> {
        let mut result = match self.base {
            Some(base) => base().hierarchy(),
            None => Vec::new(),
        };
        result.push(self.clone());
        result
    }

    /// Selects the constructor used for injection: a sole constructor wins
    /// outright, otherwise exactly one must be marked injectable.
    pub(crate) fn injectable_constructor(&self) -> Result<&ConstructorMetadata, ConstructionErrorKind> {
        if self.constructors.is_empty() {
            return Err(ConstructionErrorKind::NoConstructors {
                type_info: self.type_info,
            });
        }
        if let [constructor] = self.constructors.as_slice() {
            return Ok(constructor);
        }
        let mut marked = self.constructors.iter().filter(|constructor| constructor.injectable);
        match (marked.next(), marked.next()) {
            (Some(constructor), None) => Ok(constructor),
            (None, _) => Err(ConstructionErrorKind::NoInjectableConstructor {
                type_info: self.type_info,
            }),
            (Some(_), Some(_)) => Err(ConstructionErrorKind::MultipleInjectableConstructors {
                type_info: self.type_info,
            }),
        }
    }
}

/// Description of one provider method: the binding key derived from the
/// method's return type and qualifiers, the exposed flag, scope markers
/// declared on the method, and optionally the produced type's metadata for
/// member-injecting what it returns.
#[derive(Clone)]
pub struct ProviderMetadata {
    key: Key,
    exposed: bool,
    scopes: Vec<ScopeMarker>,
    method: MethodMetadata,
    provided: Option<fn() -> TypeMetadata>,
}

impl ProviderMetadata {
    #[must_use]
    pub fn new(key: Key, method: MethodMetadata) -> Self {
        Self {
            key,
            exposed: false,
            scopes: Vec::new(),
            method,
            provided: None,
        }
    }

    /// Makes the binding visible to modules that declare this one as a
    /// dependency.
    #[must_use]
    pub fn exposed(mut self) -> Self {
        self.exposed = true;
        self
    }

    #[must_use]
    pub fn scoped(mut self, marker: ScopeMarker) -> Self {
        self.scopes.push(marker);
        self
    }

    /// Declares member-injection metadata for the produced value.
    #[must_use]
    pub fn provided_members(mut self, metadata: fn() -> TypeMetadata) -> Self {
        self.provided = Some(metadata);
        self
    }

    #[inline]
    #[must_use]
    pub const fn key(&self) -> &Key {
        &self.key
    }

    #[inline]
    #[must_use]
    pub const fn is_exposed(&self) -> bool {
        self.exposed
    }

    #[inline]
    #[must_use]
    pub fn scopes(&self) -> &[ScopeMarker] {
        &self.scopes
    }

    #[inline]
    #[must_use]
    pub const fn method(&self) -> &MethodMetadata {
        &self.method
    }

    #[inline]
    #[must_use]
    pub(crate) const fn provided(&self) -> Option<fn() -> TypeMetadata> {
        self.provided
    }
}

/// Full module description: the module type's own metadata, its declared
/// dependency modules, and its provider methods.
#[derive(Clone)]
pub struct ModuleMetadata {
    type_metadata: TypeMetadata,
    dependencies: Vec<ModuleId>,
    providers: Vec<ProviderMetadata>,
}

impl ModuleMetadata {
    #[must_use]
    pub fn new(type_metadata: TypeMetadata) -> Self {
        Self {
            type_metadata,
            dependencies: Vec::new(),
            providers: Vec::new(),
        }
    }

    #[must_use]
    pub fn depends_on(mut self, module: ModuleId) -> Self {
        self.dependencies.push(module);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: ProviderMetadata) -> Self {
        self.providers.push(provider);
        self
    }

    #[inline]
    #[must_use]
    pub const fn type_metadata(&self) -> &TypeMetadata {
        &self.type_metadata
    }

    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &[ModuleId] {
        &self.dependencies
    }

    #[inline]
    #[must_use]
    pub fn providers(&self) -> &[ProviderMetadata] {
        &self.providers
    }
}

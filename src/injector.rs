use alloc::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    vec::Vec,
};
use parking_lot::Mutex;
use tracing::{debug, debug_span, error};

use crate::{
    any::TypeInfo,
    binding::Binding,
    container::Container,
    errors::{BindingErrorKind, ConstructionErrorKind, DependencyErrorKind, InjectErrorKind, ScopeErrorKind},
    instance::Instance,
    key::Key,
    metadata::{ConstructorMetadata, FieldMetadata, Injectable, MethodMetadata, ModuleId, ModuleMetadata, TypeMetadata},
    provider::provider_fn,
    scoping::{BoxedScoping, NoScoping},
};

/// Per-module resolver.
///
/// Owns the module's local bindings, performs cross-module resolution over
/// the declared dependency edges, and constructs/member-injects instances,
/// recursing into resolution for every dependency it needs. Injectors are
/// created once per module by the [`Container`] and live for the process
/// lifetime.
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

struct InjectorInner {
    container: Container,
    parent: Option<Injector>,
    module: ModuleId,
    dependencies: Vec<ModuleId>,
    // modules that declared this one as a dependency, filled as they realize
    children: Mutex<BTreeSet<ModuleId>>,
    bindings: Mutex<BTreeMap<Key, Binding>>,
    module_instance: Mutex<Instance>,
}

impl Injector {
    pub(crate) fn new(container: Container, parent: Option<Injector>, module: ModuleId, metadata: &ModuleMetadata) -> Self {
        let injector = Self {
            inner: Arc::new(InjectorInner {
                container,
                parent,
                module,
                dependencies: metadata.dependencies().to_vec(),
                children: Mutex::new(BTreeSet::new()),
                bindings: Mutex::new(BTreeMap::new()),
                module_instance: Mutex::new(Instance::absent()),
            }),
        };

        // Self-binding: the injector resolves itself, never scoped, local only
        let key = Key::of::<Injector>();
        let provider = provider_fn("injector", {
            let injector = injector.clone();
            move || Ok(Instance::new(injector.clone()))
        });
        let scoping: BoxedScoping = Arc::new(NoScoping);
        injector
            .inner
            .bindings
            .lock()
            .insert(key.clone(), Binding::new(key, false, provider, &scoping));

        injector
    }

    #[inline]
    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.inner.module
    }

    /// Resolves `key` to an instance.
    ///
    /// A source qualifier routes the lookup to the named module's injector,
    /// which must be this module or one of its declared dependencies; the
    /// lookup then searches that injector's local bindings, its parent's
    /// exposed bindings, exposed bindings of its declared dependencies
    /// (exactly one may match) and, failing those, its known child modules.
    ///
    /// # Errors
    /// - [`DependencyErrorKind::Illegal`] on an explicitly-sourced lookup
    ///   into a non-declared module
    /// - [`BindingErrorKind::NoSuchBinding`] when nothing matches
    /// - [`BindingErrorKind::MultipleBindings`] when several candidates
    ///   match (ambiguous)
    /// - Whatever the winning binding's producer fails with
    pub fn get_instance(&self, key: &Key) -> Result<Instance, InjectErrorKind> {
        let span = debug_span!("get_instance", key = %key, module = self.inner.module.type_info().short_name());
        let _guard = span.enter();

        let source = key.source_module_or(self.inner.module);
        let injector = self.inner.container.injector(source)?;
        if !self.same_module(&injector) && !self.inner.dependencies.contains(&injector.inner.module) {
            let err = DependencyErrorKind::Illegal {
                module: self.inner.module.type_info(),
                requested: injector.inner.module.type_info(),
            };
            error!("{}", err);
            return Err(err.into());
        }

        let stripped = key.without_source();
        let Some(binding) = injector.find_binding(&stripped, &mut BTreeSet::new())? else {
            let err = BindingErrorKind::NoSuchBinding { key: stripped };
            error!("{}", err);
            return Err(err.into());
        };
        debug!(binding = %binding, "Resolved");
        binding.get_instance()
    }

    /// Sugar for a qualifier-less key plus downcast.
    ///
    /// # Errors
    /// [`BindingErrorKind::IncorrectType`] when the bound instance is not a
    /// `T`, plus everything [`Self::get_instance`] fails with.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectErrorKind> {
        let instance = self.get_instance(&Key::of::<T>())?;
        match instance.downcast::<T>() {
            Some(value) => Ok(value),
            None => {
                let err = BindingErrorKind::IncorrectType {
                    expected: TypeInfo::of::<T>(),
                    actual: instance.type_id(),
                };
                error!("{}", err);
                Err(err.into())
            }
        }
    }

    /// Constructs a `T` through its selected injectable constructor.
    ///
    /// # Errors
    /// Constructor selection and resolution failures, plus
    /// [`BindingErrorKind::IncorrectType`] when the construction closure
    /// produced something other than a `T`.
    pub fn new_instance<T: Injectable>(&self, inject_members: bool) -> Result<Arc<T>, InjectErrorKind> {
        let metadata = T::metadata();
        let instance = self.new_instance_from(&metadata, inject_members)?;
        match instance.downcast::<T>() {
            Some(value) => Ok(value),
            None => {
                let err = BindingErrorKind::IncorrectType {
                    expected: TypeInfo::of::<T>(),
                    actual: instance.type_id(),
                };
                error!("{}", err);
                Err(err.into())
            }
        }
    }

    /// Constructs an instance from explicit type metadata, selecting the
    /// injectable constructor by the sole-or-explicitly-marked rule.
    ///
    /// # Errors
    /// See [`Self::new_instance_with`].
    pub fn new_instance_from(&self, metadata: &TypeMetadata, inject_members: bool) -> Result<Instance, InjectErrorKind> {
        let constructor = metadata.injectable_constructor()?;
        self.new_instance_with(metadata, constructor, inject_members)
    }

    /// Constructs an instance through an explicit constructor description,
    /// resolving one key per parameter.
    ///
    /// # Errors
    /// Resolution failures for parameter keys;
    /// [`ConstructionErrorKind::Failed`] when the construction closure
    /// reports a failure.
    pub fn new_instance_with(
        &self,
        metadata: &TypeMetadata,
        constructor: &ConstructorMetadata,
        inject_members: bool,
    ) -> Result<Instance, InjectErrorKind> {
        let arguments = self.get_instances(constructor.parameters())?;
        let instance = match constructor.construct(&arguments) {
            Ok(instance) => instance,
            Err(source) => {
                let err = ConstructionErrorKind::Failed {
                    member: constructor.name(),
                    source,
                };
                error!("{}", err);
                return Err(err.into());
            }
        };
        if inject_members {
            self.inject_members_with(&instance, metadata)?;
        }
        Ok(instance)
    }

    /// Resolves and assigns one field on `instance`.
    ///
    /// # Errors
    /// Resolution failures for the field key;
    /// [`ConstructionErrorKind::Failed`] when the assignment closure
    /// reports a failure.
    pub fn inject_field(&self, instance: &Instance, field: &FieldMetadata) -> Result<(), InjectErrorKind> {
        if instance.is_absent() {
            debug!(field = field.name(), "Absent instance, nothing to assign");
            return Ok(());
        }
        let value = self.get_instance(field.key())?;
        match field.assign(instance.clone(), value) {
            Ok(()) => Ok(()),
            Err(source) => {
                let err = ConstructionErrorKind::Failed {
                    member: field.name(),
                    source,
                };
                error!("{}", err);
                Err(err.into())
            }
        }
    }

    /// Assigns every injectable field declared by `T`'s metadata,
    /// most-base first.
    ///
    /// # Errors
    /// See [`Self::inject_field`].
    pub fn inject_fields<T: Injectable>(&self, instance: &Arc<T>) -> Result<(), InjectErrorKind> {
        self.inject_fields_with(&Instance::from_arc(instance.clone()), &T::metadata())
    }

    /// # Errors
    /// See [`Self::inject_field`].
    pub fn inject_fields_with(&self, instance: &Instance, metadata: &TypeMetadata) -> Result<(), InjectErrorKind> {
        for current in metadata.hierarchy() {
            for field in current.fields() {
                self.inject_field(instance, field)?;
            }
        }
        Ok(())
    }

    /// Resolves every parameter of `method` and invokes it on `instance`,
    /// returning the invocation result (absent for unit methods).
    ///
    /// # Errors
    /// Resolution failures for parameter keys;
    /// [`ConstructionErrorKind::Failed`] when the invocation closure
    /// reports a failure.
    pub fn inject_method(&self, instance: &Instance, method: &MethodMetadata) -> Result<Instance, InjectErrorKind> {
        if instance.is_absent() {
            debug!(method = method.name(), "Absent instance, nothing to invoke");
            return Ok(Instance::absent());
        }
        let arguments = self.get_instances(method.parameters())?;
        match method.invoke(instance.clone(), arguments) {
            Ok(result) => Ok(result),
            Err(source) => {
                let err = ConstructionErrorKind::Failed {
                    member: method.name(),
                    source,
                };
                error!("{}", err);
                Err(err.into())
            }
        }
    }

    /// Invokes every injectable method declared by `T`'s metadata,
    /// most-base first.
    ///
    /// # Errors
    /// See [`Self::inject_method`].
    pub fn inject_methods<T: Injectable>(&self, instance: &Arc<T>) -> Result<(), InjectErrorKind> {
        self.inject_methods_with(&Instance::from_arc(instance.clone()), &T::metadata())
    }

    /// # Errors
    /// See [`Self::inject_method`].
    pub fn inject_methods_with(&self, instance: &Instance, metadata: &TypeMetadata) -> Result<(), InjectErrorKind> {
        for current in metadata.hierarchy() {
            for method in current.methods() {
                self.inject_method(instance, method)?;
            }
        }
        Ok(())
    }

    /// Fields first, then methods: methods may assume fields are already
    /// populated.
    ///
    /// # Errors
    /// See [`Self::inject_field`] and [`Self::inject_method`].
    pub fn inject_members<T: Injectable>(&self, instance: &Arc<T>) -> Result<(), InjectErrorKind> {
        self.inject_members_with(&Instance::from_arc(instance.clone()), &T::metadata())
    }

    /// # Errors
    /// See [`Self::inject_field`] and [`Self::inject_method`].
    pub fn inject_members_with(&self, instance: &Instance, metadata: &TypeMetadata) -> Result<(), InjectErrorKind> {
        self.inject_fields_with(instance, metadata)?;
        self.inject_methods_with(instance, metadata)
    }

    /// Local bindings only, self-binding included.
    #[must_use]
    pub fn local_bindings(&self) -> Vec<Binding> {
        self.inner.bindings.lock().values().cloned().collect()
    }

    /// Local bindings plus, transitively, exposed bindings of declared
    /// dependency modules.
    ///
    /// # Errors
    /// Realization failures of a not-yet-realized dependency module.
    pub fn bindings(&self) -> Result<Vec<Binding>, InjectErrorKind> {
        let mut result = self.local_bindings();
        for dependency in &self.inner.dependencies {
            let injector = self.inner.container.injector(*dependency)?;
            result.extend(injector.bindings()?.into_iter().filter(Binding::is_exposed));
        }
        Ok(result)
    }
}

impl Injector {
    #[inline]
    fn same_module(&self, other: &Injector) -> bool {
        self.inner.module == other.inner.module
    }

    fn local_binding(&self, key: &Key) -> Option<Binding> {
        self.inner.bindings.lock().get(key).cloned()
    }

    /// Visited-module-guarded search: local table, then the parent's
    /// exposed bindings, then exposed local bindings of declared
    /// dependencies, then the same search across known child modules. Each
    /// module is examined at most once per top-level resolution.
    fn find_binding(&self, key: &Key, visited: &mut BTreeSet<ModuleId>) -> Result<Option<Binding>, InjectErrorKind> {
        if !visited.insert(self.inner.module) {
            return Ok(None);
        }

        if let Some(binding) = self.local_binding(key) {
            return Ok(Some(binding));
        }

        if let Some(parent) = &self.inner.parent {
            if let Some(binding) = parent.find_binding(key, &mut BTreeSet::new())? {
                if binding.is_exposed() {
                    return Ok(Some(binding));
                }
            }
        }

        let mut candidates = Vec::new();
        for dependency in &self.inner.dependencies {
            let injector = self.inner.container.injector(*dependency)?;
            if let Some(binding) = injector.local_binding(key) {
                if binding.is_exposed() {
                    candidates.push((injector.module().type_info(), binding));
                }
            }
        }
        if candidates.len() > 1 {
            let err = BindingErrorKind::MultipleBindings {
                key: key.clone(),
                modules: candidates.iter().map(|(type_info, _)| *type_info).collect(),
            };
            error!("{}", err);
            return Err(err.into());
        }
        if let Some((_, binding)) = candidates.pop() {
            return Ok(Some(binding));
        }

        let children: Vec<ModuleId> = self.inner.children.lock().iter().copied().collect();
        let mut candidates = Vec::new();
        for child in children {
            let injector = self.inner.container.injector(child)?;
            if let Some(binding) = injector.find_binding(key, visited)? {
                candidates.push((child.type_info(), binding));
            }
        }
        if candidates.len() > 1 {
            let err = BindingErrorKind::MultipleBindings {
                key: key.clone(),
                modules: candidates.iter().map(|(type_info, _)| *type_info).collect(),
            };
            error!("{}", err);
            return Err(err.into());
        }
        Ok(candidates.pop().map(|(_, binding)| binding))
    }

    fn get_instances(&self, keys: &[Key]) -> Result<Vec<Instance>, InjectErrorKind> {
        keys.iter().map(|key| self.get_instance(key)).collect()
    }

    pub(crate) fn register_child(&self, child: ModuleId) {
        self.inner.children.lock().insert(child);
    }

    /// Constructor-injects the module instance; its own provider bindings
    /// do not exist yet at this point.
    pub(crate) fn construct_module(&self, metadata: &ModuleMetadata) -> Result<(), InjectErrorKind> {
        let instance = self.new_instance_from(metadata.type_metadata(), false)?;
        *self.inner.module_instance.lock() = instance;
        Ok(())
    }

    /// Installs one binding per provider method: key from the method's
    /// declared return type and qualifiers, scoping resolved through the
    /// container's factory registry, exposed flag from the metadata.
    pub(crate) fn bind_providers(&self, metadata: &ModuleMetadata) -> Result<(), InjectErrorKind> {
        for provider in metadata.providers() {
            let key = provider.key().clone();
            if let Some(existing) = self.local_binding(&key) {
                let err = BindingErrorKind::AlreadyBound { binding: existing };
                error!("{}", err);
                return Err(err.into());
            }

            let scoping: BoxedScoping = match provider.scopes() {
                [] => Arc::new(NoScoping),
                [marker] => self.inner.container.scoping(marker)?,
                _ => {
                    let err = ScopeErrorKind::MultipleScopeMarkers { key };
                    error!("{}", err);
                    return Err(err.into());
                }
            };

            let raw = provider_fn(provider.method().name(), {
                let injector = self.clone();
                let method = provider.method().clone();
                let provided = provider.provided();
                move || {
                    let host = injector.inner.module_instance.lock().clone();
                    let produced = injector.inject_method(&host, &method)?;
                    if let Some(members) = provided {
                        injector.inject_members_with(&produced, &members())?;
                    }
                    Ok(produced)
                }
            });

            let binding = Binding::new(key.clone(), provider.is_exposed(), raw, &scoping);
            self.inner.bindings.lock().insert(key, binding);
            debug!(provider = provider.method().name(), "Bound provider");
        }
        Ok(())
    }

    /// Member injection of the module instance, after its own provider
    /// bindings were installed so they can satisfy its injection points.
    pub(crate) fn inject_module_members(&self, metadata: &ModuleMetadata) -> Result<(), InjectErrorKind> {
        let instance = self.inner.module_instance.lock().clone();
        self.inject_members_with(&instance, metadata.type_metadata())
    }
}

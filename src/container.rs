use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use core::any::TypeId;
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info_span};

use crate::{
    binding::Binding,
    errors::{DependencyErrorKind, InjectErrorKind, ScopeErrorKind},
    graph,
    injector::Injector,
    marker::{Marker, ScopeMarker, Singleton},
    metadata::{Module, ModuleId},
    registry::ScopingFactoryRegistry,
    scoping::{BoxedScoping, ScopingFactory, SingletonScopingFactory},
};

/// Process-scoped owner of the module-to-injector map and the scoping
/// factories.
///
/// Injectors are realized lazily, at most once per module identity, and
/// never removed. Realization is serialized per container; requests for an
/// already-realized injector only touch the backing map.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    scoping_factories: ScopingFactoryRegistry,
    injectors: Mutex<BTreeMap<TypeId, Injector>>,
    // only reachable while holding `realize_lock`; same-thread recursion
    // during a module's own realization resolves through here
    pending: Mutex<BTreeMap<TypeId, Injector>>,
    realize_lock: ReentrantMutex<()>,
}

pub struct ContainerBuilder {
    scoping_factories: ScopingFactoryRegistry,
}

impl ContainerBuilder {
    /// Registers the built-in singleton scoping factory first.
    #[must_use]
    pub fn new() -> Self {
        let scoping_factories = ScopingFactoryRegistry::new();
        scoping_factories
            .register::<Singleton>(Arc::new(SingletonScopingFactory))
            .expect("empty registry can't reject the built-in singleton factory");
        Self { scoping_factories }
    }

    /// Registers a scoping factory for the given marker type.
    ///
    /// # Errors
    /// - [`ScopeErrorKind::NotScopeMarker`] if the marker type is not
    ///   scope-tagged
    /// - [`ScopeErrorKind::FactoryAlreadyRegistered`] if a factory is
    ///   already registered for the marker type
    pub fn with_scoping_factory<M: Marker>(self, factory: impl ScopingFactory) -> Result<Self, ScopeErrorKind> {
        self.scoping_factories.register::<M>(Arc::new(factory))?;
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> Container {
        Container {
            inner: Arc::new(ContainerInner {
                scoping_factories: self.scoping_factories,
                injectors: Mutex::new(BTreeMap::new()),
                pending: Mutex::new(BTreeMap::new()),
                realize_lock: ReentrantMutex::new(()),
            }),
        }
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        ContainerBuilder::new().build()
    }

    /// Returns the injector for `module`, realizing it and, depth-first,
    /// its declared dependencies on first use. Idempotent.
    ///
    /// # Errors
    /// - [`DependencyErrorKind::Circular`] on a module-dependency cycle
    ///   reachable from `module`
    /// - Binding, scope and construction errors raised while constructing
    ///   the module instance, scanning its providers or injecting its
    ///   members
    pub fn injector(&self, module: ModuleId) -> Result<Injector, InjectErrorKind> {
        let type_id = module.type_info().id;
        if let Some(injector) = self.inner.injectors.lock().get(&type_id) {
            return Ok(injector.clone());
        }
        let _guard = self.inner.realize_lock.lock();
        self.realize(module)
    }

    /// Sugar: injector of a statically known module type.
    ///
    /// # Errors
    /// See [`Self::injector`].
    pub fn injector_of<M: Module>(&self) -> Result<Injector, InjectErrorKind> {
        self.injector(ModuleId::of::<M>())
    }

    /// Local bindings of every realized injector.
    #[must_use]
    pub fn bindings(&self) -> Vec<Binding> {
        self.inner
            .injectors
            .lock()
            .values()
            .flat_map(Injector::local_bindings)
            .collect()
    }

    pub(crate) fn scoping(&self, marker: &ScopeMarker) -> Result<BoxedScoping, ScopeErrorKind> {
        self.inner.scoping_factories.scoping(marker)
    }

    // Caller holds `realize_lock`; recursion re-enters it reentrantly.
    fn realize(&self, module: ModuleId) -> Result<Injector, InjectErrorKind> {
        let type_id = module.type_info().id;
        if let Some(injector) = self.inner.injectors.lock().get(&type_id) {
            return Ok(injector.clone());
        }
        if let Some(injector) = self.inner.pending.lock().get(&type_id) {
            return Ok(injector.clone());
        }

        let span = info_span!("realize", module = module.type_info().short_name());
        let _guard = span.enter();

        let dependencies_of = |id: ModuleId| id.metadata().dependencies().to_vec();
        if let Err(cycle) = graph::check_circularity(module, &dependencies_of) {
            let err = DependencyErrorKind::Circular {
                module: cycle.start.type_info(),
                via: cycle.via.type_info(),
            };
            error!("{}", err);
            return Err(err.into());
        }

        let metadata = module.metadata();
        for dependency in metadata.dependencies() {
            self.realize(*dependency)?;
        }

        debug!(depth = graph::depth(module, &dependencies_of), "Configuring injector");

        let injector = Injector::new(self.clone(), None, module, &metadata);
        for dependency in metadata.dependencies() {
            self.realize(*dependency)?.register_child(module);
        }
        self.inner.pending.lock().insert(type_id, injector.clone());

        let configured = injector
            .construct_module(&metadata)
            .and_then(|()| injector.bind_providers(&metadata))
            .and_then(|()| injector.inject_module_members(&metadata));
        self.inner.pending.lock().remove(&type_id);
        configured?;

        self.inner.injectors.lock().insert(type_id, injector.clone());
        Ok(injector)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::{
        format,
        string::{String, ToString as _},
        sync::Arc,
        vec,
        vec::Vec,
    };
    use core::sync::atomic::{AtomicU8, Ordering};
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    use super::Container;
    use crate::{
        errors::{BindingErrorKind, DependencyErrorKind, InjectErrorKind, ScopeErrorKind},
        instance::Instance,
        key::{Key, Qualifier},
        marker::{ScopeMarker, Singleton},
        metadata::{ConstructorMetadata, MethodMetadata, Module, ModuleId, ModuleMetadata, ProviderMetadata, TypeMetadata},
    };

    fn nullary<M: Module + Default>(type_metadata: TypeMetadata) -> TypeMetadata {
        type_metadata.constructor(ConstructorMetadata::new("new", Vec::new(), |_| Ok(Instance::new(M::default()))))
    }

    fn provides_str(name: &'static str, value: &'static str) -> ProviderMetadata {
        ProviderMetadata::new(
            Key::of::<String>(),
            MethodMetadata::new(name, Vec::new(), move |_, _| Ok(Instance::new(value.to_string()))),
        )
    }

    #[derive(Default)]
    struct ModuleA;

    impl Module for ModuleA {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).provider(provides_str("get_string", "A").exposed())
        }
    }

    #[derive(Default)]
    struct ModuleB;

    impl Module for ModuleB {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).provider(provides_str("get_string", "B").exposed())
        }
    }

    #[derive(Clone)]
    struct Seen(String);

    struct ModuleChain {
        seen: Mutex<Option<Arc<String>>>,
    }

    impl Default for ModuleChain {
        fn default() -> Self {
            Self {
                seen: Mutex::new(None),
            }
        }
    }

    impl Module for ModuleChain {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>()).method(MethodMetadata::new(
                "accept_string",
                vec![Key::of::<String>()],
                |host, arguments| {
                    let module = host.downcast::<ModuleChain>().ok_or_else(|| anyhow::anyhow!("not a ModuleChain"))?;
                    *module.seen.lock() = arguments[0].downcast::<String>();
                    Ok(Instance::absent())
                },
            )))
            .depends_on(ModuleId::of::<ModuleA>())
            .provider(ProviderMetadata::new(
                Key::of::<Seen>(),
                MethodMetadata::new("seen_string", Vec::new(), |host, _| {
                    let module = host.downcast::<ModuleChain>().ok_or_else(|| anyhow::anyhow!("not a ModuleChain"))?;
                    let seen = module.seen.lock().clone().ok_or_else(|| anyhow::anyhow!("not injected yet"))?;
                    Ok(Instance::new(Seen((*seen).clone())))
                }),
            ))
        }
    }

    #[test]
    #[traced_test]
    fn test_linear_chain() {
        let container = Container::new();
        let injector = container.injector_of::<ModuleChain>().unwrap();

        // exposed binding of the declared dependency
        assert_eq!(*injector.get::<String>().unwrap(), "A");
        // member injection of the module instance saw the same value
        assert_eq!(injector.get::<Seen>().unwrap().0, "A");
    }

    #[derive(Default)]
    struct ModuleBoth;

    impl Module for ModuleBoth {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>()))
                .depends_on(ModuleId::of::<ModuleA>())
                .depends_on(ModuleId::of::<ModuleB>())
        }
    }

    #[test]
    #[traced_test]
    fn test_source_routing() {
        let container = Container::new();
        let injector = container.injector_of::<ModuleBoth>().unwrap();

        let from_a = injector
            .get_instance(&Key::of::<String>().with_qualifier(Qualifier::source::<ModuleA>()))
            .unwrap();
        assert_eq!(*from_a.downcast::<String>().unwrap(), "A");

        let from_b = injector
            .get_instance(&Key::of::<String>().with_qualifier(Qualifier::source::<ModuleB>()))
            .unwrap();
        assert_eq!(*from_b.downcast::<String>().unwrap(), "B");
    }

    #[test]
    #[traced_test]
    fn test_unqualified_is_ambiguous() {
        let container = Container::new();
        let injector = container.injector_of::<ModuleBoth>().unwrap();

        assert!(matches!(
            injector.get::<String>(),
            Err(InjectErrorKind::Binding(BindingErrorKind::MultipleBindings { .. })),
        ));
    }

    #[derive(Default)]
    struct ModuleD;

    impl Module for ModuleD {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).provider(provides_str("get_string", "D").exposed())
        }
    }

    #[derive(Default)]
    struct ModuleE;

    impl Module for ModuleE {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).depends_on(ModuleId::of::<ModuleD>())
        }
    }

    #[derive(Default)]
    struct ModuleF;

    impl Module for ModuleF {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>()).method(MethodMetadata::new(
                "run_it",
                vec![Key::of::<String>().with_qualifier(Qualifier::source::<ModuleD>())],
                |_, _| Ok(Instance::absent()),
            )))
            .depends_on(ModuleId::of::<ModuleE>())
        }
    }

    #[test]
    #[traced_test]
    fn test_illegal_source_fails() {
        let container = Container::new();

        assert!(matches!(
            container.injector_of::<ModuleF>(),
            Err(InjectErrorKind::Dependency(DependencyErrorKind::Illegal { .. })),
        ));
    }

    #[derive(Default)]
    struct ModuleCycleA;

    impl Module for ModuleCycleA {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).depends_on(ModuleId::of::<ModuleCycleB>())
        }
    }

    #[derive(Default)]
    struct ModuleCycleB;

    impl Module for ModuleCycleB {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).depends_on(ModuleId::of::<ModuleCycleA>())
        }
    }

    #[derive(Default)]
    struct ModuleSelfCycle;

    impl Module for ModuleSelfCycle {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).depends_on(ModuleId::of::<ModuleSelfCycle>())
        }
    }

    #[test]
    #[traced_test]
    fn test_circular_fails() {
        let container = Container::new();

        assert!(matches!(
            container.injector_of::<ModuleCycleA>(),
            Err(InjectErrorKind::Dependency(DependencyErrorKind::Circular { .. })),
        ));
    }

    #[test]
    #[traced_test]
    fn test_self_circular_fails() {
        let container = Container::new();

        assert!(matches!(
            container.injector_of::<ModuleSelfCycle>(),
            Err(InjectErrorKind::Dependency(DependencyErrorKind::Circular { .. })),
        ));
    }

    #[test]
    #[traced_test]
    fn test_non_circular_succeeds() {
        let container = Container::new();

        assert!(container.injector_of::<ModuleE>().is_ok());
    }

    #[derive(Default)]
    struct ModuleHidden;

    impl Module for ModuleHidden {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).provider(provides_str("get_string", "hidden"))
        }
    }

    #[derive(Default)]
    struct ModuleDependsHidden;

    impl Module for ModuleDependsHidden {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).depends_on(ModuleId::of::<ModuleHidden>())
        }
    }

    #[test]
    #[traced_test]
    fn test_exposure_gating() {
        let container = Container::new();

        // invisible to the dependent module
        let dependent = container.injector_of::<ModuleDependsHidden>().unwrap();
        assert!(matches!(
            dependent.get::<String>(),
            Err(InjectErrorKind::Binding(BindingErrorKind::NoSuchBinding { .. })),
        ));

        // still resolvable within the owning module
        let owner = container.injector_of::<ModuleHidden>().unwrap();
        assert_eq!(*owner.get::<String>().unwrap(), "hidden");
    }

    static SINGLETON_CALL_COUNT: AtomicU8 = AtomicU8::new(0);
    static TRANSIENT_CALL_COUNT: AtomicU8 = AtomicU8::new(0);

    struct Produced;

    #[derive(Default)]
    struct ModuleScoped;

    impl Module for ModuleScoped {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>()))
                .provider(
                    ProviderMetadata::new(
                        Key::of::<Produced>(),
                        MethodMetadata::new("cached", Vec::new(), |_, _| {
                            SINGLETON_CALL_COUNT.fetch_add(1, Ordering::SeqCst);
                            Ok(Instance::new(Produced))
                        }),
                    )
                    .scoped(ScopeMarker::new(Singleton)),
                )
                .provider(ProviderMetadata::new(
                    Key::of::<u32>(),
                    MethodMetadata::new("fresh", Vec::new(), |_, _| {
                        TRANSIENT_CALL_COUNT.fetch_add(1, Ordering::SeqCst);
                        Ok(Instance::new(0_u32))
                    }),
                ))
        }
    }

    #[test]
    #[traced_test]
    fn test_singleton_idempotence() {
        let container = Container::new();
        let injector = container.injector_of::<ModuleScoped>().unwrap();

        let first = injector.get::<Produced>().unwrap();
        let second = injector.get::<Produced>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(SINGLETON_CALL_COUNT.load(Ordering::SeqCst), 1);

        let _ = injector.get::<u32>().unwrap();
        let _ = injector.get::<u32>().unwrap();
        assert_eq!(TRANSIENT_CALL_COUNT.load(Ordering::SeqCst), 2);
    }

    #[derive(Default)]
    struct ModuleDuplicate;

    impl Module for ModuleDuplicate {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>()))
                .provider(provides_str("get_string", "first"))
                .provider(provides_str("get_string_again", "second"))
        }
    }

    #[test]
    #[traced_test]
    fn test_duplicate_binding_fails() {
        let container = Container::new();

        assert!(matches!(
            container.injector_of::<ModuleDuplicate>(),
            Err(InjectErrorKind::Binding(BindingErrorKind::AlreadyBound { .. })),
        ));
    }

    #[derive(Default)]
    struct ModuleDoubleScoped;

    impl Module for ModuleDoubleScoped {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>())).provider(
                provides_str("get_string", "twice")
                    .scoped(ScopeMarker::new(Singleton))
                    .scoped(ScopeMarker::new(Singleton)),
            )
        }
    }

    #[test]
    #[traced_test]
    fn test_multiple_scope_markers_fail() {
        let container = Container::new();

        assert!(matches!(
            container.injector_of::<ModuleDoubleScoped>(),
            Err(InjectErrorKind::Scope(ScopeErrorKind::MultipleScopeMarkers { .. })),
        ));
    }

    #[test]
    #[traced_test]
    fn test_bindings_are_transitive() {
        let container = Container::new();
        let injector = container.injector_of::<ModuleChain>().unwrap();

        let bindings = injector.bindings().unwrap();
        // own Seen provider and ModuleA's exposed String, self-bindings aside
        assert!(bindings.iter().any(|binding| *binding.key() == Key::of::<Seen>()));
        assert!(bindings
            .iter()
            .any(|binding| *binding.key() == Key::of::<String>() && binding.is_exposed()));

        let local = injector.local_bindings();
        assert!(local.iter().all(|binding| *binding.key() != Key::of::<String>()));

        // the container-wide view covers both realized injectors
        assert!(container.bindings().len() >= local.len() + 1);
    }

    struct Gadget {
        seen: Mutex<Option<Arc<String>>>,
    }

    impl crate::metadata::Injectable for Gadget {
        fn metadata() -> TypeMetadata {
            TypeMetadata::new::<Self>().method(MethodMetadata::new(
                "accept_string",
                vec![Key::of::<String>()],
                |host, arguments| {
                    let gadget = host.downcast::<Gadget>().ok_or_else(|| anyhow::anyhow!("not a Gadget"))?;
                    *gadget.seen.lock() = arguments[0].downcast::<String>();
                    Ok(Instance::absent())
                },
            ))
        }
    }

    #[derive(Default)]
    struct ModuleGadget;

    impl Module for ModuleGadget {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(nullary::<Self>(TypeMetadata::new::<Self>()))
                .depends_on(ModuleId::of::<ModuleA>())
                .provider(
                    ProviderMetadata::new(
                        Key::of::<Gadget>(),
                        MethodMetadata::new("get_gadget", Vec::new(), |_, _| {
                            Ok(Instance::new(Gadget {
                                seen: Mutex::new(None),
                            }))
                        }),
                    )
                    .provided_members(<Gadget as crate::metadata::Injectable>::metadata),
                )
        }
    }

    #[test]
    #[traced_test]
    fn test_provided_value_is_member_injected() {
        let container = Container::new();
        let injector = container.injector_of::<ModuleGadget>().unwrap();

        let gadget = injector.get::<Gadget>().unwrap();
        assert_eq!(**gadget.seen.lock().as_ref().unwrap(), "A");
    }

    static REALIZE_CALL_COUNT: AtomicU8 = AtomicU8::new(0);

    struct Shared;

    struct ModuleConcurrent;

    impl Module for ModuleConcurrent {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new(TypeMetadata::new::<Self>().constructor(ConstructorMetadata::new("new", Vec::new(), |_| {
                REALIZE_CALL_COUNT.fetch_add(1, Ordering::SeqCst);
                Ok(Instance::new(ModuleConcurrent))
            })))
            .provider(
                ProviderMetadata::new(
                    Key::of::<Shared>(),
                    MethodMetadata::new("shared", Vec::new(), |_, _| Ok(Instance::new(Shared))),
                )
                .scoped(ScopeMarker::new(Singleton)),
            )
        }
    }

    #[test]
    #[traced_test]
    fn test_concurrent_first_use() {
        let container = Container::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = container.clone();
                std::thread::spawn(move || {
                    let injector = container.injector_of::<ModuleConcurrent>().unwrap();
                    injector.get::<Shared>().unwrap()
                })
            })
            .collect();
        let values: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

        // the injector was realized exactly once, and every caller observed
        // the same cached value
        assert_eq!(REALIZE_CALL_COUNT.load(Ordering::SeqCst), 1);
        for value in &values {
            assert!(Arc::ptr_eq(value, &values[0]));
        }
    }
}

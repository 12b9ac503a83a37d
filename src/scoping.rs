use alloc::sync::Arc;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    instance::Instance,
    marker::ScopeMarker,
    provider::{provider_fn, BoxedCloneProvider},
};

/// Caching/lifetime policy wrapped around a binding's producer.
///
/// Wrapping happens once, when the binding is created; the container only
/// ever invokes the wrapped form.
pub trait Scoping: Send + Sync + 'static {
    #[must_use]
    fn name(&self) -> &'static str;

    #[must_use]
    fn scope(&self, provider: BoxedCloneProvider) -> BoxedCloneProvider;
}

pub(crate) type BoxedScoping = Arc<dyn Scoping>;

/// Pass-through policy: every call re-invokes the producer.
pub struct NoScoping;

impl Scoping for NoScoping {
    #[inline]
    fn name(&self) -> &'static str {
        "no_scope"
    }

    #[inline]
    fn scope(&self, provider: BoxedCloneProvider) -> BoxedCloneProvider {
        provider
    }
}

/// Memoize-once policy.
///
/// The first successfully produced instance, including an absent one, is
/// cached forever. The producer runs outside the cache lock, so racing
/// first callers may each invoke it, but the first stored result wins and
/// late finishers discard their own result and return the winner. This is
/// a relaxed at-most-once guarantee: producers with externally visible
/// side effects may run more than once under contention. Errors are never
/// cached.
pub struct SingletonScoping;

impl Scoping for SingletonScoping {
    #[inline]
    fn name(&self) -> &'static str {
        "singleton"
    }

    fn scope(&self, provider: BoxedCloneProvider) -> BoxedCloneProvider {
        let cell: Arc<Mutex<Option<Instance>>> = Arc::new(Mutex::new(None));
        provider_fn(provider.name(), move || {
            if let Some(cached) = cell.lock().clone() {
                debug!("Found in singleton cache");
                return Ok(cached);
            }
            let produced = provider.call()?;
            let mut guard = cell.lock();
            Ok(guard.get_or_insert(produced).clone())
        })
    }
}

/// Builds a [`Scoping`] from a concrete scope-marker value.
pub trait ScopingFactory: Send + Sync + 'static {
    /// # Errors
    /// Opaque failures are wrapped by the registry with the marker context.
    fn scoping(&self, marker: &ScopeMarker) -> anyhow::Result<Arc<dyn Scoping>>;
}

pub struct SingletonScopingFactory;

impl ScopingFactory for SingletonScopingFactory {
    fn scoping(&self, _marker: &ScopeMarker) -> anyhow::Result<Arc<dyn Scoping>> {
        Ok(Arc::new(SingletonScoping))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU8, Ordering};

    use super::{NoScoping, Scoping, SingletonScoping};
    use crate::{errors::InjectErrorKind, instance::Instance, key::Key, provider::provider_fn};

    #[test]
    fn test_no_scope_reinvokes() {
        let call_count = Arc::new(AtomicU8::new(0));
        let provider = provider_fn("value", {
            let call_count = call_count.clone();
            move || {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok(Instance::new(1_u8))
            }
        });

        let scoped = NoScoping.scope(provider);
        let _ = scoped.call().unwrap();
        let _ = scoped.call().unwrap();

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singleton_caches_first_value() {
        let call_count = Arc::new(AtomicU8::new(0));
        let provider = provider_fn("value", {
            let call_count = call_count.clone();
            move || {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok(Instance::new(1_u8))
            }
        });

        let scoped = SingletonScoping.scope(provider);
        let first = scoped.call().unwrap().downcast::<u8>().unwrap();
        let second = scoped.call().unwrap().downcast::<u8>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_singleton_caches_absent_value() {
        let call_count = Arc::new(AtomicU8::new(0));
        let provider = provider_fn("value", {
            let call_count = call_count.clone();
            move || {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok(Instance::absent())
            }
        });

        let scoped = SingletonScoping.scope(provider);
        assert!(scoped.call().unwrap().is_absent());
        assert!(scoped.call().unwrap().is_absent());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_singleton_does_not_cache_errors() {
        let call_count = Arc::new(AtomicU8::new(0));
        let provider = provider_fn("value", {
            let call_count = call_count.clone();
            move || {
                if call_count.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(InjectErrorKind::Binding(crate::errors::BindingErrorKind::NoSuchBinding {
                        key: Key::of::<u8>(),
                    }))
                } else {
                    Ok(Instance::new(1_u8))
                }
            }
        });

        let scoped = SingletonScoping.scope(provider);
        assert!(scoped.call().is_err());
        assert!(scoped.call().is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singleton_concurrent_first_use() {
        let provider = provider_fn("value", || Ok(Instance::new(1_u8)));
        let scoped = SingletonScoping.scope(provider);

        let handles: alloc::vec::Vec<_> = (0..8)
            .map(|_| {
                let scoped = scoped.clone();
                std::thread::spawn(move || scoped.call().unwrap().downcast::<u8>().unwrap())
            })
            .collect();
        let values: alloc::vec::Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

        for value in &values {
            assert!(Arc::ptr_eq(value, &values[0]));
        }
    }
}

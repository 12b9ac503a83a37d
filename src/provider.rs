use alloc::sync::Arc;

use crate::{errors::InjectErrorKind, instance::Instance};

/// Shared zero-argument producer behind every binding.
///
/// Providers are invoked only through their scoped form once installed in a
/// binding, and may be re-entered concurrently.
#[derive(Clone)]
pub struct BoxedCloneProvider {
    name: &'static str,
    f: Arc<dyn Fn() -> Result<Instance, InjectErrorKind> + Send + Sync>,
}

impl BoxedCloneProvider {
    /// Producer identity, for diagnostics only.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// # Errors
    /// Whatever the underlying producer fails with.
    #[inline]
    pub fn call(&self) -> Result<Instance, InjectErrorKind> {
        (self.f)()
    }
}

#[inline]
#[must_use]
pub fn provider_fn<F>(name: &'static str, f: F) -> BoxedCloneProvider
where
    F: Fn() -> Result<Instance, InjectErrorKind> + Send + Sync + 'static,
{
    BoxedCloneProvider { name, f: Arc::new(f) }
}

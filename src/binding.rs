use core::fmt::{self, Debug, Display, Formatter};

use crate::{
    errors::InjectErrorKind,
    instance::Instance,
    key::Key,
    provider::BoxedCloneProvider,
    scoping::BoxedScoping,
};

/// Immutable association of a [`Key`] with a producer, a scoping and an
/// exposed flag.
///
/// The raw producer is wrapped with the scoping at construction; instances
/// are only ever obtained through the scoped form.
#[derive(Clone)]
pub struct Binding {
    key: Key,
    exposed: bool,
    provider_name: &'static str,
    scoping_name: &'static str,
    scoped_provider: BoxedCloneProvider,
}

impl Binding {
    #[must_use]
    pub(crate) fn new(key: Key, exposed: bool, provider: BoxedCloneProvider, scoping: &BoxedScoping) -> Self {
        let provider_name = provider.name();
        Self {
            key,
            exposed,
            provider_name,
            scoping_name: scoping.name(),
            scoped_provider: scoping.scope(provider),
        }
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

    /// Producer identity, for diagnostics only.
    #[inline]
    #[must_use]
    pub const fn provider_name(&self) -> &'static str {
        self.provider_name
    }

    /// Scoping identity, for diagnostics only.
    #[inline]
    #[must_use]
    pub const fn scoping_name(&self) -> &'static str {
        self.scoping_name
    }

    pub(crate) fn get_instance(&self) -> Result<Instance, InjectErrorKind> {
        self.scoped_provider.call()
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Binding {{ key: {}, exposed: {}, provider: {}, scope: {} }}",
            self.key, self.exposed, self.provider_name, self.scoping_name,
        )
    }
}

impl Debug for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("exposed", &self.exposed)
            .field("provider", &self.provider_name)
            .field("scope", &self.scoping_name)
            .finish()
    }
}

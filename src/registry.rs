use alloc::{collections::BTreeMap, sync::Arc};
use core::any::TypeId;
use parking_lot::Mutex;
use tracing::error;

use crate::{
    errors::ScopeErrorKind,
    marker::{Marker, ScopeMarker},
    scoping::{BoxedScoping, ScopingFactory},
};

/// Scope-marker-type keyed table of scoping factories.
pub(crate) struct ScopingFactoryRegistry {
    factories: Mutex<BTreeMap<TypeId, Arc<dyn ScopingFactory>>>,
}

impl ScopingFactoryRegistry {
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            factories: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn register<M: Marker>(&self, factory: Arc<dyn ScopingFactory>) -> Result<(), ScopeErrorKind> {
        use alloc::collections::btree_map::Entry::{Occupied, Vacant};

        let type_info = M::type_info();
        if !M::IS_SCOPE {
            let err = ScopeErrorKind::NotScopeMarker { marker: type_info };
            error!("{}", err);
            return Err(err);
        }
        match self.factories.lock().entry(type_info.id) {
            Occupied(_) => {
                let err = ScopeErrorKind::FactoryAlreadyRegistered { marker: type_info };
                error!("{}", err);
                Err(err)
            }
            Vacant(entry) => {
                entry.insert(factory);
                Ok(())
            }
        }
    }

    /// Resolves `marker` to a concrete scoping through its registered
    /// factory.
    pub(crate) fn scoping(&self, marker: &ScopeMarker) -> Result<BoxedScoping, ScopeErrorKind> {
        let type_info = marker.type_info();
        if !marker.is_scope() {
            let err = ScopeErrorKind::NotScopeMarker { marker: type_info };
            error!("{}", err);
            return Err(err);
        }
        let Some(factory) = self.factories.lock().get(&type_info.id).cloned() else {
            let err = ScopeErrorKind::NoSuchFactory { marker: type_info };
            error!("{}", err);
            return Err(err);
        };
        match factory.scoping(marker) {
            Ok(scoping) => Ok(scoping),
            Err(source) => {
                let err = ScopeErrorKind::Factory {
                    marker: type_info,
                    source,
                };
                error!("{}", err);
                Err(err)
            }
        }
    }
}

use alloc::sync::Arc;

use crate::any::{RcAny, TypeInfo};

/// Declares a marker type used in binding metadata.
///
/// Implementing this with [`Marker::IS_SCOPE`] set is the explicit
/// counterpart of tagging an annotation type as a scope marker; the
/// scoping-factory registry refuses markers that are not scope-tagged.
pub trait Marker: Send + Sync + 'static {
    /// Whether the marker is recognized as a scope marker.
    const IS_SCOPE: bool;

    #[inline]
    #[must_use]
    fn type_info() -> TypeInfo {
        TypeInfo::of::<Self>()
    }
}

/// Built-in scope marker: memoize the first produced value forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct Singleton;

impl Marker for Singleton {
    const IS_SCOPE: bool = true;
}

/// A concrete scope-marker value attached to a provider method.
///
/// Carries the marker type identity for factory lookup and an opaque
/// payload the owning factory can downcast back with [`ScopeMarker::value`].
#[derive(Clone)]
pub struct ScopeMarker {
    type_info: TypeInfo,
    is_scope: bool,
    value: RcAny,
}

impl ScopeMarker {
    #[must_use]
    pub fn new<M: Marker>(value: M) -> Self {
        Self {
            type_info: M::type_info(),
            is_scope: M::IS_SCOPE,
            value: Arc::new(value),
        }
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub(crate) const fn is_scope(&self) -> bool {
        self.is_scope
    }

    /// Marker payload, downcast by the owning scoping factory.
    #[must_use]
    pub fn value<M: Marker>(&self) -> Option<Arc<M>> {
        self.value.clone().downcast().ok()
    }
}

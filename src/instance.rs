use alloc::sync::Arc;
use core::any::TypeId;

use crate::any::RcAny;

/// An untyped value produced by a provider.
///
/// A legitimate produced value may be absent: [`Instance::absent`] is a
/// first-class result, cached by singleton scoping like any other value.
#[derive(Clone)]
pub struct Instance {
    value: Option<RcAny>,
}

impl Instance {
    #[inline]
    #[must_use]
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Some(Arc::new(value)),
        }
    }

    #[inline]
    #[must_use]
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self { value: Some(value) }
    }

    #[inline]
    #[must_use]
    pub const fn absent() -> Self {
        Self { value: None }
    }

    #[inline]
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    #[must_use]
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.as_ref().and_then(|value| value.clone().downcast().ok())
    }

    #[inline]
    #[must_use]
    pub(crate) fn type_id(&self) -> Option<TypeId> {
        self.value.as_ref().map(|value| (**value).type_id())
    }
}

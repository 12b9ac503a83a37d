use alloc::{borrow::Cow, collections::BTreeSet, vec::Vec};
use core::fmt::{self, Display, Formatter};

use crate::{
    any::TypeInfo,
    metadata::{Module, ModuleId},
};

/// Raw-type stand-in for a wildcard/bounded type parameter.
///
/// A wildcard descriptor carries its `[lower, upper]` bound pair as the
/// argument list of this marker type.
struct WildcardMarker;

/// Normalized, value-comparable description of a type shape: a raw type
/// identity plus the ordered descriptors of its generic arguments.
///
/// Equality and ordering are structural, so two independently built
/// descriptors of the same shape compare equal. Immutable after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeDescriptor {
    raw: TypeInfo,
    arguments: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            raw: TypeInfo::of::<T>(),
            arguments: Vec::new(),
        }
    }

    /// Descriptor with explicit generic arguments, for shapes the caller
    /// describes beyond the reified raw type.
    #[must_use]
    pub fn parameterized<T>(arguments: impl IntoIterator<Item = TypeDescriptor>) -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            raw: TypeInfo::of::<T>(),
            arguments: arguments.into_iter().collect(),
        }
    }

    /// Wildcard descriptor bounded by `lower` and `upper`.
    #[must_use]
    pub fn wildcard(lower: TypeDescriptor, upper: TypeDescriptor) -> Self {
        Self {
            raw: TypeInfo::of::<WildcardMarker>(),
            arguments: Vec::from([lower, upper]),
        }
    }

    #[inline]
    #[must_use]
    pub const fn raw(&self) -> TypeInfo {
        self.raw
    }

    #[inline]
    #[must_use]
    pub fn arguments(&self) -> &[TypeDescriptor] {
        &self.arguments
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw.short_name())?;
        if let Some((first, rest)) = self.arguments.split_first() {
            write!(f, "[{first}")?;
            for argument in rest {
                write!(f, ", {argument}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// Opaque selector token attached to an injection site.
///
/// [`Qualifier::Source`] is a routing directive, not a true type
/// distinguisher: it names the module whose injector must perform the
/// lookup and is stripped before the binding-table search.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Qualifier {
    /// Parameterless marker qualifier.
    Marker(TypeInfo),
    /// Value-carrying qualifier.
    Named(Cow<'static, str>),
    /// Resolve from the given module's injector.
    Source(ModuleId),
}

impl Qualifier {
    #[inline]
    #[must_use]
    pub fn marker<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self::Marker(TypeInfo::of::<T>())
    }

    #[inline]
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    #[inline]
    #[must_use]
    pub fn source<M: Module>() -> Self {
        Self::Source(ModuleId::of::<M>())
    }
}

impl Display for Qualifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Marker(marker) => write!(f, "@{}", marker.short_name()),
            Qualifier::Named(name) => write!(f, "@Named({name:?})"),
            Qualifier::Source(module) => write!(f, "@Source({})", module.type_info().short_name()),
        }
    }
}

/// Identity of an injectable value: a type shape plus a set of qualifiers.
///
/// Qualifiers form a set, so equality ignores insertion order while staying
/// sensitive to their values. The primary map key throughout the container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    descriptor: TypeDescriptor,
    qualifiers: BTreeSet<Qualifier>,
}

impl Key {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self::new(TypeDescriptor::of::<T>())
    }

    #[inline]
    #[must_use]
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor,
            qualifiers: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }

    #[must_use]
    pub fn with_qualifiers(mut self, qualifiers: impl IntoIterator<Item = Qualifier>) -> Self {
        self.qualifiers.extend(qualifiers);
        self
    }

    #[inline]
    #[must_use]
    pub const fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    #[inline]
    #[must_use]
    pub const fn qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.qualifiers
    }

    /// Copy of this key with any source qualifier removed, the form used
    /// for the actual binding-table lookup.
    #[must_use]
    pub fn without_source(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            qualifiers: self
                .qualifiers
                .iter()
                .filter(|qualifier| !matches!(qualifier, Qualifier::Source(_)))
                .cloned()
                .collect(),
        }
    }

    /// Module named by a source qualifier, else `default`. Decides which
    /// injector performs the lookup.
    #[must_use]
    pub fn source_module_or(&self, default: ModuleId) -> ModuleId {
        for qualifier in &self.qualifiers {
            if let Qualifier::Source(module) = qualifier {
                return *module;
            }
        }
        default
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)?;
        for qualifier in &self.qualifiers {
            write!(f, " {qualifier}")?;
        }
        Ok(())
    }
}

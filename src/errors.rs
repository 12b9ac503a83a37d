mod binding;
mod construction;
mod dependency;
mod scope;

pub use binding::BindingErrorKind;
pub use construction::ConstructionErrorKind;
pub use dependency::DependencyErrorKind;
pub use scope::ScopeErrorKind;

/// Umbrella error surfaced by the resolution and construction entry
/// points. Every failure is immediate and aborts the in-progress chain.
#[derive(thiserror::Error, Debug)]
pub enum InjectErrorKind {
    #[error(transparent)]
    Dependency(#[from] DependencyErrorKind),
    #[error(transparent)]
    Binding(#[from] BindingErrorKind),
    #[error(transparent)]
    Scope(#[from] ScopeErrorKind),
    #[error(transparent)]
    Construction(#[from] ConstructionErrorKind),
}

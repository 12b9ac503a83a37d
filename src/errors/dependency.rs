use crate::any::TypeInfo;

#[derive(thiserror::Error, Debug)]
pub enum DependencyErrorKind {
    #[error("Circular module dependency: {} <-> {}", module.name, via.name)]
    Circular { module: TypeInfo, via: TypeInfo },
    #[error("Illegal dependency: {} is not declared as a dependency of {}", requested.name, module.name)]
    Illegal { module: TypeInfo, requested: TypeInfo },
}

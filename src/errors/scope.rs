use crate::{any::TypeInfo, key::Key};

#[derive(thiserror::Error, Debug)]
pub enum ScopeErrorKind {
    #[error("{} is not recognized as a scope marker", marker.name)]
    NotScopeMarker { marker: TypeInfo },
    #[error("Scoping factory already registered for {}", marker.name)]
    FactoryAlreadyRegistered { marker: TypeInfo },
    #[error("No scoping factory registered for {}", marker.name)]
    NoSuchFactory { marker: TypeInfo },
    #[error("Multiple scope markers on provider for {key}")]
    MultipleScopeMarkers { key: Key },
    #[error("Unhandled failure in scoping factory for {}: {source}", marker.name)]
    Factory {
        marker: TypeInfo,
        #[source]
        source: anyhow::Error,
    },
}

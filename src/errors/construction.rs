use crate::any::TypeInfo;

#[derive(thiserror::Error, Debug)]
pub enum ConstructionErrorKind {
    #[error("{} has no constructors", type_info.name)]
    NoConstructors { type_info: TypeInfo },
    #[error("{} has several constructors of which none is marked injectable", type_info.name)]
    NoInjectableConstructor { type_info: TypeInfo },
    #[error("{} has several constructors marked injectable", type_info.name)]
    MultipleInjectableConstructors { type_info: TypeInfo },
    #[error("Failed to construct, assign or invoke {member}: {source}")]
    Failed {
        member: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

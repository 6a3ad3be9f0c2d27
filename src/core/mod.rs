// Schema-less engine: node capabilities, path navigation, indexing, type resolution.
pub mod convert;
pub mod error;
pub mod graph;
pub mod inspect;
pub mod mutate;
pub mod path;
pub mod registry;
pub mod typeres;

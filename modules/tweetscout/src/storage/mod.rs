//! Storage collaborators: where written artifacts are uploaded and how they
//! are registered.

mod catalog;
mod local;

pub use catalog::CatalogGateway;
pub use local::LocalRepository;

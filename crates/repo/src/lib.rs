pub mod context;
pub mod entity;
pub mod handler;
pub mod handlers;
pub mod projects;
pub mod registry;
pub mod splits;

pub use context::HandlerContext;
pub use entity::{Baseline, EntityRepository};
pub use handler::{Handler, HandlerRegistry};
pub use registry::RepositoryRegistry;

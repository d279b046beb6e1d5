pub mod handler_registry;
pub mod handlers;
pub mod worker_pool;

pub use handler_registry::{CommandHandler, HandlerContext, HandlerRegistry};
pub use handlers::{build_registry, HandlerDeps};
pub use worker_pool::{WorkerPool, WorkerPoolStats};

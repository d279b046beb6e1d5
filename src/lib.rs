pub mod app;
pub mod shutdown;

pub use app::{Application, Collaborators};
pub use shutdown::ShutdownManager;

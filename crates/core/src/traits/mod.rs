pub mod analyzer;
pub mod calendar;
pub mod clock;
pub mod command_sink;
pub mod notifier;
pub mod repository;

pub use analyzer::*;
pub use calendar::*;
pub use clock::*;
pub use command_sink::*;
pub use notifier::*;
pub use repository::*;

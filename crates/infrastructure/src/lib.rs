pub mod analyzer_client;
pub mod calendar;
pub mod circuit_breaker;
pub mod command_queue;
pub mod notifier;
pub mod report_store;
pub mod resilience;
pub mod retry;
pub mod timeout_handler;

pub use analyzer_client::HttpReportAnalyzer;
pub use calendar::WeekendCalendar;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use command_queue::{CommandQueue, QueueStats};
pub use notifier::LoggingNotifier;
pub use report_store::InMemoryReportStore;
pub use resilience::ResiliencePipeline;
pub use retry::{AttemptError, RetryPolicy};
pub use timeout_handler::TimeoutHandler;

pub mod analyzer_observability;
pub mod app_config;
pub mod queue_worker;
pub mod resilience;
pub mod schedule;
pub mod sweeper;

// Re-export main types for easier imports
pub use analyzer_observability::{AnalyzerConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use queue_worker::QueueConfig;
pub use resilience::ResilienceConfig;
pub use schedule::{local_to_utc, PeriodDeadlines, ScheduleConfig};
pub use sweeper::SweeperConfig;

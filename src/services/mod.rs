pub mod adapters;
pub mod health_checker;
pub mod provider_registry;
pub mod router;
pub mod telemetry;
pub mod unified_api;
pub mod usage_stats;

pub use adapters::{
    AdapterRegistry, AnthropicAdapter, OpenAiCompatibleAdapter, ProviderAdapter, SimulatedAdapter,
};
pub use health_checker::HealthChecker;
pub use provider_registry::ProviderRegistry;
pub use router::select_provider;
pub use telemetry::{InMemoryTelemetry, RecordedEvents, SqliteTelemetry, TelemetrySink};
pub use unified_api::{spawn_health_monitor, RouterState, UnifiedApi};
pub use usage_stats::compute_statistics;

pub mod app;

pub use app::AppConfig;
pub use app::Environment;
pub use app::LogFormat;
pub use app::DatabaseConfig;
pub use app::ServerConfig;
pub use app::TelemetryBackend;
pub use app::TelemetryConfig;
pub use app::AdapterConfig;
pub use app::AdapterMode;
pub use app::HealthCheckConfig;
pub use app::ApiProviderConfig;
pub use app::RouterBootstrap;

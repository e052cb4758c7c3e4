use std::sync::Arc;
use std::time::Duration;

use api_router::{
    config::{AdapterMode, AppConfig, LogFormat, RouterBootstrap, TelemetryBackend},
    database::initialize_database,
    routes::build_app,
    services::{
        spawn_health_monitor, AdapterRegistry, HealthChecker, InMemoryTelemetry, ProviderRegistry,
        RouterState, SqliteTelemetry, TelemetrySink, UnifiedApi,
    },
};
use reqwest::Client;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.server.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    let config = AppConfig::from_env()?;

    // 初始化日志
    init_tracing(&config);

    info!("应用启动中...");
    info!("环境: {:?}", config.environment);

    // 遥测存储
    let telemetry: Arc<dyn TelemetrySink> = match config.telemetry.backend {
        TelemetryBackend::Sqlite => {
            info!("使用SQLite存储遥测事件: {}", config.database.path.display());
            let db_pool = initialize_database(&config.database).await?;
            Arc::new(SqliteTelemetry::new(db_pool))
        }
        TelemetryBackend::Memory => {
            info!("使用内存存储遥测事件, 每类最多保留 {} 条", config.telemetry.memory_capacity);
            Arc::new(InMemoryTelemetry::with_capacity(config.telemetry.memory_capacity))
        }
    };

    // 适配器
    let client = Client::builder()
        .timeout(Duration::from_millis(config.adapters.request_timeout_ms))
        .build()?;
    let adapters = match config.adapters.mode {
        AdapterMode::Simulated => {
            info!("适配器模式: 模拟, 延迟 {}ms", config.adapters.simulated_latency_ms);
            AdapterRegistry::simulated(Duration::from_millis(config.adapters.simulated_latency_ms))
        }
        AdapterMode::Http => {
            info!("适配器模式: HTTP, 已配置凭据 {} 个", config.api_providers.len());
            AdapterRegistry::http(
                client.clone(),
                config.api_providers.clone(),
                config.adapters.azure_api_version.clone(),
            )
        }
    };
    let health_checker = HealthChecker::new(client, &config.health_check, config.api_providers.clone());

    // 预置的提供商、规则和设置
    let bootstrap = match &config.bootstrap_file {
        Some(path) => {
            info!("加载路由配置文件: {}", path.display());
            RouterBootstrap::load(path)?
        }
        None => RouterBootstrap::default(),
    };
    if bootstrap.providers.is_empty() {
        warn!("没有预置的API提供商，需通过 /api/v1/providers 注册");
    }
    info!(
        "初始化路由状态, 提供商: {} 个, 规则: {} 条",
        bootstrap.providers.len(),
        bootstrap.rules.len()
    );
    let state = RouterState {
        providers: ProviderRegistry::new(bootstrap.providers),
        rules: bootstrap.rules,
        settings: bootstrap.settings,
    };

    let api = Arc::new(
        UnifiedApi::new(adapters, telemetry)
            .with_state(state)
            .with_health_checker(health_checker),
    );

    // 启动定期健康检查任务
    if config.health_check.interval > 0 {
        spawn_health_monitor(api.clone(), Duration::from_secs(config.health_check.interval));
    }

    // 创建路由
    let app = build_app(api, &config.server);

    // 启动服务器
    let addr = config.socket_addr()?;
    info!("Starting server on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app.into_make_service()).await?;

    Ok(())
}

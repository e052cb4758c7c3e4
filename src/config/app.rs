use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::str::FromStr;
use std::path::PathBuf;

use crate::models::{ApiProvider, ApiType, RouterSettings, RoutingRule};

/// 应用程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 环境模式
    pub environment: Environment,
    /// 服务器地址和端口
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 遥测配置
    pub telemetry: TelemetryConfig,
    /// 适配器配置
    pub adapters: AdapterConfig,
    /// 健康检查配置
    pub health_check: HealthCheckConfig,
    /// 启动时加载的路由配置文件
    pub bootstrap_file: Option<PathBuf>,
    /// API提供商凭据（按API类型）
    pub api_providers: HashMap<String, ApiProviderConfig>,
}

/// 环境模式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Testing,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            "testing" => Ok(Environment::Testing),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 服务器主机地址
    pub host: String,
    /// 服务器端口
    pub port: u16,
    /// 日志级别
    pub log_level: String,
    /// 日志格式
    pub log_format: LogFormat,
    /// CORS允许的域名
    pub cors_allowed_origins: Vec<String>,
    /// 单个请求超时(毫秒)
    pub request_timeout_ms: u64,
}

/// 数据库配置 - SQLite版本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库URL (sqlite:///path/to/db.sqlite3)
    pub url: String,
    /// 数据库文件路径
    pub path: PathBuf,
    /// 是否启用WAL模式
    pub enable_wal: bool,
    /// 是否启用外键约束
    pub enable_foreign_keys: bool,
    /// 最大连接数
    pub max_connections: u32,
}

/// 遥测存储后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TelemetryBackend {
    Memory,
    Sqlite,
}

impl FromStr for TelemetryBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(TelemetryBackend::Memory),
            "sqlite" => Ok(TelemetryBackend::Sqlite),
            _ => Err(format!("Unknown telemetry backend: {}", s)),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub backend: TelemetryBackend,
    /// 内存后端每类事件最多保留的条数
    pub memory_capacity: usize,
}

/// 适配器模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdapterMode {
    /// 模拟响应，不发起网络请求
    Simulated,
    /// 调用真实的厂商接口
    Http,
}

impl FromStr for AdapterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulated" => Ok(AdapterMode::Simulated),
            "http" => Ok(AdapterMode::Http),
            _ => Err(format!("Unknown adapter mode: {}", s)),
        }
    }
}

/// 适配器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub mode: AdapterMode,
    /// 厂商请求超时(毫秒)
    pub request_timeout_ms: u64,
    /// 模拟延迟(毫秒)
    pub simulated_latency_ms: u64,
    /// Azure OpenAI 的 api-version 查询参数
    pub azure_api_version: String,
}

/// 健康检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// 检查间隔(秒)，0表示不启动后台检查
    pub interval: u64,
    /// 超时时间(毫秒)
    pub timeout: u64,
    /// 响应时间超过此值视为降级(毫秒)
    pub degraded_threshold_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: 60,
            timeout: 5000,
            degraded_threshold_ms: 2000,
        }
    }
}

/// API提供商配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiProviderConfig {
    /// API密钥
    pub api_key: String,
    /// 基础URL
    pub base_url: String,
}

/// 启动时预置的提供商、规则和设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterBootstrap {
    #[serde(default)]
    pub providers: Vec<ApiProvider>,
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    #[serde(default)]
    pub settings: RouterSettings,
}

impl RouterBootstrap {
    /// 从配置文件加载（toml/json/yaml），可用 `ROUTER__` 前缀的环境变量覆盖
    pub fn load(path: &std::path::Path) -> Result<Self, ::config::ConfigError> {
        ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix("ROUTER").separator("__"))
            .build()?
            .try_deserialize()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ::config::ConfigError> {
        // 加载.env文件
        dotenv::dotenv().ok();

        // 解析环境
        let environment = env_or("APP_ENVIRONMENT", Environment::Development);

        // 服务器配置
        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_or("APP_PORT", 3000u16);
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env_or("LOG_FORMAT", LogFormat::Pretty);
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
        let request_timeout_ms = env_or("REQUEST_TIMEOUT_MS", 120_000u64);

        // SQLite数据库配置
        let db_path = env::var("SQLITE_PATH").unwrap_or_else(|_| "telemetry.sqlite3".to_string());
        let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}?mode=rwc", db_path)
        });
        let enable_wal = env_or("SQLITE_ENABLE_WAL", true);
        let enable_foreign_keys = env_or("SQLITE_ENABLE_FOREIGN_KEYS", true);
        let max_connections = env_or("SQLITE_MAX_CONNECTIONS", 5u32);

        // 遥测与适配器
        let telemetry_backend = env_or("TELEMETRY_BACKEND", TelemetryBackend::Memory);
        let telemetry_capacity = env_or("TELEMETRY_MEMORY_CAPACITY", 10_000usize);
        let adapter_mode = env_or("ADAPTER_MODE", AdapterMode::Simulated);
        let adapter_timeout = env_or("ADAPTER_TIMEOUT_MS", 30_000u64);
        let simulated_latency = env_or("SIMULATED_LATENCY_MS", 500u64);
        let azure_api_version =
            env::var("AZURE_API_VERSION").unwrap_or_else(|_| "2024-02-01".to_string());

        // 健康检查配置
        let defaults = HealthCheckConfig::default();
        let health_check_interval = env_or("HEALTH_CHECK_INTERVAL", defaults.interval);
        let health_check_timeout = env_or("HEALTH_CHECK_TIMEOUT", defaults.timeout);
        let degraded_threshold_ms = env_or("HEALTH_CHECK_DEGRADED_MS", defaults.degraded_threshold_ms);

        let bootstrap_file = env::var("ROUTER_BOOTSTRAP_FILE").ok().map(PathBuf::from);

        // API提供商凭据
        let mut api_providers = HashMap::new();
        for api_type in ApiType::BUILTIN {
            let prefix = api_type.as_str().to_uppercase();
            if let (Ok(key), Ok(url)) = (
                env::var(format!("{}_API_KEY", prefix)),
                env::var(format!("{}_BASE_URL", prefix)),
            ) {
                api_providers.insert(
                    api_type.as_str().to_string(),
                    ApiProviderConfig {
                        api_key: key,
                        base_url: url,
                    },
                );
            }
        }

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                log_level,
                log_format,
                cors_allowed_origins,
                request_timeout_ms,
            },
            database: DatabaseConfig {
                url: db_url,
                path: PathBuf::from(db_path),
                enable_wal,
                enable_foreign_keys,
                max_connections,
            },
            telemetry: TelemetryConfig {
                backend: telemetry_backend,
                memory_capacity: telemetry_capacity,
            },
            adapters: AdapterConfig {
                mode: adapter_mode,
                request_timeout_ms: adapter_timeout,
                simulated_latency_ms: simulated_latency,
                azure_api_version,
            },
            health_check: HealthCheckConfig {
                interval: health_check_interval,
                timeout: health_check_timeout,
                degraded_threshold_ms,
            },
            bootstrap_file,
            api_providers,
        })
    }

    /// 获取Socket地址
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_enum_settings_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Sqlite".parse::<TelemetryBackend>().unwrap(), TelemetryBackend::Sqlite);
        assert_eq!("http".parse::<AdapterMode>().unwrap(), AdapterMode::Http);
        assert!("grpc".parse::<AdapterMode>().is_err());
    }

    #[test]
    fn bootstrap_file_seeds_providers_and_rules() {
        let dir = std::env::temp_dir().join(format!("api-router-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("router.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "providers": [{{
                    "id": "openai-main",
                    "name": "OpenAI",
                    "api_type": "openai",
                    "status": "active",
                    "health_status": "healthy",
                    "default_model": "gpt-4o",
                    "cost_per_token": 0.00001
                }}],
                "rules": [{{
                    "id": "code",
                    "priority": 1,
                    "conditions": [{{"field": "messages.last_user", "operator": "contains", "value": "code"}}],
                    "action": {{"provider_id": "openai-main"}}
                }}],
                "settings": {{"cost_optimization": true}}
            }}"#
        )
        .unwrap();

        let bootstrap = RouterBootstrap::load(&path).unwrap();
        assert_eq!(bootstrap.providers.len(), 1);
        assert_eq!(bootstrap.providers[0].api_type, ApiType::OpenAI);
        assert_eq!(bootstrap.rules[0].action.provider_id, "openai-main");
        assert!(bootstrap.settings.cost_optimization);
        assert!(bootstrap.settings.smart_routing);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_bootstrap_file_yields_empty_state() {
        let bootstrap = RouterBootstrap::load(std::path::Path::new("/nonexistent/router.toml")).unwrap();
        assert!(bootstrap.providers.is_empty());
        assert!(bootstrap.rules.is_empty());
    }
}

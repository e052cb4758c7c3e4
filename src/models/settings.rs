use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 路由全局开关
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(default)]
pub struct RouterSettings {
    /// 是否启用规则路由
    pub smart_routing: bool,
    /// 是否启用故障转移
    pub failover: bool,
    /// 是否启用成本优化（无规则命中时选最便宜的提供商）
    pub cost_optimization: bool,
    /// A/B测试开关，路由逻辑暂未使用
    pub ab_testing: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            smart_routing: true,
            failover: true,
            cost_optimization: false,
            ab_testing: false,
        }
    }
}

/// 设置的部分更新
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SettingsUpdate {
    pub smart_routing: Option<bool>,
    pub failover: Option<bool>,
    pub cost_optimization: Option<bool>,
    pub ab_testing: Option<bool>,
}

impl SettingsUpdate {
    pub fn apply(self, settings: &mut RouterSettings) {
        if let Some(v) = self.smart_routing {
            settings.smart_routing = v;
        }
        if let Some(v) = self.failover {
            settings.failover = v;
        }
        if let Some(v) = self.cost_optimization {
            settings.cost_optimization = v;
        }
        if let Some(v) = self.ab_testing {
            settings.ab_testing = v;
        }
    }
}

use chrono::{DateTime, Utc};

use crate::models::{ApiProvider, HealthStatus, ProviderUpdate};

// 提供商注册表，保持注册顺序（默认选择依赖迭代顺序）
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ApiProvider>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ApiProvider>) -> Self {
        let mut registry = Self::default();
        for provider in providers {
            registry.register(provider);
        }
        registry
    }

    // 注册提供商，已存在的ID原位覆盖
    pub fn register(&mut self, provider: ApiProvider) {
        match self.providers.iter_mut().find(|p| p.id == provider.id) {
            Some(existing) => {
                tracing::info!("覆盖已注册的提供商: id={}", provider.id);
                *existing = provider;
            }
            None => {
                tracing::info!("注册新的提供商: id={}, 类型={}", provider.id, provider.api_type);
                self.providers.push(provider);
            }
        }
    }

    // 合并部分字段，未知ID时静默忽略并返回false
    pub fn update(&mut self, id: &str, update: ProviderUpdate) -> bool {
        match self.providers.iter_mut().find(|p| p.id == id) {
            Some(provider) => {
                update.apply(provider);
                tracing::info!("提供商已更新: id={}", id);
                true
            }
            None => {
                tracing::debug!("更新的提供商不存在，忽略: id={}", id);
                false
            }
        }
    }

    // 删除提供商，未知ID时静默忽略并返回false
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.providers.len();
        self.providers.retain(|p| p.id != id);
        let removed = self.providers.len() != before;
        if removed {
            tracing::info!("提供商已删除: id={}", id);
        } else {
            tracing::debug!("删除的提供商不存在，忽略: id={}", id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&ApiProvider> {
        self.providers.iter().find(|p| p.id == id)
    }

    // 获取所有提供商
    pub fn providers(&self) -> &[ApiProvider] {
        &self.providers
    }

    // 写回健康检查结果
    pub fn update_health(&mut self, id: &str, status: HealthStatus, checked_at: DateTime<Utc>) -> bool {
        match self.providers.iter_mut().find(|p| p.id == id) {
            Some(provider) => {
                if provider.health_status != status {
                    tracing::info!(
                        "提供商健康状态变化: id={}, {:?} -> {:?}",
                        id,
                        provider.health_status,
                        status
                    );
                }
                provider.update_health(status, checked_at);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiType, ProviderStatus};
    use pretty_assertions::assert_eq;

    fn provider(id: &str, cost: f64) -> ApiProvider {
        ApiProvider::new(id, id.to_uppercase(), ApiType::OpenAI, "gpt-4", cost)
    }

    #[test]
    fn register_then_get_round_trips() {
        let mut registry = ProviderRegistry::default();
        let p = provider("a", 0.01);
        registry.register(p.clone());
        assert_eq!(registry.get("a"), Some(&p));
    }

    #[test]
    fn overwrite_keeps_registration_position() {
        let mut registry = ProviderRegistry::new(vec![provider("a", 0.01), provider("b", 0.02)]);
        registry.register(provider("a", 0.05));

        let ids: Vec<&str> = registry.providers().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.get("a").map(|p| p.cost_per_token), Some(0.05));
    }

    #[test]
    fn unknown_ids_are_silent_noops() {
        let mut registry = ProviderRegistry::new(vec![provider("a", 0.01)]);
        let snapshot = registry.providers().to_vec();

        assert!(!registry.update(
            "missing",
            ProviderUpdate { status: Some(ProviderStatus::Inactive), ..Default::default() }
        ));
        assert!(!registry.remove("missing"));
        assert_eq!(registry.providers(), snapshot.as_slice());
    }

    #[test]
    fn remove_deletes_entry() {
        let mut registry = ProviderRegistry::new(vec![provider("a", 0.01), provider("b", 0.02)]);
        assert!(registry.remove("a"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("a").is_none());
    }
}

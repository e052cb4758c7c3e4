//! 基于规则的提供商选择
//!
//! 选择顺序：显式指定 -> 规则（按优先级）-> 默认选择（可选成本优化）。
//! 这里只做纯计算，调用方负责在锁内取快照。

use std::cmp::Ordering;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, RouterError};
use crate::models::{
    ApiProvider, ChatRequest, ConditionOperator, FieldValue, RouterSettings, RoutingRule,
    RuleCondition,
};

const NUMBER_EPSILON: f64 = 1e-6;

/// 为请求选择提供商
pub fn select_provider<'a>(
    providers: &'a [ApiProvider],
    rules: &[RoutingRule],
    settings: &RouterSettings,
    request: &ChatRequest,
) -> Result<&'a ApiProvider> {
    // 显式指定的提供商可用时直接使用，跳过规则
    if let Some(requested) = request.provider_id.as_deref() {
        if let Some(provider) = find_usable(providers, requested) {
            debug!("使用显式指定的提供商: {}", provider.id);
            return Ok(provider);
        }
        info!("显式指定的提供商 {} 不可用，继续按规则选择", requested);
    }

    if settings.smart_routing {
        if let Some(provider) = select_by_rules(providers, rules, settings, request) {
            return Ok(provider);
        }
    }

    select_default(providers, settings).ok_or(RouterError::NoAvailableProvider)
}

fn select_by_rules<'a>(
    providers: &'a [ApiProvider],
    rules: &[RoutingRule],
    settings: &RouterSettings,
    request: &ChatRequest,
) -> Option<&'a ApiProvider> {
    let mut ordered: Vec<&RoutingRule> = rules.iter().filter(|r| r.enabled).collect();
    // 稳定排序，同优先级保持原有顺序
    ordered.sort_by_key(|r| r.priority);

    for rule in ordered {
        if !rule_matches(rule, request) {
            continue;
        }
        debug!("规则命中: id={}, 优先级={}", rule.id, rule.priority);

        if let Some(provider) = find_usable(providers, &rule.action.provider_id) {
            info!("规则 {} 选择提供商 {}", rule.id, provider.id);
            return Some(provider);
        }

        if settings.failover {
            if let Some(fallback) = rule.action.fallback_provider_id.as_deref() {
                if let Some(provider) = find_usable(providers, fallback) {
                    info!(
                        "规则 {} 的主提供商 {} 不可用，切换到备用提供商 {}",
                        rule.id, rule.action.provider_id, provider.id
                    );
                    return Some(provider);
                }
            }
        }

        debug!("规则 {} 命中但没有可用的提供商，继续评估后续规则", rule.id);
    }

    None
}

fn select_default<'a>(providers: &'a [ApiProvider], settings: &RouterSettings) -> Option<&'a ApiProvider> {
    let mut candidates = providers.iter().filter(|p| p.is_usable());

    if settings.cost_optimization {
        // min_by 在相等时保留先出现的元素
        candidates.min_by(|a, b| {
            a.cost_per_token
                .partial_cmp(&b.cost_per_token)
                .unwrap_or(Ordering::Equal)
        })
    } else {
        candidates.next()
    }
}

fn find_usable<'a>(providers: &'a [ApiProvider], id: &str) -> Option<&'a ApiProvider> {
    providers.iter().find(|p| p.id == id && p.is_usable())
}

/// 所有条件都满足才算命中；没有条件的规则总是命中
pub fn rule_matches(rule: &RoutingRule, request: &ChatRequest) -> bool {
    rule.conditions.iter().all(|c| evaluate_condition(c, request))
}

/// 评估单个条件，字段缺失或类型不匹配时为false
pub fn evaluate_condition(condition: &RuleCondition, request: &ChatRequest) -> bool {
    let Some(actual) = condition.field.lookup(request) else {
        return false;
    };

    match (condition.operator, actual, &condition.value) {
        (ConditionOperator::Equals, FieldValue::Text(s), Value::String(expected)) => s == expected,
        (ConditionOperator::Equals, FieldValue::Number(n), Value::Number(expected)) => expected
            .as_f64()
            .map_or(false, |e| (n - e).abs() < NUMBER_EPSILON),
        (ConditionOperator::Contains, FieldValue::Text(s), Value::String(expected)) => {
            s.contains(expected.as_str())
        }
        (ConditionOperator::StartsWith, FieldValue::Text(s), Value::String(expected)) => {
            s.starts_with(expected.as_str())
        }
        (ConditionOperator::EndsWith, FieldValue::Text(s), Value::String(expected)) => {
            s.ends_with(expected.as_str())
        }
        (ConditionOperator::GreaterThan, FieldValue::Number(n), Value::Number(expected)) => {
            expected.as_f64().map_or(false, |e| n > e)
        }
        (ConditionOperator::LessThan, FieldValue::Number(n), Value::Number(expected)) => {
            expected.as_f64().map_or(false, |e| n < e)
        }
        _ => false,
    }
}

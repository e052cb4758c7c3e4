use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use anyhow::Result;

use crate::models::{ErrorEvent, ErrorEventRow, UsageEvent, UsageEventRow};

/// 某个时间区间内记录的事件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedEvents {
    pub usage: Vec<UsageEvent>,
    pub errors: Vec<ErrorEvent>,
}

/// 遥测存储：记录调用成功/失败事件，并按时间区间查询
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record_usage(&self, event: UsageEvent) -> Result<()>;

    async fn record_error(&self, event: ErrorEvent) -> Result<()>;

    /// 查询 `[start, end)` 内的事件
    async fn events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<RecordedEvents>;
}

/// 内存后端默认每类事件保留的条数
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug)]
struct EventBuffers {
    usage: VecDeque<UsageEvent>,
    errors: VecDeque<ErrorEvent>,
}

/// 进程内存储，重启后丢失。每类事件只保留最近的 `capacity` 条
#[derive(Debug)]
pub struct InMemoryTelemetry {
    capacity: usize,
    events: RwLock<EventBuffers>,
}

impl Default for InMemoryTelemetry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: RwLock::new(EventBuffers {
                usage: VecDeque::new(),
                errors: VecDeque::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前所有事件的快照
    pub async fn snapshot(&self) -> RecordedEvents {
        let events = self.events.read().await;
        RecordedEvents {
            usage: events.usage.iter().cloned().collect(),
            errors: events.errors.iter().cloned().collect(),
        }
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) -> bool {
    let evicted = buffer.len() >= capacity;
    if evicted {
        buffer.pop_front();
    }
    buffer.push_back(item);
    evicted
}

#[async_trait]
impl TelemetrySink for InMemoryTelemetry {
    async fn record_usage(&self, event: UsageEvent) -> Result<()> {
        debug!("记录调用: provider={}, tokens={}", event.provider_id, event.total_tokens);
        let mut events = self.events.write().await;
        if push_bounded(&mut events.usage, event, self.capacity) {
            trace!("调用记录已达上限 {}，丢弃最早一条", self.capacity);
        }
        Ok(())
    }

    async fn record_error(&self, event: ErrorEvent) -> Result<()> {
        debug!("记录错误: provider={}, code={}", event.provider_id, event.error_code);
        let mut events = self.events.write().await;
        if push_bounded(&mut events.errors, event, self.capacity) {
            trace!("错误记录已达上限 {}，丢弃最早一条", self.capacity);
        }
        Ok(())
    }

    async fn events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<RecordedEvents> {
        let events = self.events.read().await;
        let in_range = |ts: &DateTime<Utc>| *ts >= start && *ts < end;
        Ok(RecordedEvents {
            usage: events.usage.iter().filter(|e| in_range(&e.timestamp)).cloned().collect(),
            errors: events.errors.iter().filter(|e| in_range(&e.timestamp)).cloned().collect(),
        })
    }
}

/// SQLite存储
#[derive(Debug, Clone)]
pub struct SqliteTelemetry {
    db: SqlitePool,
}

impl SqliteTelemetry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TelemetrySink for SqliteTelemetry {
    async fn record_usage(&self, event: UsageEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_usage_events (
                id, provider_id, model, endpoint, prompt_tokens,
                completion_tokens, total_tokens, response_time_ms,
                success, cost, timestamp_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.provider_id)
        .bind(&event.model)
        .bind(&event.endpoint)
        .bind(i64::from(event.prompt_tokens))
        .bind(i64::from(event.completion_tokens))
        .bind(i64::from(event.total_tokens))
        .bind(i64::try_from(event.response_time_ms).unwrap_or(i64::MAX))
        .bind(event.success)
        .bind(event.cost)
        .bind(event.timestamp.timestamp_millis())
        .execute(&self.db)
        .await?;

        debug!("调用记录已写入数据库: id={}", event.id);
        Ok(())
    }

    async fn record_error(&self, event: ErrorEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_error_events (
                id, provider_id, endpoint, error_code, error_message, timestamp_ms
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.provider_id)
        .bind(&event.endpoint)
        .bind(&event.error_code)
        .bind(&event.error_message)
        .bind(event.timestamp.timestamp_millis())
        .execute(&self.db)
        .await?;

        debug!("错误记录已写入数据库: id={}", event.id);
        Ok(())
    }

    async fn events_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<RecordedEvents> {
        let usage = sqlx::query_as::<_, UsageEventRow>(
            r#"
            SELECT * FROM api_usage_events
            WHERE timestamp_ms >= ? AND timestamp_ms < ?
            ORDER BY timestamp_ms
            "#,
        )
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(&self.db)
        .await?;

        let errors = sqlx::query_as::<_, ErrorEventRow>(
            r#"
            SELECT * FROM api_error_events
            WHERE timestamp_ms >= ? AND timestamp_ms < ?
            ORDER BY timestamp_ms
            "#,
        )
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(&self.db)
        .await?;

        Ok(RecordedEvents {
            usage: usage.into_iter().map(UsageEvent::from).collect(),
            errors: errors.into_iter().map(ErrorEvent::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_in_memory_pool;
    use crate::models::{TokenUsage, ENDPOINT_CHAT};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn in_memory_filters_by_half_open_range() {
        let sink = InMemoryTelemetry::new();
        let event = UsageEvent::new("a", "gpt-4", ENDPOINT_CHAT, TokenUsage::new(10, 5), 20, 0.01);
        let ts = event.timestamp;
        sink.record_usage(event).await.unwrap();

        let hit = sink.events_between(ts, ts + Duration::seconds(1)).await.unwrap();
        assert_eq!(hit.usage.len(), 1);

        let miss = sink.events_between(ts - Duration::seconds(1), ts).await.unwrap();
        assert!(miss.usage.is_empty());
    }

    #[tokio::test]
    async fn in_memory_keeps_only_the_most_recent_events() {
        let sink = InMemoryTelemetry::with_capacity(3);
        let mut ids = Vec::new();
        for i in 0..5u32 {
            let event = UsageEvent::new(format!("p{}", i), "gpt-4", ENDPOINT_CHAT, TokenUsage::new(i, 1), 1, 0.0);
            ids.push(event.id.clone());
            sink.record_usage(event).await.unwrap();
            sink.record_error(ErrorEvent::new(format!("p{}", i), ENDPOINT_CHAT, "HTTP_500", "boom")).await.unwrap();
        }

        let events = sink.snapshot().await;
        assert_eq!(events.usage.len(), 3);
        assert_eq!(events.errors.len(), 3);
        let kept: Vec<String> = events.usage.iter().map(|e| e.id.clone()).collect();
        assert_eq!(kept, ids[2..].to_vec());
        assert_eq!(events.errors[0].provider_id, "p2");
    }

    #[test]
    fn zero_capacity_still_keeps_latest_event() {
        assert_eq!(InMemoryTelemetry::with_capacity(0).capacity(), 1);
    }

    #[tokio::test]
    async fn sqlite_sink_round_trips_events() {
        let pool = create_in_memory_pool().await.unwrap();
        let sink = SqliteTelemetry::new(pool);

        let usage = UsageEvent::new("a", "gpt-4", ENDPOINT_CHAT, TokenUsage::new(10, 5), 20, 0.01);
        let error = ErrorEvent::new("b", ENDPOINT_CHAT, "HTTP_500", "boom");
        sink.record_usage(usage.clone()).await.unwrap();
        sink.record_error(error.clone()).await.unwrap();

        let start = Utc::now() - Duration::hours(1);
        let end = Utc::now() + Duration::hours(1);
        let events = sink.events_between(start, end).await.unwrap();

        assert_eq!(events.usage.len(), 1);
        assert_eq!(events.usage[0].id, usage.id);
        assert_eq!(events.usage[0].total_tokens, 15);
        assert_eq!(events.usage[0].timestamp.timestamp_millis(), usage.timestamp.timestamp_millis());
        assert_eq!(events.errors.len(), 1);
        assert_eq!(events.errors[0].error_code, "HTTP_500");
    }
}

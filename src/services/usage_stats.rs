use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use crate::models::{BreakdownStats, GroupBy, TimelineBucket, UsageStatistics};
use crate::services::telemetry::RecordedEvents;

#[derive(Debug, Default)]
struct Accumulator {
    successes: u64,
    errors: u64,
    total_tokens: u64,
    cost: f64,
    response_time_sum: u64,
}

impl Accumulator {
    fn avg_response_time(&self) -> f64 {
        if self.successes == 0 {
            0.0
        } else {
            self.response_time_sum as f64 / self.successes as f64
        }
    }

    fn into_stats(self, key: String) -> BreakdownStats {
        BreakdownStats {
            avg_response_time_ms: self.avg_response_time(),
            key,
            calls: self.successes + self.errors,
            errors: self.errors,
            total_tokens: self.total_tokens,
            cost: self.cost,
        }
    }
}

/// 时间桶的起始时间
pub fn bucket_start(ts: DateTime<Utc>, group_by: GroupBy) -> DateTime<Utc> {
    let date = ts.date_naive();
    let start = match group_by {
        GroupBy::Hour => date.and_hms_opt(ts.hour(), 0, 0),
        GroupBy::Day => date.and_hms_opt(0, 0, 0),
        GroupBy::Week => {
            let monday = date - Duration::days(i64::from(ts.weekday().num_days_from_monday()));
            monday.and_hms_opt(0, 0, 0)
        }
        GroupBy::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
    };
    start.map(|naive| Utc.from_utc_datetime(&naive)).unwrap_or(ts)
}

/// 汇总事件为统计报告
pub fn compute_statistics(events: &RecordedEvents, group_by: GroupBy) -> UsageStatistics {
    let mut overall = Accumulator::default();
    let mut by_provider: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut by_endpoint: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut timeline: BTreeMap<DateTime<Utc>, TimelineBucket> = BTreeMap::new();

    for event in &events.usage {
        for acc in [
            &mut overall,
            by_provider.entry(event.provider_id.clone()).or_default(),
            by_endpoint.entry(event.endpoint.clone()).or_default(),
        ] {
            acc.successes += 1;
            acc.total_tokens += u64::from(event.total_tokens);
            acc.cost += event.cost;
            acc.response_time_sum += event.response_time_ms;
        }

        let start = bucket_start(event.timestamp, group_by);
        let bucket = timeline
            .entry(start)
            .or_insert_with(|| TimelineBucket { start, calls: 0, errors: 0, cost: 0.0 });
        bucket.calls += 1;
        bucket.cost += event.cost;
    }

    for event in &events.errors {
        for acc in [
            &mut overall,
            by_provider.entry(event.provider_id.clone()).or_default(),
            by_endpoint.entry(event.endpoint.clone()).or_default(),
        ] {
            acc.errors += 1;
        }

        let start = bucket_start(event.timestamp, group_by);
        let bucket = timeline
            .entry(start)
            .or_insert_with(|| TimelineBucket { start, calls: 0, errors: 0, cost: 0.0 });
        bucket.calls += 1;
        bucket.errors += 1;
    }

    let total_calls = overall.successes + overall.errors;
    let error_rate = if total_calls == 0 {
        0.0
    } else {
        overall.errors as f64 / total_calls as f64
    };

    UsageStatistics {
        total_calls,
        total_cost: overall.cost,
        avg_response_time_ms: overall.avg_response_time(),
        error_rate,
        by_provider: by_provider.into_iter().map(|(k, acc)| acc.into_stats(k)).collect(),
        by_endpoint: by_endpoint.into_iter().map(|(k, acc)| acc.into_stats(k)).collect(),
        timeline: timeline.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorEvent, TokenUsage, UsageEvent, ENDPOINT_CHAT};
    use pretty_assertions::assert_eq;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn usage(provider: &str, ms: u64, ts: &str) -> UsageEvent {
        let mut event = UsageEvent::new(provider, "m", ENDPOINT_CHAT, TokenUsage::new(60, 40), ms, 0.01);
        event.timestamp = at(ts);
        event
    }

    fn error(provider: &str, ts: &str) -> ErrorEvent {
        let mut event = ErrorEvent::new(provider, ENDPOINT_CHAT, "HTTP_500", "boom");
        event.timestamp = at(ts);
        event
    }

    #[test]
    fn empty_events_produce_zeroed_report() {
        let stats = compute_statistics(&RecordedEvents::default(), GroupBy::Day);
        assert_eq!(stats, UsageStatistics::default());
    }

    #[test]
    fn aggregates_totals_and_breakdowns() {
        let events = RecordedEvents {
            usage: vec![
                usage("a", 100, "2024-03-04T10:15:00Z"),
                usage("a", 300, "2024-03-04T11:00:00Z"),
                usage("b", 200, "2024-03-05T09:00:00Z"),
            ],
            errors: vec![error("b", "2024-03-05T09:30:00Z")],
        };

        let stats = compute_statistics(&events, GroupBy::Day);

        assert_eq!(stats.total_calls, 4);
        assert!((stats.total_cost - 3.0).abs() < 1e-9);
        assert!((stats.avg_response_time_ms - 200.0).abs() < 1e-9);
        assert!((stats.error_rate - 0.25).abs() < 1e-9);

        assert_eq!(stats.by_provider.len(), 2);
        assert_eq!(stats.by_provider[0].key, "a");
        assert_eq!(stats.by_provider[0].calls, 2);
        assert_eq!(stats.by_provider[0].total_tokens, 200);
        assert_eq!(stats.by_provider[1].key, "b");
        assert_eq!(stats.by_provider[1].calls, 2);
        assert_eq!(stats.by_provider[1].errors, 1);

        assert_eq!(stats.by_endpoint.len(), 1);
        assert_eq!(stats.by_endpoint[0].calls, 4);

        assert_eq!(stats.timeline.len(), 2);
        assert_eq!(stats.timeline[0].start, at("2024-03-04T00:00:00Z"));
        assert_eq!(stats.timeline[0].calls, 2);
        assert_eq!(stats.timeline[1].errors, 1);
    }

    #[test]
    fn bucket_boundaries() {
        // 2024-03-06 是星期三
        let ts = at("2024-03-06T13:45:10Z");
        assert_eq!(bucket_start(ts, GroupBy::Hour), at("2024-03-06T13:00:00Z"));
        assert_eq!(bucket_start(ts, GroupBy::Day), at("2024-03-06T00:00:00Z"));
        assert_eq!(bucket_start(ts, GroupBy::Week), at("2024-03-04T00:00:00Z"));
        assert_eq!(bucket_start(ts, GroupBy::Month), at("2024-03-01T00:00:00Z"));
    }
}

//! Usage analytics aggregation.
//!
//! Pure computation over a window of usage events. The stored `success_rate`
//! on the feature row is advisory; this aggregation is the authoritative
//! recomputation from the event log.

use std::collections::{BTreeMap, HashMap, HashSet};

use featuregate_domain::constants::{TOP_ERROR_LIMIT, UNKNOWN_ERROR_TYPE};
use featuregate_domain::{
    ErrorCount, FeatureUsageEvent, GroupStats, UsageAnalytics, UsageEventType,
};

/// Aggregate `events` (already filtered to one feature and a trailing
/// window) into a report.
pub fn aggregate(feature_id: &str, window_days: i64, events: &[FeatureUsageEvent]) -> UsageAnalytics {
    let mut report = UsageAnalytics::empty(feature_id, window_days);
    if events.is_empty() {
        return report;
    }

    let mut users: HashSet<i64> = HashSet::new();
    let mut daily: BTreeMap<String, u64> = BTreeMap::new();
    // First-seen iteration order matters for the error ranking tie-break.
    let mut error_order: Vec<String> = Vec::new();
    let mut error_counts: HashMap<String, u64> = HashMap::new();
    let mut group_order: Vec<String> = Vec::new();
    let mut group_acc: HashMap<String, GroupAccumulator> = HashMap::new();

    for event in events {
        report.total_events += 1;
        users.insert(event.user_telegram_id);
        *daily.entry(event.created_at.format("%Y-%m-%d").to_string()).or_insert(0) += 1;

        match event.event_type {
            UsageEventType::Access => report.access_count += 1,
            UsageEventType::Success => report.success_count += 1,
            UsageEventType::Error => {
                report.error_count += 1;
                let error_type = event
                    .metadata
                    .get("error_type")
                    .and_then(|value| value.as_str())
                    .unwrap_or(UNKNOWN_ERROR_TYPE)
                    .to_string();
                if !error_counts.contains_key(&error_type) {
                    error_order.push(error_type.clone());
                }
                *error_counts.entry(error_type).or_insert(0) += 1;
            }
            UsageEventType::Conversion | UsageEventType::EmergencyDisable => {}
        }

        if let Some(group) = &event.ab_test_group {
            if !group_acc.contains_key(group) {
                group_order.push(group.clone());
            }
            let acc = group_acc.entry(group.clone()).or_default();
            acc.events += 1;
            acc.users.insert(event.user_telegram_id);
            match event.event_type {
                UsageEventType::Access => acc.access += 1,
                UsageEventType::Success => acc.success += 1,
                _ => {}
            }
        }
    }

    report.unique_users = users.len() as u64;
    report.daily_usage = daily;
    if report.access_count > 0 {
        report.success_rate = report.success_count as f64 / report.access_count as f64;
        report.error_rate = report.error_count as f64 / report.access_count as f64;
    }

    report.group_stats = group_order
        .into_iter()
        .filter_map(|group| {
            group_acc.remove(&group).map(|acc| GroupStats {
                group,
                events: acc.events,
                unique_users: acc.users.len() as u64,
                success_rate: if acc.access > 0 {
                    acc.success as f64 / acc.access as f64
                } else {
                    0.0
                },
            })
        })
        .collect();

    let mut ranked: Vec<ErrorCount> = error_order
        .into_iter()
        .filter_map(|error_type| {
            error_counts
                .get(&error_type)
                .map(|count| ErrorCount { error_type, count: *count })
        })
        .collect();
    // Stable sort keeps first-seen order among equal counts.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(TOP_ERROR_LIMIT);
    report.top_errors = ranked;

    report
}

#[derive(Default)]
struct GroupAccumulator {
    events: u64,
    access: u64,
    success: u64,
    users: HashSet<i64>,
}

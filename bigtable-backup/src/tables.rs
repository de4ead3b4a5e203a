//! Resolve which Bigtable tables a backup run covers.
//!
//! Tables are matched on a literal id prefix. Periodic tables (e.g. the
//! weekly index tables of Cortex and Loki, named `{prefix}{unix_secs / period}`)
//! are narrowed to the currently active one by appending the current period
//! number to the prefix.

use crate::gcp::{self, TableAdmin};
use crate::Result;
use futures_util::TryStreamExt;
use std::time::Duration;

/// Prefix to match, given the optional table rotation period.
///
/// A period shorter than one second counts as no period.
pub fn effective_prefix(id_or_prefix: &str, period: Duration, now: i64) -> String {
    let period_secs = period.as_secs() as i64;
    if period_secs == 0 {
        return id_or_prefix.to_string();
    }
    format!("{}{}", id_or_prefix, now.div_euclid(period_secs))
}

/// Ids of all tables in the instance that start with the effective prefix,
/// in the order the admin API lists them.
pub async fn list_table_ids(
    admin: &dyn TableAdmin,
    project_id: &str,
    instance_id: &str,
    id_or_prefix: &str,
    period: Duration,
    now: i64,
) -> Result<Vec<String>> {
    let prefix = effective_prefix(id_or_prefix, period, now);
    tracing::debug!(project_id, instance_id, prefix = %prefix, "Resolving tables");

    let table_ids: Vec<String> = gcp::all_tables(admin, project_id, instance_id)
        .try_filter_map(|table| {
            let id = table.id();
            let matched = id.starts_with(&prefix).then(|| id.to_string());
            async move { Ok(matched) }
        })
        .try_collect()
        .await?;

    tracing::info!(prefix = %prefix, count = table_ids.len(), "Resolved tables");
    Ok(table_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::fake::FakeTableAdmin;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_effective_prefix_without_period() {
        assert_eq!(effective_prefix("events", Duration::ZERO, 1_700_000_000), "events");
        assert_eq!(
            effective_prefix("events", Duration::from_millis(999), 1_700_000_000),
            "events"
        );
    }

    #[test]
    fn test_effective_prefix_with_period() {
        // 1_700_000_000 / 3600 = 472222.2
        assert_eq!(effective_prefix("index_", HOUR, 1_700_000_000), "index_472222");
        assert_eq!(
            effective_prefix("index_", Duration::from_secs(7 * 24 * 3600), 1_700_000_000),
            "index_2810"
        );
    }

    #[tokio::test]
    async fn test_plain_prefix_keeps_listing_order() {
        let admin = FakeTableAdmin::with_ids(&["events_2", "users", "events_1", "events_10"]);

        let ids = list_table_ids(&admin, "p", "i", "events", Duration::ZERO, 0)
            .await
            .unwrap();

        assert_eq!(ids, vec!["events_2", "events_1", "events_10"]);
    }

    #[tokio::test]
    async fn test_periodic_prefix_selects_active_table() {
        let now = 2 * 3600 + 1800;
        let admin = FakeTableAdmin::with_ids(&["a0", "a1", "a2", "b5"]);

        let ids = list_table_ids(&admin, "p", "i", "a", HOUR, now).await.unwrap();

        assert_eq!(ids, vec!["a2"]);
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let admin = FakeTableAdmin::with_ids(&["a0", "a1"]);

        let ids = list_table_ids(&admin, "p", "i", "z", Duration::ZERO, 0)
            .await
            .unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_exact_id_matches_itself() {
        let admin = FakeTableAdmin::with_ids(&["a", "ab", "b"]);

        let ids = list_table_ids(&admin, "p", "i", "ab", Duration::ZERO, 0)
            .await
            .unwrap();

        assert_eq!(ids, vec!["ab"]);
    }
}

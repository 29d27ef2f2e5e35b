use std::collections::HashSet;

use crate::domain::time_key::TimeKey;
use crate::store::{StoreError, SubscriberStore};

/// Distinct delivery times currently wanted by eligible subscribers.
pub async fn active_preferences(
    store: &dyn SubscriberStore,
) -> Result<HashSet<TimeKey>, StoreError> {
    store.distinct_active_times().await
}

/// Unordered comparison of two snapshots.
pub fn has_changed(previous: &HashSet<TimeKey>, current: &HashSet<TimeKey>) -> bool {
    if previous.len() != current.len() {
        return true;
    }

    !previous.iter().all(|time_key| current.contains(time_key))
}

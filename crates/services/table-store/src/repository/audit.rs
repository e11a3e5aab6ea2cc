//! Audit record addressing.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, SubsecRound, Utc};

use domain::{
    DomainError, DomainResult, EntityKey, AUDIT_PARTITION_SEPARATOR, AUDIT_ROW_KEY_FORMAT,
    MAX_KEY_LENGTH,
};

/// Last row key handed out in this process.
///
/// Shared by every repository so two scopes writing the same record within
/// one millisecond still get distinct, increasing row keys.
static LAST_STAMP: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

/// Key of the next audit record for the entity at `key`
pub(crate) fn audit_key(key: &EntityKey) -> EntityKey {
    EntityKey::new(
        audit_partition(&key.partition_key, &key.row_key),
        next_row_key(Utc::now()),
    )
}

/// Audit partition holding the history of one record
pub fn audit_partition(partition_key: &str, row_key: &str) -> String {
    format!("{}{}{}", partition_key, AUDIT_PARTITION_SEPARATOR, row_key)
}

/// Fail if the audit partition of `key` would exceed the key length limit
pub(crate) fn check_audit_partition(key: &EntityKey) -> DomainResult<()> {
    let length = key.partition_key.chars().count()
        + AUDIT_PARTITION_SEPARATOR.chars().count()
        + key.row_key.chars().count();
    if length > MAX_KEY_LENGTH {
        return Err(DomainError::validation(format!(
            "audit partition for {} exceeds {} characters",
            key, MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

fn next_row_key(now: DateTime<Utc>) -> String {
    let mut last = LAST_STAMP.lock().unwrap_or_else(PoisonError::into_inner);
    let mut stamp = now.trunc_subsecs(3);
    if let Some(previous) = *last {
        if stamp <= previous {
            stamp = previous + Duration::milliseconds(1);
        }
    }
    *last = Some(stamp);
    stamp.format(AUDIT_ROW_KEY_FORMAT).to_string()
}

//! Domain-level constants.
//!
//! These constants define store limits and naming conventions.

// =============================================================================
// Keys
// =============================================================================

/// Maximum length of a partition or row key
pub const MAX_KEY_LENGTH: usize = 1024;

/// Characters the store rejects inside partition and row keys
pub const FORBIDDEN_KEY_CHARS: &[char] = &['/', '\\', '#', '?'];

// =============================================================================
// Audit Trail
// =============================================================================

/// Suffix appended to an entity table name to form its audit table
pub const AUDIT_TABLE_SUFFIX: &str = "Audit";

/// Separator between the original partition and row key in an audit partition
pub const AUDIT_PARTITION_SEPARATOR: &str = "-";

/// Row key format for audit records (millisecond precision, UTC)
pub const AUDIT_ROW_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

// =============================================================================
// Soft Delete
// =============================================================================

/// Property name of the soft-delete flag in a stored property bag
pub const SOFT_DELETE_PROPERTY: &str = "is_deleted";

/// Build the audit table name for an entity table
pub fn audit_table_name(table: &str) -> String {
    format!("{}{}", table, AUDIT_TABLE_SUFFIX)
}

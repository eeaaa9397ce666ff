//! Domain-level constants.
//!
//! These constants define the query contract defaults and reserved field names.

// =============================================================================
// Pagination
// =============================================================================

/// Default starting page number (1-indexed)
pub const DEFAULT_PAGE: u64 = 1;

/// Default number of records per page
pub const DEFAULT_PER_PAGE: u64 = 10;

// =============================================================================
// Reserved Fields
// =============================================================================

/// Identifier field present on every record
pub const ID_FIELD: &str = "id";

/// Creation timestamp, stamped by the backend
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Last modification timestamp, stamped by the backend
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Fields managed by the backend and never searched or written by callers
pub const MANAGED_FIELDS: &[&str] = &[ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// Check if a field is backend-managed
pub fn is_managed_field(field: &str) -> bool {
    MANAGED_FIELDS.contains(&field)
}

//! Query contract: parameter and result shapes shared by every backend.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_PAGE, DEFAULT_PER_PAGE};
use crate::error::DomainError;
use crate::identifier::Identifier;
use crate::{Filter, Record};

/// Requested page, as supplied by the caller.
///
/// Signed so that non-positive values can be normalized instead of rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self { page, per_page }
    }
}

/// Normalized page window used by backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    /// Resolve caller pagination, falling back to defaults for absent or
    /// non-positive values.
    pub fn resolve(pagination: Option<Pagination>) -> Self {
        let (page, per_page) = match pagination {
            Some(p) => (p.page, p.per_page),
            None => (DEFAULT_PAGE as i64, DEFAULT_PER_PAGE as i64),
        };

        Self {
            page: u64::try_from(page).ok().filter(|p| *p >= 1).unwrap_or(DEFAULT_PAGE),
            per_page: u64::try_from(per_page)
                .ok()
                .filter(|p| *p >= 1)
                .unwrap_or(DEFAULT_PER_PAGE),
        }
    }

    /// Number of records to skip, saturating for pages past `u64::MAX` rows
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    /// Number of records to take
    pub fn limit(&self) -> u64 {
        self.per_page
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::resolve(None)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl FromStr for SortOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            other => Err(DomainError::validation(format!("unknown sort order '{}'", other))),
        }
    }
}

/// Single-field sort
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl Sort {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

impl FromStr for Sort {
    type Err = DomainError;

    /// Parse `field` or `field:ORDER`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, order) = match s.split_once(':') {
            Some((field, order)) => (field, order.parse()?),
            None => (s, SortOrder::Asc),
        };
        let field = field.trim();
        if field.is_empty() {
            return Err(DomainError::validation("sort field must not be empty"));
        }
        Ok(Sort::new(field, order))
    }
}

/// List query shared by `get_list` and `get_many_reference`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(default, skip_serializing_if = "Filter::is_empty")]
    pub filter: Filter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paginate(mut self, page: i64, per_page: i64) -> Self {
        self.pagination = Some(Pagination::new(page, per_page));
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(Sort::new(field, order));
        self
    }

    pub fn filter_by(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// Normalized page window
    pub fn page_request(&self) -> PageRequest {
        PageRequest::resolve(self.pagination)
    }
}

/// Paginated list result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub data: Vec<Record>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl ListResult {
    /// Build a result for one page of a filtered set of `total` records.
    pub fn new(data: Vec<Record>, total: u64, page: PageRequest) -> Self {
        Self {
            data,
            total,
            page: page.page,
            per_page: page.per_page,
            total_pages: total.div_ceil(page.per_page),
        }
    }
}

// =============================================================================
// Operation Parameters
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetOneParams {
    pub id: Identifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetManyParams {
    pub ids: Vec<Identifier>,
}

/// `get_list` restricted to records whose `target` field equals `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetManyReferenceParams {
    pub target: String,
    pub id: Identifier,
    #[serde(flatten)]
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateParams {
    pub data: Record,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    pub id: Identifier,
    pub data: Record,
    /// Accepted for contract parity; backends do not consult it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_data: Option<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateManyParams {
    pub ids: Vec<Identifier>,
    pub data: Record,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParams {
    pub id: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_data: Option<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteManyParams {
    pub ids: Vec<Identifier>,
}

// =============================================================================
// Operation Results
// =============================================================================

/// Single record result (`get_one`, `create`, `update`, `delete`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    pub data: Record,
}

/// Multiple record result (`get_many`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordsResult {
    pub data: Vec<Record>,
}

/// Affected identifiers (`update_many`, `delete_many`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdsResult {
    pub data: Vec<Identifier>,
}

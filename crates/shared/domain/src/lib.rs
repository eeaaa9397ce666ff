//! Domain layer - The resource query contract.
//!
//! This crate contains pure contract types with no infrastructure dependencies:
//! records and identifiers, list queries and results, per-resource schemas,
//! and the predicate tree every backend evaluates identically.

pub mod constants;
pub mod criteria;
pub mod error;
pub mod identifier;
pub mod query;
pub mod schema;

pub use constants::*;
pub use criteria::{compare_records, compare_values, Criterion, SearchMode, SearchScope};
pub use error::{DomainError, DomainResult};
pub use identifier::Identifier;
pub use query::{
    CreateParams, DeleteManyParams, DeleteParams, GetManyParams, GetManyReferenceParams,
    GetOneParams, IdsResult, ListResult, PageRequest, Pagination, Query, RecordResult,
    RecordsResult, Sort, SortOrder, UpdateManyParams, UpdateParams,
};
pub use schema::{ResourceRegistry, ResourceSchema};

/// A record: field name to schema-agnostic JSON value
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Field filter: field name to expected value
pub type Filter = serde_json::Map<String, serde_json::Value>;

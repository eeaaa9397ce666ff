//! Resource schemas: per-resource field allowlists.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{is_managed_field, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::error::{DomainError, DomainResult};
use crate::query::Query;
use crate::Record;

/// Allowlist of caller-visible fields for one resource.
///
/// `fields` lists user fields only; `id`, `createdAt` and `updatedAt` are
/// always part of the projection and never writable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub name: String,
    pub fields: Vec<String>,
}

impl ResourceSchema {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for field in fields.into_iter().map(Into::into) {
            if !is_managed_field(&field) && !unique.contains(&field) {
                unique.push(field);
            }
        }
        Self {
            name: name.into(),
            fields: unique,
        }
    }

    /// Fields consulted by free-text search
    pub fn searchable_fields(&self) -> &[String] {
        &self.fields
    }

    /// Columns returned by reads, in order
    pub fn projection(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.fields.len() + 3);
        columns.push(ID_FIELD.to_string());
        columns.extend(self.fields.iter().cloned());
        columns.push(CREATED_AT_FIELD.to_string());
        columns.push(UPDATED_AT_FIELD.to_string());
        columns
    }

    /// Check if callers may read or write a field
    pub fn allows(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Restrict a payload to writable allowlisted fields.
    pub fn writable(&self, data: &Record) -> Record {
        data.iter()
            .filter(|(field, _)| self.allows(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// Reject list queries that filter, sort or reference on a field outside
    /// the projection.
    pub fn check_query(&self, query: &Query, reference: Option<&str>) -> DomainResult<()> {
        let projection = self.projection();
        let fields = query
            .filter
            .keys()
            .map(String::as_str)
            .chain(query.sort.as_ref().map(|sort| sort.field.as_str()))
            .chain(reference);

        for field in fields {
            if !projection.iter().any(|column| column == field) {
                return Err(DomainError::validation(format!(
                    "{} has no queryable field '{}'",
                    self.name, field
                )));
            }
        }
        Ok(())
    }

    /// Restrict a stored record to the projection.
    pub fn project(&self, record: &Record) -> Record {
        self.projection()
            .into_iter()
            .filter_map(|field| record.get(&field).map(|v| (field, v.clone())))
            .collect()
    }
}

impl FromStr for ResourceSchema {
    type Err = DomainError;

    /// Parse `name=field1,field2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, fields) = s
            .split_once('=')
            .ok_or_else(|| DomainError::invalid_schema(format!("expected 'name=fields' in '{}'", s)))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_schema("resource name must not be empty"));
        }
        let fields = fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty());
        Ok(ResourceSchema::new(name, fields))
    }
}

/// Registered resource schemas keyed by resource name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRegistry {
    schemas: BTreeMap<String, ResourceSchema>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a schema
    pub fn register(mut self, schema: ResourceSchema) -> Self {
        self.schemas.insert(schema.name.clone(), schema);
        self
    }

    pub fn get(&self, resource: &str) -> Option<&ResourceSchema> {
        self.schemas.get(resource)
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Parse `users=name,email;posts=title,body`
    pub fn parse(descriptor: &str) -> DomainResult<Self> {
        descriptor
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .try_fold(Self::new(), |registry, entry| Ok(registry.register(entry.parse()?)))
    }
}

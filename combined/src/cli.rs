//! CLI argument definitions.
//!
//! Uses clap derive macros for type-safe argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use domain::Sort;

/// Resource admin - query and edit resources through the data provider
#[derive(Parser, Debug)]
#[command(name = "resource-admin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Backend to use (`local` or `relational`)
    #[arg(short, long, global = true, env = "DATA_PROVIDER")]
    pub provider: Option<String>,

    /// Skip the local backend's simulated latency
    #[arg(long, global = true)]
    pub no_delay: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List records with filters, search, sorting and pagination
    List(ListArgs),

    /// Fetch one record
    Get(RecordArgs),

    /// Fetch several records by id
    GetMany(IdsArgs),

    /// List records referencing another record
    References(ReferenceArgs),

    /// Create a record from a JSON object
    Create(CreateArgs),

    /// Merge a JSON object into a record
    Update(UpdateArgs),

    /// Merge a JSON object into several records
    UpdateMany(UpdateManyArgs),

    /// Delete one record
    Delete(RecordArgs),

    /// Delete several records
    DeleteMany(IdsArgs),

    /// Create every record of a JSON array file
    Seed(SeedArgs),
}

/// Query options shared by `list` and `references`
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Page number (1-based)
    #[arg(long, default_value_t = 1)]
    pub page: i64,

    /// Records per page
    #[arg(long, default_value_t = 10)]
    pub per_page: i64,

    /// Sort as `field` or `field:DESC`
    #[arg(long)]
    pub sort: Option<Sort>,

    /// Filter as a JSON object, e.g. '{"role":"admin"}'
    #[arg(long)]
    pub filter: Option<String>,

    /// Free-text search
    #[arg(short = 'q', long)]
    pub search: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    pub resource: String,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    pub resource: String,
    pub id: String,
}

#[derive(Args, Debug)]
pub struct IdsArgs {
    pub resource: String,

    /// Comma-separated ids
    #[arg(value_delimiter = ',', required = true)]
    pub ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ReferenceArgs {
    pub resource: String,

    /// Referencing field, e.g. `authorId`
    pub target: String,

    /// Referenced id
    pub id: String,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub resource: String,

    /// Record fields as a JSON object
    pub data: String,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub resource: String,
    pub id: String,

    /// Changed fields as a JSON object
    pub data: String,
}

#[derive(Args, Debug)]
pub struct UpdateManyArgs {
    pub resource: String,

    /// Comma-separated ids
    #[arg(long, value_delimiter = ',', required = true)]
    pub ids: Vec<String>,

    /// Changed fields as a JSON object
    pub data: String,
}

#[derive(Args, Debug)]
pub struct SeedArgs {
    pub resource: String,

    /// JSON file holding an array of records
    pub file: PathBuf,
}

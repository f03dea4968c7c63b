use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_NAMESPACE, DEFAULT_STORE_ROOT, StoreConfig},
    ingest::WriteMode,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load CSV uploads into a relational store, one table per schema",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a CSV upload, resolving its destination table by name and columns
    Load(LoadArgs),
    /// Show the columns and row count of a table in the store
    Inspect(InspectArgs),
    /// List the tables of a namespace
    Tables(TablesArgs),
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Directory holding the destination store
    #[arg(long = "store", env = "CSV_LANDING_STORE", default_value = DEFAULT_STORE_ROOT)]
    pub store: PathBuf,
    /// Maximum time to wait on a store lock, in milliseconds
    #[arg(
        long = "busy-timeout-ms",
        env = "CSV_LANDING_BUSY_TIMEOUT_MS",
        default_value_t = DEFAULT_BUSY_TIMEOUT_MS
    )]
    pub busy_timeout_ms: u64,
}

impl StoreArgs {
    pub fn to_config(&self) -> StoreConfig {
        StoreConfig::new(&self.store).with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// CSV upload to load ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Upload filename used to derive the table name (defaults to the input's file name)
    #[arg(long = "filename")]
    pub filename: Option<String>,
    /// Explicit base table name, overriding the one derived from the filename
    #[arg(short = 't', long = "table")]
    pub table: Option<String>,
    /// Namespace (schema) receiving the table
    #[arg(short = 'n', long = "namespace", env = "CSV_LANDING_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
    /// Write mode for the resolved table
    #[arg(long = "mode", value_enum, default_value_t = WriteMode::Append)]
    pub mode: WriteMode,
    /// Character encoding of the upload (tried before lossy UTF-8; defaults to utf-8 then windows-1252)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Table to inspect
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Namespace (schema) holding the table
    #[arg(short = 'n', long = "namespace", env = "CSV_LANDING_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// Namespace (schema) to list
    #[arg(short = 'n', long = "namespace", env = "CSV_LANDING_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
    #[command(flatten)]
    pub store: StoreArgs,
}

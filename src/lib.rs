pub mod catalog;
pub mod cli;
pub mod columns;
pub mod config;
pub mod error;
pub mod headers;
pub mod ingest;
pub mod io_utils;
pub mod lock;
pub mod naming;
pub mod resolver;
pub mod rows;
pub mod store;
pub mod table;
pub mod upload;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    catalog::SchemaCatalog,
    cli::{Cli, Commands},
    error::{Fault, UploadError},
    naming::normalize_table,
    store::SqliteStore,
    upload::UploadRequest,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_landing", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => handle_load(&args),
        Commands::Inspect(args) => handle_inspect(&args),
        Commands::Tables(args) => handle_tables(&args),
    }
}

/// Exit status for a failed run: 2 when the upload itself was at fault,
/// 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<UploadError>().map(UploadError::fault) {
        Some(Fault::Client) => 2,
        _ => 1,
    }
}

fn open_store(args: &cli::StoreArgs) -> Result<SqliteStore> {
    let config = args.to_config();
    SqliteStore::open(config).with_context(|| format!("Opening store at {:?}", args.store))
}

fn handle_load(args: &cli::LoadArgs) -> Result<()> {
    let filename = match &args.filename {
        Some(name) => name.clone(),
        None if io_utils::is_dash(&args.input) => {
            return Err(UploadError::Validation(
                "--filename is required when reading from stdin".to_string(),
            )
            .into());
        }
        None => args
            .input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let content = io_utils::read_input(&args.input)
        .with_context(|| format!("Reading upload from {:?}", args.input))?;
    let store = open_store(&args.store)?;

    let mut request = UploadRequest::new(filename, content)
        .with_namespace(args.namespace.clone())
        .with_mode(args.mode)
        .with_encoding(encoding);
    if let Some(table) = &args.table {
        request = request.with_table(table.clone());
    }

    let response = upload::handle_upload(&store, &request)
        .with_context(|| format!("Loading {:?}", args.input))?;
    info!(
        "{} -> {}.{} ({})",
        request.filename, response.namespace, response.final_table, response.decision
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let namespace = normalize_table(&args.namespace);
    let table_name = normalize_table(&args.table);
    if !store.has_table(&namespace, &table_name)? {
        println!("Table {namespace}.{table_name} does not exist");
        return Ok(());
    }

    let rows = store
        .columns_of(&namespace, &table_name)?
        .into_iter()
        .enumerate()
        .map(|(idx, column)| vec![(idx + 1).to_string(), column])
        .collect::<Vec<_>>();
    table::print_table(&["#".to_string(), "column".to_string()], &rows);
    println!(
        "{namespace}.{table_name}: {} row(s)",
        store.row_count(&namespace, &table_name)?
    );
    Ok(())
}

fn handle_tables(args: &cli::TablesArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let namespace = normalize_table(&args.namespace);
    let tables = store.list_tables(&namespace)?;
    if tables.is_empty() {
        println!("No tables in namespace {namespace}");
        return Ok(());
    }
    let rows = tables.into_iter().map(|name| vec![name]).collect::<Vec<_>>();
    table::print_table(&["table".to_string()], &rows);
    Ok(())
}

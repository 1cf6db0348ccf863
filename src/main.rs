use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Error, Result};
use clap::{Parser, Subcommand};
use heapdb::common::{DbConfig, DEFAULT_LOCK_TIMEOUT, DEFAULT_PAGE_SIZE, DEFAULT_POOL_SIZE};
use heapdb::tuple::value::Value;
use heapdb::tuple::Tuple;
use heapdb::Database;

#[derive(Parser)]
struct CliConfig {
    #[arg(long, help = "Directory where data is stored")]
    data: PathBuf,

    #[arg(
        long,
        help = "Catalog file describing the tables, defaults to catalog.txt inside the data directory"
    )]
    catalog: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_POOL_SIZE, help = "Size of buffer pool")]
    pool_size: usize,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, help = "Page size in bytes")]
    page_size: usize,

    #[arg(
        long,
        default_value_t = DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
        help = "How long a transaction waits for a page lock before it is aborted"
    )]
    lock_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all tables with their page count and schema
    Tables,
    /// Print every tuple of a table
    Scan { table: String },
    /// Insert a single tuple and commit it
    Insert { table: String, values: Vec<String> },
}

fn main() -> Result<()> {
    env_logger::init();
    let config = CliConfig::parse();

    if !config.data.is_dir() {
        return Err(Error::msg(format!(
            "{} is not a directory",
            config.data.display()
        )));
    }
    let catalog_file = config
        .catalog
        .clone()
        .unwrap_or_else(|| config.data.join("catalog.txt"));

    let db = Database::new(
        DbConfig::default()
            .with_page_size(config.page_size)
            .with_pool_size(config.pool_size)
            .with_lock_timeout(Duration::from_millis(config.lock_timeout_ms)),
    );
    db.load_schema(&catalog_file)
        .with_context(|| format!("Failed to load catalog {}", catalog_file.display()))?;

    let mut writer = BufWriter::new(io::stdout().lock());
    match config.command {
        Command::Tables => list_tables(&db, &mut writer)?,
        Command::Scan { table } => scan_table(&db, &table, &mut writer)?,
        Command::Insert { table, values } => insert_tuple(&db, &table, &values, &mut writer)?,
    }
    writer.flush()?;

    Ok(())
}

fn list_tables(db: &Database, writer: &mut impl Write) -> Result<()> {
    let catalog = db.catalog();
    for table_id in catalog.table_ids() {
        let file = catalog.get_file(table_id)?;
        writeln!(
            writer,
            "{}\t{}\t{} pages\t{}",
            table_id,
            catalog.table_name(table_id)?,
            file.num_pages(),
            file.schema()
        )?;
    }
    Ok(())
}

fn scan_table(db: &Database, table_name: &str, writer: &mut impl Write) -> Result<()> {
    let table_id = db.catalog().get_table_id(table_name)?;
    let tuples = db
        .run_transaction(|tid| db.scan(tid, table_id)?.collect::<heapdb::Result<Vec<_>>>())
        .with_context(|| format!("Failed to scan table {}", table_name))?;
    for tuple in tuples {
        writeln!(writer, "{}", tuple)?;
    }
    Ok(())
}

fn insert_tuple(
    db: &Database,
    table_name: &str,
    literals: &[String],
    writer: &mut impl Write,
) -> Result<()> {
    let catalog = db.catalog();
    let table_id = catalog.get_table_id(table_name)?;
    let schema = catalog.get_schema(table_id)?;
    if literals.len() != schema.columns().len() {
        return Err(Error::msg(format!(
            "Table {} has {} columns, got {} values",
            table_name,
            schema.columns().len(),
            literals.len()
        )));
    }

    let values = literals
        .iter()
        .zip(schema.columns())
        .map(|(literal, column)| Value::parse_literal(literal, column.type_id()))
        .collect::<heapdb::Result<Vec<_>>>()?;
    let mut tuple = Tuple::new(values, schema)?;

    let record_id = db
        .run_transaction(|tid| db.buffer_pool().insert_tuple(tid, table_id, &mut tuple))
        .with_context(|| format!("Failed to insert into table {}", table_name))?;
    writeln!(writer, "{}", record_id)?;
    Ok(())
}

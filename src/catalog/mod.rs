use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::info;

use crate::common::{TableId, USER_DATA_TABLE_ID_START};
use crate::error::{DbError, Result};
use crate::storage::heap::file::HeapFile;
use crate::tuple::schema::{ColumnDefinition, Schema, TypeId};

struct TableEntry {
    name: String,
    primary_key: Option<String>,
    file: Arc<HeapFile>,
}

/// Catalog keeps track of all tables and the heap files storing them.
pub struct Catalog {
    page_size: usize,
    next_table_id: AtomicU32,
    tables: DashMap<TableId, TableEntry>,
    table_name_to_id: DashMap<String, TableId>,
}

impl Catalog {
    /// Creates an empty catalog whose tables use pages of `page_size` bytes
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            next_table_id: AtomicU32::new(USER_DATA_TABLE_ID_START),
            tables: DashMap::new(),
            table_name_to_id: DashMap::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Registers a table stored in the heap file at `path`, creating the file if needed.
    /// A table registered earlier under the same name is replaced.
    pub fn add_table(
        &self,
        name: &str,
        schema: Schema,
        path: impl Into<PathBuf>,
        primary_key: Option<&str>,
    ) -> Result<TableId> {
        let table_id = self.generate_table_id()?;
        let file = HeapFile::open(path, table_id, Arc::new(schema), self.page_size)?;
        info!(
            "Added table {} with id {} and schema {}",
            name,
            table_id,
            file.schema()
        );

        self.tables.insert(
            table_id,
            TableEntry {
                name: name.to_owned(),
                primary_key: primary_key.map(str::to_owned),
                file: Arc::new(file),
            },
        );
        if let Some(replaced) = self.table_name_to_id.insert(name.to_owned(), table_id) {
            self.tables.remove(&replaced);
            info!("Table {} replaced table {} named {}", table_id, replaced, name);
        }

        Ok(table_id)
    }

    pub fn get_table_id(&self, name: &str) -> Result<TableId> {
        self.table_name_to_id
            .get(name)
            .map(|kv| *kv.value())
            .ok_or_else(|| DbError::NoSuchTableName(name.to_owned()))
    }

    pub fn get_schema(&self, table_id: TableId) -> Result<Arc<Schema>> {
        self.get_file(table_id).map(|file| Arc::clone(file.schema()))
    }

    pub fn get_file(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.tables
            .get(&table_id)
            .map(|table| Arc::clone(&table.file))
            .ok_or(DbError::NoSuchTable(table_id))
    }

    pub fn get_primary_key(&self, table_id: TableId) -> Result<Option<String>> {
        self.tables
            .get(&table_id)
            .map(|table| table.primary_key.clone())
            .ok_or(DbError::NoSuchTable(table_id))
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.tables
            .get(&table_id)
            .map(|table| table.name.clone())
            .ok_or(DbError::NoSuchTable(table_id))
    }

    /// Ids of all registered tables in ascending order
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut table_ids = self
            .tables
            .iter()
            .map(|table| *table.key())
            .collect::<Vec<_>>();
        table_ids.sort_unstable();
        table_ids
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names = self
            .table_name_to_id
            .iter()
            .map(|s| s.key().to_owned())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Forgets all tables. The heap files stay on disk.
    pub fn clear(&self) {
        self.table_name_to_id.clear();
        self.tables.clear();
    }

    /// Registers every table described in a catalog file and returns their ids in file order.
    ///
    /// Each non-empty line has the form `name (column type [pk], ...)` where type is one of
    /// `int`, `string` or `bool`. The data of table `name` is stored in `name.dat` next to the
    /// catalog file.
    pub fn load_schema(&self, catalog_file: impl AsRef<Path>) -> Result<Vec<TableId>> {
        let catalog_file = catalog_file.as_ref();
        let base_dir = catalog_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let content = fs::read_to_string(catalog_file)?;

        let mut table_ids = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            let (name, columns, primary_key) = parse_table_definition(line)?;
            let path = base_dir.join(format!("{}.dat", name));
            let table_id =
                self.add_table(&name, Schema::new(columns), path, primary_key.as_deref())?;
            table_ids.push(table_id);
        }

        Ok(table_ids)
    }

    fn generate_table_id(&self) -> Result<TableId> {
        self.next_table_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
                prev.checked_add(1)
            })
            .map_err(|_| {
                DbError::InvalidSchema(
                    "Cannot create new table. TableId space is already exhausted".to_owned(),
                )
            })
    }
}

/// Parses a single catalog line, see [`Catalog::load_schema`]
fn parse_table_definition(
    line: &str,
) -> Result<(String, Vec<ColumnDefinition>, Option<String>)> {
    let invalid = |reason: &str| DbError::InvalidSchema(format!("{}: {}", reason, line));

    let (open, close) = match (line.find('('), line.rfind(')')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Err(invalid("Invalid catalog entry")),
    };
    let name = line[..open].trim();
    if name.is_empty() {
        return Err(invalid("Missing table name"));
    }

    let mut columns = Vec::new();
    let mut primary_key = None;
    for field in line[open + 1..close].split(',') {
        let parts = field.split_whitespace().collect::<Vec<_>>();
        let (column_name, type_name) = match parts.as_slice() {
            [column_name, type_name] => (*column_name, *type_name),
            [column_name, type_name, "pk"] => {
                primary_key = Some(column_name.to_string());
                (*column_name, *type_name)
            }
            [_, _, annotation] => {
                return Err(invalid(&format!("Unknown annotation {}", annotation)))
            }
            _ => return Err(invalid("Invalid column definition")),
        };
        let type_id = type_name
            .parse::<TypeId>()
            .map_err(|_| invalid(&format!("Unknown type {}", type_name)))?;
        columns.push(ColumnDefinition::new(type_id, column_name));
    }

    Ok((name.to_owned(), columns, primary_key))
}

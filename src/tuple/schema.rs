use std::fmt::Display;
use std::str::FromStr;

use crate::error::DbError;

/// Longest text value that fits into a fixed-width text column
pub const MAX_TEXT_LEN: usize = 128;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeId {
    Boolean,
    Integer,
    Text,
}

impl TypeId {
    /// Serialized width in bytes. Every value of a type occupies the same width.
    pub fn size(&self) -> usize {
        match self {
            TypeId::Boolean => 1,
            TypeId::Integer => 4,
            // length prefix followed by the padded characters
            TypeId::Text => 4 + MAX_TEXT_LEN,
        }
    }
}

impl FromStr for TypeId {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Ok(TypeId::Boolean),
            "int" | "integer" => Ok(TypeId::Integer),
            "string" | "text" => Ok(TypeId::Text),
            _ => Err(DbError::InvalidSchema(format!("Invalid TypeId {}", s))),
        }
    }
}

impl Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnDefinition {
    type_id: TypeId,
    column_name: String,
}

impl ColumnDefinition {
    pub fn new(type_id: TypeId, column_name: impl Into<String>) -> Self {
        Self {
            type_id,
            column_name: column_name.into(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Schema {
    columns: Vec<ColumnDefinition>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDefinition>) -> Self {
        Self { columns }
    }

    /// Builds a schema with anonymous columns
    pub fn from_types(types: &[TypeId]) -> Self {
        Self {
            columns: types
                .iter()
                .map(|type_id| ColumnDefinition::new(*type_id, ""))
                .collect(),
        }
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.column_name().eq(name))
    }

    /// Bytes occupied by one serialized tuple of this schema
    pub fn tuple_size(&self) -> usize {
        self.columns.iter().map(|col| col.type_id().size()).sum()
    }

    /// Two schemas are compatible if their column types line up, names are ignored.
    pub fn is_compatible(&self, other: &Schema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.type_id() == b.type_id())
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let columns = self
            .columns
            .iter()
            .map(|col| format!("{}({})", col.column_name(), col.type_id()))
            .collect::<Vec<_>>();
        write!(f, "{}", columns.join(", "))
    }
}

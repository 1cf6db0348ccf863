use std::fmt::Display;
use std::sync::Arc;

use self::schema::Schema;
use self::value::Value;
use crate::common::RecordId;
use crate::error::{DbError, Result};
use crate::storage::codec::{Deserializer, Serializer};

pub mod schema;
pub mod value;

/// A row of a table. Once stored, it knows where it lives through its record id.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    values: Vec<Value>,
    schema: Arc<Schema>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(values: Vec<Value>, schema: Arc<Schema>) -> Result<Self> {
        if values.len() != schema.columns().len() {
            return Err(DbError::InvalidValue(format!(
                "expected {} values, got {}",
                schema.columns().len(),
                values.len()
            )));
        }
        for (value, column) in values.iter().zip(schema.columns()) {
            value.check_type(column.type_id())?;
        }

        Ok(Self {
            values,
            schema,
            record_id: None,
        })
    }

    /// Parses a tuple from exactly `schema.tuple_size()` bytes
    pub fn parse(bytes: &[u8], schema: Arc<Schema>) -> Result<Self> {
        let mut deserializer = Deserializer::new(bytes);
        let mut values = Vec::with_capacity(schema.columns().len());
        for column in schema.columns() {
            values.push(Value::parse_value(&mut deserializer, column.type_id())?);
        }

        Ok(Self {
            values,
            schema,
            record_id: None,
        })
    }

    /// Writes the tuple into `buffer`, which has to hold at least `schema.tuple_size()` bytes.
    /// Returns how many bytes were written
    pub fn serialize(&self, buffer: &mut [u8]) -> usize {
        let mut serializer = Serializer::new(buffer);
        for value in &self.values {
            value.serialize_value(&mut serializer);
        }
        serializer.end()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    pub fn as_str(&self, column: usize) -> &str {
        self.values[column].as_str()
    }

    pub fn as_i32(&self, column: usize) -> i32 {
        self.values[column].as_i32()
    }

    pub fn as_bool(&self, column: usize) -> bool {
        self.values[column].as_bool()
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self
            .values
            .iter()
            .map(|val| val.to_string())
            .collect::<Vec<_>>();
        write!(f, "{}", values.join("\t"))
    }
}

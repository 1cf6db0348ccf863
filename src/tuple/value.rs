use std::fmt::Display;

use super::schema::{TypeId, MAX_TEXT_LEN};
use crate::error::{DbError, Result};
use crate::storage::codec::{Deserializer, Serializer};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    String(String),
}

impl Value {
    /// parses a value of the given type, consuming exactly `type_id.size()` bytes
    pub(crate) fn parse_value(deserializer: &mut Deserializer, type_id: TypeId) -> Result<Self> {
        match type_id {
            TypeId::Boolean => match deserializer.deserialize_u8() {
                0 => Ok(Value::Boolean(false)),
                1 => Ok(Value::Boolean(true)),
                b => Err(DbError::InvalidValue(format!("{} is not a boolean", b))),
            },
            TypeId::Integer => Ok(Value::Integer(deserializer.deserialize_i32())),
            TypeId::Text => {
                let len = deserializer.deserialize_u32() as usize;
                if len > MAX_TEXT_LEN {
                    return Err(DbError::InvalidValue(format!(
                        "text length {} exceeds {}",
                        len, MAX_TEXT_LEN
                    )));
                }
                let bytes = deserializer.bytes(MAX_TEXT_LEN);
                let val = std::str::from_utf8(&bytes[..len])
                    .map_err(|e| DbError::InvalidValue(e.to_string()))?
                    .to_owned();
                Ok(Value::String(val))
            }
        }
    }

    /// Writes this value using the fixed width of its type
    pub(crate) fn serialize_value(&self, serializer: &mut Serializer) {
        match self {
            Value::Boolean(b) => serializer.serialize_u8(*b as u8),
            Value::Integer(val) => serializer.serialize_i32(*val),
            Value::String(val) => {
                let bytes = val.as_bytes();
                serializer.serialize_u32(bytes.len() as u32);
                serializer.copy_bytes(bytes);
                serializer.zeroes(MAX_TEXT_LEN - bytes.len());
            }
        }
    }

    /// Parses a user supplied literal, e.g. from the command line
    pub fn parse_literal(literal: &str, type_id: TypeId) -> Result<Self> {
        let value = match type_id {
            TypeId::Boolean => Value::Boolean(
                literal
                    .parse()
                    .map_err(|_| DbError::InvalidValue(format!("{} is not a boolean", literal)))?,
            ),
            TypeId::Integer => Value::Integer(
                literal
                    .parse()
                    .map_err(|_| DbError::InvalidValue(format!("{} is not an integer", literal)))?,
            ),
            TypeId::Text => Value::String(literal.to_owned()),
        };
        value.check_type(type_id)?;
        Ok(value)
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Boolean(_) => TypeId::Boolean,
            Value::Integer(_) => TypeId::Integer,
            Value::String(_) => TypeId::Text,
        }
    }

    /// Checks that the value can be stored in a column of the given type
    pub fn check_type(&self, type_id: TypeId) -> Result<()> {
        if self.type_id() != type_id {
            return Err(DbError::InvalidValue(format!(
                "expected {}, got {:?}",
                type_id, self
            )));
        }
        if let Value::String(val) = self {
            if val.as_bytes().len() > MAX_TEXT_LEN {
                return Err(DbError::InvalidValue(format!(
                    "text of {} bytes exceeds {}",
                    val.as_bytes().len(),
                    MAX_TEXT_LEN
                )));
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        match &self {
            Value::String(val) => val,
            _ => unreachable!(),
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            Value::Integer(val) => *val,
            _ => unreachable!(),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Boolean(val) => *val,
            _ => unreachable!(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

//! Tabular types for snapshots.
//!
//! A snapshot copies selected frame columns into an in-memory [`DataSet`] of typed [`Value`]s,
//! described by a [`Schema`] of [`DataType`]s.

use std::fmt;

use serde::Serialize;

/// Logical data type of a snapshot column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Int64 => "Int64",
            DataType::Float64 => "Float64",
            DataType::Bool => "Bool",
        };
        f.write_str(s)
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields describing the shape of a [`DataSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed snapshot value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{DataSet, DataType, Field, Schema, Value};

    #[test]
    fn schema_index_of_works() {
        let schema = Schema::new(vec![
            Field::new("eventNumber", DataType::Int64),
            Field::new("response", DataType::Float64),
        ]);
        assert_eq!(schema.index_of("eventNumber"), Some(0));
        assert_eq!(schema.index_of("response"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
        assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["eventNumber", "response"]);
    }

    #[test]
    fn null_prints_as_empty() {
        assert_eq!(Value::Int64(211).to_string(), "211");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Float64(1.25).to_string(), "1.25");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }

    #[test]
    fn dataset_column_projection() {
        let ds = DataSet::new(
            Schema::new(vec![
                Field::new("id", DataType::Int64),
                Field::new("e", DataType::Float64),
            ]),
            vec![
                vec![Value::Int64(1), Value::Float64(50.0)],
                vec![Value::Int64(2), Value::Float64(12.5)],
            ],
        );
        assert_eq!(ds.row_count(), 2);
        assert_eq!(
            ds.column("e"),
            Some(vec![&Value::Float64(50.0), &Value::Float64(12.5)])
        );
        assert_eq!(ds.column("missing"), None);
    }
}

//! Schemas with fixed serialized tuple sizes.
//!
//! Every column has a fixed byte width, so a schema determines the exact
//! serialized size of its tuples. Operators use that size to compute how
//! many tuples fit in one page.

use std::collections::HashMap;

use grist_common::{GristError, GristResult};

/// The type of a column, with its fixed serialized width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 32-bit signed integer.
    Int,
    /// 32-bit floating point.
    Float,
    /// String of at most the given number of bytes.
    Varchar(usize),
}

impl ColumnType {
    /// Returns the serialized width of a value of this type in bytes.
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        match self {
            ColumnType::Int | ColumnType::Float => 4,
            ColumnType::Varchar(width) => *width,
        }
    }

    /// Returns the name of this type, for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Varchar(_) => "string",
        }
    }
}

/// A named, typed column in a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
}

impl Field {
    /// Creates a new field.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    /// Creates an integer field.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Int)
    }

    /// Creates a float field.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Float)
    }

    /// Creates a varchar field of the given byte width.
    pub fn varchar(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, ColumnType::Varchar(width))
    }
}

/// An ordered list of fields with name lookup.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Fields in the schema.
    fields: Vec<Field>,
    /// Index by column name for fast lookup.
    index: HashMap<String, usize>,
}

impl Schema {
    /// Creates a schema from a list of fields.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        let mut schema = Self {
            fields: Vec::with_capacity(fields.len()),
            index: HashMap::new(),
        };
        for field in fields {
            schema.add_field(field);
        }
        schema
    }

    /// Adds a field to the schema.
    ///
    /// On duplicate names the first occurrence wins for lookup, matching
    /// the behavior joins need when both sides share a column name.
    pub fn add_field(&mut self, field: Field) {
        if !self.index.contains_key(&field.name) {
            self.index.insert(field.name.clone(), self.fields.len());
        }
        self.fields.push(field);
    }

    /// Returns the fields of this schema.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the field at the given position.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.fields.len()
    }

    /// Returns the position of the named column.
    pub fn index_of(&self, name: &str) -> GristResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GristError::ColumnNotFound {
                column: name.to_string(),
            })
    }

    /// Returns the serialized size of one tuple of this schema in bytes.
    #[must_use]
    pub fn tuple_size(&self) -> usize {
        self.fields.iter().map(|f| f.column_type.byte_size()).sum()
    }

    /// Builds the schema of a join output: this schema's columns followed by
    /// the other schema's columns, without duplicate elimination.
    #[must_use]
    pub fn join(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema::new(fields)
    }
}

//! Schema agnostic description of a single row to upsert.
//!
//! Converters and repositories build [`InsertionModel`]s; the storage backend
//! resolves their foreign keys and renders them into parameterized statements.
use std::collections::{BTreeMap, HashMap};

/// A bound column value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    /// Arbitrary precision decimal, passed as text and cast by the database.
    Numeric(String),
    BigInt(i64),
    Null,
}

/// Dimension tables a model may reference.
///
/// Each variant resolves a natural value to a surrogate id stored in
/// [`ForeignKeyField::column`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ForeignKeyField {
    /// 0x prefixed 32 byte ilk, resolved against `maker.ilks`.
    Ilk,
    /// Address of the contract emitting the fact, resolved against
    /// `public.addresses`.
    Address,
}

impl ForeignKeyField {
    pub fn column(&self) -> &'static str {
        match self {
            ForeignKeyField::Ilk => "ilk_id",
            ForeignKeyField::Address => "address_id",
        }
    }
}

/// What to do when the natural key of a model already exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OnConflict {
    /// The first write wins. Used for storage facts, a (block, identity)
    /// tuple never changes value.
    DoNothing,
    /// Overwrite every non-key column. Used for event facts, redelivering a
    /// log rewrites the same values.
    Update { key: Vec<&'static str> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertionModel {
    pub schema: &'static str,
    pub table: &'static str,
    pub ordered_columns: Vec<&'static str>,
    pub column_values: HashMap<&'static str, ColumnValue>,
    pub foreign_keys: BTreeMap<ForeignKeyField, String>,
    pub on_conflict: OnConflict,
}

impl InsertionModel {
    pub fn new(schema: &'static str, table: &'static str) -> Self {
        InsertionModel {
            schema,
            table,
            ordered_columns: Vec::new(),
            column_values: HashMap::new(),
            foreign_keys: BTreeMap::new(),
            on_conflict: OnConflict::DoNothing,
        }
    }

    pub fn column(mut self, name: &'static str, value: ColumnValue) -> Self {
        if !self.ordered_columns.contains(&name) {
            self.ordered_columns.push(name);
        }
        self.column_values.insert(name, value);
        self
    }

    /// Registers a natural value to resolve at write time. The resolved id
    /// is written to the field's column.
    pub fn foreign_key(mut self, field: ForeignKeyField, natural: impl Into<String>) -> Self {
        let column = field.column();
        if !self.ordered_columns.contains(&column) {
            self.ordered_columns.push(column);
        }
        self.foreign_keys.insert(field, natural.into());
        self
    }

    pub fn on_conflict(mut self, policy: OnConflict) -> Self {
        self.on_conflict = policy;
        self
    }

    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// A contract level scalar written through the headerless value tracker.
///
/// Rows are keyed by `(address_id, block_number, block_hash)`; header
/// linkage is computed by the backend at write time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderlessValue {
    pub schema: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    pub address: String,
    pub block_number: i64,
    pub block_hash: String,
    pub value: ColumnValue,
}

impl HeaderlessValue {
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// A single write produced by a storage repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageWrite {
    Upsert(InsertionModel),
    Headerless(HeaderlessValue),
}

impl StorageWrite {
    pub fn table(&self) -> &'static str {
        match self {
            StorageWrite::Upsert(m) => m.table,
            StorageWrite::Headerless(h) => h.table,
        }
    }
}

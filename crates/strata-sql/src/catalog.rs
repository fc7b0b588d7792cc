//! In-memory catalog: databases, tables, columns, and indexes.
//!
//! Catalog objects reference each other by dense 32-bit ids rather than
//! pointers; the id-based layout is also the on-disk representation under
//! the `CTL.*` key namespace. The catalog is loaded at startup by scanning
//! the namespace prefixes in order (databases, tables, columns, indexes) and
//! is mutated in place during statement compilation, with a `mutated` flag
//! signalling that catalog persistence entries were staged.

use tracing::debug;

use strata_store::{KeyReaderSpec, Store};

use crate::ast::ColSpec;
use crate::encoding::{decode_id, encode_id, map_key, ENC_ID_LEN, MAX_KEY_LEN};
use crate::error::{SqlError, SqlResult};
use crate::value::SqlType;

/// Key prefix for database catalog entries.
pub const CATALOG_DATABASE_PREFIX: &str = "CTL.DATABASE.";
/// Key prefix for table catalog entries.
pub const CATALOG_TABLE_PREFIX: &str = "CTL.TABLE.";
/// Key prefix for column catalog entries.
pub const CATALOG_COLUMN_PREFIX: &str = "CTL.COLUMN.";
/// Key prefix for index catalog entries.
pub const CATALOG_INDEX_PREFIX: &str = "CTL.INDEX.";
/// Key prefix for primary-index row entries.
pub const P_INDEX_PREFIX: &str = "P.";
/// Key prefix for non-unique secondary-index entries.
pub const S_INDEX_PREFIX: &str = "S.";
/// Key prefix for unique secondary-index entries.
pub const U_INDEX_PREFIX: &str = "U.";

/// Reserved id of every table's primary index.
pub const PK_INDEX_ID: u32 = 0;

/// Maximum number of columns in a single index.
pub const MAX_NUMBER_OF_COLUMNS_IN_INDEX: usize = 8;

/// Column flags byte: set when the column is NOT NULL.
pub const NOT_NULL_FLAG: u8 = 1;
/// Column flags byte: set when the column is AUTO_INCREMENT.
pub const AUTO_INCREMENT_FLAG: u8 = 1 << 1;

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column id, dense and 1-based within its table.
    pub id: u32,
    /// Column name.
    pub name: String,
    /// Logical type.
    pub sql_type: SqlType,
    /// Maximum value length in bytes; required (non-zero) for
    /// variable-length columns used in indexes.
    pub max_len: usize,
    /// Rejects NULL values when set.
    pub not_null: bool,
    /// Auto-assigned primary key when set.
    pub auto_increment: bool,
}

impl Column {
    /// Effective maximum encoded length of this column's values.
    #[must_use]
    pub fn max_len(&self) -> usize {
        if self.sql_type.is_fixed_size() && self.max_len == 0 {
            8
        } else {
            self.max_len
        }
    }

    /// Returns true if the column's key encoding needs a declared max length.
    #[must_use]
    pub fn is_variable_sized(&self) -> bool {
        !self.sql_type.is_fixed_size()
    }
}

/// An index over an ordered list of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Index id; `0` is reserved for the primary index.
    pub id: u32,
    /// Rejects duplicate column tuples when set.
    pub unique: bool,
    /// Ordered ids of the indexed columns.
    pub col_ids: Vec<u32>,
}

impl Index {
    /// Returns true if this is the table's primary index.
    #[inline]
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.id == PK_INDEX_ID
    }

    /// Returns true if a scan over this index yields rows ordered by
    /// `col_id`, given the per-column ranges derived from the predicate:
    /// every indexed column ahead of `col_id` must be pinned to a single
    /// value.
    #[must_use]
    pub fn sortable_using(
        &self,
        col_id: u32,
        ranges: &std::collections::HashMap<u32, crate::expr::ValueRange>,
    ) -> bool {
        for &id in &self.col_ids {
            if id == col_id {
                return true;
            }
            match ranges.get(&id) {
                Some(r) if r.is_unitary() => continue,
                _ => return false,
            }
        }
        false
    }
}

/// A table: columns, indexes, and the auto-increment high-water mark.
#[derive(Debug, Clone)]
pub struct Table {
    /// Table id, dense and 1-based within its database.
    pub id: u32,
    /// Owning database id.
    pub db_id: u32,
    /// Table name, unique within the database.
    pub name: String,
    /// Columns ordered by id.
    pub cols: Vec<Column>,
    /// Indexes ordered by id; `indexes[0]` is the primary index.
    pub indexes: Vec<Index>,
    /// Greatest primary key value handed out by auto-increment.
    pub max_pk: i64,
}

impl Table {
    fn new(id: u32, db_id: u32, name: String, specs: &[ColSpec]) -> SqlResult<Self> {
        if specs.is_empty() {
            return Err(SqlError::IllegalArguments("table needs at least one column"));
        }

        let mut cols = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if cols.iter().any(|c: &Column| c.name == spec.name) {
                return Err(SqlError::DuplicatedColumn(spec.name.clone()));
            }
            cols.push(Column {
                id: i as u32 + 1,
                name: spec.name.clone(),
                sql_type: spec.sql_type,
                max_len: spec.max_len,
                not_null: spec.not_null,
                auto_increment: spec.auto_increment,
            });
        }

        Ok(Self {
            id,
            db_id,
            name,
            cols,
            indexes: Vec::new(),
            max_pk: 0,
        })
    }

    /// Looks up a column by name.
    pub fn col_by_name(&self, name: &str) -> SqlResult<&Column> {
        self.cols
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SqlError::ColumnDoesNotExist(name.to_string()))
    }

    /// Looks up a column by id.
    pub fn col_by_id(&self, id: u32) -> SqlResult<&Column> {
        self.cols
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| SqlError::ColumnDoesNotExist(format!("#{id}")))
    }

    /// The table's primary index.
    ///
    /// Present on every fully created table; absent only while a CREATE
    /// TABLE compilation is in flight.
    pub fn primary_index(&self) -> SqlResult<&Index> {
        self.indexes
            .first()
            .filter(|ix| ix.is_primary())
            .ok_or(SqlError::Unexpected("table without primary index"))
    }

    /// Returns true if the primary key is a single auto-increment column.
    #[must_use]
    pub fn auto_increment_pk(&self) -> bool {
        self.primary_index()
            .ok()
            .filter(|ix| ix.col_ids.len() == 1)
            .and_then(|ix| self.col_by_id(ix.col_ids[0]).ok())
            .is_some_and(|c| c.auto_increment)
    }

    /// Finds the index with exactly this ordered column-id tuple.
    #[must_use]
    pub fn index_for_cols(&self, col_ids: &[u32]) -> Option<&Index> {
        self.indexes.iter().find(|ix| ix.col_ids == col_ids)
    }

    /// All indexes covering the given column.
    #[must_use]
    pub fn indexes_covering(&self, col_id: u32) -> Vec<&Index> {
        self.indexes
            .iter()
            .filter(|ix| ix.col_ids.contains(&col_id))
            .collect()
    }

    /// Registers a new index over the given columns.
    ///
    /// The first index created becomes the primary index (id 0).
    pub fn new_index(&mut self, unique: bool, col_ids: Vec<u32>) -> SqlResult<&Index> {
        if col_ids.is_empty() {
            return Err(SqlError::IllegalArguments("index needs at least one column"));
        }
        if col_ids.len() > MAX_NUMBER_OF_COLUMNS_IN_INDEX {
            return Err(SqlError::MaxNumberOfColumnsInIndexExceeded);
        }
        for &id in &col_ids {
            self.col_by_id(id)?;
        }
        if self.index_for_cols(&col_ids).is_some() {
            return Err(SqlError::IllegalArguments("index already exists"));
        }

        let id = self.indexes.len() as u32;
        self.indexes.push(Index { id, unique, col_ids });
        Ok(&self.indexes[id as usize])
    }
}

/// A database: a namespace of tables.
#[derive(Debug, Clone)]
pub struct Database {
    /// Database id, dense and 1-based within the catalog.
    pub id: u32,
    /// Database name, unique within the catalog.
    pub name: String,
    /// Tables ordered by id.
    pub tables: Vec<Table>,
}

impl Database {
    /// Looks up a table by name.
    pub fn table_by_name(&self, name: &str) -> SqlResult<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SqlError::TableDoesNotExist(name.to_string()))
    }

    /// Mutable variant of [`Self::table_by_name`].
    pub fn table_by_name_mut(&mut self, name: &str) -> SqlResult<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| SqlError::TableDoesNotExist(name.to_string()))
    }

    /// Returns true if a table with this name exists.
    #[must_use]
    pub fn exist_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }

    /// Creates a table from column specifications and returns it.
    pub fn new_table(&mut self, name: &str, specs: &[ColSpec]) -> SqlResult<&mut Table> {
        if self.exist_table(name) {
            return Err(SqlError::TableAlreadyExists(name.to_string()));
        }

        let id = self.tables.len() as u32 + 1;
        let table = Table::new(id, self.id, name.to_string(), specs)?;
        self.tables.push(table);
        Ok(self.tables.last_mut().expect("just pushed"))
    }
}

/// The in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    dbs: Vec<Database>,
    /// Set when compilation mutated in-memory state, signalling that staged
    /// catalog entries must be committed by the enclosing transaction.
    pub mutated: bool,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All databases, ordered by id.
    #[must_use]
    pub fn databases(&self) -> &[Database] {
        &self.dbs
    }

    /// Looks up a database by name.
    pub fn db_by_name(&self, name: &str) -> SqlResult<&Database> {
        self.dbs
            .iter()
            .find(|db| db.name == name)
            .ok_or_else(|| SqlError::DatabaseDoesNotExist(name.to_string()))
    }

    /// Mutable variant of [`Self::db_by_name`].
    pub fn db_by_name_mut(&mut self, name: &str) -> SqlResult<&mut Database> {
        self.dbs
            .iter_mut()
            .find(|db| db.name == name)
            .ok_or_else(|| SqlError::DatabaseDoesNotExist(name.to_string()))
    }

    /// Looks up a database by id.
    pub fn db_by_id(&self, id: u32) -> SqlResult<&Database> {
        self.dbs
            .get(id.checked_sub(1).ok_or(SqlError::Unexpected("zero db id"))? as usize)
            .ok_or_else(|| SqlError::DatabaseDoesNotExist(format!("#{id}")))
    }

    /// Creates a database and returns it.
    pub fn new_database(&mut self, name: &str) -> SqlResult<&Database> {
        if self.dbs.iter().any(|db| db.name == name) {
            return Err(SqlError::DatabaseAlreadyExists(name.to_string()));
        }

        let id = self.dbs.len() as u32 + 1;
        self.dbs.push(Database {
            id,
            name: name.to_string(),
            tables: Vec::new(),
        });
        Ok(self.dbs.last().expect("just pushed"))
    }

    /// Loads the catalog from the store by scanning the `CTL.*` prefixes in
    /// order, then recovers each auto-increment table's `max_pk` with one
    /// descending scan over its primary prefix.
    pub fn load(store: &dyn Store) -> SqlResult<Self> {
        let mut catalog = Self::new();
        let snapshot = store.current_snapshot()?;

        // Catalog values legitimately start with flag bytes equal to the
        // tombstone marker, so every scan here must include "deleted" keys.
        let scan = |prefix: &str| {
            snapshot.new_key_reader(
                KeyReaderSpec::for_prefix(prefix.as_bytes().to_vec()).with_include_deleted(true),
            )
        };

        let mut reader = scan(CATALOG_DATABASE_PREFIX)?;
        while let Some((key, value)) = reader.read()? {
            let id = decode_id(&key[CATALOG_DATABASE_PREFIX.len()..])?;
            let name = String::from_utf8(value.as_bytes().to_vec())
                .map_err(|_| SqlError::InvalidValue)?;
            let db = catalog.new_database(&name)?;
            if db.id != id {
                return Err(SqlError::Unexpected("non-dense database ids"));
            }
        }

        let mut reader = scan(CATALOG_TABLE_PREFIX)?;
        while let Some((key, value)) = reader.read()? {
            let rest = &key[CATALOG_TABLE_PREFIX.len()..];
            let db_id = decode_id(rest)?;
            let table_id = decode_id(&rest[ENC_ID_LEN..])?;
            let name = String::from_utf8(value.as_bytes().to_vec())
                .map_err(|_| SqlError::InvalidValue)?;

            let db = catalog.db_by_id_mut(db_id)?;
            if db.exist_table(&name) {
                return Err(SqlError::Unexpected("duplicate table entry"));
            }
            db.tables.push(Table {
                id: table_id,
                db_id,
                name,
                cols: Vec::new(),
                indexes: Vec::new(),
                max_pk: 0,
            });
            if db.tables.len() as u32 != table_id {
                return Err(SqlError::Unexpected("non-dense table ids"));
            }
        }

        let mut reader = scan(CATALOG_COLUMN_PREFIX)?;
        while let Some((key, value)) = reader.read()? {
            let rest = &key[CATALOG_COLUMN_PREFIX.len()..];
            let db_id = decode_id(rest)?;
            let table_id = decode_id(&rest[ENC_ID_LEN..])?;
            let col_id = decode_id(&rest[2 * ENC_ID_LEN..])?;
            let type_str = std::str::from_utf8(&rest[3 * ENC_ID_LEN..])
                .map_err(|_| SqlError::InvalidValue)?;
            let sql_type = SqlType::parse(type_str)?;

            let v = value.as_bytes();
            if v.len() < 1 + ENC_ID_LEN {
                return Err(SqlError::InvalidValue);
            }
            let flags = v[0];
            let max_len = decode_id(&v[1..])? as usize;
            let name =
                String::from_utf8(v[1 + ENC_ID_LEN..].to_vec()).map_err(|_| SqlError::InvalidValue)?;

            let table = catalog.table_by_ids_mut(db_id, table_id)?;
            table.cols.push(Column {
                id: col_id,
                name,
                sql_type,
                max_len,
                not_null: flags & NOT_NULL_FLAG != 0,
                auto_increment: flags & AUTO_INCREMENT_FLAG != 0,
            });
            if table.cols.len() as u32 != col_id {
                return Err(SqlError::Unexpected("non-dense column ids"));
            }
        }

        let mut reader = scan(CATALOG_INDEX_PREFIX)?;
        while let Some((key, value)) = reader.read()? {
            let rest = &key[CATALOG_INDEX_PREFIX.len()..];
            let db_id = decode_id(rest)?;
            let table_id = decode_id(&rest[ENC_ID_LEN..])?;
            let index_id = decode_id(&rest[2 * ENC_ID_LEN..])?;

            let v = value.as_bytes();
            if v.is_empty() || (v.len() - 1) % (ENC_ID_LEN + 1) != 0 {
                return Err(SqlError::InvalidValue);
            }
            let unique = v[0] == 1;
            let col_ids = v[1..]
                .chunks(ENC_ID_LEN + 1)
                .map(decode_id)
                .collect::<SqlResult<Vec<u32>>>()?;

            let table = catalog.table_by_ids_mut(db_id, table_id)?;
            table.indexes.push(Index {
                id: index_id,
                unique,
                col_ids,
            });
            if table.indexes.len() as u32 != index_id + 1 {
                return Err(SqlError::Unexpected("non-dense index ids"));
            }
        }

        catalog.recover_max_pks(&*snapshot)?;
        snapshot.close()?;

        debug!(
            databases = catalog.dbs.len(),
            "catalog loaded from store"
        );

        Ok(catalog)
    }

    fn recover_max_pks(&mut self, snapshot: &dyn strata_store::Snapshot) -> SqlResult<()> {
        for db in &mut self.dbs {
            for table in &mut db.tables {
                if !table.auto_increment_pk() {
                    continue;
                }

                let prefix = map_key(
                    P_INDEX_PREFIX,
                    &[
                        &encode_id(db.id),
                        &encode_id(table.id),
                        &encode_id(PK_INDEX_ID),
                    ],
                );
                let mut reader = snapshot.new_key_reader(
                    KeyReaderSpec::for_prefix(prefix.clone())
                        .with_desc_order(true)
                        .with_include_deleted(true),
                )?;

                if let Some((key, _)) = reader.read()? {
                    let pk_bytes = &key[prefix.len()..];
                    let (value, consumed) =
                        crate::encoding::decode_key_fragment(pk_bytes, SqlType::Integer, 0)?;
                    if consumed != pk_bytes.len() {
                        return Err(SqlError::Unexpected("malformed auto-increment pk"));
                    }
                    if let crate::value::TypedValue::Integer(pk) = value {
                        table.max_pk = pk;
                    }
                }
                reader.close()?;
            }
        }
        Ok(())
    }

    fn db_by_id_mut(&mut self, id: u32) -> SqlResult<&mut Database> {
        let idx = id.checked_sub(1).ok_or(SqlError::Unexpected("zero db id"))? as usize;
        self.dbs
            .get_mut(idx)
            .ok_or_else(|| SqlError::DatabaseDoesNotExist(format!("#{id}")))
    }

    fn table_by_ids_mut(&mut self, db_id: u32, table_id: u32) -> SqlResult<&mut Table> {
        let db = self.db_by_id_mut(db_id)?;
        let idx = table_id
            .checked_sub(1)
            .ok_or(SqlError::Unexpected("zero table id"))? as usize;
        db.tables
            .get_mut(idx)
            .ok_or_else(|| SqlError::TableDoesNotExist(format!("#{table_id}")))
    }
}

/// Validates that a column may participate in an index and returns it.
///
/// Variable-length columns must declare `0 < max_len` small enough that one
/// encoded fragment fits a key.
pub fn index_col<'a>(table: &'a Table, col_name: &str) -> SqlResult<&'a Column> {
    let col = table.col_by_name(col_name)?;
    if col.is_variable_sized() && (col.max_len() == 0 || col.max_len() > MAX_KEY_LEN) {
        return Err(SqlError::LimitedKeyType);
    }
    Ok(col)
}

//! Statement compilation.
//!
//! Compilation lowers a statement list into a [`TxSummary`]: staged catalog
//! writes (`ces`), staged data writes (`des`), and execution metadata. The
//! summary is pure data; committing it is a single separate step, which
//! keeps the whole write path testable against the staged batch alone.
//!
//! The selected database flows left-to-right through the statement chain.
//! In-memory catalog state is mutated during compilation and is not rolled
//! back if the enclosing commit fails.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use strata_store::{Constraint, KvEntry, Snapshot, Store};

use crate::ast::{
    CreateDatabaseStmt, CreateIndexStmt, CreateTableStmt, SelectStmt, Statement, UpsertIntoStmt,
    UseDatabaseStmt,
};
use crate::catalog::{
    index_col, Catalog, Table, AUTO_INCREMENT_FLAG, CATALOG_COLUMN_PREFIX, CATALOG_DATABASE_PREFIX,
    CATALOG_INDEX_PREFIX, CATALOG_TABLE_PREFIX, NOT_NULL_FLAG, PK_INDEX_ID, P_INDEX_PREFIX,
    S_INDEX_PREFIX, U_INDEX_PREFIX,
};
use crate::encoding::{encode_as_key, encode_id, encode_selector, encode_value, map_key, MAX_KEY_LEN};
use crate::error::{SqlError, SqlResult};
use crate::expr::{Params, SemiRange, ValueRange};
use crate::planner::{check_select_restrictions, ScanSpecs};
use crate::reader::{RawRowReader, RowReader};
use crate::row::Row;
use crate::value::{SqlType, TypedValue};

/// The staged result of compiling one or more statements.
#[derive(Debug, Default)]
pub struct TxSummary {
    /// Database selected after the chain, if any statement changed it.
    pub db: Option<String>,
    /// Staged catalog writes, committed before `des`.
    pub ces: Vec<KvEntry>,
    /// Staged data writes.
    pub des: Vec<KvEntry>,
    /// Number of rows written.
    pub updated_rows: usize,
    /// Last auto-assigned primary key per table name.
    pub last_inserted_pks: HashMap<String, i64>,
}

impl TxSummary {
    fn new() -> Self {
        Self::default()
    }

    /// Merges another summary into this one, left to right.
    pub fn add(&mut self, other: TxSummary) {
        if other.db.is_some() {
            self.db = other.db;
        }
        self.ces.extend(other.ces);
        self.des.extend(other.des);
        self.updated_rows += other.updated_rows;
        self.last_inserted_pks.extend(other.last_inserted_pks);
    }
}

/// Compiles a statement chain into one merged summary.
pub fn compile(
    stmts: &[Statement],
    catalog: &mut Catalog,
    store: &dyn Store,
    implicit_db: Option<&str>,
    params: &Params,
) -> SqlResult<TxSummary> {
    let mut summary = TxSummary::new();
    let mut implicit = implicit_db.map(str::to_string);

    for stmt in stmts {
        let stmt_summary = compile_stmt(stmt, catalog, store, implicit.as_deref(), params)?;
        if let Some(db) = &stmt_summary.db {
            implicit = Some(db.clone());
        }
        summary.add(stmt_summary);
    }

    Ok(summary)
}

fn compile_stmt(
    stmt: &Statement,
    catalog: &mut Catalog,
    store: &dyn Store,
    implicit_db: Option<&str>,
    params: &Params,
) -> SqlResult<TxSummary> {
    match stmt {
        Statement::CreateDatabase(s) => compile_create_database(s, catalog),
        Statement::UseDatabase(s) => compile_use_database(s, catalog),
        Statement::UseSnapshot(_) | Statement::AddColumn(_) => Err(SqlError::NoSupported),
        Statement::CreateTable(s) => compile_create_table(s, catalog, store, implicit_db),
        Statement::CreateIndex(s) => compile_create_index(s, catalog, store, implicit_db),
        Statement::Upsert(s) => compile_upsert(s, catalog, store, implicit_db, params),
        Statement::Select(s) => compile_select(s, catalog, implicit_db),
    }
}

fn compile_create_database(stmt: &CreateDatabaseStmt, catalog: &mut Catalog) -> SqlResult<TxSummary> {
    let db = catalog.new_database(&stmt.db)?;
    let db_id = db.id;
    catalog.mutated = true;

    let mut summary = TxSummary::new();
    summary.db = Some(stmt.db.clone());
    summary.ces.push(KvEntry::new(
        map_key(CATALOG_DATABASE_PREFIX, &[&encode_id(db_id)]),
        stmt.db.as_bytes().to_vec(),
    ));

    Ok(summary)
}

fn compile_use_database(stmt: &UseDatabaseStmt, catalog: &Catalog) -> SqlResult<TxSummary> {
    catalog.db_by_name(&stmt.db)?;

    let mut summary = TxSummary::new();
    summary.db = Some(stmt.db.clone());
    Ok(summary)
}

fn compile_create_table(
    stmt: &CreateTableStmt,
    catalog: &mut Catalog,
    store: &dyn Store,
    implicit_db: Option<&str>,
) -> SqlResult<TxSummary> {
    let db_name = implicit_db.ok_or(SqlError::NoDatabaseSelected)?;

    if stmt.if_not_exists && catalog.db_by_name(db_name)?.exist_table(&stmt.table) {
        return Ok(TxSummary::new());
    }

    {
        let db = catalog.db_by_name_mut(db_name)?;
        db.new_table(&stmt.table, &stmt.col_specs)?;
        catalog.mutated = true;
    }

    // The primary index is a unique index over the PRIMARY KEY columns.
    let pk_index = CreateIndexStmt {
        unique: true,
        table: stmt.table.clone(),
        cols: stmt.pk_col_names.clone(),
    };
    let mut summary = compile_create_index(&pk_index, catalog, store, implicit_db)?;

    let (db_id, table) = {
        let db = catalog.db_by_name(db_name)?;
        (db.id, db.table_by_name(&stmt.table)?.clone())
    };
    let primary = table.primary_index()?;

    for col in &table.cols {
        let mut flags = 0u8;

        if col.auto_increment {
            if primary.col_ids.len() > 1
                || primary.col_ids[0] != col.id
                || col.sql_type != SqlType::Integer
            {
                return Err(SqlError::LimitedAutoIncrement);
            }
            flags |= AUTO_INCREMENT_FLAG;
        }

        if col.not_null {
            flags |= NOT_NULL_FLAG;
        }

        // value = flags ∥ maxLen ∥ name
        let mut value = Vec::with_capacity(5 + col.name.len());
        value.push(flags);
        value.extend_from_slice(&(col.max_len as u32).to_be_bytes());
        value.extend_from_slice(col.name.as_bytes());

        summary.ces.push(KvEntry::new(
            map_key(
                CATALOG_COLUMN_PREFIX,
                &[
                    &encode_id(db_id),
                    &encode_id(table.id),
                    &encode_id(col.id),
                    col.sql_type.as_str().as_bytes(),
                ],
            ),
            value,
        ));
    }

    summary.ces.push(KvEntry::new(
        map_key(CATALOG_TABLE_PREFIX, &[&encode_id(db_id), &encode_id(table.id)]),
        table.name.as_bytes().to_vec(),
    ));

    Ok(summary)
}

fn compile_create_index(
    stmt: &CreateIndexStmt,
    catalog: &mut Catalog,
    store: &dyn Store,
    implicit_db: Option<&str>,
) -> SqlResult<TxSummary> {
    if stmt.cols.is_empty() {
        return Err(SqlError::IllegalArguments("index needs at least one column"));
    }

    let db_name = implicit_db.ok_or(SqlError::NoDatabaseSelected)?;

    let (db_id, table_id, col_ids) = {
        let db = catalog.db_by_name(db_name)?;
        let table = db.table_by_name(&stmt.table)?;

        let mut col_ids = Vec::with_capacity(stmt.cols.len());
        for name in &stmt.cols {
            col_ids.push(index_col(table, name)?.id);
        }
        (db.id, table.id, col_ids)
    };

    // Secondary indexes may only be created while the table holds no rows.
    let (last_tx_id, _) = store.alh();
    store.wait_for_indexing_upto(last_tx_id)?;

    let pk_prefix = map_key(
        P_INDEX_PREFIX,
        &[&encode_id(db_id), &encode_id(table_id), &encode_id(PK_INDEX_ID)],
    );
    if store.exist_key_with(&pk_prefix, &pk_prefix, false)? {
        return Err(SqlError::LimitedIndexCreation);
    }

    let index = {
        let table = catalog
            .db_by_name_mut(db_name)?
            .table_by_name_mut(&stmt.table)?;
        table.new_index(stmt.unique, col_ids)?.clone()
    };
    catalog.mutated = true;

    // value = unique ∥ (colID ∥ dir)*, dir reserved (only ASC defined)
    let mut value = Vec::with_capacity(1 + index.col_ids.len() * 5);
    value.push(u8::from(index.unique));
    for col_id in &index.col_ids {
        value.extend_from_slice(&encode_id(*col_id));
        value.push(0);
    }

    let mut summary = TxSummary::new();
    summary.ces.push(KvEntry::new(
        map_key(
            CATALOG_INDEX_PREFIX,
            &[&encode_id(db_id), &encode_id(table_id), &encode_id(index.id)],
        ),
        value,
    ));

    Ok(summary)
}

fn compile_select(
    stmt: &SelectStmt,
    catalog: &Catalog,
    implicit_db: Option<&str>,
) -> SqlResult<TxSummary> {
    let table = match &stmt.ds {
        crate::ast::DataSource::Table(tref) => {
            let db_name = if tref.db.is_empty() {
                implicit_db.ok_or(SqlError::NoDatabaseSelected)?
            } else {
                tref.db.as_str()
            };
            Some(catalog.db_by_name(db_name)?.table_by_name(&tref.table)?)
        }
        crate::ast::DataSource::Select(_) => None,
    };

    check_select_restrictions(stmt, table)?;
    Ok(TxSummary::new())
}

fn compile_upsert(
    stmt: &UpsertIntoStmt,
    catalog: &mut Catalog,
    store: &dyn Store,
    implicit_db: Option<&str>,
    params: &Params,
) -> SqlResult<TxSummary> {
    let db_name = if stmt.table_ref.db.is_empty() {
        implicit_db
            .ok_or(SqlError::NoDatabaseSelected)?
            .to_string()
    } else {
        stmt.table_ref.db.clone()
    };

    let (db_id, table) = {
        let db = catalog.db_by_name(&db_name)?;
        (db.id, db.table_by_name(&stmt.table_ref.table)?.clone())
    };

    let sel_pos_by_col_id = validate_upsert_cols(stmt, &table)?;
    let primary = table.primary_index()?.clone();
    let auto_increment_pk = table.auto_increment_pk();

    let mut summary = TxSummary::new();

    for row_spec in &stmt.rows {
        if row_spec.values.len() != stmt.cols.len() {
            return Err(SqlError::InvalidNumberOfValues);
        }

        let mut values_by_col_id: BTreeMap<u32, TypedValue> = BTreeMap::new();

        for col in &table.cols {
            let Some(&pos) = sel_pos_by_col_id.get(&col.id) else {
                // Unlisted columns receive the implicit NULL; auto-increment
                // primary keys are injected below instead.
                if col.not_null && !col.auto_increment {
                    return Err(SqlError::NotNullableColumnCannotBeNull(col.name.clone()));
                }
                continue;
            };

            if stmt.is_insert && col.auto_increment {
                return Err(SqlError::NoValueForAutoIncrementalColumn(col.name.clone()));
            }

            let value = row_spec.values[pos]
                .substitute(params)?
                .reduce(None, &db_name, &table.name)?;

            if value.is_null() {
                if col.not_null {
                    return Err(SqlError::NotNullableColumnCannotBeNull(col.name.clone()));
                }
                continue;
            }

            values_by_col_id.insert(col.id, value);
        }

        // Inject the auto-assigned primary key.
        if stmt.is_insert && auto_increment_pk {
            let new_pk = {
                let t = catalog
                    .db_by_name_mut(&db_name)?
                    .table_by_name_mut(&stmt.table_ref.table)?;
                t.max_pk = t
                    .max_pk
                    .checked_add(1)
                    .ok_or(SqlError::LimitedAutoIncrement)?;
                t.max_pk
            };
            catalog.mutated = true;

            values_by_col_id.insert(primary.col_ids[0], TypedValue::Integer(new_pk));
            summary.last_inserted_pks.insert(table.name.clone(), new_pk);
        }

        let pk_enc_vals = encode_pk(&table, &values_by_col_id)?;

        // Tombstone or reuse the previous secondary-index entries.
        let mut reusable: HashSet<u32> = HashSet::new();
        if !stmt.is_insert && table.indexes.len() > 1 {
            match fetch_pk_row(store, &table, &db_name, &values_by_col_id) {
                Ok(curr_row) => {
                    let mut curr_values: BTreeMap<u32, TypedValue> = BTreeMap::new();
                    for col in &table.cols {
                        let sel = encode_selector("", &db_name, &table.name, &col.name);
                        if let Some(v) = curr_row.get(&sel) {
                            curr_values.insert(col.id, v.clone());
                        }
                    }
                    reusable = delete_index_entries_for(
                        &table,
                        db_id,
                        &pk_enc_vals,
                        &curr_values,
                        &values_by_col_id,
                        &mut summary,
                    )?;
                }
                Err(SqlError::NoMoreRows) => {}
                Err(e) => return Err(e),
            }
        }

        // payload = count ∥ (colID ∥ encVal)*, non-null columns in order.
        let mut payload = Vec::new();
        payload.extend_from_slice(&(values_by_col_id.len() as u32).to_be_bytes());
        for col in &table.cols {
            let Some(value) = values_by_col_id.get(&col.id) else {
                continue;
            };
            payload.extend_from_slice(&encode_id(col.id));
            payload.extend_from_slice(&encode_value(value, col.sql_type, col.max_len)?);
        }

        let pk_key = map_key(
            P_INDEX_PREFIX,
            &[
                &encode_id(db_id),
                &encode_id(table.id),
                &encode_id(primary.id),
                &pk_enc_vals,
            ],
        );

        let mut pk_value = Vec::with_capacity(1 + payload.len());
        pk_value.push(0);
        pk_value.extend_from_slice(&payload);

        let mut pk_entry = KvEntry::new(pk_key, pk_value);
        pk_entry.constraint = match (stmt.is_insert, auto_increment_pk) {
            (true, false) => Some(Constraint::DeletedOrMustNotExist),
            (false, true) => Some(Constraint::MustExist),
            _ => None,
        };
        summary.des.push(pk_entry);

        // Secondary-index entries.
        for index in &table.indexes {
            if index.is_primary() || reusable.contains(&index.id) {
                continue;
            }

            let enc_vals = encode_index_vals(&table, index, &values_by_col_id)?;

            let entry = if index.unique {
                let mut value = Vec::with_capacity(1 + pk_enc_vals.len());
                value.push(0);
                value.extend_from_slice(&pk_enc_vals);

                KvEntry::new(
                    map_key(
                        U_INDEX_PREFIX,
                        &[
                            &encode_id(db_id),
                            &encode_id(table.id),
                            &encode_id(index.id),
                            &enc_vals,
                        ],
                    ),
                    value,
                )
                .with_constraint(Constraint::DeletedOrMustNotExist)
            } else {
                KvEntry::new(
                    map_key(
                        S_INDEX_PREFIX,
                        &[
                            &encode_id(db_id),
                            &encode_id(table.id),
                            &encode_id(index.id),
                            &enc_vals,
                            &pk_enc_vals,
                        ],
                    ),
                    vec![0u8],
                )
            };

            summary.des.push(entry);
        }

        summary.updated_rows += 1;
    }

    trace!(
        table = %table.name,
        rows = summary.updated_rows,
        entries = summary.des.len(),
        "upsert staged"
    );

    Ok(summary)
}

/// Maps each named column to its position in the VALUES tuples.
fn validate_upsert_cols(stmt: &UpsertIntoStmt, table: &Table) -> SqlResult<HashMap<u32, usize>> {
    let mut sel_pos_by_col_id = HashMap::with_capacity(stmt.cols.len());

    for (pos, name) in stmt.cols.iter().enumerate() {
        let col = table.col_by_name(name)?;
        if sel_pos_by_col_id.insert(col.id, pos).is_some() {
            return Err(SqlError::DuplicatedColumn(name.clone()));
        }
    }

    Ok(sel_pos_by_col_id)
}

/// Concatenates the encoded primary-key column values in declared order.
fn encode_pk(table: &Table, values_by_col_id: &BTreeMap<u32, TypedValue>) -> SqlResult<Vec<u8>> {
    let mut pk_enc_vals = Vec::new();

    for col_id in &table.primary_index()?.col_ids {
        let value = values_by_col_id
            .get(col_id)
            .ok_or(SqlError::PKCanNotBeNull)?;

        let col = table.col_by_id(*col_id)?;
        let enc = encode_as_key(value, col.sql_type, col.max_len())?;
        if enc.len() > MAX_KEY_LEN {
            return Err(SqlError::MaxKeyLengthExceeded);
        }
        pk_enc_vals.extend_from_slice(&enc);
    }

    Ok(pk_enc_vals)
}

/// Concatenates the encoded index column values in index order.
fn encode_index_vals(
    table: &Table,
    index: &crate::catalog::Index,
    values_by_col_id: &BTreeMap<u32, TypedValue>,
) -> SqlResult<Vec<u8>> {
    let mut enc_vals = Vec::new();

    for col_id in &index.col_ids {
        let col = table.col_by_id(*col_id)?;
        let value = values_by_col_id
            .get(col_id)
            .cloned()
            .unwrap_or(TypedValue::Null(col.sql_type));

        let enc = encode_as_key(&value, col.sql_type, col.max_len())?;
        if enc.len() > MAX_KEY_LEN {
            return Err(SqlError::MaxKeyLengthExceeded);
        }
        enc_vals.extend_from_slice(&enc);
    }

    Ok(enc_vals)
}

/// Fetches the current row for a primary key through a short-lived snapshot.
fn fetch_pk_row(
    store: &dyn Store,
    table: &Table,
    db_name: &str,
    values_by_col_id: &BTreeMap<u32, TypedValue>,
) -> SqlResult<Row> {
    let primary = table.primary_index()?.clone();

    let mut ranges = HashMap::new();
    for col_id in &primary.col_ids {
        let value = values_by_col_id
            .get(col_id)
            .ok_or(SqlError::PKCanNotBeNull)?;
        ranges.insert(
            *col_id,
            ValueRange {
                low: Some(SemiRange {
                    val: value.clone(),
                    inclusive: true,
                }),
                high: Some(SemiRange {
                    val: value.clone(),
                    inclusive: true,
                }),
            },
        );
    }

    let (last_tx_id, _) = store.alh();
    store.wait_for_indexing_upto(last_tx_id)?;

    let snapshot: Arc<dyn Snapshot> = Arc::from(store.current_snapshot()?);

    let specs = ScanSpecs {
        index: primary,
        ranges_by_col_id: ranges,
        desc_order: false,
        include_deleted: false,
    };

    let mut reader = RawRowReader::new(
        Arc::clone(&snapshot),
        table.clone(),
        db_name.to_string(),
        table.name.clone(),
        specs,
    )?;

    let result = reader.read();
    reader.close()?;
    snapshot.close()?;

    result?.ok_or(SqlError::NoMoreRows)
}

/// Stages tombstones for secondary-index entries whose key changes, and
/// reports the indexes whose entries can be reused because it does not.
fn delete_index_entries_for(
    table: &Table,
    db_id: u32,
    pk_enc_vals: &[u8],
    curr_values: &BTreeMap<u32, TypedValue>,
    new_values: &BTreeMap<u32, TypedValue>,
    summary: &mut TxSummary,
) -> SqlResult<HashSet<u32>> {
    let mut reusable = HashSet::new();

    for index in &table.indexes {
        if index.is_primary() {
            continue;
        }

        let mut same_index_key = true;
        for col_id in &index.col_ids {
            let col = table.col_by_id(*col_id)?;
            let null = TypedValue::Null(col.sql_type);
            let curr = curr_values.get(col_id).unwrap_or(&null);
            let new = new_values.get(col_id).unwrap_or(&null);
            same_index_key = same_index_key && curr.compare(new)?.is_eq();
        }

        if same_index_key {
            reusable.insert(index.id);
            continue;
        }

        let enc_vals = encode_index_vals(table, index, curr_values)?;

        let entry = if index.unique {
            let mut value = Vec::with_capacity(1 + pk_enc_vals.len());
            value.push(1);
            value.extend_from_slice(pk_enc_vals);

            KvEntry::new(
                map_key(
                    U_INDEX_PREFIX,
                    &[
                        &encode_id(db_id),
                        &encode_id(table.id),
                        &encode_id(index.id),
                        &enc_vals,
                    ],
                ),
                value,
            )
        } else {
            KvEntry::new(
                map_key(
                    S_INDEX_PREFIX,
                    &[
                        &encode_id(db_id),
                        &encode_id(table.id),
                        &encode_id(index.id),
                        &enc_vals,
                        pk_enc_vals,
                    ],
                ),
                vec![1u8],
            )
        };

        summary.des.push(entry);
    }

    Ok(reusable)
}

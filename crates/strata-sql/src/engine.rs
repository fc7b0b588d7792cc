//! The engine facade.
//!
//! [`Engine`] glues the statement tree, catalog, planner, reader pipeline,
//! and the backing store together. Writes compile to a staged batch that is
//! committed atomically (catalog entries first, data entries after, each
//! with its constraints); reads pin a store snapshot and return the top of
//! a reader stack whose lifetime the caller owns.
//!
//! Multiple engines may coexist over different stores; the engine holds no
//! global state.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use strata_store::{Snapshot, Store, TxId};

use crate::ast::{SelectStmt, Statement};
use crate::catalog::Catalog;
use crate::compile::{compile, TxSummary};
use crate::error::{SqlError, SqlResult};
use crate::expr::{ParamTypes, Params};
use crate::reader::{resolve_select, RowReader};
use crate::row::cols_by_name;

/// The SQL execution engine.
pub struct Engine {
    store: Arc<dyn Store>,
    catalog: RwLock<Catalog>,
    implicit_db: RwLock<Option<String>>,
}

impl Engine {
    /// Opens an engine over a store, loading the persisted catalog.
    pub fn new(store: Arc<dyn Store>) -> SqlResult<Self> {
        let (last_tx_id, _) = store.alh();
        store.wait_for_indexing_upto(last_tx_id)?;

        let catalog = Catalog::load(&*store)?;

        Ok(Self {
            store,
            catalog: RwLock::new(catalog),
            implicit_db: RwLock::new(None),
        })
    }

    /// The currently selected database, if any.
    #[must_use]
    pub fn current_database(&self) -> Option<String> {
        self.implicit_db.read().clone()
    }

    /// Selects the database unqualified statements resolve against.
    pub fn use_database(&self, name: &str) -> SqlResult<()> {
        self.catalog.read().db_by_name(name)?;
        *self.implicit_db.write() = Some(name.to_string());
        Ok(())
    }

    /// Compiles and atomically commits a statement chain.
    ///
    /// All staged catalog entries precede all data entries in the committed
    /// batch; a single constraint violation fails the whole batch. On
    /// failure the in-memory catalog (including advanced auto-increment
    /// counters) is not rolled back; re-open the engine to reload persisted
    /// state if exact counters matter.
    pub fn exec(&self, stmts: &[Statement], params: &Params) -> SqlResult<TxSummary> {
        if stmts.is_empty() {
            return Err(SqlError::IllegalArguments("no statements"));
        }

        let mut catalog = self.catalog.write();
        let implicit = self.implicit_db.read().clone();

        let summary = compile(stmts, &mut catalog, &*self.store, implicit.as_deref(), params)?;

        if !summary.ces.is_empty() || !summary.des.is_empty() {
            let mut batch = Vec::with_capacity(summary.ces.len() + summary.des.len());
            batch.extend(summary.ces.iter().cloned());
            batch.extend(summary.des.iter().cloned());

            let tx_id: TxId = self.store.commit(batch)?;
            catalog.mutated = false;

            debug!(
                tx_id,
                ces = summary.ces.len(),
                des = summary.des.len(),
                rows = summary.updated_rows,
                "statement batch committed"
            );
        }

        drop(catalog);

        if let Some(db) = &summary.db {
            *self.implicit_db.write() = Some(db.clone());
        }

        Ok(summary)
    }

    /// Plans a SELECT and returns its reader stack.
    ///
    /// The query pins a snapshot of the store's indexed state at call time;
    /// closing the returned reader releases it. Writes committed after this
    /// call are invisible to the reader.
    pub fn query(&self, stmt: &SelectStmt, params: &Params) -> SqlResult<Box<dyn RowReader>> {
        let catalog = self.catalog.read();
        let implicit = self.implicit_db.read().clone();

        let (last_tx_id, _) = self.store.alh();
        self.store.wait_for_indexing_upto(last_tx_id)?;
        let snapshot: Arc<dyn Snapshot> = Arc::from(self.store.current_snapshot()?);

        resolve_select(stmt, &catalog, &snapshot, implicit.as_deref(), params)
    }

    /// Runs a query and collects every row, closing the reader.
    pub fn query_all(
        &self,
        stmt: &SelectStmt,
        params: &Params,
    ) -> SqlResult<Vec<crate::row::Row>> {
        let mut reader = self.query(stmt, params)?;
        let mut rows = Vec::new();

        let result = loop {
            match reader.read() {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => break Ok(rows),
                Err(e) => break Err(e),
            }
        };

        reader.close()?;
        result
    }

    /// Infers the name → type mapping of every parameter placeholder in the
    /// statement chain, without executing anything.
    pub fn infer_parameters(&self, stmts: &[Statement]) -> SqlResult<ParamTypes> {
        let catalog = self.catalog.read();
        let mut implicit = self.implicit_db.read().clone();
        let mut params = ParamTypes::new();

        for stmt in stmts {
            match stmt {
                Statement::CreateDatabase(s) => implicit = Some(s.db.clone()),
                Statement::UseDatabase(s) => {
                    catalog.db_by_name(&s.db)?;
                    implicit = Some(s.db.clone());
                }
                Statement::Upsert(s) => {
                    let db_name = if s.table_ref.db.is_empty() {
                        implicit.as_deref().ok_or(SqlError::NoDatabaseSelected)?
                    } else {
                        s.table_ref.db.as_str()
                    };
                    let db = catalog.db_by_name(db_name)?;
                    let table = db.table_by_name(&s.table_ref.table)?;

                    let cols = cols_by_name(
                        &table
                            .cols
                            .iter()
                            .map(|c| {
                                crate::row::ColDescriptor::new(
                                    db_name,
                                    table.name.clone(),
                                    c.name.clone(),
                                    c.sql_type,
                                )
                            })
                            .collect::<Vec<_>>(),
                    );

                    for row_spec in &s.rows {
                        if row_spec.values.len() != s.cols.len() {
                            return Err(SqlError::IllegalArguments(
                                "column and value counts differ",
                            ));
                        }
                        for (i, value) in row_spec.values.iter().enumerate() {
                            let col = table.col_by_name(&s.cols[i])?;
                            value.requires_type(
                                col.sql_type,
                                &cols,
                                &mut params,
                                db_name,
                                &table.name,
                            )?;
                        }
                    }
                }
                Statement::Select(s) => {
                    let (last_tx_id, _) = self.store.alh();
                    self.store.wait_for_indexing_upto(last_tx_id)?;
                    let snapshot: Arc<dyn Snapshot> =
                        Arc::from(self.store.current_snapshot()?);

                    let mut reader = resolve_select(
                        s,
                        &catalog,
                        &snapshot,
                        implicit.as_deref(),
                        &Params::new(),
                    )?;
                    let result = reader.infer_parameters(&mut params);
                    reader.close()?;
                    result?;
                }
                _ => {}
            }
        }

        Ok(params)
    }
}

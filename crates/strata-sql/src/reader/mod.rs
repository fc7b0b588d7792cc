//! The composable row-reader pipeline.
//!
//! Every reader implements [`RowReader`]: a pull-based iterator over
//! selector-keyed rows with lazy evaluation. A SELECT resolves into a stack
//! of decorators over a raw index scan:
//!
//! ```text
//! raw scan → joint → conditional (WHERE) → grouped → conditional (HAVING)
//!          → projected → distinct → limit
//! ```
//!
//! Readers own cloned catalog metadata and a shared store snapshot, so a
//! query observes a consistent view of both for its whole lifetime.

mod conditional;
mod distinct;
mod grouped;
mod joint;
mod limit;
mod projected;
mod raw;

pub use conditional::ConditionalRowReader;
pub use distinct::DistinctRowReader;
pub use grouped::GroupedRowReader;
pub use joint::JointRowReader;
pub use limit::LimitRowReader;
pub use projected::ProjectedRowReader;
pub use raw::RawRowReader;

use std::sync::Arc;

use strata_store::Snapshot;

use crate::ast::{DataSource, SelectStmt, Selector};
use crate::catalog::Catalog;
use crate::encoding::encode_value;
use crate::error::{SqlError, SqlResult};
use crate::expr::{ParamTypes, Params};
use crate::planner::{check_select_restrictions, scan_specs, ScanSpecs};
use crate::row::{ColDescriptor, Row};

/// A pull-based reader over selector-keyed rows.
pub trait RowReader {
    /// The database name unqualified selectors resolve against.
    fn implicit_db(&self) -> &str;

    /// The table name or alias unqualified selectors resolve against.
    fn implicit_table(&self) -> &str;

    /// Descriptions of the columns this reader emits.
    fn columns(&self) -> SqlResult<Vec<ColDescriptor>>;

    /// Returns the next row, or `None` when the reader is exhausted.
    fn read(&mut self) -> SqlResult<Option<Row>>;

    /// Gathers parameter types from the reader stack.
    fn infer_parameters(&self, params: &mut ParamTypes) -> SqlResult<()>;

    /// Releases the reader and its underlying resources. Idempotent.
    fn close(&mut self) -> SqlResult<()>;
}

/// Resolves a SELECT statement into its reader stack.
pub fn resolve_select(
    stmt: &SelectStmt,
    catalog: &Catalog,
    snapshot: &Arc<dyn Snapshot>,
    implicit_db: Option<&str>,
    params: &Params,
) -> SqlResult<Box<dyn RowReader>> {
    let table = match &stmt.ds {
        DataSource::Table(tref) => {
            let db_name = if tref.db.is_empty() {
                implicit_db.ok_or(SqlError::NoDatabaseSelected)?
            } else {
                tref.db.as_str()
            };
            let db = catalog.db_by_name(db_name)?;
            Some((db.name.clone(), db.table_by_name(&tref.table)?.clone()))
        }
        DataSource::Select(_) => None,
    };

    check_select_restrictions(stmt, table.as_ref().map(|(_, t)| t))?;

    let mut reader: Box<dyn RowReader> = match (&stmt.ds, table) {
        (DataSource::Table(tref), Some((db_name, table))) => {
            let specs: ScanSpecs = scan_specs(stmt, &table, &db_name, tref.alias(), params)?;
            Box::new(RawRowReader::new(
                Arc::clone(snapshot),
                table,
                db_name,
                tref.alias().to_string(),
                specs,
            )?)
        }
        (DataSource::Select(inner), _) => {
            resolve_select(inner, catalog, snapshot, implicit_db, params)?
        }
        _ => return Err(SqlError::Unexpected("unresolved data source")),
    };

    if !stmt.joins.is_empty() {
        reader = Box::new(JointRowReader::new(
            reader,
            stmt.joins.clone(),
            catalog.clone(),
            Arc::clone(snapshot),
            implicit_db.map(str::to_string),
            params.clone(),
        )?);
    }

    if let Some(cond) = &stmt.where_clause {
        reader = Box::new(ConditionalRowReader::new(
            reader,
            cond.clone(),
            params.clone(),
        ));
    }

    let contains_aggregations = stmt
        .selectors
        .iter()
        .any(|s| matches!(s, Selector::Agg(_)));

    if contains_aggregations {
        reader = Box::new(GroupedRowReader::new(
            reader,
            stmt.selectors.clone(),
            stmt.group_by.clone(),
        )?);

        if let Some(having) = &stmt.having {
            reader = Box::new(ConditionalRowReader::new(
                reader,
                having.clone(),
                params.clone(),
            ));
        }
    }

    reader = Box::new(ProjectedRowReader::new(
        reader,
        stmt.as_alias.clone(),
        stmt.selectors.clone(),
    ));

    if stmt.distinct {
        reader = Box::new(DistinctRowReader::new(reader));
    }

    if stmt.limit > 0 {
        reader = Box::new(LimitRowReader::new(reader, stmt.limit));
    }

    Ok(reader)
}

/// Encodes a row's values, in column order, into a deduplication key.
///
/// NULL and missing values encode as a single marker byte so they collide
/// with each other and with nothing else.
pub(crate) fn encode_row_identity(cols: &[ColDescriptor], row: &Row) -> SqlResult<Vec<u8>> {
    let mut out = Vec::new();

    for desc in cols {
        match row.get(&desc.selector()) {
            None => out.push(0x00),
            Some(v) if v.is_null() => out.push(0x00),
            Some(v) => {
                out.push(0x01);
                out.extend_from_slice(&encode_value(v, v.sql_type(), 0)?);
            }
        }
    }

    Ok(out)
}

/// Output type of an aggregate over a source column type.
pub(crate) fn agg_output_type(
    agg_fn: crate::ast::AggFn,
    source: Option<crate::value::SqlType>,
) -> crate::value::SqlType {
    use crate::ast::AggFn;
    use crate::value::SqlType;

    match agg_fn {
        AggFn::Count | AggFn::Sum | AggFn::Avg => SqlType::Integer,
        AggFn::Min | AggFn::Max => source.unwrap_or(SqlType::Any),
    }
}

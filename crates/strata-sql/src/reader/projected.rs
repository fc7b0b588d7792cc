//! Projection reader.
//!
//! Restricts each row to the select list and rewrites selector keys: the
//! query's `AS` alias replaces the table qualifier, and a selector's own
//! alias replaces its column name. An empty select list is the star
//! projection and passes every column through.

use crate::ast::Selector;
use crate::encoding::encode_selector;
use crate::error::{SqlError, SqlResult};
use crate::expr::{Expr, ParamTypes};
use crate::reader::{agg_output_type, RowReader};
use crate::row::{cols_by_name, ColDescriptor, Row};

/// Reader restricting and renaming columns per the select list.
pub struct ProjectedRowReader {
    inner: Box<dyn RowReader>,
    table_alias: String,
    selectors: Vec<Selector>,
    closed: bool,
}

impl ProjectedRowReader {
    /// Wraps `inner`. An empty `selectors` list projects every column.
    #[must_use]
    pub fn new(inner: Box<dyn RowReader>, table_alias: String, selectors: Vec<Selector>) -> Self {
        Self {
            inner,
            table_alias,
            selectors,
            closed: false,
        }
    }

    /// `(input selector, output descriptor)` per projected column.
    fn projection(&self) -> SqlResult<Vec<(String, ColDescriptor)>> {
        let inner_cols = self.inner.columns()?;
        let by_name = cols_by_name(&inner_cols);
        let idb = self.inner.implicit_db();
        let itable = self.inner.implicit_table();

        if self.selectors.is_empty() {
            // Star projection: all columns, re-qualified by the alias.
            return Ok(inner_cols
                .into_iter()
                .map(|c| {
                    let key = c.selector();
                    let mut out = c;
                    out.table = self.implicit_table().to_string();
                    (key, out)
                })
                .collect());
        }

        let mut out = Vec::with_capacity(self.selectors.len());

        for sel in &self.selectors {
            let (agg_fn, db, table, col, alias) = match sel {
                Selector::Col(c) => {
                    let (db, table) = c.resolve(idb, itable);
                    ("", db, table, c.col.as_str(), c.as_alias.as_str())
                }
                Selector::Agg(a) => {
                    let (db, table) = a.resolve(idb, itable);
                    (
                        a.agg_fn.as_str(),
                        db,
                        table,
                        a.col.as_str(),
                        a.as_alias.as_str(),
                    )
                }
            };

            let in_key = encode_selector(agg_fn, db, table, col);

            let sql_type = match sel {
                Selector::Col(_) => by_name
                    .get(&in_key)
                    .ok_or(SqlError::InvalidColumn(col.to_string()))?
                    .sql_type,
                Selector::Agg(a) => {
                    let source = by_name
                        .get(&encode_selector("", db, table, col))
                        .map(|d| d.sql_type);
                    agg_output_type(a.agg_fn, source)
                }
            };

            let out_table = if self.table_alias.is_empty() {
                table
            } else {
                self.table_alias.as_str()
            };

            let desc = if alias.is_empty() {
                ColDescriptor {
                    agg_fn: agg_fn.to_string(),
                    database: db.to_string(),
                    table: out_table.to_string(),
                    column: col.to_string(),
                    sql_type,
                }
            } else {
                // Aliased outputs are plain named columns.
                ColDescriptor::new(db, out_table, alias, sql_type)
            };

            out.push((in_key, desc));
        }

        Ok(out)
    }
}

impl RowReader for ProjectedRowReader {
    fn implicit_db(&self) -> &str {
        self.inner.implicit_db()
    }

    fn implicit_table(&self) -> &str {
        if self.table_alias.is_empty() {
            self.inner.implicit_table()
        } else {
            &self.table_alias
        }
    }

    fn columns(&self) -> SqlResult<Vec<ColDescriptor>> {
        Ok(self.projection()?.into_iter().map(|(_, d)| d).collect())
    }

    fn read(&mut self) -> SqlResult<Option<Row>> {
        let Some(row) = self.inner.read()? else {
            return Ok(None);
        };

        let mut out = Row::new();
        for (in_key, desc) in self.projection()? {
            let value = row
                .get(&in_key)
                .cloned()
                .ok_or(SqlError::ColumnDoesNotExist(desc.column.clone()))?;
            out.insert(desc.selector(), value);
        }

        Ok(Some(out))
    }

    fn infer_parameters(&self, params: &mut ParamTypes) -> SqlResult<()> {
        self.inner.infer_parameters(params)?;

        let cols = cols_by_name(&self.inner.columns()?);
        for sel in &self.selectors {
            let expr = match sel {
                Selector::Col(c) => Expr::Col(c.clone()),
                Selector::Agg(a) => Expr::Agg(a.clone()),
            };
            expr.infer_type(
                &cols,
                params,
                self.inner.implicit_db(),
                self.inner.implicit_table(),
            )?;
        }
        Ok(())
    }

    fn close(&mut self) -> SqlResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}

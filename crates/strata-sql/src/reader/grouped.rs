//! Grouping and aggregation reader.
//!
//! Groups are detected by a sort-based boundary check: the upstream reader
//! must already be ordered by the (single) GROUP BY column, so a group ends
//! exactly when that column's value changes. One output row is emitted per
//! group, carrying the group's first row plus one accumulated value per
//! aggregate selector in the select list.

use crate::ast::{AggColSelector, AggFn, ColSelector, Selector};
use crate::encoding::encode_selector;
use crate::error::{SqlError, SqlResult};
use crate::expr::{Expr, ParamTypes};
use crate::reader::{agg_output_type, RowReader};
use crate::row::{cols_by_name, ColDescriptor, Row};
use crate::value::{SqlType, TypedValue};

/// One aggregate in flight.
struct Accumulator {
    /// Output selector key, `AGG(db.table.col)`.
    out_key: String,
    /// Source selector key; `None` for `COUNT(*)`.
    source_key: Option<String>,
    agg_fn: AggFn,
    count: i64,
    sum: i64,
    extreme: Option<TypedValue>,
}

impl Accumulator {
    fn new(out_key: String, source_key: Option<String>, agg_fn: AggFn) -> Self {
        Self {
            out_key,
            source_key,
            agg_fn,
            count: 0,
            sum: 0,
            extreme: None,
        }
    }

    fn update(&mut self, row: &Row) -> SqlResult<()> {
        let value = match &self.source_key {
            None => {
                // COUNT(*) counts every row.
                self.count += 1;
                return Ok(());
            }
            Some(key) => row.get(key).cloned().unwrap_or(TypedValue::Null(SqlType::Any)),
        };

        if value.is_null() {
            return Ok(());
        }

        match self.agg_fn {
            AggFn::Count => self.count += 1,
            AggFn::Sum | AggFn::Avg => {
                let n = value.as_i64().ok_or(SqlError::InvalidTypes)?;
                self.sum = self.sum.wrapping_add(n);
                self.count += 1;
            }
            AggFn::Min => match &self.extreme {
                Some(curr) if value.compare(curr)?.is_ge() => {}
                _ => self.extreme = Some(value),
            },
            AggFn::Max => match &self.extreme {
                Some(curr) if value.compare(curr)?.is_le() => {}
                _ => self.extreme = Some(value),
            },
        }

        Ok(())
    }

    fn finalize(&self) -> TypedValue {
        match self.agg_fn {
            AggFn::Count => TypedValue::Integer(self.count),
            AggFn::Sum => TypedValue::Integer(self.sum),
            AggFn::Avg => {
                if self.count == 0 {
                    TypedValue::Null(SqlType::Integer)
                } else {
                    TypedValue::Integer(self.sum / self.count)
                }
            }
            AggFn::Min | AggFn::Max => self
                .extreme
                .clone()
                .unwrap_or(TypedValue::Null(SqlType::Any)),
        }
    }
}

/// Aggregating reader over sorted input.
pub struct GroupedRowReader {
    inner: Box<dyn RowReader>,
    selectors: Vec<Selector>,
    group_by: Vec<ColSelector>,
    current: Option<(Row, Vec<Accumulator>)>,
    emitted_any: bool,
    done: bool,
    closed: bool,
}

impl GroupedRowReader {
    /// Wraps `inner`, aggregating per the select list and GROUP BY column.
    pub fn new(
        inner: Box<dyn RowReader>,
        selectors: Vec<Selector>,
        group_by: Vec<ColSelector>,
    ) -> SqlResult<Self> {
        if group_by.len() > 1 {
            return Err(SqlError::LimitedGroupBy);
        }

        Ok(Self {
            inner,
            selectors,
            group_by,
            current: None,
            emitted_any: false,
            done: false,
            closed: false,
        })
    }

    fn agg_selectors(&self) -> impl Iterator<Item = &AggColSelector> {
        self.selectors.iter().filter_map(|s| match s {
            Selector::Agg(a) => Some(a),
            Selector::Col(_) => None,
        })
    }

    fn new_accumulators(&self) -> Vec<Accumulator> {
        let db = self.inner.implicit_db();
        let table = self.inner.implicit_table();

        self.agg_selectors()
            .map(|sel| {
                let (sdb, stable) = sel.resolve(db, table);
                let out_key = encode_selector(sel.agg_fn.as_str(), sdb, stable, &sel.col);
                let source_key = (sel.col != "*")
                    .then(|| encode_selector("", sdb, stable, &sel.col));
                Accumulator::new(out_key, source_key, sel.agg_fn)
            })
            .collect()
    }

    fn group_key(&self) -> Option<String> {
        self.group_by.first().map(|sel| {
            let (db, table) = sel.resolve(self.inner.implicit_db(), self.inner.implicit_table());
            encode_selector("", db, table, &sel.col)
        })
    }

    fn same_group(&self, prev: &Row, next: &Row) -> SqlResult<bool> {
        let Some(key) = self.group_key() else {
            return Ok(true);
        };

        let null = TypedValue::Null(SqlType::Any);
        let a = prev.get(&key).unwrap_or(&null);
        let b = next.get(&key).unwrap_or(&null);
        Ok(a.compare(b)?.is_eq())
    }

    fn finalize(row: Row, accumulators: Vec<Accumulator>) -> Row {
        let mut out = row;
        for acc in &accumulators {
            out.insert(acc.out_key.clone(), acc.finalize());
        }
        out
    }
}

impl RowReader for GroupedRowReader {
    fn implicit_db(&self) -> &str {
        self.inner.implicit_db()
    }

    fn implicit_table(&self) -> &str {
        self.inner.implicit_table()
    }

    fn columns(&self) -> SqlResult<Vec<ColDescriptor>> {
        let mut cols = self.inner.columns()?;
        let by_name = cols_by_name(&cols);
        let db = self.inner.implicit_db();
        let table = self.inner.implicit_table();

        for sel in self.agg_selectors() {
            let (sdb, stable) = sel.resolve(db, table);
            let source = by_name
                .get(&encode_selector("", sdb, stable, &sel.col))
                .map(|d| d.sql_type);

            cols.push(ColDescriptor {
                agg_fn: sel.agg_fn.as_str().to_string(),
                database: sdb.to_string(),
                table: stable.to_string(),
                column: sel.col.clone(),
                sql_type: agg_output_type(sel.agg_fn, source),
            });
        }

        Ok(cols)
    }

    fn read(&mut self) -> SqlResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }

        loop {
            let Some(row) = self.inner.read()? else {
                self.done = true;

                if let Some((row, accs)) = self.current.take() {
                    self.emitted_any = true;
                    return Ok(Some(Self::finalize(row, accs)));
                }

                // Aggregation over empty input without GROUP BY yields one
                // zero-valued row.
                if !self.emitted_any && self.group_by.is_empty() {
                    self.emitted_any = true;
                    let accs = self.new_accumulators();
                    return Ok(Some(Self::finalize(Row::new(), accs)));
                }

                return Ok(None);
            };

            match self.current.take() {
                None => {
                    let mut accs = self.new_accumulators();
                    for acc in &mut accs {
                        acc.update(&row)?;
                    }
                    self.current = Some((row, accs));
                }
                Some((prev_row, mut prev_accs)) => {
                    if self.same_group(&prev_row, &row)? {
                        for acc in &mut prev_accs {
                            acc.update(&row)?;
                        }
                        self.current = Some((prev_row, prev_accs));
                    } else {
                        let mut accs = self.new_accumulators();
                        for acc in &mut accs {
                            acc.update(&row)?;
                        }
                        self.current = Some((row, accs));
                        self.emitted_any = true;
                        return Ok(Some(Self::finalize(prev_row, prev_accs)));
                    }
                }
            }
        }
    }

    fn infer_parameters(&self, params: &mut ParamTypes) -> SqlResult<()> {
        self.inner.infer_parameters(params)?;

        let cols = cols_by_name(&self.inner.columns()?);
        for sel in self.agg_selectors() {
            Expr::Agg(sel.clone()).infer_type(
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

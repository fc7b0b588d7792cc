//! Nested-loop join reader.
//!
//! For each left row, every join spec opens a fresh reader over its right
//! side with the join condition injected into the right scan's WHERE, the
//! left row's current values substituted in. LEFT joins emit unmatched left
//! rows with NULL right columns; RIGHT joins track matched right rows and
//! flush the unmatched remainder, NULL-filled on the left, once the left
//! side is exhausted.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use strata_store::Snapshot;

use crate::ast::{JoinSpec, JoinType, SelectStmt};
use crate::catalog::Catalog;
use crate::error::SqlResult;
use crate::expr::{ParamTypes, Params};
use crate::reader::{encode_row_identity, resolve_select, RowReader};
use crate::row::{cols_by_name, ColDescriptor, Row};
use crate::value::{SqlType, TypedValue};

/// Reader joining a left stream against per-row right-side scans.
pub struct JointRowReader {
    left: Box<dyn RowReader>,
    joins: Vec<JoinSpec>,
    catalog: Catalog,
    snapshot: Arc<dyn Snapshot>,
    implicit_db: Option<String>,
    params: Params,
    right_cols: Vec<Vec<ColDescriptor>>,
    pending: VecDeque<Row>,
    matched: Vec<HashSet<Vec<u8>>>,
    right_flushed: bool,
    closed: bool,
}

impl JointRowReader {
    /// Wraps `left` with the given join specs.
    ///
    /// The catalog is cloned so the join observes table metadata as of
    /// query start for its whole lifetime.
    pub fn new(
        left: Box<dyn RowReader>,
        joins: Vec<JoinSpec>,
        catalog: Catalog,
        snapshot: Arc<dyn Snapshot>,
        implicit_db: Option<String>,
        params: Params,
    ) -> SqlResult<Self> {
        // Capture each right side's columns up front; LEFT/RIGHT joins need
        // them to null-fill before any row has been matched.
        let mut right_cols = Vec::with_capacity(joins.len());
        for join in &joins {
            let mut probe = resolve_select(
                &SelectStmt::new(join.ds.clone()),
                &catalog,
                &snapshot,
                implicit_db.as_deref(),
                &params,
            )?;
            right_cols.push(probe.columns()?);
            probe.close()?;
        }

        let matched = joins.iter().map(|_| HashSet::new()).collect();

        Ok(Self {
            left,
            joins,
            catalog,
            snapshot,
            implicit_db,
            params,
            right_cols,
            pending: VecDeque::new(),
            matched,
            right_flushed: false,
            closed: false,
        })
    }

    /// Opens a right-side reader for one join, with an optional left row's
    /// values injected into the join condition.
    fn right_reader(&self, join_idx: usize, left_row: Option<&Row>) -> SqlResult<Box<dyn RowReader>> {
        let join = &self.joins[join_idx];

        let mut stmt = SelectStmt::new(join.ds.clone());
        stmt.index_on = join.index_on.clone();

        if let Some(row) = left_row {
            let cond = join.cond.reduce_selectors(
                row,
                self.left.implicit_db(),
                self.left.implicit_table(),
            );
            stmt = stmt.with_where(cond);
        }

        resolve_select(
            &stmt,
            &self.catalog,
            &self.snapshot,
            self.implicit_db.as_deref(),
            &self.params,
        )
    }

    fn null_fill(row: &mut Row, cols: &[ColDescriptor]) {
        for desc in cols {
            row.insert(desc.selector(), TypedValue::Null(desc.sql_type));
        }
    }

    /// Extends `rows` through one join spec.
    fn expand(&mut self, join_idx: usize, rows: Vec<Row>) -> SqlResult<Vec<Row>> {
        let join_type = self.joins[join_idx].join_type;
        let mut out = Vec::new();

        for row in rows {
            let mut reader = self.right_reader(join_idx, Some(&row))?;
            let mut matched_any = false;

            while let Some(right_row) = reader.read()? {
                matched_any = true;

                if join_type == JoinType::Right {
                    let id = encode_row_identity(&self.right_cols[join_idx], &right_row)?;
                    self.matched[join_idx].insert(id);
                }

                let mut combined = row.clone();
                combined.merge(&right_row);
                out.push(combined);
            }
            reader.close()?;

            if !matched_any && join_type == JoinType::Left {
                let mut combined = row.clone();
                Self::null_fill(&mut combined, &self.right_cols[join_idx]);
                out.push(combined);
            }
        }

        Ok(out)
    }

    /// Emits unmatched right rows of RIGHT joins, left columns NULL.
    fn flush_unmatched_right(&mut self) -> SqlResult<()> {
        let left_cols = self.left.columns()?;

        for join_idx in 0..self.joins.len() {
            if self.joins[join_idx].join_type != JoinType::Right {
                continue;
            }

            let mut reader = self.right_reader(join_idx, None)?;
            while let Some(right_row) = reader.read()? {
                let id = encode_row_identity(&self.right_cols[join_idx], &right_row)?;
                if self.matched[join_idx].contains(&id) {
                    continue;
                }

                let mut out = Row::new();
                Self::null_fill(&mut out, &left_cols);
                for (other_idx, cols) in self.right_cols.iter().enumerate() {
                    if other_idx != join_idx {
                        Self::null_fill(&mut out, cols);
                    }
                }
                out.merge(&right_row);
                self.pending.push_back(out);
            }
            reader.close()?;
        }

        Ok(())
    }
}

impl RowReader for JointRowReader {
    fn implicit_db(&self) -> &str {
        self.left.implicit_db()
    }

    fn implicit_table(&self) -> &str {
        self.left.implicit_table()
    }

    fn columns(&self) -> SqlResult<Vec<ColDescriptor>> {
        let mut cols = self.left.columns()?;
        for right in &self.right_cols {
            cols.extend(right.iter().cloned());
        }
        Ok(cols)
    }

    fn read(&mut self) -> SqlResult<Option<Row>> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }

            let Some(left_row) = self.left.read()? else {
                if !self.right_flushed {
                    self.right_flushed = true;
                    self.flush_unmatched_right()?;
                    continue;
                }
                return Ok(None);
            };

            let mut rows = vec![left_row];
            for join_idx in 0..self.joins.len() {
                rows = self.expand(join_idx, rows)?;
                if rows.is_empty() {
                    break;
                }
            }

            self.pending.extend(rows);
        }
    }

    fn infer_parameters(&self, params: &mut ParamTypes) -> SqlResult<()> {
        self.left.infer_parameters(params)?;

        let cols = cols_by_name(&self.columns()?);
        for join in &self.joins {
            join.cond.requires_type(
                SqlType::Boolean,
                &cols,
                params,
                self.left.implicit_db(),
                self.left.implicit_table(),
            )?;
        }
        Ok(())
    }

    fn close(&mut self) -> SqlResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.left.close()
    }
}

//! Filtering reader for WHERE and HAVING clauses.

use crate::error::{SqlError, SqlResult};
use crate::expr::{Expr, ParamTypes, Params};
use crate::reader::RowReader;
use crate::row::{cols_by_name, ColDescriptor, Row};
use crate::value::{SqlType, TypedValue};

/// Emits only the rows for which the condition reduces to TRUE.
///
/// Rows reducing to FALSE or NULL are skipped; a condition that reduces to
/// any other value fails with `InvalidCondition`.
pub struct ConditionalRowReader {
    inner: Box<dyn RowReader>,
    condition: Expr,
    params: Params,
    // Parameter substitution happens once, on first read; the raw condition
    // stays available for parameter inference.
    prepared: Option<Expr>,
    closed: bool,
}

impl ConditionalRowReader {
    /// Wraps `inner`, filtering by `condition`.
    #[must_use]
    pub fn new(inner: Box<dyn RowReader>, condition: Expr, params: Params) -> Self {
        Self {
            inner,
            condition,
            params,
            prepared: None,
            closed: false,
        }
    }
}

impl RowReader for ConditionalRowReader {
    fn implicit_db(&self) -> &str {
        self.inner.implicit_db()
    }

    fn implicit_table(&self) -> &str {
        self.inner.implicit_table()
    }

    fn columns(&self) -> SqlResult<Vec<ColDescriptor>> {
        self.inner.columns()
    }

    fn read(&mut self) -> SqlResult<Option<Row>> {
        if self.prepared.is_none() {
            self.prepared = Some(self.condition.substitute(&self.params)?);
        }
        let condition = self.prepared.as_ref().expect("just prepared").clone();

        loop {
            let Some(row) = self.inner.read()? else {
                return Ok(None);
            };

            let value = condition.reduce(
                Some(&row),
                self.inner.implicit_db(),
                self.inner.implicit_table(),
            )?;

            match value {
                TypedValue::Boolean(true) => return Ok(Some(row)),
                TypedValue::Boolean(false) | TypedValue::Null(_) => continue,
                _ => return Err(SqlError::InvalidCondition),
            }
        }
    }

    fn infer_parameters(&self, params: &mut ParamTypes) -> SqlResult<()> {
        self.inner.infer_parameters(params)?;

        let cols = cols_by_name(&self.inner.columns()?);
        self.condition.requires_type(
            SqlType::Boolean,
            &cols,
            params,
            self.inner.implicit_db(),
            self.inner.implicit_table(),
        )
    }

    fn close(&mut self) -> SqlResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}

//! Row-count limiting reader.

use crate::error::SqlResult;
use crate::expr::ParamTypes;
use crate::reader::RowReader;
use crate::row::{ColDescriptor, Row};

/// Stops after emitting a fixed number of rows.
pub struct LimitRowReader {
    inner: Box<dyn RowReader>,
    limit: usize,
    emitted: usize,
    closed: bool,
}

impl LimitRowReader {
    /// Wraps `inner`, emitting at most `limit` rows.
    #[must_use]
    pub fn new(inner: Box<dyn RowReader>, limit: usize) -> Self {
        Self {
            inner,
            limit,
            emitted: 0,
            closed: false,
        }
    }
}

impl RowReader for LimitRowReader {
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
        if self.emitted >= self.limit {
            return Ok(None);
        }

        match self.inner.read()? {
            Some(row) => {
                self.emitted += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn infer_parameters(&self, params: &mut ParamTypes) -> SqlResult<()> {
        self.inner.infer_parameters(params)
    }

    fn close(&mut self) -> SqlResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}

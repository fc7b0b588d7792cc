//! Duplicate-eliminating reader.

use std::collections::HashSet;

use crate::error::SqlResult;
use crate::expr::ParamTypes;
use crate::reader::{encode_row_identity, RowReader};
use crate::row::{ColDescriptor, Row};

/// Emits each distinct row once, keyed by its encoded value tuple.
pub struct DistinctRowReader {
    inner: Box<dyn RowReader>,
    seen: HashSet<Vec<u8>>,
    closed: bool,
}

impl DistinctRowReader {
    /// Wraps `inner`, dropping duplicate rows.
    #[must_use]
    pub fn new(inner: Box<dyn RowReader>) -> Self {
        Self {
            inner,
            seen: HashSet::new(),
            closed: false,
        }
    }
}

impl RowReader for DistinctRowReader {
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
        let cols = self.inner.columns()?;

        loop {
            let Some(row) = self.inner.read()? else {
                return Ok(None);
            };

            let identity = encode_row_identity(&cols, &row)?;
            if self.seen.insert(identity) {
                return Ok(Some(row));
            }
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

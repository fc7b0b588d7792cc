//! Raw index scan reader.
//!
//! Walks one index of one table between the range bounds the planner
//! derived, materializing full rows:
//!
//! - primary index: the entry payload holds every non-null column value
//! - unique secondary index: the payload holds the encoded primary key and
//!   a point lookup on the primary index materializes the row
//! - non-unique secondary index: the encoded primary key is the trailing
//!   section of the entry key, followed by the same point lookup
//!
//! Entries whose value carries the tombstone marker are skipped unless the
//! scan asks for them. Decoded rows are re-checked against the planner's
//! ranges, so bound inclusivity is exact regardless of how coarse the seek
//! position was.

use std::sync::Arc;

use tracing::trace;

use strata_store::{KeyReader, KeyReaderSpec, Snapshot, StoreError};

use crate::catalog::{Table, P_INDEX_PREFIX, PK_INDEX_ID, S_INDEX_PREFIX, U_INDEX_PREFIX};
use crate::encoding::{decode_id, decode_value, encode_as_key, encode_id, map_key, ENC_ID_LEN};
use crate::error::{SqlError, SqlResult};
use crate::expr::ParamTypes;
use crate::planner::ScanSpecs;
use crate::reader::RowReader;
use crate::row::{ColDescriptor, Row};
use crate::value::TypedValue;

/// Reader over one index range of one table.
pub struct RawRowReader {
    snapshot: Arc<dyn Snapshot>,
    table: Table,
    db_name: String,
    table_alias: String,
    specs: ScanSpecs,
    prefix: Vec<u8>,
    key_reader: Box<dyn KeyReader>,
    closed: bool,
}

impl RawRowReader {
    /// Opens a reader for the planned scan.
    pub fn new(
        snapshot: Arc<dyn Snapshot>,
        table: Table,
        db_name: String,
        table_alias: String,
        specs: ScanSpecs,
    ) -> SqlResult<Self> {
        let index = &specs.index;

        let store_prefix = if index.is_primary() {
            P_INDEX_PREFIX
        } else if index.unique {
            U_INDEX_PREFIX
        } else {
            S_INDEX_PREFIX
        };

        let prefix = map_key(
            store_prefix,
            &[
                &encode_id(table.db_id),
                &encode_id(table.id),
                &encode_id(index.id),
            ],
        );

        let seek_key = Self::seek_key(&table, &specs, &prefix)?;

        trace!(
            table = %table.name,
            index = index.id,
            desc = specs.desc_order,
            "raw scan opened"
        );

        let key_reader = snapshot.new_key_reader(
            KeyReaderSpec::for_prefix(prefix.clone())
                .with_seek_key(seek_key)
                .with_desc_order(specs.desc_order)
                .with_include_deleted(specs.include_deleted),
        )?;

        Ok(Self {
            snapshot,
            table,
            db_name,
            table_alias,
            specs,
            prefix,
            key_reader,
            closed: false,
        })
    }

    /// Builds the scan's starting position from the leading bounded columns
    /// of the index. The position is a coarse optimization; exact bound
    /// checks happen against decoded values.
    fn seek_key(table: &Table, specs: &ScanSpecs, prefix: &[u8]) -> SqlResult<Vec<u8>> {
        let mut seek = prefix.to_vec();
        let mut bounded = false;

        for col_id in &specs.index.col_ids {
            let Some(range) = specs.ranges_by_col_id.get(col_id) else {
                break;
            };

            let bound = if specs.desc_order {
                &range.high
            } else {
                &range.low
            };
            let Some(semi) = bound else { break };
            if semi.val.is_null() {
                break;
            }

            let col = table.col_by_id(*col_id)?;
            seek.extend_from_slice(&encode_as_key(&semi.val, col.sql_type, col.max_len())?);
            bounded = true;

            if !range.is_unitary() {
                break;
            }
        }

        if !bounded {
            return Ok(Vec::new());
        }

        if specs.desc_order {
            // The bound bytes are a prefix of longer keys which sort after
            // them; start past every extension of the bound.
            Ok(strata_store::Key::from_vec(seek).successor().as_bytes().to_vec())
        } else {
            Ok(seek)
        }
    }

    /// Decodes the payload of a primary-index entry into column values.
    fn decode_payload(&self, payload: &[u8]) -> SqlResult<Vec<(u32, TypedValue)>> {
        let count = decode_id(payload)? as usize;
        let mut values = Vec::with_capacity(count);
        let mut off = ENC_ID_LEN;

        for _ in 0..count {
            let col_id = decode_id(&payload[off..])?;
            off += ENC_ID_LEN;

            let col = self.table.col_by_id(col_id)?;
            let (value, consumed) = decode_value(&payload[off..], col.sql_type)?;
            off += consumed;

            values.push((col_id, value));
        }

        Ok(values)
    }

    /// Materializes the row behind a secondary-index entry by looking up
    /// its primary entry. Returns `None` if the primary row is tombstoned.
    fn fetch_primary(&self, pk_enc_vals: &[u8]) -> SqlResult<Option<Vec<(u32, TypedValue)>>> {
        let pk_key = map_key(
            P_INDEX_PREFIX,
            &[
                &encode_id(self.table.db_id),
                &encode_id(self.table.id),
                &encode_id(PK_INDEX_ID),
                pk_enc_vals,
            ],
        );

        let value = match self.snapshot.get(&pk_key) {
            Ok(v) => v,
            Err(StoreError::KeyNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let bytes = value.as_bytes();
        if bytes.is_empty() {
            return Err(SqlError::Unexpected("empty primary entry"));
        }
        if bytes[0] == 1 && !self.specs.include_deleted {
            return Ok(None);
        }

        Ok(Some(self.decode_payload(&bytes[1..])?))
    }

    /// Total encoded width of the index's column fragments.
    fn index_fragments_len(&self) -> SqlResult<usize> {
        let mut len = 0;
        for col_id in &self.specs.index.col_ids {
            let col = self.table.col_by_id(*col_id)?;
            len += match col.sql_type {
                t if t.is_fixed_size() => {
                    if matches!(t, crate::value::SqlType::Boolean) {
                        1
                    } else {
                        8
                    }
                }
                _ => col.max_len() + ENC_ID_LEN,
            };
        }
        Ok(len)
    }

    fn decode_entry(&self, key: &[u8], value: &[u8]) -> SqlResult<Option<Vec<(u32, TypedValue)>>> {
        if value.is_empty() {
            return Err(SqlError::Unexpected("empty index entry"));
        }

        if self.specs.index.is_primary() {
            return Ok(Some(self.decode_payload(&value[1..])?));
        }

        if self.specs.index.unique {
            // value = tombstone ∥ pkEncVals
            return self.fetch_primary(&value[1..]);
        }

        // Non-unique: pkEncVals is the key tail past the index fragments.
        let frag_len = self.index_fragments_len()?;
        let tail_start = self.prefix.len() + frag_len;
        let pk_enc_vals = key.get(tail_start..).ok_or(SqlError::InvalidValue)?;
        self.fetch_primary(pk_enc_vals)
    }

    /// Checks the decoded row against the planner's ranges.
    fn fits_ranges(&self, values: &[(u32, TypedValue)]) -> SqlResult<bool> {
        for (col_id, range) in &self.specs.ranges_by_col_id {
            let value = values
                .iter()
                .find(|(id, _)| id == col_id)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| {
                    let t = self
                        .table
                        .col_by_id(*col_id)
                        .map(|c| c.sql_type)
                        .unwrap_or(crate::value::SqlType::Any);
                    TypedValue::Null(t)
                });

            if !range.contains(&value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn build_row(&self, values: &[(u32, TypedValue)]) -> Row {
        let mut row = Row::new();
        for col in &self.table.cols {
            let value = values
                .iter()
                .find(|(id, _)| *id == col.id)
                .map(|(_, v)| v.clone())
                .unwrap_or(TypedValue::Null(col.sql_type));

            let selector = crate::encoding::encode_selector(
                "",
                &self.db_name,
                &self.table_alias,
                &col.name,
            );
            row.insert(selector, value);
        }
        row
    }
}

impl RowReader for RawRowReader {
    fn implicit_db(&self) -> &str {
        &self.db_name
    }

    fn implicit_table(&self) -> &str {
        &self.table_alias
    }

    fn columns(&self) -> SqlResult<Vec<ColDescriptor>> {
        Ok(self
            .table
            .cols
            .iter()
            .map(|c| {
                ColDescriptor::new(
                    self.db_name.clone(),
                    self.table_alias.clone(),
                    c.name.clone(),
                    c.sql_type,
                )
            })
            .collect())
    }

    fn read(&mut self) -> SqlResult<Option<Row>> {
        if self.closed {
            return Err(StoreError::AlreadyClosed.into());
        }

        loop {
            let Some((key, value)) = self.key_reader.read()? else {
                return Ok(None);
            };

            let Some(values) = self.decode_entry(key.as_bytes(), value.as_bytes())? else {
                continue;
            };

            if !self.fits_ranges(&values)? {
                continue;
            }

            return Ok(Some(self.build_row(&values)));
        }
    }

    fn infer_parameters(&self, _params: &mut ParamTypes) -> SqlResult<()> {
        Ok(())
    }

    fn close(&mut self) -> SqlResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.key_reader.close()?;
        Ok(())
    }
}

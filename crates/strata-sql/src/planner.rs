//! Scan planning.
//!
//! Given a SELECT's WHERE predicate, optional `USE INDEX` hint, and optional
//! `ORDER BY`, the planner picks the index to walk, derives per-column value
//! ranges from the predicate, and decides the iteration direction. The
//! result fully describes a single-index range scan.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::SelectStmt;
use crate::catalog::{Index, Table};
use crate::error::{SqlError, SqlResult};
use crate::expr::{Params, ValueRange};

/// A fully planned single-index range scan.
#[derive(Debug, Clone)]
pub struct ScanSpecs {
    /// The index to walk.
    pub index: Index,
    /// Value ranges per column id, derived from the WHERE predicate.
    pub ranges_by_col_id: HashMap<u32, ValueRange>,
    /// Walk the index in descending key order.
    pub desc_order: bool,
    /// Surface tombstoned entries instead of skipping them.
    pub include_deleted: bool,
}

/// Plans the scan for a SELECT over `table`.
///
/// Selection order: a `USE INDEX` hint must resolve to an index with
/// exactly the hinted column tuple; an `ORDER BY` column must be covered by
/// an index whose leading columns are all pinned by the predicate (the
/// hinted index is preferred among candidates); otherwise the primary index
/// is used.
pub fn scan_specs(
    stmt: &SelectStmt,
    table: &Table,
    db_name: &str,
    as_table: &str,
    params: &Params,
) -> SqlResult<ScanSpecs> {
    let mut ranges_by_col_id = HashMap::new();
    if let Some(cond) = &stmt.where_clause {
        cond.selector_ranges(table, db_name, as_table, params, &mut ranges_by_col_id)?;
    }

    let preferred_index = match stmt.index_on.is_empty() {
        true => None,
        false => {
            let mut col_ids = Vec::with_capacity(stmt.index_on.len());
            for name in &stmt.index_on {
                col_ids.push(table.col_by_name(name)?.id);
            }
            Some(
                table
                    .index_for_cols(&col_ids)
                    .ok_or(SqlError::NoAvailableIndex)?,
            )
        }
    };

    let mut sorting_index: Option<&Index> = None;
    let mut desc_order = false;

    if stmt.order_by.is_empty() {
        sorting_index = Some(match preferred_index {
            Some(ix) => ix,
            None => table.primary_index()?,
        });
    } else {
        let ord = &stmt.order_by[0];
        let col = table.col_by_name(&ord.sel.col)?;

        for ix in table.indexes_covering(col.id) {
            if !ix.sortable_using(col.id, &ranges_by_col_id) {
                continue;
            }
            if preferred_index.is_none() || preferred_index.is_some_and(|p| p.id == ix.id) {
                sorting_index = Some(ix);
                break;
            }
        }

        desc_order = ord.desc_order;
    }

    let index = sorting_index.ok_or(SqlError::NoAvailableIndex)?.clone();

    debug!(
        table = %table.name,
        index = index.id,
        desc = desc_order,
        ranged_cols = ranges_by_col_id.len(),
        "scan planned"
    );

    Ok(ScanSpecs {
        index,
        ranges_by_col_id,
        desc_order,
        include_deleted: false,
    })
}

/// Validates the structural restrictions of a SELECT.
///
/// GROUP BY and ORDER BY are limited to one column, the ORDER BY target
/// must be indexed, and HAVING requires GROUP BY.
pub fn check_select_restrictions(stmt: &SelectStmt, table: Option<&Table>) -> SqlResult<()> {
    if stmt.group_by.is_empty() && stmt.having.is_some() {
        return Err(SqlError::HavingClauseRequiresGroupClause);
    }

    if stmt.group_by.len() > 1 {
        return Err(SqlError::LimitedGroupBy);
    }

    if stmt.order_by.len() > 1 {
        return Err(SqlError::LimitedOrderBy);
    }

    if let Some(ord) = stmt.order_by.first() {
        let table = table.ok_or(SqlError::LimitedOrderBy)?;
        let col = table.col_by_name(&ord.sel.col)?;
        if table.indexes_covering(col.id).is_empty() {
            return Err(SqlError::LimitedOrderBy);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ColSpec, OrdCol};
    use crate::catalog::Catalog;
    use crate::expr::{CmpOp, Expr};
    use crate::value::SqlType;

    fn indexed_table() -> Table {
        let mut catalog = Catalog::new();
        catalog.new_database("db1").unwrap();
        let db = catalog.db_by_name_mut("db1").unwrap();
        let specs = vec![
            ColSpec::new("id", SqlType::Integer),
            ColSpec::new("age", SqlType::Integer),
            ColSpec::new("name", SqlType::Varchar).with_max_len(16),
        ];
        let table = db.new_table("t1", &specs).unwrap();
        table.new_index(true, vec![1]).unwrap(); // primary on id
        table.new_index(false, vec![2]).unwrap(); // (age)
        table.new_index(false, vec![2, 3]).unwrap(); // (age, name)
        table.clone()
    }

    #[test]
    fn test_default_primary_index() {
        let table = indexed_table();
        let stmt = SelectStmt::from_table("t1");

        let specs = scan_specs(&stmt, &table, "db1", "t1", &Params::new()).unwrap();
        assert!(specs.index.is_primary());
        assert!(!specs.desc_order);
    }

    #[test]
    fn test_use_index_hint() {
        let table = indexed_table();

        let stmt = SelectStmt::from_table("t1").with_index_on(&["age"]);
        let specs = scan_specs(&stmt, &table, "db1", "t1", &Params::new()).unwrap();
        assert_eq!(specs.index.id, 1);

        // The hint must match the full column tuple.
        let stmt = SelectStmt::from_table("t1").with_index_on(&["name"]);
        assert!(matches!(
            scan_specs(&stmt, &table, "db1", "t1", &Params::new()),
            Err(SqlError::NoAvailableIndex)
        ));
    }

    #[test]
    fn test_order_by_picks_covering_index() {
        let table = indexed_table();

        let stmt = SelectStmt::from_table("t1").with_order_by(OrdCol::desc("age"));
        let specs = scan_specs(&stmt, &table, "db1", "t1", &Params::new()).unwrap();
        assert_eq!(specs.index.id, 1);
        assert!(specs.desc_order);
    }

    #[test]
    fn test_order_by_second_index_col_needs_pinned_prefix() {
        let table = indexed_table();

        // ORDER BY name alone: only the (age, name) index covers "name",
        // and its leading column is unpinned.
        let stmt = SelectStmt::from_table("t1").with_order_by(OrdCol::asc("name"));
        assert!(matches!(
            scan_specs(&stmt, &table, "db1", "t1", &Params::new()),
            Err(SqlError::NoAvailableIndex)
        ));

        // Pinning age with an equality makes the composite index sortable.
        let stmt = SelectStmt::from_table("t1")
            .with_where(Expr::col_cmp("age", CmpOp::Eq, 30_i64))
            .with_order_by(OrdCol::asc("name"));
        let specs = scan_specs(&stmt, &table, "db1", "t1", &Params::new()).unwrap();
        assert_eq!(specs.index.id, 2);
    }

    #[test]
    fn test_restrictions() {
        let table = indexed_table();

        let stmt = SelectStmt::from_table("t1")
            .with_having(Expr::col_cmp("age", CmpOp::Gt, 1_i64));
        assert!(matches!(
            check_select_restrictions(&stmt, Some(&table)),
            Err(SqlError::HavingClauseRequiresGroupClause)
        ));

        let stmt = SelectStmt::from_table("t1")
            .with_group_by("age")
            .with_group_by("name");
        assert!(matches!(
            check_select_restrictions(&stmt, Some(&table)),
            Err(SqlError::LimitedGroupBy)
        ));

        let stmt = SelectStmt::from_table("t1")
            .with_order_by(OrdCol::asc("id"))
            .with_order_by(OrdCol::asc("age"));
        assert!(matches!(
            check_select_restrictions(&stmt, Some(&table)),
            Err(SqlError::LimitedOrderBy)
        ));
    }
}

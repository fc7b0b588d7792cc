//! The abstract statement tree.
//!
//! SQL lexing and parsing live outside this crate; a grammar-driven parser
//! lowers statement text into these types and hands them to the engine.
//! The tree is a data contract: plain structs and enums with builder-style
//! constructors, no behavior beyond construction. Compilation semantics live
//! in [`crate::compile`], expression semantics in [`crate::expr`].

use crate::expr::Expr;
use crate::value::SqlType;

/// A single SQL statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// `CREATE DATABASE name`
    CreateDatabase(CreateDatabaseStmt),
    /// `USE DATABASE name`
    UseDatabase(UseDatabaseStmt),
    /// `USE SNAPSHOT ...` — parsed, compilation reports unsupported.
    UseSnapshot(UseSnapshotStmt),
    /// `CREATE TABLE [IF NOT EXISTS] ...`
    CreateTable(CreateTableStmt),
    /// `CREATE [UNIQUE] INDEX ON t (cols)`
    CreateIndex(CreateIndexStmt),
    /// `ALTER TABLE t ADD COLUMN ...` — parsed, compilation reports
    /// unsupported.
    AddColumn(AddColumnStmt),
    /// `INSERT INTO ...` / `UPSERT INTO ...`
    Upsert(UpsertIntoStmt),
    /// `SELECT ...`
    Select(SelectStmt),
}

/// `CREATE DATABASE name`.
#[derive(Debug, Clone)]
pub struct CreateDatabaseStmt {
    /// Database name.
    pub db: String,
}

/// `USE DATABASE name`.
#[derive(Debug, Clone)]
pub struct UseDatabaseStmt {
    /// Database name.
    pub db: String,
}

/// `USE SNAPSHOT SINCE TX ... BEFORE TX ...`.
#[derive(Debug, Clone)]
pub struct UseSnapshotStmt {
    /// Lower transaction bound.
    pub since_tx: u64,
    /// Upper transaction bound.
    pub as_before: u64,
}

/// Column specification inside `CREATE TABLE`.
#[derive(Debug, Clone)]
pub struct ColSpec {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub sql_type: SqlType,
    /// Declared max length in bytes (`VARCHAR[20]`), zero when absent.
    pub max_len: usize,
    /// `NOT NULL` modifier.
    pub not_null: bool,
    /// `AUTO_INCREMENT` modifier.
    pub auto_increment: bool,
}

impl ColSpec {
    /// Creates a plain nullable column of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            max_len: 0,
            not_null: false,
            auto_increment: false,
        }
    }

    /// Declares the max length in bytes.
    #[must_use]
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Marks the column `NOT NULL`.
    #[must_use]
    pub fn with_not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column `AUTO_INCREMENT`.
    #[must_use]
    pub fn with_auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// `CREATE TABLE [IF NOT EXISTS] t (cols..., PRIMARY KEY (pk_cols))`.
#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    /// Table name.
    pub table: String,
    /// Succeed silently if the table already exists.
    pub if_not_exists: bool,
    /// Column specifications.
    pub col_specs: Vec<ColSpec>,
    /// Primary key column names, in order.
    pub pk_col_names: Vec<String>,
}

impl CreateTableStmt {
    /// Creates a statement for the given table and columns.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        col_specs: Vec<ColSpec>,
        pk_col_names: Vec<String>,
    ) -> Self {
        Self {
            table: table.into(),
            if_not_exists: false,
            col_specs,
            pk_col_names,
        }
    }

    /// Adds the `IF NOT EXISTS` guard.
    #[must_use]
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }
}

/// `CREATE [UNIQUE] INDEX ON t (cols)`.
#[derive(Debug, Clone)]
pub struct CreateIndexStmt {
    /// Reject duplicate column tuples.
    pub unique: bool,
    /// Table name.
    pub table: String,
    /// Indexed column names, in order.
    pub cols: Vec<String>,
}

/// `ALTER TABLE t ADD COLUMN ...`.
#[derive(Debug, Clone)]
pub struct AddColumnStmt {
    /// Table name.
    pub table: String,
    /// The column to add.
    pub col_spec: ColSpec,
}

/// One row of an `INSERT`/`UPSERT` VALUES list.
#[derive(Debug, Clone)]
pub struct RowSpec {
    /// Positional value expressions, one per named column.
    pub values: Vec<Expr>,
}

impl RowSpec {
    /// Creates a row from positional expressions.
    #[must_use]
    pub fn new(values: Vec<Expr>) -> Self {
        Self { values }
    }
}

/// `INSERT INTO t (cols) VALUES ...` / `UPSERT INTO t (cols) VALUES ...`.
#[derive(Debug, Clone)]
pub struct UpsertIntoStmt {
    /// True for `INSERT` (insert-only semantics), false for `UPSERT`.
    pub is_insert: bool,
    /// Target table.
    pub table_ref: TableRef,
    /// Named columns.
    pub cols: Vec<String>,
    /// Value rows.
    pub rows: Vec<RowSpec>,
}

impl UpsertIntoStmt {
    /// Creates an `INSERT INTO` statement.
    #[must_use]
    pub fn insert(table: impl Into<String>, cols: Vec<String>, rows: Vec<RowSpec>) -> Self {
        Self {
            is_insert: true,
            table_ref: TableRef::new(table),
            cols,
            rows,
        }
    }

    /// Creates an `UPSERT INTO` statement.
    #[must_use]
    pub fn upsert(table: impl Into<String>, cols: Vec<String>, rows: Vec<RowSpec>) -> Self {
        Self {
            is_insert: false,
            table_ref: TableRef::new(table),
            cols,
            rows,
        }
    }
}

/// A reference to a table, optionally database-qualified and aliased.
#[derive(Debug, Clone)]
pub struct TableRef {
    /// Database name; empty resolves against the implicit database.
    pub db: String,
    /// Table name.
    pub table: String,
    /// `AS` alias; empty means the table name itself.
    pub as_alias: String,
}

impl TableRef {
    /// References a table in the implicit database.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            db: String::new(),
            table: table.into(),
            as_alias: String::new(),
        }
    }

    /// Qualifies the reference with a database name.
    #[must_use]
    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = db.into();
        self
    }

    /// Sets the alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.as_alias = alias.into();
        self
    }

    /// The name this reference exposes to selectors.
    #[must_use]
    pub fn alias(&self) -> &str {
        if self.as_alias.is_empty() {
            &self.table
        } else {
            &self.as_alias
        }
    }
}

/// The FROM-position data source of a SELECT: a table or a nested select.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// A (possibly aliased) table reference.
    Table(TableRef),
    /// A parenthesized nested `SELECT`.
    Select(Box<SelectStmt>),
}

impl DataSource {
    /// The name this source exposes to selectors.
    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            Self::Table(t) => t.alias(),
            Self::Select(s) => s.alias(),
        }
    }
}

/// Join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Emit only matching row pairs.
    Inner,
    /// Also emit unmatched left rows with NULL right columns.
    Left,
    /// Also emit unmatched right rows with NULL left columns.
    Right,
}

/// One `JOIN ds ON cond` clause.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// Join kind.
    pub join_type: JoinType,
    /// Right-hand data source.
    pub ds: DataSource,
    /// Join condition.
    pub cond: Expr,
    /// `USE INDEX` hint for the right-hand scan.
    pub index_on: Vec<String>,
}

impl JoinSpec {
    /// Creates an inner join.
    #[must_use]
    pub fn inner(ds: DataSource, cond: Expr) -> Self {
        Self {
            join_type: JoinType::Inner,
            ds,
            cond,
            index_on: Vec::new(),
        }
    }

    /// Sets the join kind.
    #[must_use]
    pub fn with_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }
}

/// A selected item: a column or an aggregate over a column.
#[derive(Debug, Clone)]
pub enum Selector {
    /// A plain column selector.
    Col(ColSelector),
    /// An aggregate selector.
    Agg(AggColSelector),
}

impl Selector {
    /// The output alias: the `AS` name when set, the column name otherwise.
    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            Self::Col(c) => {
                if c.as_alias.is_empty() {
                    &c.col
                } else {
                    &c.as_alias
                }
            }
            Self::Agg(a) => &a.as_alias,
        }
    }
}

/// `[db.][table.]col [AS alias]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColSelector {
    /// Database qualifier; empty resolves implicitly.
    pub db: String,
    /// Table qualifier; empty resolves implicitly.
    pub table: String,
    /// Column name.
    pub col: String,
    /// `AS` alias.
    pub as_alias: String,
}

impl ColSelector {
    /// Creates an unqualified column selector.
    #[must_use]
    pub fn new(col: impl Into<String>) -> Self {
        Self {
            db: String::new(),
            table: String::new(),
            col: col.into(),
            as_alias: String::new(),
        }
    }

    /// Qualifies with a table name or alias.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Qualifies with a database name.
    #[must_use]
    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = db.into();
        self
    }

    /// Sets the output alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.as_alias = alias.into();
        self
    }

    /// Resolves qualifiers against the enclosing query's implicit names.
    #[must_use]
    pub fn resolve<'a>(&'a self, implicit_db: &'a str, implicit_table: &'a str) -> (&'a str, &'a str) {
        let db = if self.db.is_empty() { implicit_db } else { &self.db };
        let table = if self.table.is_empty() {
            implicit_table
        } else {
            &self.table
        };
        (db, table)
    }
}

/// Aggregate function name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    /// Row / non-null count.
    Count,
    /// Integer sum.
    Sum,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Integer average (sum / count).
    Avg,
}

impl AggFn {
    /// The canonical upper-case name used inside selector keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
        }
    }
}

/// `AGG([db.][table.]col) [AS alias]`; `col` is `*` for `COUNT(*)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggColSelector {
    /// Aggregate function.
    pub agg_fn: AggFn,
    /// Database qualifier; empty resolves implicitly.
    pub db: String,
    /// Table qualifier; empty resolves implicitly.
    pub table: String,
    /// Column name, `*` for whole-row counting.
    pub col: String,
    /// `AS` alias.
    pub as_alias: String,
}

impl AggColSelector {
    /// Creates an unqualified aggregate selector.
    #[must_use]
    pub fn new(agg_fn: AggFn, col: impl Into<String>) -> Self {
        Self {
            agg_fn,
            db: String::new(),
            table: String::new(),
            col: col.into(),
            as_alias: String::new(),
        }
    }

    /// `COUNT(*)`.
    #[must_use]
    pub fn count_all() -> Self {
        Self::new(AggFn::Count, "*")
    }

    /// Sets the output alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.as_alias = alias.into();
        self
    }

    /// Resolves qualifiers against the enclosing query's implicit names.
    #[must_use]
    pub fn resolve<'a>(&'a self, implicit_db: &'a str, implicit_table: &'a str) -> (&'a str, &'a str) {
        let db = if self.db.is_empty() { implicit_db } else { &self.db };
        let table = if self.table.is_empty() {
            implicit_table
        } else {
            &self.table
        };
        (db, table)
    }
}

/// `ORDER BY col [DESC]`.
#[derive(Debug, Clone)]
pub struct OrdCol {
    /// Ordering column.
    pub sel: ColSelector,
    /// Descending order.
    pub desc_order: bool,
}

impl OrdCol {
    /// Ascending order by the given column.
    #[must_use]
    pub fn asc(col: impl Into<String>) -> Self {
        Self {
            sel: ColSelector::new(col),
            desc_order: false,
        }
    }

    /// Descending order by the given column.
    #[must_use]
    pub fn desc(col: impl Into<String>) -> Self {
        Self {
            sel: ColSelector::new(col),
            desc_order: true,
        }
    }
}

/// A `SELECT` statement.
#[derive(Debug, Clone)]
pub struct SelectStmt {
    /// `DISTINCT` modifier.
    pub distinct: bool,
    /// Select list; empty means `*`.
    pub selectors: Vec<Selector>,
    /// FROM-position source.
    pub ds: DataSource,
    /// `USE INDEX (cols)` hint.
    pub index_on: Vec<String>,
    /// JOIN clauses, in order.
    pub joins: Vec<JoinSpec>,
    /// `WHERE` predicate.
    pub where_clause: Option<Expr>,
    /// `GROUP BY` columns (at most one supported).
    pub group_by: Vec<ColSelector>,
    /// `HAVING` predicate.
    pub having: Option<Expr>,
    /// `LIMIT` row count, zero when absent.
    pub limit: usize,
    /// `ORDER BY` columns (at most one supported).
    pub order_by: Vec<OrdCol>,
    /// `AS` alias for the whole query.
    pub as_alias: String,
}

impl SelectStmt {
    /// `SELECT * FROM table`.
    #[must_use]
    pub fn from_table(table: impl Into<String>) -> Self {
        Self::new(DataSource::Table(TableRef::new(table)))
    }

    /// `SELECT * FROM ds`.
    #[must_use]
    pub fn new(ds: DataSource) -> Self {
        Self {
            distinct: false,
            selectors: Vec::new(),
            ds,
            index_on: Vec::new(),
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            limit: 0,
            order_by: Vec::new(),
            as_alias: String::new(),
        }
    }

    /// Sets the select list.
    #[must_use]
    pub fn with_selectors(mut self, selectors: Vec<Selector>) -> Self {
        self.selectors = selectors;
        self
    }

    /// Selects plain columns by name.
    #[must_use]
    pub fn with_cols(mut self, cols: &[&str]) -> Self {
        self.selectors = cols
            .iter()
            .map(|c| Selector::Col(ColSelector::new(*c)))
            .collect();
        self
    }

    /// Adds `DISTINCT`.
    #[must_use]
    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Sets the `WHERE` predicate.
    #[must_use]
    pub fn with_where(mut self, cond: Expr) -> Self {
        self.where_clause = Some(cond);
        self
    }

    /// Adds a join clause.
    #[must_use]
    pub fn with_join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    /// Sets the `USE INDEX` hint.
    #[must_use]
    pub fn with_index_on(mut self, cols: &[&str]) -> Self {
        self.index_on = cols.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Sets `GROUP BY`.
    #[must_use]
    pub fn with_group_by(mut self, col: impl Into<String>) -> Self {
        self.group_by.push(ColSelector::new(col));
        self
    }

    /// Sets `HAVING`.
    #[must_use]
    pub fn with_having(mut self, cond: Expr) -> Self {
        self.having = Some(cond);
        self
    }

    /// Sets `ORDER BY`.
    #[must_use]
    pub fn with_order_by(mut self, ord: OrdCol) -> Self {
        self.order_by.push(ord);
        self
    }

    /// Sets `LIMIT`.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the query alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.as_alias = alias.into();
        self
    }

    /// The name this query exposes to enclosing selectors.
    #[must_use]
    pub fn alias(&self) -> &str {
        if self.as_alias.is_empty() {
            self.ds.alias()
        } else {
            &self.as_alias
        }
    }
}

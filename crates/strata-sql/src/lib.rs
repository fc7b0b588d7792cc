//! # strata-sql
//!
//! The SQL execution core of StrataDB: a relational data model layered on
//! top of an immutable, append-only key-value store.
//!
//! The core accepts a parsed statement tree (SQL text parsing is an
//! external collaborator; see [`ast`]) and produces either a set of
//! key-value mutations staged for atomic commit, or a pull-based row
//! stream. The hard part is the translation between the two models:
//!
//! - [`encoding`]: bit-exact key fragments that sort logically under
//!   lexicographic byte comparison, plus the self-delimiting payload form
//! - [`catalog`]: databases, tables, columns, and indexes as an id arena,
//!   persisted under well-known key prefixes
//! - [`expr`]: typed expressions with inference, parameter substitution,
//!   evaluation, and scan-range extraction
//! - [`compile`]: statement lowering into staged, constraint-carrying
//!   write batches, with secondary-index maintenance by tombstoning
//! - [`planner`]: index selection, per-column ranges, scan direction
//! - [`reader`]: the composable row-reader pipeline
//! - [`engine`]: the facade tying it all to a [`strata_store::Store`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_sql::ast::{ColSpec, CreateTableStmt, RowSpec, SelectStmt, Statement, UpsertIntoStmt};
//! use strata_sql::expr::{Expr, Params};
//! use strata_sql::value::{SqlType, TypedValue};
//! use strata_sql::Engine;
//! use strata_store::MemStore;
//!
//! let engine = Engine::new(Arc::new(MemStore::new())).unwrap();
//!
//! engine
//!     .exec(
//!         &[
//!             Statement::CreateDatabase(strata_sql::ast::CreateDatabaseStmt {
//!                 db: "db1".into(),
//!             }),
//!             Statement::CreateTable(CreateTableStmt::new(
//!                 "t",
//!                 vec![
//!                     ColSpec::new("id", SqlType::Integer).with_auto_increment(),
//!                     ColSpec::new("name", SqlType::Varchar).with_max_len(20),
//!                 ],
//!                 vec!["id".into()],
//!             )),
//!             Statement::Upsert(UpsertIntoStmt::insert(
//!                 "t",
//!                 vec!["name".into()],
//!                 vec![RowSpec::new(vec![Expr::Literal(TypedValue::from("alice"))])],
//!             )),
//!         ],
//!         &Params::new(),
//!     )
//!     .unwrap();
//!
//! let rows = engine
//!     .query_all(&SelectStmt::from_table("t").with_cols(&["name"]), &Params::new())
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod catalog;
pub mod compile;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod expr;
pub mod planner;
pub mod reader;
pub mod row;
pub mod value;

pub use compile::TxSummary;
pub use engine::Engine;
pub use error::{SqlError, SqlResult};
pub use expr::{Expr, Params};
pub use reader::RowReader;
pub use row::Row;
pub use value::{SqlType, TypedValue};

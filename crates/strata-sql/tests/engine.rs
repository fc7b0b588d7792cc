//! End-to-end tests for the SQL execution core over the in-memory store.
//!
//! Statements are built through the tree API the external parser targets;
//! each test drives the full path: compile → staged batch → commit →
//! planner → reader stack.

use std::sync::Arc;

use strata_sql::ast::{
    AggColSelector, AggFn, ColSpec, CreateDatabaseStmt, CreateIndexStmt, CreateTableStmt,
    DataSource, JoinSpec, JoinType, OrdCol, RowSpec, SelectStmt, Selector, Statement, TableRef,
    UpsertIntoStmt, UseDatabaseStmt,
};
use strata_sql::expr::{CmpOp, Expr, Params};
use strata_sql::value::{SqlType, TypedValue};
use strata_sql::{Engine, Row, SqlError};
use strata_store::MemStore;

fn new_engine() -> Engine {
    Engine::new(Arc::new(MemStore::new())).unwrap()
}

fn exec(engine: &Engine, stmts: Vec<Statement>) -> strata_sql::TxSummary {
    engine.exec(&stmts, &Params::new()).unwrap()
}

fn create_db(engine: &Engine, name: &str) {
    exec(
        engine,
        vec![
            Statement::CreateDatabase(CreateDatabaseStmt { db: name.into() }),
            Statement::UseDatabase(UseDatabaseStmt { db: name.into() }),
        ],
    );
}

fn lit(v: impl Into<TypedValue>) -> Expr {
    Expr::Literal(v.into())
}

fn int_at(row: &Row, selector: &str) -> i64 {
    match row.get(selector) {
        Some(TypedValue::Integer(i)) => *i,
        other => panic!("expected integer at {selector}, got {other:?}"),
    }
}

fn str_at(row: &Row, selector: &str) -> String {
    match row.get(selector) {
        Some(TypedValue::Varchar(s)) => s.clone(),
        other => panic!("expected varchar at {selector}, got {other:?}"),
    }
}

#[test]
fn test_create_and_roundtrip() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer).with_auto_increment(),
                ColSpec::new("name", SqlType::Varchar).with_max_len(20),
            ],
            vec!["id".into()],
        ))],
    );

    let summary = exec(
        &engine,
        vec![Statement::Upsert(UpsertIntoStmt::insert(
            "t",
            vec!["name".into()],
            vec![
                RowSpec::new(vec![lit("alice")]),
                RowSpec::new(vec![lit("bob")]),
            ],
        ))],
    );
    assert_eq!(summary.updated_rows, 2);
    assert_eq!(summary.last_inserted_pks["t"], 2);

    let stmt = SelectStmt::from_table("t")
        .with_cols(&["id", "name"])
        .with_order_by(OrdCol::asc("id"));
    let rows = engine.query_all(&stmt, &Params::new()).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(int_at(&rows[0], "(db1.t.id)"), 1);
    assert_eq!(str_at(&rows[0], "(db1.t.name)"), "alice");
    assert_eq!(int_at(&rows[1], "(db1.t.id)"), 2);
    assert_eq!(str_at(&rows[1], "(db1.t.name)"), "bob");
}

#[test]
fn test_unique_index_conflict() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![
            Statement::CreateTable(CreateTableStmt::new(
                "t",
                vec![
                    ColSpec::new("id", SqlType::Integer),
                    ColSpec::new("email", SqlType::Varchar)
                        .with_max_len(64)
                        .with_not_null(),
                ],
                vec!["id".into()],
            )),
            Statement::CreateIndex(CreateIndexStmt {
                unique: true,
                table: "t".into(),
                cols: vec!["email".into()],
            }),
        ],
    );

    exec(
        &engine,
        vec![Statement::Upsert(UpsertIntoStmt::insert(
            "t",
            vec!["id".into(), "email".into()],
            vec![RowSpec::new(vec![lit(1_i64), lit("a@x")])],
        ))],
    );

    let err = engine
        .exec(
            &[Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into(), "email".into()],
                vec![RowSpec::new(vec![lit(2_i64), lit("a@x")])],
            ))],
            &Params::new(),
        )
        .unwrap_err();

    assert!(err.is_key_already_exists(), "got {err:?}");

    // The whole batch failed: the second row is not visible.
    let rows = engine
        .query_all(&SelectStmt::from_table("t"), &Params::new())
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_upsert_tombstones_old_secondary_key() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![
            Statement::CreateTable(CreateTableStmt::new(
                "t",
                vec![
                    ColSpec::new("id", SqlType::Integer),
                    ColSpec::new("tag", SqlType::Varchar).with_max_len(8),
                ],
                vec!["id".into()],
            )),
            Statement::CreateIndex(CreateIndexStmt {
                unique: false,
                table: "t".into(),
                cols: vec!["tag".into()],
            }),
        ],
    );

    for tag in ["red", "blue"] {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::upsert(
                "t",
                vec!["id".into(), "tag".into()],
                vec![RowSpec::new(vec![lit(1_i64), lit(tag)])],
            ))],
        );
    }

    let by_tag = |tag: &str| {
        let stmt = SelectStmt::from_table("t")
            .with_cols(&["id"])
            .with_index_on(&["tag"])
            .with_where(Expr::col_cmp("tag", CmpOp::Eq, tag));
        engine.query_all(&stmt, &Params::new()).unwrap()
    };

    assert!(by_tag("red").is_empty());

    let blue = by_tag("blue");
    assert_eq!(blue.len(), 1);
    assert_eq!(int_at(&blue[0], "(db1.t.id)"), 1);
}

#[test]
fn test_range_planning() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![
            Statement::CreateTable(CreateTableStmt::new(
                "t",
                vec![
                    ColSpec::new("id", SqlType::Integer),
                    ColSpec::new("age", SqlType::Integer),
                ],
                vec!["id".into()],
            )),
            Statement::CreateIndex(CreateIndexStmt {
                unique: false,
                table: "t".into(),
                cols: vec!["age".into()],
            }),
        ],
    );

    for (id, age) in [(1_i64, 10_i64), (2, 20), (3, 30), (4, 40)] {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into(), "age".into()],
                vec![RowSpec::new(vec![lit(id), lit(age)])],
            ))],
        );
    }

    let stmt = SelectStmt::from_table("t")
        .with_cols(&["id"])
        .with_where(Expr::and(
            Expr::col_cmp("age", CmpOp::Ge, 20_i64),
            Expr::col_cmp("age", CmpOp::Lt, 40_i64),
        ))
        .with_order_by(OrdCol::asc("age"));

    let rows = engine.query_all(&stmt, &Params::new()).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| int_at(r, "(db1.t.id)")).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_group_by_aggregation() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![
            Statement::CreateTable(CreateTableStmt::new(
                "sales",
                vec![
                    ColSpec::new("id", SqlType::Integer),
                    ColSpec::new("country", SqlType::Varchar).with_max_len(8),
                    ColSpec::new("amount", SqlType::Integer),
                ],
                vec!["id".into()],
            )),
            Statement::CreateIndex(CreateIndexStmt {
                unique: false,
                table: "sales".into(),
                cols: vec!["country".into()],
            }),
        ],
    );

    for (id, country, amount) in [(1_i64, "US", 10_i64), (2, "US", 5), (3, "EU", 7)] {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::insert(
                "sales",
                vec!["id".into(), "country".into(), "amount".into()],
                vec![RowSpec::new(vec![lit(id), lit(country), lit(amount)])],
            ))],
        );
    }

    let stmt = SelectStmt::from_table("sales")
        .with_selectors(vec![
            Selector::Col(strata_sql::ast::ColSelector::new("country")),
            Selector::Agg(AggColSelector::count_all()),
            Selector::Agg(AggColSelector::new(AggFn::Sum, "amount")),
        ])
        .with_index_on(&["country"])
        .with_group_by("country");

    let rows = engine.query_all(&stmt, &Params::new()).unwrap();
    assert_eq!(rows.len(), 2);

    // The country index orders the groups: EU before US.
    assert_eq!(str_at(&rows[0], "(db1.sales.country)"), "EU");
    assert_eq!(int_at(&rows[0], "COUNT(db1.sales.*)"), 1);
    assert_eq!(int_at(&rows[0], "SUM(db1.sales.amount)"), 7);

    assert_eq!(str_at(&rows[1], "(db1.sales.country)"), "US");
    assert_eq!(int_at(&rows[1], "COUNT(db1.sales.*)"), 2);
    assert_eq!(int_at(&rows[1], "SUM(db1.sales.amount)"), 15);
}

#[test]
fn test_null_equality_matches_no_rows() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer),
                ColSpec::new("note", SqlType::Varchar).with_max_len(16),
            ],
            vec!["id".into()],
        ))],
    );

    exec(
        &engine,
        vec![
            Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into(), "note".into()],
                vec![RowSpec::new(vec![lit(1_i64), lit("x")])],
            )),
            Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into()],
                vec![RowSpec::new(vec![lit(2_i64)])],
            )),
        ],
    );

    let stmt = SelectStmt::from_table("t").with_where(Expr::col_cmp(
        "note",
        CmpOp::Eq,
        TypedValue::Null(SqlType::Varchar),
    ));
    let rows = engine.query_all(&stmt, &Params::new()).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_insert_uniqueness_on_primary_key() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer),
                ColSpec::new("v", SqlType::Integer),
            ],
            vec!["id".into()],
        ))],
    );

    let insert = |v: i64| {
        engine.exec(
            &[Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into(), "v".into()],
                vec![RowSpec::new(vec![lit(7_i64), lit(v)])],
            ))],
            &Params::new(),
        )
    };

    insert(1).unwrap();
    let err = insert(2).unwrap_err();
    assert!(err.is_key_already_exists(), "got {err:?}");
}

#[test]
fn test_upsert_stability() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer),
                ColSpec::new("v", SqlType::Integer),
            ],
            vec!["id".into()],
        ))],
    );

    for v in 0..5_i64 {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::upsert(
                "t",
                vec!["id".into(), "v".into()],
                vec![RowSpec::new(vec![lit(1_i64), lit(v)])],
            ))],
        );
    }

    let rows = engine
        .query_all(&SelectStmt::from_table("t"), &Params::new())
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(int_at(&rows[0], "(db1.t.v)"), 4);
}

#[test]
fn test_secondary_index_coverage() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![
            Statement::CreateTable(CreateTableStmt::new(
                "t",
                vec![
                    ColSpec::new("id", SqlType::Integer),
                    ColSpec::new("age", SqlType::Integer),
                ],
                vec!["id".into()],
            )),
            Statement::CreateIndex(CreateIndexStmt {
                unique: false,
                table: "t".into(),
                cols: vec!["age".into()],
            }),
        ],
    );

    for (id, age) in [(1_i64, 30_i64), (2, 10), (3, 20), (4, 10)] {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into(), "age".into()],
                vec![RowSpec::new(vec![lit(id), lit(age)])],
            ))],
        );
    }

    let collect_ids = |stmt: SelectStmt| {
        let mut ids: Vec<i64> = engine
            .query_all(&stmt, &Params::new())
            .unwrap()
            .iter()
            .map(|r| int_at(r, "(db1.t.id)"))
            .collect();
        ids.sort_unstable();
        ids
    };

    let via_primary = collect_ids(SelectStmt::from_table("t").with_cols(&["id"]));
    let via_secondary =
        collect_ids(SelectStmt::from_table("t").with_cols(&["id"]).with_index_on(&["age"]));

    assert_eq!(via_primary, via_secondary);
    assert_eq!(via_primary, vec![1, 2, 3, 4]);
}

#[test]
fn test_auto_increment_monotonicity() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer).with_auto_increment(),
                ColSpec::new("v", SqlType::Integer),
            ],
            vec!["id".into()],
        ))],
    );

    let mut last = 0;
    for v in 0..4_i64 {
        let summary = exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["v".into()],
                vec![RowSpec::new(vec![lit(v)])],
            ))],
        );
        let pk = summary.last_inserted_pks["t"];
        assert!(pk > last);
        last = pk;
    }
    assert_eq!(last, 4);
}

#[test]
fn test_idempotent_close() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![ColSpec::new("id", SqlType::Integer)],
            vec!["id".into()],
        ))],
    );

    let mut reader = engine
        .query(&SelectStmt::from_table("t"), &Params::new())
        .unwrap();
    reader.close().unwrap();
    reader.close().unwrap();
}

#[test]
fn test_select_with_parameters() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer),
                ColSpec::new("age", SqlType::Integer),
            ],
            vec!["id".into()],
        ))],
    );

    for (id, age) in [(1_i64, 15_i64), (2, 25), (3, 35)] {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into(), "age".into()],
                vec![RowSpec::new(vec![lit(id), lit(age)])],
            ))],
        );
    }

    let stmt = SelectStmt::from_table("t")
        .with_cols(&["id"])
        .with_where(Expr::cmp(
            Expr::Col(strata_sql::ast::ColSelector::new("age")),
            CmpOp::Gt,
            Expr::Param("min_age".into()),
        ));

    let mut params = Params::new();
    params.insert("min_age".into(), TypedValue::Integer(20));

    let rows = engine.query_all(&stmt, &params).unwrap();
    assert_eq!(rows.len(), 2);

    // Missing parameters surface as an error at read time.
    let err = engine.query_all(&stmt, &Params::new()).unwrap_err();
    assert!(matches!(err, SqlError::MissingParameter(_)));
}

#[test]
fn test_infer_parameters() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer),
                ColSpec::new("name", SqlType::Varchar).with_max_len(20),
            ],
            vec!["id".into()],
        ))],
    );

    let stmts = vec![Statement::Upsert(UpsertIntoStmt::insert(
        "t",
        vec!["id".into(), "name".into()],
        vec![RowSpec::new(vec![
            Expr::Param("pk".into()),
            Expr::Param("n".into()),
        ])],
    ))];
    let params = engine.infer_parameters(&stmts).unwrap();
    assert_eq!(params["pk"], SqlType::Integer);
    assert_eq!(params["n"], SqlType::Varchar);

    let select = SelectStmt::from_table("t").with_where(Expr::cmp(
        Expr::Col(strata_sql::ast::ColSelector::new("name")),
        CmpOp::Eq,
        Expr::Param("who".into()),
    ));
    let params = engine
        .infer_parameters(&[Statement::Select(select)])
        .unwrap();
    assert_eq!(params["who"], SqlType::Varchar);
}

#[test]
fn test_inner_and_left_join() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![
            Statement::CreateTable(CreateTableStmt::new(
                "users",
                vec![
                    ColSpec::new("id", SqlType::Integer),
                    ColSpec::new("name", SqlType::Varchar).with_max_len(16),
                ],
                vec!["id".into()],
            )),
            Statement::CreateTable(CreateTableStmt::new(
                "orders",
                vec![
                    ColSpec::new("id", SqlType::Integer),
                    ColSpec::new("user_id", SqlType::Integer),
                    ColSpec::new("total", SqlType::Integer),
                ],
                vec!["id".into()],
            )),
        ],
    );

    for (id, name) in [(1_i64, "alice"), (2, "bob")] {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::insert(
                "users",
                vec!["id".into(), "name".into()],
                vec![RowSpec::new(vec![lit(id), lit(name)])],
            ))],
        );
    }
    exec(
        &engine,
        vec![Statement::Upsert(UpsertIntoStmt::insert(
            "orders",
            vec!["id".into(), "user_id".into(), "total".into()],
            vec![RowSpec::new(vec![lit(10_i64), lit(1_i64), lit(99_i64)])],
        ))],
    );

    let join_cond = Expr::cmp(
        Expr::Col(strata_sql::ast::ColSelector::new("id").with_table("users")),
        CmpOp::Eq,
        Expr::Col(strata_sql::ast::ColSelector::new("user_id").with_table("orders")),
    );

    // Inner join: only alice has an order.
    let stmt = SelectStmt::from_table("users").with_join(JoinSpec::inner(
        DataSource::Table(TableRef::new("orders")),
        join_cond.clone(),
    ));
    let rows = engine.query_all(&stmt, &Params::new()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(str_at(&rows[0], "(db1.users.name)"), "alice");
    assert_eq!(int_at(&rows[0], "(db1.orders.total)"), 99);

    // Left join: bob appears with NULL order columns.
    let stmt = SelectStmt::from_table("users").with_join(
        JoinSpec::inner(DataSource::Table(TableRef::new("orders")), join_cond)
            .with_type(JoinType::Left),
    );
    let rows = engine.query_all(&stmt, &Params::new()).unwrap();
    assert_eq!(rows.len(), 2);

    let bob = rows
        .iter()
        .find(|r| str_at(r, "(db1.users.name)") == "bob")
        .expect("bob present");
    assert!(matches!(
        bob.get("(db1.orders.total)"),
        Some(TypedValue::Null(_))
    ));
}

#[test]
fn test_distinct_and_limit() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer),
                ColSpec::new("v", SqlType::Integer),
            ],
            vec!["id".into()],
        ))],
    );

    for (id, v) in [(1_i64, 1_i64), (2, 2), (3, 1), (4, 2), (5, 3)] {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into(), "v".into()],
                vec![RowSpec::new(vec![lit(id), lit(v)])],
            ))],
        );
    }

    let stmt = SelectStmt::from_table("t").with_cols(&["v"]).with_distinct();
    let rows = engine.query_all(&stmt, &Params::new()).unwrap();
    assert_eq!(rows.len(), 3);

    let stmt = SelectStmt::from_table("t").with_limit(2);
    let rows = engine.query_all(&stmt, &Params::new()).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_catalog_reload_recovers_max_pk() {
    let store = Arc::new(MemStore::new());

    {
        let engine = Engine::new(Arc::clone(&store) as Arc<dyn strata_store::Store>).unwrap();
        create_db(&engine, "db1");
        exec(
            &engine,
            vec![Statement::CreateTable(CreateTableStmt::new(
                "t",
                vec![
                    ColSpec::new("id", SqlType::Integer).with_auto_increment(),
                    ColSpec::new("v", SqlType::Integer),
                ],
                vec!["id".into()],
            ))],
        );
        for v in 0..3_i64 {
            exec(
                &engine,
                vec![Statement::Upsert(UpsertIntoStmt::insert(
                    "t",
                    vec!["v".into()],
                    vec![RowSpec::new(vec![lit(v)])],
                ))],
            );
        }
    }

    // A fresh engine over the same store resumes the counter.
    let engine = Engine::new(store).unwrap();
    engine.use_database("db1").unwrap();

    let summary = exec(
        &engine,
        vec![Statement::Upsert(UpsertIntoStmt::insert(
            "t",
            vec!["v".into()],
            vec![RowSpec::new(vec![lit(9_i64)])],
        ))],
    );
    assert_eq!(summary.last_inserted_pks["t"], 4);
}

#[test]
fn test_unsupported_statements() {
    let engine = new_engine();
    create_db(&engine, "db1");

    let err = engine
        .exec(
            &[Statement::UseSnapshot(strata_sql::ast::UseSnapshotStmt {
                since_tx: 0,
                as_before: 1,
            })],
            &Params::new(),
        )
        .unwrap_err();
    assert!(matches!(err, SqlError::NoSupported));

    let err = engine
        .exec(
            &[Statement::AddColumn(strata_sql::ast::AddColumnStmt {
                table: "t".into(),
                col_spec: ColSpec::new("x", SqlType::Integer),
            })],
            &Params::new(),
        )
        .unwrap_err();
    assert!(matches!(err, SqlError::NoSupported));
}

#[test]
fn test_index_creation_requires_empty_table() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![
                ColSpec::new("id", SqlType::Integer),
                ColSpec::new("v", SqlType::Integer),
            ],
            vec!["id".into()],
        ))],
    );

    exec(
        &engine,
        vec![Statement::Upsert(UpsertIntoStmt::insert(
            "t",
            vec!["id".into(), "v".into()],
            vec![RowSpec::new(vec![lit(1_i64), lit(1_i64)])],
        ))],
    );

    let err = engine
        .exec(
            &[Statement::CreateIndex(CreateIndexStmt {
                unique: false,
                table: "t".into(),
                cols: vec!["v".into()],
            })],
            &Params::new(),
        )
        .unwrap_err();
    assert!(matches!(err, SqlError::LimitedIndexCreation));
}

#[test]
fn test_descending_order() {
    let engine = new_engine();
    create_db(&engine, "db1");

    exec(
        &engine,
        vec![Statement::CreateTable(CreateTableStmt::new(
            "t",
            vec![ColSpec::new("id", SqlType::Integer)],
            vec!["id".into()],
        ))],
    );

    for id in [3_i64, 1, 2] {
        exec(
            &engine,
            vec![Statement::Upsert(UpsertIntoStmt::insert(
                "t",
                vec!["id".into()],
                vec![RowSpec::new(vec![lit(id)])],
            ))],
        );
    }

    let stmt = SelectStmt::from_table("t").with_order_by(OrdCol::desc("id"));
    let rows = engine.query_all(&stmt, &Params::new()).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| int_at(r, "(db1.t.id)")).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

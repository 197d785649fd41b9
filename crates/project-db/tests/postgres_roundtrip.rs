//! Round trips against a live PostgreSQL server.
//!
//! Run with `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

use project_db::config::{DatabaseConfig, SessionConfig};
use project_db::context::DbContext;
use project_db::db::{Base, ColumnDef, ColumnType, Model, SqlValue, Statement, TableDef};
use project_db::DbError;

#[derive(Debug, sqlx::FromRow)]
struct Widget {
    id: i64,
    name: String,
    weight: Option<f64>,
}

struct NewWidget {
    name: &'static str,
    weight: Option<f64>,
}

impl Model for NewWidget {
    fn table_def() -> TableDef {
        TableDef::new("widgets")
            .column(ColumnDef::new("id", ColumnType::BigSerial).primary_key())
            .column(ColumnDef::new("name", ColumnType::Text).not_null())
            .column(ColumnDef::new("weight", ColumnType::Double))
            .column(
                ColumnDef::new("created_at", ColumnType::Timestamp)
                    .not_null()
                    .default_sql("now()"),
            )
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![("name", self.name.into()), ("weight", self.weight.into())]
    }
}

fn test_config() -> DatabaseConfig {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    DatabaseConfig::with_url(url)
}

async fn setup(schema: &str) -> DbContext {
    let mut base = Base::with_schema(schema).unwrap();
    base.register::<NewWidget>().unwrap();

    let ctx = DbContext::new(&test_config(), &SessionConfig::default(), base).unwrap();
    ctx.base.drop_all(&ctx.engine).await.unwrap();
    ctx.base.create_all(&ctx.engine).await.unwrap();
    ctx
}

#[tokio::test]
#[ignore = "requires a reachable PostgreSQL (TEST_DATABASE_URL)"]
async fn session_round_trip() {
    let ctx = DbContext::new(&test_config(), &SessionConfig::default(), Base::new()).unwrap();
    let mut session = ctx.session();

    session.ping().await.unwrap();
    assert!(session.in_transaction());

    let rows = session.fetch_all("SELECT 1 AS one, 'x'::text AS label").await.unwrap();
    assert_eq!(rows, vec![serde_json::json!({"one": 1, "label": "x"})]);

    session.commit().await.unwrap();
    assert!(!session.in_transaction());
}

#[tokio::test]
#[ignore = "requires a reachable PostgreSQL (TEST_DATABASE_URL)"]
async fn commit_persists_staged_models() {
    let ctx = setup("pdb_commit").await;

    let mut session = ctx.session();
    session.add(&NewWidget { name: "bolt", weight: Some(1.5) }).unwrap();
    session.add(&NewWidget { name: "nut", weight: None }).unwrap();
    session.commit().await.unwrap();

    let mut reader = ctx.session();
    let widgets: Vec<Widget> = reader
        .fetch_all_as("SELECT id, name, weight FROM pdb_commit.widgets ORDER BY id")
        .await
        .unwrap();

    assert_eq!(widgets.len(), 2);
    assert_eq!(widgets[0].name, "bolt");
    assert_eq!(widgets[0].weight, Some(1.5));
    assert_eq!(widgets[1].weight, None);
    assert!(widgets[0].id < widgets[1].id);

    reader.close().await.unwrap();
    ctx.base.drop_all(&ctx.engine).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a reachable PostgreSQL (TEST_DATABASE_URL)"]
async fn autoflush_disabled_hides_staged_rows() {
    let ctx = setup("pdb_autoflush").await;
    let count = "SELECT count(*)::bigint AS n FROM pdb_autoflush.widgets";

    let mut session = ctx.session();
    session.add(&NewWidget { name: "gear", weight: None }).unwrap();
    let rows = session.fetch_all(count).await.unwrap();
    assert_eq!(rows[0]["n"], 0);
    assert_eq!(session.pending_count(), 1);

    session.flush().await.unwrap();
    let rows = session.fetch_all(count).await.unwrap();
    assert_eq!(rows[0]["n"], 1);

    session.rollback().await.unwrap();
    let rows = session.fetch_all(count).await.unwrap();
    assert_eq!(rows[0]["n"], 0);

    let mut eager = ctx.sessions.clone().autoflush(true).session();
    eager.add(&NewWidget { name: "cog", weight: None }).unwrap();
    let rows = eager.fetch_all(count).await.unwrap();
    assert_eq!(rows[0]["n"], 1);
    eager.close().await.unwrap();
    session.close().await.unwrap();

    ctx.base.drop_all(&ctx.engine).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a reachable PostgreSQL (TEST_DATABASE_URL)"]
async fn execute_binds_parameters() {
    let ctx = setup("pdb_execute").await;
    let mut session = ctx.session();

    let inserted = session
        .execute(
            Statement::new("INSERT INTO pdb_execute.widgets (name, weight) VALUES ($1, $2)")
                .bind("spring")
                .bind(0.25),
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let rows = session
        .fetch_all(Statement::new("SELECT name FROM pdb_execute.widgets WHERE weight > $1").bind(0.1))
        .await
        .unwrap();
    assert_eq!(rows[0]["name"], "spring");

    session.commit().await.unwrap();
    ctx.base.drop_all(&ctx.engine).await.unwrap();
}

async fn count_widgets(ctx: &DbContext, table: &str) -> i64 {
    let mut reader = ctx.session();
    let rows = reader
        .fetch_all(format!("SELECT count(*)::bigint AS n FROM {}", table))
        .await
        .unwrap();
    reader.close().await.unwrap();
    rows[0]["n"].as_i64().unwrap()
}

#[tokio::test]
#[ignore = "requires a reachable PostgreSQL (TEST_DATABASE_URL)"]
async fn autocommit_applies_statements_immediately() {
    let ctx = setup("pdb_autocommit").await;
    let mut session = ctx.sessions.clone().autocommit(true).session();

    session
        .execute(Statement::new("INSERT INTO pdb_autocommit.widgets (name) VALUES ($1)").bind("washer"))
        .await
        .unwrap();
    assert!(!session.in_transaction());
    assert_eq!(count_widgets(&ctx, "pdb_autocommit.widgets").await, 1);

    session.add(&NewWidget { name: "rivet", weight: None }).unwrap();
    session.flush().await.unwrap();
    assert!(!session.in_transaction());
    assert_eq!(count_widgets(&ctx, "pdb_autocommit.widgets").await, 2);

    session.close().await.unwrap();
    ctx.base.drop_all(&ctx.engine).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a reachable PostgreSQL (TEST_DATABASE_URL)"]
async fn failed_flush_applies_nothing_and_keeps_pending() {
    let ctx = setup("pdb_failed_flush").await;
    let table = "pdb_failed_flush.widgets";
    let null_name = "INSERT INTO pdb_failed_flush.widgets (name) VALUES (NULL)";

    let mut session = ctx.sessions.clone().autocommit(true).session();
    session.add(&NewWidget { name: "axle", weight: None }).unwrap();
    session.add_statement(null_name).unwrap();

    let err = session.flush().await.unwrap_err();
    assert_eq!(err.sqlstate().as_deref(), Some("23502"));
    assert_eq!(session.pending_count(), 2);
    assert_eq!(count_widgets(&ctx, table).await, 0);
    session.close().await.unwrap();

    // Inside the session transaction, earlier work survives a failed flush.
    let mut session = ctx.session();
    session.add(&NewWidget { name: "hub", weight: None }).unwrap();
    session.flush().await.unwrap();
    session.add(&NewWidget { name: "spoke", weight: None }).unwrap();
    session.add_statement(null_name).unwrap();

    assert!(session.flush().await.is_err());
    assert_eq!(session.pending_count(), 2);
    let rows = session
        .fetch_all(format!("SELECT name FROM {} ORDER BY id", table))
        .await
        .unwrap();
    assert_eq!(rows, vec![serde_json::json!({"name": "hub"})]);

    session.rollback().await.unwrap();
    session.close().await.unwrap();
    ctx.base.drop_all(&ctx.engine).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a reachable PostgreSQL (TEST_DATABASE_URL)"]
async fn dropped_session_rolls_back() {
    let ctx = setup("pdb_dropped").await;

    {
        let mut session = ctx.session();
        session.add(&NewWidget { name: "lost", weight: None }).unwrap();
        session.flush().await.unwrap();
        assert!(session.in_transaction());
    }

    assert_eq!(count_widgets(&ctx, "pdb_dropped.widgets").await, 0);
    ctx.base.drop_all(&ctx.engine).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a reachable PostgreSQL (TEST_DATABASE_URL)"]
async fn fetch_all_decodes_extended_types() {
    let ctx = DbContext::new(&test_config(), &SessionConfig::default(), Base::new()).unwrap();
    let mut session = ctx.session();

    let rows = session
        .fetch_all(
            "SELECT DATE '2024-02-29' AS day, TIME '12:30:00' AS at, '\\x0102'::bytea AS raw, \
             ARRAY[1, 2]::int4[] AS ints, ARRAY['a', 'b'] AS tags, NULL::date AS missing, \
             'x'::varchar AS code",
        )
        .await
        .unwrap();
    assert_eq!(
        rows[0],
        serde_json::json!({
            "day": "2024-02-29",
            "at": "12:30:00",
            "raw": "AQI=",
            "ints": [1, 2],
            "tags": ["a", "b"],
            "missing": null,
            "code": "x",
        })
    );

    let err = session.fetch_all("SELECT 1.5::numeric AS amount").await.unwrap_err();
    assert!(matches!(err, DbError::Decode(ref msg) if msg.contains("amount")));

    let rows = session.fetch_all("SELECT 1.5::numeric::text AS amount").await.unwrap();
    assert_eq!(rows[0]["amount"], "1.5");

    session.close().await.unwrap();
}

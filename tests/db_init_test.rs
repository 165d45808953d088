mod helpers;

use mnemos::db;
use tempfile::TempDir;

#[test]
fn schema_creates_expected_tables() {
    let conn = helpers::test_db();
    let tables: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type IN ('table') ORDER BY name")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    for expected in ["causal_edges", "memory_fts", "memory_index", "schema_meta"] {
        assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
    }
}

#[test]
fn init_schema_is_idempotent() {
    let conn = helpers::test_db();
    db::schema::init_schema(&conn).unwrap();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(
        db::migrations::get_schema_version(&conn).unwrap(),
        db::migrations::CURRENT_SCHEMA_VERSION
    );
}

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();
    assert!(db_path.exists());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memory_index", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn wal_and_busy_timeout_are_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db")).unwrap();

    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn records_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("persist.db");
    {
        let conn = db::open_database(&path).unwrap();
        helpers::insert_record(&conn, "a", "Persistent", "written before close");
    }
    let conn = db::open_database(&path).unwrap();
    let report = db::check_database_health(&conn).unwrap();
    assert_eq!(report.record_count, 1);
    assert_eq!(report.fts_row_count, 1);
}

#[test]
fn health_check_counts_rows() {
    let conn = helpers::test_db();
    helpers::insert_record(&conn, "a", "One", "first");
    helpers::insert_record(&conn, "b", "Two", "second");
    helpers::insert_edge(&conn, "a", "b", mnemos::store::Relation::Caused, 0.9);
    mnemos::store::sqlite::archive_record(&conn, "b").unwrap();

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.record_count, 2);
    assert_eq!(report.archived_count, 1);
    assert_eq!(report.edge_count, 1);
    assert_eq!(report.fts_row_count, 1);
}

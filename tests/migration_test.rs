mod helpers;

use mnemos::db;
use mnemos::db::migrations::{get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION};

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn migrations_are_idempotent() {
    let conn = helpers::test_db();
    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn manual_v1_db_upgrades_and_keeps_rows() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);

    conn.execute(
        "INSERT INTO memory_index (id, title, created_at, updated_at) \
         VALUES ('old', 'Pre-migration', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        [],
    )
    .unwrap();

    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);

    // The new column exists and the old row reads back with no links.
    let links: Option<String> = conn
        .query_row(
            "SELECT related_memories FROM memory_index WHERE id = 'old'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(links.is_none());
}

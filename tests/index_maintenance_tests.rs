use docrel::engine::naming::index_table_name;
use docrel::{
    ConnectionConfig, Criteria, DbError, DocumentStore, FieldType, IndexKind, Record, SortDirection,
    Table,
};

fn store() -> DocumentStore {
    docrel::open(ConnectionConfig::in_memory())
}

fn books() -> Table {
    let mut table = Table::new("books").unwrap();
    table.add_field("title", FieldType::String, None).unwrap();
    table.add_field("year", FieldType::Integer, None).unwrap();
    table
        .add_index("by_title", &[("title", IndexKind::Ascending)])
        .unwrap();
    table
}

fn raw_count(store: &DocumentStore, sql: &str) -> i64 {
    let conn = store.backend().driver().unwrap().connection();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn test_missing_table_is_created_on_first_write() {
    let mut store = store();
    let books = books();
    assert!(!store.has_table(&books).unwrap());

    let saved = store
        .set(&books, Record::new().with("title", "Dune"))
        .unwrap();
    assert!(saved.id().is_some());
    assert!(store.has_table(&books).unwrap());
    assert_eq!(store.get_indexes(&books).unwrap().len(), 1);
}

#[test]
fn test_missing_table_reads_as_empty() {
    let mut store = store();
    let books = books();

    let result = store
        .get(&books, &Criteria::new().equals("title", "Dune"))
        .unwrap();
    assert!(result.is_empty());
    assert!(store.has_table(&books).unwrap());
}

#[test]
fn test_orphaned_index_rows_are_healed() {
    let mut store = store();
    let books = books();
    store.set_table(&books).unwrap();

    let mut ids = Vec::new();
    for title in ["A", "B", "C"] {
        let saved = store.set(&books, Record::new().with("title", title)).unwrap();
        ids.push(saved.id().unwrap().to_string());
    }

    // Remove one document behind the engine's back
    store
        .backend()
        .driver()
        .unwrap()
        .connection()
        .execute("DELETE FROM \"books\" WHERE \"_id\" = ?1", [ids[1].as_str()])
        .unwrap();

    let index_table = index_table_name("books", books.get_index("by_title").unwrap());
    let count_sql = format!("SELECT COUNT(*) FROM \"{}\"", index_table);
    assert_eq!(raw_count(&store, &count_sql), 3);

    let result = store
        .get(&books, &Criteria::new().sort("title", SortDirection::Ascending))
        .unwrap();
    let titles: Vec<&str> = result.iter().filter_map(|r| r.get("title")?.as_str()).collect();
    assert_eq!(titles, vec!["A", "C"]);
    assert_eq!(raw_count(&store, &count_sql), 2);
}

#[test]
fn test_set_index_backfills_existing_documents() {
    let mut store = docrel::open(ConnectionConfig::in_memory().option("batch_size", 2));
    let mut books = books();
    store.set_table(&books).unwrap();

    for (title, year) in [("A", 1990i64), ("B", 2001), ("C", 2001), ("D", 2015), ("E", 1990)] {
        store
            .set(&books, Record::new().with("title", title).with("year", year))
            .unwrap();
    }

    books
        .add_index("by_year", &[("year", IndexKind::Ascending)])
        .unwrap();
    assert!(store.set_index(&books, "by_year").unwrap());
    assert_eq!(store.get_indexes(&books).unwrap().len(), 2);

    let found = store
        .get(&books, &Criteria::new().equals("year", 2001i64))
        .unwrap();
    let mut titles: Vec<&str> = found.iter().filter_map(|r| r.get("title")?.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["B", "C"]);

    // Re-creating an existing index is a no-op
    assert!(store.set_index(&books, "by_year").unwrap());
    assert_eq!(
        store
            .get_count(&books, &Criteria::new().equals("year", 1990i64))
            .unwrap(),
        2
    );
}

#[test]
fn test_kill_index_and_kill_table() {
    let mut store = store();
    let mut books = books();
    books
        .add_index("by_year", &[("year", IndexKind::Descending)])
        .unwrap();
    store.set_table(&books).unwrap();
    store
        .set(&books, Record::new().with("title", "A").with("year", 1999i64))
        .unwrap();

    let mut indexes = store.get_indexes(&books).unwrap();
    indexes.sort();
    let mut expected: Vec<String> = books
        .get_indexes()
        .iter()
        .map(|index| index_table_name("books", index))
        .collect();
    expected.sort();
    assert_eq!(indexes, expected);

    assert!(store.kill_index(&books, "by_year").unwrap());
    assert!(!store.kill_index(&books, "by_year").unwrap());
    assert_eq!(store.get_indexes(&books).unwrap().len(), 1);

    assert!(store.kill_table(&books).unwrap());
    assert!(!store.has_table(&books).unwrap());
    assert!(store.get_indexes(&books).unwrap().is_empty());
}

#[test]
fn test_other_tables_keep_their_indexes() {
    let mut store = store();
    let books = books();
    let mut archive = Table::new("books_archive").unwrap();
    archive
        .add_index("by_title", &[("title", IndexKind::Ascending)])
        .unwrap();
    store.set_table(&books).unwrap();
    store.set_table(&archive).unwrap();

    store.kill_table(&books).unwrap();
    assert!(store.has_table(&archive).unwrap());
    assert_eq!(store.get_indexes(&archive).unwrap().len(), 1);
}

#[test]
fn test_index_declared_after_documents_is_filled_on_first_query() {
    let mut store = store();
    let mut books = Table::new("books").unwrap();
    books.add_field("title", FieldType::String, None).unwrap();
    store.set_table(&books).unwrap();
    store
        .set(&books, Record::new().with("title", "Dune"))
        .unwrap();

    // Declared on the schema only; its table does not exist yet
    books
        .add_index("by_title", &[("title", IndexKind::Ascending)])
        .unwrap();

    let found = store
        .get(&books, &Criteria::new().equals("title", "Dune"))
        .unwrap();
    assert_eq!(found.row_count(), 1);
    assert_eq!(
        store
            .get_count(&books, &Criteria::new().equals("title", "Dune"))
            .unwrap(),
        1
    );
}

#[test]
fn test_set_table_fills_newly_declared_indexes() {
    let mut store = store();
    let mut books = books();
    store.set_table(&books).unwrap();
    store
        .set(&books, Record::new().with("title", "A").with("year", 2001i64))
        .unwrap();

    books
        .add_index("by_year", &[("year", IndexKind::Ascending)])
        .unwrap();
    store.set_table(&books).unwrap();

    let index_table = index_table_name("books", books.get_index("by_year").unwrap());
    let count_sql = format!("SELECT COUNT(*) FROM \"{}\"", index_table);
    assert_eq!(raw_count(&store, &count_sql), 1);
}

#[test]
fn test_indexes_over_the_same_fields_share_a_table() {
    let mut store = store();
    let mut accounts = Table::new("accounts").unwrap();
    accounts
        .add_field("email", FieldType::String, None)
        .unwrap()
        .set_unique(true);
    accounts
        .add_index("a", &[("email", IndexKind::Ascending)])
        .unwrap();
    accounts
        .add_index("b", &[("email", IndexKind::Descending)])
        .unwrap();
    store.set_table(&accounts).unwrap();
    assert_eq!(store.get_indexes(&accounts).unwrap().len(), 1);

    store
        .set(&accounts, Record::new().with("email", "a@x"))
        .unwrap();
    let err = store
        .set(&accounts, Record::new().with("email", "a@x"))
        .unwrap_err();
    assert!(matches!(err, DbError::Duplicate(_)));

    // "a" still reads from the shared table
    assert!(store.kill_index(&accounts, "b").unwrap());
    assert_eq!(store.get_indexes(&accounts).unwrap().len(), 1);
    let found = store
        .get(&accounts, &Criteria::new().equals("email", "a@x"))
        .unwrap();
    assert_eq!(found.row_count(), 1);
}

#[test]
fn test_non_unique_indexes_over_the_same_fields() {
    let mut store = store();
    let mut users = Table::new("users").unwrap();
    users
        .add_index("by_email", &[("email", IndexKind::Ascending)])
        .unwrap();
    users
        .add_index("by_email_desc", &[("email", IndexKind::Descending)])
        .unwrap();
    store.set_table(&users).unwrap();

    let saved = store
        .set(&users, Record::new().with("email", "a@x"))
        .unwrap();
    store
        .set(&users, Record::new().with("email", "b@x"))
        .unwrap();
    store.set(&users, saved.with("email", "c@x")).unwrap();

    let index_table = index_table_name("users", users.get_index("by_email").unwrap());
    let count_sql = format!("SELECT COUNT(*) FROM \"{}\"", index_table);
    assert_eq!(raw_count(&store, &count_sql), 2);
}

#[test]
fn test_has_more_counts_rows_before_healing() {
    let mut store = store();
    let mut books = books();
    books
        .add_index("by_year", &[("year", IndexKind::Ascending)])
        .unwrap();
    store.set_table(&books).unwrap();
    for (title, year) in [("A", 1i64), ("B", 2), ("C", 3)] {
        store
            .set(&books, Record::new().with("title", title).with("year", year))
            .unwrap();
    }

    let index_table = index_table_name("books", books.get_index("by_year").unwrap());
    store
        .backend()
        .driver()
        .unwrap()
        .connection()
        .execute(
            &format!("INSERT INTO \"{}\" (\"year\", \"_id\") VALUES (0, 'ghost')", index_table),
            [],
        )
        .unwrap();

    let page = store
        .get(
            &books,
            &Criteria::new().greater_than_or_equal("year", 0i64).limit(2),
        )
        .unwrap();
    let titles: Vec<&str> = page.iter().filter_map(|r| r.get("title")?.as_str()).collect();
    assert_eq!(titles, vec!["A", "B"]);
    assert!(page.has_more());

    let count_sql = format!("SELECT COUNT(*) FROM \"{}\"", index_table);
    assert_eq!(raw_count(&store, &count_sql), 3);
}

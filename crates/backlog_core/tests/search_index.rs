use backlog_core::db::migrations::{current_user_version, latest_version};
use backlog_core::{build_index, search_items, BacklogPaths, SearchQuery};
use std::fs;

fn seeded_paths() -> (tempfile::TempDir, BacklogPaths) {
    let dir = tempfile::tempdir().unwrap();
    let paths = BacklogPaths::new(dir.path());
    fs::create_dir_all(paths.data_dir()).unwrap();
    fs::create_dir_all(paths.items_dir()).unwrap();
    fs::write(
        paths.backlog_csv(),
        "id,title,status,priority\n\
         BACKLOG-001,Fix login redirect,Pending,High\n\
         BACKLOG-002,Offline sync,Completed,Low\n",
    )
    .unwrap();
    fs::write(
        paths.item_file("BACKLOG-002"),
        "# BACKLOG-002: Offline sync\n\n## Description\nQueue writes while the tunnel is down.\n",
    )
    .unwrap();
    (dir, paths)
}

#[test]
fn index_covers_markdown_descriptions() {
    let (_dir, paths) = seeded_paths();
    let conn = build_index(&paths).unwrap();
    assert_eq!(current_user_version(&conn).unwrap(), latest_version());

    let hits = search_items(&conn, &SearchQuery::new("tunnel")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "BACKLOG-002");
    assert!(hits[0].snippet.contains("[tunnel]"));
}

#[test]
fn all_terms_must_match() {
    let (_dir, paths) = seeded_paths();
    let conn = build_index(&paths).unwrap();
    assert_eq!(search_items(&conn, &SearchQuery::new("login fix")).unwrap().len(), 1);
    assert!(search_items(&conn, &SearchQuery::new("login tunnel")).unwrap().is_empty());
    assert!(search_items(&conn, &SearchQuery::new("   ")).unwrap().is_empty());
}

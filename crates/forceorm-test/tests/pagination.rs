//! Integration tests for pagination draining, endpoint selection, chunked
//! reads, and counts against the mock transport.

use std::sync::Arc;

use forceorm_core::{ForceError, Settings};
use forceorm_db::transport::{QueryPage, TransportResponse};
use forceorm_db::{ObjectQuery, Value};
use forceorm_test::fixtures::{self, account_meta, opportunity_meta};
use forceorm_test::mock_transport::MOCK_INSTANCE_URL;
use forceorm_test::{assert_num_queries, record, CallKind, MockTransport};
use serde_json::json;

// ── Helpers ─────────────────────────────────────────────────────────

fn account(id: &str) -> forceorm_db::RawRecord {
    record("Account", json!({"Id": id, "Name": format!("Account {id}")}))
}

fn ids(rows: &[forceorm_db::RawRecord]) -> Vec<&str> {
    rows.iter().filter_map(|r| r["Id"].as_str()).collect()
}

// ═════════════════════════════════════════════════════════════════════
// 1. Draining
// ═════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_two_pages_drain_in_order_with_two_calls() {
    let mock = Arc::new(
        MockTransport::new()
            .on_query(
                "FROM Account",
                QueryPage::with_cursor(vec![account("a"), account("b")], "/next1"),
            )
            .on_follow_up("/next1", QueryPage::last(vec![account("c")])),
    );
    let conn = fixtures::connection(Arc::clone(&mock));

    let rows = conn.table("Account").run().await.unwrap();

    assert_eq!(ids(&rows), vec!["a", "b", "c"]);
    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].kind, CallKind::Query);
    assert_eq!(calls[0].target, "SELECT Id FROM Account");
    assert_eq!(calls[1].kind, CallKind::Request(http::Method::GET));
    assert_eq!(calls[1].target, format!("{MOCK_INSTANCE_URL}/next1"));
}

#[tokio::test]
async fn test_single_terminal_page_makes_one_call() {
    let mock = Arc::new(MockTransport::new().respond("FROM Account", vec![vec![account("a")]]));
    let conn = fixtures::connection(Arc::clone(&mock));

    assert_num_queries(&mock, 1, || async {
        let rows = conn.table("Account").run().await.unwrap();
        assert_eq!(rows.len(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_many_pages_follow_generated_cursors() {
    let pages = (0..5)
        .map(|page| vec![account(&format!("p{page}a")), account(&format!("p{page}b"))])
        .collect();
    let mock = Arc::new(MockTransport::new().respond("FROM Account", pages));
    let conn = fixtures::connection(Arc::clone(&mock));

    let rows = conn.table("Account").run().await.unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(ids(&rows)[..3], ["p0a", "p0b", "p1a"]);
    assert_eq!(mock.call_count(), 5);
}

#[tokio::test]
async fn test_follow_up_failure_aborts_drain() {
    let mock = Arc::new(
        MockTransport::new()
            .on_query(
                "FROM Account",
                QueryPage::with_cursor(vec![account("a")], "/next1"),
            )
            .on_follow_up_response(
                "/next1",
                TransportResponse {
                    status: http::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "[{\"errorCode\":\"QUERY_TIMEOUT\"}]".to_string(),
                },
            ),
    );
    let conn = fixtures::connection(Arc::clone(&mock));

    let err = conn.table("Account").run().await.unwrap_err();
    assert!(matches!(err, ForceError::TransportFailure(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_initial_failure_is_propagated() {
    let mock = Arc::new(MockTransport::new().fail_on("FROM Account", "session expired"));
    let conn = fixtures::connection(Arc::clone(&mock));

    let err = conn.table("Account").run().await.unwrap_err();
    assert_eq!(err, ForceError::TransportFailure("session expired".to_string()));
}

#[tokio::test]
async fn test_open_page_without_cursor_is_malformed() {
    let mock = Arc::new(MockTransport::new().on_query(
        "FROM Account",
        QueryPage {
            records: vec![account("a")],
            done: false,
            next_records_url: None,
            total_size: None,
        },
    ));
    let conn = fixtures::connection(Arc::clone(&mock));

    let err = conn.table("Account").run().await.unwrap_err();
    assert!(matches!(err, ForceError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_unparsable_follow_up_body_is_malformed() {
    let mock = Arc::new(
        MockTransport::new()
            .on_query("FROM Account", QueryPage::with_cursor(Vec::new(), "/next1"))
            .on_follow_up_response("/next1", TransportResponse::ok("<html>maintenance</html>")),
    );
    let conn = fixtures::connection(Arc::clone(&mock));

    let err = conn.table("Account").run().await.unwrap_err();
    assert!(matches!(err, ForceError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_page_guard_stops_endless_cursors() {
    let pages = (0..4).map(|i| vec![account(&i.to_string())]).collect();
    let mock = Arc::new(MockTransport::new().respond("FROM Account", pages));
    let settings = Settings {
        max_pages: 2,
        ..Settings::default()
    };
    let conn = fixtures::connection_with(Arc::clone(&mock), settings);

    let err = conn.table("Account").run().await.unwrap_err();
    assert_eq!(err, ForceError::PaginationLimitExceeded(2));
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_first_page_only() {
    let mock = Arc::new(MockTransport::new().respond(
        "FROM Account",
        vec![vec![account("a")], vec![account("b")]],
    ));
    let conn = fixtures::connection(Arc::clone(&mock));

    let page = conn.table("Account").run_first_page().await.unwrap();
    assert!(!page.done);
    assert_eq!(page.records.len(), 1);
    assert_eq!(mock.call_count(), 1);
}

// ═════════════════════════════════════════════════════════════════════
// 2. Endpoint selection
// ═════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_archive_marker_routes_to_query_all() {
    let mock = Arc::new(MockTransport::new());
    let conn = fixtures::connection(Arc::clone(&mock));

    conn.table("Account")
        .where_eq("IsDeleted", true)
        .run()
        .await
        .unwrap();
    conn.table("Account")
        .where_eq("Name", "Acme")
        .run()
        .await
        .unwrap();

    let calls = mock.calls();
    assert_eq!(calls[0].kind, CallKind::QueryAll);
    assert_eq!(calls[0].target, "SELECT Id FROM Account WHERE IsDeleted = true");
    assert_eq!(calls[1].kind, CallKind::Query);
}

#[tokio::test]
async fn test_marker_inside_nested_group_keeps_standard_endpoint() {
    let mock = Arc::new(MockTransport::new());
    let conn = fixtures::connection(Arc::clone(&mock));

    conn.table("Account")
        .where_nested(|q| q.where_eq("IsDeleted", false))
        .run()
        .await
        .unwrap();

    assert_eq!(mock.calls()[0].kind, CallKind::Query);
}

#[tokio::test]
async fn test_custom_marker_fields() {
    let mock = Arc::new(MockTransport::new());
    let settings = Settings {
        archive_marker_fields: vec!["IsRecycled".to_string()],
        ..Settings::default()
    };
    let conn = fixtures::connection_with(Arc::clone(&mock), settings);

    let query = conn.table("Account").where_eq("IsRecycled", true);
    assert!(query.is_query_all());
    assert!(!conn.table("Account").where_eq("IsDeleted", true).is_query_all());
}

// ═════════════════════════════════════════════════════════════════════
// 3. Object queries: hydration, chunks, counts
// ═════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_get_selects_schema_fields_and_hydrates() {
    let mock = Arc::new(MockTransport::new().respond(
        "FROM Account",
        vec![vec![record(
            "Account",
            json!({
                "Id": "001A",
                "Name": "Acme",
                "AnnualRevenue": 1_500_000,
                "IsDeleted": false,
                "CreatedDate": "2024-01-15T10:30:00.000+0000",
                "Unknown__c": "dropped",
            }),
        )]],
    ));
    let conn = fixtures::connection(Arc::clone(&mock));

    let records = ObjectQuery::new(&conn, account_meta())
        .where_eq("Industry", "Energy")
        .get()
        .await
        .unwrap();

    assert_eq!(
        mock.queries()[0],
        "SELECT Id, Name, OwnerId, Industry, AnnualRevenue, IsDeleted, CreatedDate \
         FROM Account WHERE Industry = 'Energy'"
    );
    let acme = &records[0];
    assert_eq!(acme.object(), "Account");
    assert_eq!(acme.get_as::<String>("Name").unwrap(), "Acme");
    assert_eq!(acme.get_as::<i64>("AnnualRevenue").unwrap(), 1_500_000);
    assert_eq!(acme.value("IsDeleted"), &Value::Bool(false));
    assert!(matches!(acme.value("CreatedDate"), Value::DateTimeTz(_)));
    assert!(acme.get("Unknown__c").is_none());
}

#[tokio::test]
async fn test_explicit_selection_is_kept() {
    let mock = Arc::new(MockTransport::new());
    let conn = fixtures::connection(Arc::clone(&mock));

    ObjectQuery::new(&conn, account_meta())
        .select(["Id", "Name"])
        .get()
        .await
        .unwrap();

    assert_eq!(mock.queries()[0], "SELECT Id, Name FROM Account");
}

#[tokio::test]
async fn test_get_raw_strips_envelope() {
    let mock = Arc::new(MockTransport::new().respond("FROM Account", vec![vec![account("a")]]));
    let conn = fixtures::connection(Arc::clone(&mock));

    let rows = ObjectQuery::new(&conn, account_meta()).get_raw().await.unwrap();
    assert!(!rows[0].contains_key("attributes"));
    assert_eq!(rows[0]["Id"], "a");
}

#[tokio::test]
async fn test_first_and_find() {
    let mock = Arc::new(MockTransport::new().respond("FROM Account", vec![vec![account("001A")]]));
    let conn = fixtures::connection(Arc::clone(&mock));
    let query = ObjectQuery::new(&conn, account_meta()).select(["Id"]);

    let first = query.first().await.unwrap().unwrap();
    assert_eq!(first.key("Id").as_deref(), Some("001A"));
    let found = query.find("001A").await.unwrap();
    assert!(found.is_some());

    let queries = mock.queries();
    assert_eq!(queries[0], "SELECT Id FROM Account LIMIT 1");
    assert_eq!(queries[1], "SELECT Id FROM Account WHERE Id = '001A' LIMIT 1");
}

#[tokio::test]
async fn test_first_of_nothing_is_none() {
    let mock = Arc::new(MockTransport::new());
    let conn = fixtures::connection(Arc::clone(&mock));

    let first = ObjectQuery::new(&conn, account_meta()).first().await.unwrap();
    assert!(first.is_none());
}

#[tokio::test]
async fn test_chunk_hands_over_each_page() {
    let pages = (0..3)
        .map(|page| vec![account(&format!("{page}a")), account(&format!("{page}b"))])
        .collect();
    let mock = Arc::new(MockTransport::new().respond("FROM Account", pages));
    let conn = fixtures::connection(Arc::clone(&mock));

    let mut sizes = Vec::new();
    let pages = ObjectQuery::new(&conn, account_meta())
        .chunk(|records| {
            sizes.push(records.len());
            true
        })
        .await
        .unwrap();

    assert_eq!(pages, 3);
    assert_eq!(sizes, vec![2, 2, 2]);
}

#[tokio::test]
async fn test_chunk_stops_when_consumer_declines() {
    let pages = (0..3).map(|page| vec![account(&page.to_string())]).collect();
    let mock = Arc::new(MockTransport::new().respond("FROM Account", pages));
    let conn = fixtures::connection(Arc::clone(&mock));

    let pages = conn.table("Account").run_chunked(|_| false).await.unwrap();

    assert_eq!(pages, 1);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_count_uses_total_size() {
    let mock = Arc::new(MockTransport::new().on_query(
        "SELECT COUNT() FROM Account",
        QueryPage {
            records: Vec::new(),
            done: true,
            next_records_url: None,
            total_size: Some(42),
        },
    ));
    let conn = fixtures::connection(Arc::clone(&mock));

    let count = ObjectQuery::new(&conn, account_meta())
        .where_eq("Industry", "Energy")
        .order_by("Name")
        .count()
        .await
        .unwrap();

    assert_eq!(count, 42);
    assert_eq!(
        mock.queries(),
        vec!["SELECT COUNT() FROM Account WHERE Industry = 'Energy'".to_string()]
    );
}

#[tokio::test]
async fn test_count_formats_literals_like_get() {
    let mock = Arc::new(MockTransport::new());
    let conn = fixtures::connection(Arc::clone(&mock));
    let query = ObjectQuery::new(&conn, opportunity_meta())
        .where_eq("CloseDate", "2024-01-01")
        .where_eq("IsWon", "true");

    query.get().await.unwrap();
    assert_eq!(query.count().await.unwrap(), 0);

    let queries = mock.queries();
    assert!(queries[0].ends_with("FROM Opportunity WHERE CloseDate = 2024-01-01 AND IsWon = true"));
    assert_eq!(
        queries[1],
        "SELECT COUNT() FROM Opportunity WHERE CloseDate = 2024-01-01 AND IsWon = true"
    );
}

#[tokio::test]
async fn test_paginate_detects_following_page() {
    let mock = Arc::new(MockTransport::new().respond(
        "LIMIT 3 OFFSET 2",
        vec![vec![account("c"), account("d"), account("e")]],
    ));
    let conn = fixtures::connection(Arc::clone(&mock));

    let page = ObjectQuery::new(&conn, account_meta())
        .select(["Id"])
        .order_by("Name")
        .paginate(2, 2)
        .await
        .unwrap();

    assert_eq!(page.page, 2);
    assert_eq!(page.per_page, 2);
    assert!(page.has_more);
    let ids: Vec<String> = page.items.iter().filter_map(|r| r.key("Id")).collect();
    assert_eq!(ids, vec!["c", "d"]);
    assert_eq!(
        mock.queries(),
        vec!["SELECT Id FROM Account ORDER BY Name ASC LIMIT 3 OFFSET 2".to_string()]
    );
}

#[tokio::test]
async fn test_paginate_last_page() {
    let mock = Arc::new(
        MockTransport::new().respond("LIMIT 3 OFFSET 4", vec![vec![account("e")]]),
    );
    let conn = fixtures::connection(Arc::clone(&mock));

    let page = ObjectQuery::new(&conn, account_meta())
        .select(["Id"])
        .paginate(2, 3)
        .await
        .unwrap();

    assert!(!page.has_more);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.page, 3);
}

#[tokio::test]
async fn test_paginate_page_zero_reads_first_page() {
    let mock = Arc::new(MockTransport::new());
    let conn = fixtures::connection(Arc::clone(&mock));

    let page = ObjectQuery::new(&conn, account_meta())
        .select(["Id"])
        .paginate(10, 0)
        .await
        .unwrap();

    assert_eq!(page.page, 1);
    assert!(page.items.is_empty());
    assert!(!page.has_more);
    assert_eq!(mock.queries()[0], "SELECT Id FROM Account LIMIT 11 OFFSET 0");
}

#[tokio::test]
async fn test_unknown_object_schema_fails_before_querying() {
    static LEAD: std::sync::LazyLock<forceorm_db::ObjectMeta> =
        std::sync::LazyLock::new(|| forceorm_db::ObjectMeta::new("Lead", "Id"));

    let mock = Arc::new(MockTransport::new());
    let conn = fixtures::connection(Arc::clone(&mock));

    let err = ObjectQuery::new(&conn, &LEAD).get().await.unwrap_err();
    assert!(matches!(err, ForceError::SchemaUnavailable(_)));
    assert_eq!(mock.call_count(), 0);
}

//! End-to-end screening flows: source document through refresh to query answers

use chrono::{Duration, Utc};
use std::sync::Arc;
use watchlist_screening::config::SourceConfig;
use watchlist_screening::refresh::FailureKind;
use watchlist_screening::{
    CacheStore, FileSource, HttpSource, JsonFileBackend, Metrics, NameMatcher,
    RefreshCoordinator, RefreshOutcome, RefreshTrigger, ScreeningQuery, ScreeningResult,
    ScreeningService, StaticSource, UnConsolidatedParser, WatchlistRecord, WatchlistSource,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST_PAGE: &str = r#"<html>
<head><title>Consolidated List</title><style>td { padding: 2px; }</style></head>
<body>
<table>
<tr><td><b>Name:</b> 1: ABDUL 2: ROSYID 3: RIDHO 4: BA'ASYIR <b>Title:</b> na
    <b>Designation:</b> na <b>DOB:</b> 31 Jan. 1974 <b>POB:</b> Sukoharjo</td></tr>
<tr><td><b>Name:</b> 1: MUHAMMAD 2: HASSAN 3: AL-ZAIDI <b>Nationality:</b> Iraq</td></tr>
<tr><td><b>Name:</b> 1: OMAR 2: ABDUL 3: KHALIQ 4: SALEH</td></tr>
<tr><td><b>Name:</b> 1: JOS&#201; 2: GARC&#205;A 3: na 4: na</td></tr>
<tr><td><b>Name:</b> entry without numbered parts</td></tr>
<tr><td><b>Name:</b> 1: OMAR 2: ABDUL 3: KHALIQ 4: SALEH</td></tr>
</table>
</body>
</html>"#;

struct Node {
    store: Arc<CacheStore>,
    coordinator: Arc<RefreshCoordinator>,
    service: ScreeningService,
}

fn node(store: Arc<CacheStore>, source: Arc<dyn WatchlistSource>) -> Node {
    let metrics = Metrics::new().unwrap();
    let coordinator = Arc::new(RefreshCoordinator::new(
        store.clone(),
        source,
        Arc::new(UnConsolidatedParser::new()),
        metrics.clone(),
    ));
    let service = ScreeningService::new(
        store.clone(),
        Some(coordinator.clone()),
        NameMatcher::default(),
        metrics,
    );

    Node {
        store,
        coordinator,
        service,
    }
}

fn matched(result: &ScreeningResult) -> Vec<&str> {
    result.matches.iter().map(|m| m.name.as_str()).collect()
}

#[tokio::test]
async fn test_html_list_to_screening_answers() {
    let dir = tempfile::tempdir().unwrap();
    let page = dir.path().join("consolidated.htm");
    std::fs::write(&page, LIST_PAGE).unwrap();

    let node = node(
        Arc::new(CacheStore::in_memory(Duration::hours(24))),
        Arc::new(FileSource::new(&page)),
    );

    let report = node.coordinator.initialize().await.unwrap();
    match &report.outcome {
        RefreshOutcome::Swapped {
            record_count,
            source_version_tag,
        } => {
            // Malformed entry skipped, duplicate OMAR entry dropped
            assert_eq!(*record_count, 4);
            assert!(source_version_tag.starts_with("file://"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(node.service.cache_size(), 4);

    // ABDUL also occurs inside the OMAR entry, so both are reported in list order
    let result = node.service.check_sanctions(Some("Abdul Rosyid Ridho Ba'asyir"));
    assert_eq!(
        matched(&result),
        vec!["ABDUL ROSYID RIDHO BA'ASYIR", "OMAR ABDUL KHALIQ SALEH"]
    );

    let result = node.service.check_sanctions(Some("Jose Garcia"));
    assert_eq!(matched(&result), vec!["JOSÉ GARCÍA"]);

    // Name captured without spaces and out of order
    let result = node.service.screen(&ScreeningQuery::new("HASSANMUHAMMAD"));
    assert_eq!(matched(&result), vec!["MUHAMMAD HASSAN AL-ZAIDI"]);

    // Partial capture
    let result = node.service.check_sanctions(Some("KHALIQ ZZ"));
    assert_eq!(matched(&result), vec!["OMAR ABDUL KHALIQ SALEH"]);

    let result = node.service.check_sanctions(Some("Jane Roe"));
    assert_eq!(result, ScreeningResult::clear());
}

#[tokio::test]
async fn test_empty_cache_answers_clear() {
    let node = node(
        Arc::new(CacheStore::in_memory(Duration::hours(24))),
        Arc::new(StaticSource::new("static", "")),
    );

    let report = node.coordinator.initialize().await.unwrap();
    assert!(matches!(report.outcome, RefreshOutcome::SkippedEmpty { .. }));

    let result = node.service.check_sanctions(Some("JOHN DOE"));
    assert!(!result.is_sanctioned);
    assert!(result.matches.is_empty());
    assert!(node.service.cache_metadata().is_none());
}

#[tokio::test]
async fn test_outage_page_does_not_wipe_populated_cache() {
    let store = Arc::new(CacheStore::in_memory(Duration::hours(24)));
    let records: Vec<_> = (0..50)
        .map(|i| WatchlistRecord::new(format!("LISTED PERSON {}", i), Utc::now()))
        .collect();
    let before = store.replace(records, "seed", Utc::now()).unwrap();

    let source = Arc::new(StaticSource::new(
        "static",
        "<html><body>Service temporarily unavailable</body></html>",
    ));
    let node = node(store, source);

    let report = node.coordinator.refresh(RefreshTrigger::Scheduled).await;

    assert!(matches!(report.outcome, RefreshOutcome::SkippedEmpty { .. }));
    assert_eq!(node.service.cache_size(), 50);
    let after = node.service.cache_metadata().unwrap();
    assert_eq!(after, before);
    assert!(node.service.check_sanctions(Some("LISTED PERSON 7")).is_sanctioned);
}

#[tokio::test]
async fn test_persisted_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.json");
    let source = Arc::new(StaticSource::new("static", "Name: 1: JOHN 2: DOE Name: 1: JANE 2: ROE"));

    {
        let store = Arc::new(CacheStore::open(
            Box::new(JsonFileBackend::new(&snapshot)),
            Duration::hours(24),
        ));
        let first = node(store, source.clone());
        assert!(first.coordinator.initialize().await.unwrap().outcome.is_swapped());
    }

    // Restart with a source that would wipe the names if it were fetched
    source.set_text("Name: 1: MARY 2: MAJOR");
    let store = Arc::new(CacheStore::open(
        Box::new(JsonFileBackend::new(&snapshot)),
        Duration::hours(24),
    ));
    let second = node(store, source);

    assert!(second.coordinator.initialize().await.is_none());
    assert_eq!(second.service.cache_size(), 2);
    assert!(second.service.check_sanctions(Some("jane roe")).is_sanctioned);
    assert!(!second.service.check_sanctions(Some("mary major")).is_sanctioned);
}

#[tokio::test]
async fn test_stale_snapshot_is_refreshed_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("snapshot.json");

    {
        let store = CacheStore::open(Box::new(JsonFileBackend::new(&snapshot)), Duration::hours(24));
        store
            .replace(
                vec![WatchlistRecord::new("JOHN DOE", Utc::now())],
                "old",
                Utc::now() - Duration::hours(25),
            )
            .unwrap();
    }

    let store = Arc::new(CacheStore::open(
        Box::new(JsonFileBackend::new(&snapshot)),
        Duration::hours(24),
    ));
    assert!(!store.is_valid());

    let node = node(store, Arc::new(StaticSource::new("static", "Name: 1: MARY 2: MAJOR")));
    let report = node.coordinator.initialize().await.unwrap();

    assert!(report.outcome.is_swapped());
    assert!(node.store.is_valid());
    assert!(node.service.check_sanctions(Some("MARY MAJOR")).is_sanctioned);
    assert!(!node.service.check_sanctions(Some("JOHN DOE")).is_sanctioned);
}

#[tokio::test]
async fn test_unreachable_source_fails_open() {
    let node = node(
        Arc::new(CacheStore::in_memory(Duration::hours(24))),
        Arc::new(FileSource::new("/nonexistent/consolidated.htm")),
    );

    let report = node.coordinator.initialize().await.unwrap();

    assert!(matches!(report.outcome, RefreshOutcome::Failed { .. }));
    assert_eq!(node.service.check_sanctions(Some("JOHN DOE")), ScreeningResult::clear());
}

#[tokio::test]
async fn test_queries_during_refresh_see_whole_snapshots() {
    let store = Arc::new(CacheStore::in_memory(Duration::hours(24)));
    let source = Arc::new(StaticSource::new("static", "Name: 1: JOHN 2: DOE"));
    let node = Arc::new(node(store, source.clone()));
    node.coordinator.refresh(RefreshTrigger::Startup).await;

    let big: String = (0..500)
        .map(|i| format!("Name: 1: PERSON 2: NUMBER{} ", i))
        .collect();
    source.set_text(big);

    let reader = {
        let node = node.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let snapshot = node.store.snapshot();
                let meta = snapshot.metadata().unwrap();
                assert_eq!(meta.record_count, snapshot.len());
                tokio::task::yield_now().await;
            }
        })
    };

    node.coordinator.refresh(RefreshTrigger::Manual).await;
    reader.await.unwrap();

    assert_eq!(node.service.cache_size(), 500);
}

#[tokio::test]
async fn test_entity_encoded_names_match_plain_queries() {
    let dir = tempfile::tempdir().unwrap();
    let page = dir.path().join("consolidated.htm");
    std::fs::write(
        &page,
        "<tr><td><b>Name:</b> 1: JOS&#xC9; 2: PE&Ntilde;A</td></tr>\
         <tr><td><b>Name:</b> 1: HANS 2: M&Uuml;LLER</td></tr>",
    )
    .unwrap();

    let node = node(
        Arc::new(CacheStore::in_memory(Duration::hours(24))),
        Arc::new(FileSource::new(&page)),
    );
    assert!(node.coordinator.initialize().await.unwrap().outcome.is_swapped());

    let records = node.store.snapshot();
    let names: Vec<_> = records.records().iter().map(|r| r.normalized_name.as_str()).collect();
    assert_eq!(names, vec!["JOSEPENA", "HANSMULLER"]);

    let result = node.service.check_sanctions(Some("José Peña"));
    assert_eq!(matched(&result), vec!["JOSÉ PEÑA"]);

    let result = node.service.check_sanctions(Some("Mueller"));
    assert!(!result.is_sanctioned);
    let result = node.service.check_sanctions(Some("Muller"));
    assert_eq!(matched(&result), vec!["HANS MÜLLER"]);
}

#[tokio::test]
async fn test_http_outage_keeps_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consolidated.htm"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Arc::new(CacheStore::in_memory(Duration::hours(24)));
    let before = store
        .replace(vec![WatchlistRecord::new("JOHN DOE", Utc::now())], "seed", Utc::now())
        .unwrap();

    let config = SourceConfig {
        url: format!("{}/consolidated.htm", server.uri()),
        connect_timeout_secs: 5,
        read_timeout_secs: 5,
    };
    let node = node(store, Arc::new(HttpSource::new(&config).unwrap()));

    let report = node.coordinator.refresh(RefreshTrigger::Scheduled).await;

    assert!(matches!(
        report.outcome,
        RefreshOutcome::Failed {
            kind: FailureKind::Fetch,
            ..
        }
    ));
    assert_eq!(node.service.cache_metadata(), Some(before));
    assert!(node.service.check_sanctions(Some("JOHN DOE")).is_sanctioned);
}

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use ruc_harness::config::{FetchConfig, IngestConfig};
use ruc_harness::db;
use ruc_harness::error::FetchError;
use ruc_harness::fetch::http::{HttpPayload, HttpSource};
use ruc_harness::fetch::ArchiveFetcher;
use ruc_harness::migrate;
use ruc_harness::pipeline::Pipeline;
use ruc_harness::store::{InMemoryStore, RecordStore, SqliteStore};

const ORIGIN: &str = "http://registry.test";
const LISTING: &str = "http://registry.test/listing?maps=todos";

/// How the fake server answers one archive URL.
#[derive(Clone)]
enum Route {
    Zip(Vec<u8>),
    /// Transport failure on every attempt.
    Down,
    /// Bytes that are not a zip archive on every attempt.
    Garbage,
    /// Transport failures for the first `n` attempts, then the archive.
    FlakyThen(u32, Vec<u8>),
    /// Garbage for the first `n` attempts, then the archive.
    CorruptThen(u32, Vec<u8>),
}

struct FakeHttp {
    listing: Option<String>,
    routes: Mutex<HashMap<String, Route>>,
    hits: Mutex<HashMap<String, u32>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeHttp {
    fn new(listing: Option<String>) -> Self {
        Self {
            listing,
            routes: Mutex::new(HashMap::new()),
            hits: Mutex::new(HashMap::new()),
            gate: None,
        }
    }

    fn route(self, url: &str, route: Route) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), route);
        self
    }

    fn set_route(&self, url: &str, route: Route) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }

    fn hits(&self, url: &str) -> u32 {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HttpSource for FakeHttp {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        self.listing.clone().ok_or_else(|| FetchError::Transport {
            url: url.to_string(),
            message: "connection refused".to_string(),
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<HttpPayload, FetchError> {
        let attempt = {
            let mut hits = self.hits.lock().unwrap();
            let n = hits.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let route = self.routes.lock().unwrap().get(url).cloned();
        let refused = || FetchError::Transport {
            url: url.to_string(),
            message: "HTTP 503 Service Unavailable".to_string(),
        };
        let garbage = HttpPayload {
            content_type: Some("text/html".to_string()),
            bytes: b"<html>maintenance</html>".to_vec(),
        };
        let zip = |bytes: Vec<u8>| HttpPayload {
            content_type: Some("application/zip".to_string()),
            bytes,
        };

        match route {
            None | Some(Route::Down) => Err(refused()),
            Some(Route::Zip(bytes)) => Ok(zip(bytes)),
            Some(Route::Garbage) => Ok(garbage),
            Some(Route::FlakyThen(n, bytes)) if attempt > n => Ok(zip(bytes)),
            Some(Route::FlakyThen(..)) => Err(refused()),
            Some(Route::CorruptThen(n, bytes)) if attempt > n => Ok(zip(bytes)),
            Some(Route::CorruptThen(..)) => Ok(garbage),
        }
    }
}

fn archive_url(id: u8) -> String {
    format!("{}/files/ruc{}.zip", ORIGIN, id)
}

fn listing_for(ids: &[u8]) -> String {
    let mut html = String::from("<html><body><ul>");
    for id in ids {
        html.push_str(&format!(
            r#"<li><a class="button-download" href="/files/ruc{}.zip">RUC {}</a></li>"#,
            id, id
        ));
    }
    html.push_str("</ul></body></html>");
    html
}

fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// One record per source: tax id `<id>00<id>`.
fn source_zip(id: u8, status: &str) -> Vec<u8> {
    let name = format!("ruc{}.txt", id);
    let body = format!("{}00{}|Taxpayer {}|{}|{}|{}|\n", id, id, id, id, id, status);
    zip_bytes(&[(&name, &body)])
}

fn fetch_config(root: &Path) -> FetchConfig {
    FetchConfig {
        listing_url: LISTING.to_string(),
        base_origin: ORIGIN.to_string(),
        download_dir: root.join("downloads"),
        extract_dir: root.join("extracted"),
        retry_delay_secs: 0,
        ..FetchConfig::default()
    }
}

fn pipeline(root: &Path, http: Arc<FakeHttp>, store: Arc<dyn RecordStore>) -> Pipeline {
    let fetcher = ArchiveFetcher::new(http, fetch_config(root));
    Pipeline::new(fetcher, store, IngestConfig::default())
}

fn all_sources(status: &str) -> FakeHttp {
    let mut http = FakeHttp::new(Some(listing_for(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9])));
    for id in 0..10 {
        http = http.route(&archive_url(id), Route::Zip(source_zip(id, status)));
    }
    http
}

#[tokio::test]
async fn test_full_run_loads_every_source() {
    let tmp = TempDir::new().unwrap();
    let http = Arc::new(all_sources("ACTIVO"));
    let store = Arc::new(InMemoryStore::new());

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.attempted, 10);
    assert_eq!(summary.succeeded.len(), 10);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.records.processed, 10);
    assert_eq!(summary.records.errors, 0);
    assert_eq!(store.len(), 10);

    let r = store.find_by_key("7007").await.unwrap().unwrap();
    assert_eq!(r.source_id, "ruc7");
    assert_eq!(r.prior_tax_id.as_deref(), Some("7"));
    assert_eq!(r.status, "ACTIVO");

    assert!(tmp.path().join("downloads").join("ruc7.zip").exists());
    assert!(tmp.path().join("extracted").join("ruc7").join("ruc7.txt").exists());

    let syncs = store.list_syncs().await.unwrap();
    assert_eq!(syncs.len(), 10);
    assert_eq!(syncs[3].source_id, "ruc3");
    assert_eq!(syncs[3].archive_url, archive_url(3));
    assert_eq!(syncs[3].archive_sha256.len(), 64);
}

#[tokio::test]
async fn test_failing_source_does_not_block_others() {
    let tmp = TempDir::new().unwrap();
    let http = all_sources("ACTIVO");
    http.set_route(&archive_url(4), Route::Down);
    let http = Arc::new(http);
    let store = Arc::new(InMemoryStore::new());

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.failed, vec!["4".to_string()]);
    assert_eq!(summary.succeeded.len(), 9);
    assert_eq!(summary.records.processed, 9);
    assert_eq!(http.hits(&archive_url(4)), 3);
    assert_eq!(http.hits(&archive_url(5)), 1);
    assert!(store.find_by_key("4004").await.unwrap().is_none());
    assert!(store.find_by_key("9009").await.unwrap().is_some());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let tmp = TempDir::new().unwrap();
    let http = Arc::new(
        FakeHttp::new(Some(listing_for(&[2])))
            .route(&archive_url(2), Route::FlakyThen(2, source_zip(2, "ACTIVO"))),
    );
    let store = Arc::new(InMemoryStore::new());

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.succeeded, vec!["2".to_string()]);
    assert_eq!(http.hits(&archive_url(2)), 3);
    assert!(store.find_by_key("2002").await.unwrap().is_some());
}

#[tokio::test]
async fn test_invalid_archive_is_deleted_and_retried() {
    let tmp = TempDir::new().unwrap();
    let http = Arc::new(
        FakeHttp::new(Some(listing_for(&[1, 6])))
            .route(&archive_url(1), Route::CorruptThen(1, source_zip(1, "ACTIVO")))
            .route(&archive_url(6), Route::Garbage),
    );
    let store = Arc::new(InMemoryStore::new());

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.succeeded, vec!["1".to_string()]);
    assert_eq!(summary.failed, vec!["6".to_string()]);
    assert_eq!(http.hits(&archive_url(1)), 2);
    assert_eq!(http.hits(&archive_url(6)), 3);
    assert!(tmp.path().join("downloads").join("ruc1.zip").exists());
    assert!(!tmp.path().join("downloads").join("ruc6.zip").exists());
    assert!(!tmp.path().join("extracted").join("ruc6").exists());
}

#[tokio::test]
async fn test_unreachable_listing_falls_back_to_patterns() {
    let tmp = TempDir::new().unwrap();
    let mut http = FakeHttp::new(None);
    for id in 0..10 {
        let url = format!("{}/docs/ruc{}.zip", ORIGIN, id);
        http = http.route(&url, Route::Zip(source_zip(id, "ACTIVO")));
    }
    let http = Arc::new(http);
    let store = Arc::new(InMemoryStore::new());

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.attempted, 10);
    assert_eq!(summary.succeeded.len(), 10);
    assert_eq!(store.len(), 10);
    // Only the first pattern per source survives deduplication.
    assert_eq!(http.hits(&format!("{}/listing/files/ruc0.zip", ORIGIN)), 0);
}

#[tokio::test]
async fn test_listing_without_archive_links_falls_back() {
    let tmp = TempDir::new().unwrap();
    let http = Arc::new(
        FakeHttp::new(Some("<html><a href=\"/about\">About</a></html>".to_string())).route(
            &format!("{}/docs/ruc3.zip", ORIGIN),
            Route::Zip(source_zip(3, "ACTIVO")),
        ),
    );
    let store = Arc::new(InMemoryStore::new());

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.attempted, 10);
    assert_eq!(summary.succeeded, vec!["3".to_string()]);
    assert_eq!(summary.failed.len(), 9);
}

#[tokio::test]
async fn test_partial_discovery_does_not_trigger_fallback() {
    // Fallback only activates on zero candidates: a listing that names two
    // archives yields a run over exactly those two sources.
    let tmp = TempDir::new().unwrap();
    let http = Arc::new(
        FakeHttp::new(Some(listing_for(&[5, 8])))
            .route(&archive_url(5), Route::Zip(source_zip(5, "ACTIVO")))
            .route(&archive_url(8), Route::Zip(source_zip(8, "ACTIVO"))),
    );
    let store = Arc::new(InMemoryStore::new());

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.succeeded, vec!["5".to_string(), "8".to_string()]);
    assert_eq!(http.hits(&format!("{}/docs/ruc0.zip", ORIGIN)), 0);
}

#[tokio::test]
async fn test_duplicate_links_download_once() {
    let tmp = TempDir::new().unwrap();
    let html = r#"<a href="/files/ruc7.zip">a</a><a href="/mirror/ruc7.zip">b</a><a href="/files/ruc3.zip">c</a>"#
        .to_string();
    let http = Arc::new(
        FakeHttp::new(Some(html))
            .route(&archive_url(7), Route::Zip(source_zip(7, "ACTIVO")))
            .route(&archive_url(3), Route::Zip(source_zip(3, "ACTIVO"))),
    );
    let store = Arc::new(InMemoryStore::new());

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.attempted, 2);
    assert_eq!(http.hits(&archive_url(7)), 1);
    assert_eq!(http.hits(&format!("{}/mirror/ruc7.zip", ORIGIN)), 0);
}

#[tokio::test]
async fn test_repeated_runs_converge_in_sqlite() {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("ruc.sqlite")).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));

    let http = Arc::new(all_sources("ACTIVO"));
    let p = pipeline(tmp.path(), http.clone(), store.clone());

    p.run_once().await;
    let first = store.find_all(100, 0).await.unwrap();
    p.run_once().await;
    let second = store.find_all(100, 0).await.unwrap();

    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_status_change_updates_single_row() {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("ruc.sqlite")).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));

    let http = Arc::new(all_sources("ACTIVO"));
    let p = pipeline(tmp.path(), http.clone(), store.clone());
    p.run_once().await;

    http.set_route(&archive_url(2), Route::Zip(source_zip(2, "CANCELADO")));
    p.run_once().await;

    let all = store.find_all(100, 0).await.unwrap();
    assert_eq!(all.len(), 10);
    let rows: Vec<_> = all.iter().filter(|r| r.tax_id == "2002").collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "CANCELADO");
}

#[tokio::test]
async fn test_overlapping_trigger_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let mut http = FakeHttp::new(Some(listing_for(&[1])))
        .route(&archive_url(1), Route::Zip(source_zip(1, "ACTIVO")));
    http.gate = Some((entered.clone(), release.clone()));
    let http = Arc::new(http);
    let store = Arc::new(InMemoryStore::new());

    let p = Arc::new(pipeline(tmp.path(), http.clone(), store.clone()));
    let running = {
        let p = p.clone();
        tokio::spawn(async move { p.try_run_once().await })
    };

    // First run is now parked inside discovery, holding the guard.
    entered.notified().await;
    assert!(p.try_run_once().await.is_none());

    release.notify_one();
    let first = running.await.unwrap().expect("first run completes");
    assert_eq!(first.succeeded, vec!["1".to_string()]);
    assert_eq!(http.hits(&archive_url(1)), 1);
}

#[tokio::test]
async fn test_fetch_all_reports_extracted_and_failed() {
    let tmp = TempDir::new().unwrap();
    let http = Arc::new(
        FakeHttp::new(Some(listing_for(&[0, 9])))
            .route(&archive_url(0), Route::Zip(source_zip(0, "ACTIVO")))
            .route(&archive_url(9), Route::Down),
    );
    let fetcher = ArchiveFetcher::new(http.clone(), fetch_config(tmp.path()));

    let report = fetcher.fetch_all().await;

    assert_eq!(report.failed, vec!["9".to_string()]);
    assert_eq!(report.extracted.len(), 1);
    let x = &report.extracted[0];
    assert_eq!(x.source_id, "0");
    assert_eq!(x.dir, tmp.path().join("extracted").join("ruc0"));
    assert_eq!(x.archive_path, tmp.path().join("downloads").join("ruc0.zip"));
    assert_eq!(x.archive_bytes, source_zip(0, "ACTIVO").len() as u64);
    assert!(x.dir.join("ruc0.txt").exists());
}

#[tokio::test]
async fn test_write_failure_aborts_only_that_source() {
    let tmp = TempDir::new().unwrap();
    let http = all_sources("ACTIVO");
    http.set_route(
        &archive_url(3),
        Route::Zip(zip_bytes(&[
            ("a.txt", "3101|First|1|31|ACTIVO|\n3102|Second|2|32|ACTIVO|\n"),
            ("b.txt", "3201|Third|1|33|ACTIVO|\n"),
        ])),
    );
    let http = Arc::new(http);
    let store = Arc::new(InMemoryStore::new());
    // a.txt commits, b.txt's batch fails
    store.fail_source_after("ruc3", 1);

    let summary = pipeline(tmp.path(), http.clone(), store.clone()).run_once().await;

    assert_eq!(summary.failed, vec!["3".to_string()]);
    assert_eq!(summary.succeeded.len(), 9);
    assert!(!summary.succeeded.contains(&"3".to_string()));
    assert_eq!(summary.records.processed, 9 + 2);

    assert!(store.find_by_key("3101").await.unwrap().is_some());
    assert!(store.find_by_key("3102").await.unwrap().is_some());
    assert!(store.find_by_key("3201").await.unwrap().is_none());
    assert!(store.find_by_key("4004").await.unwrap().is_some());

    let syncs = store.list_syncs().await.unwrap();
    assert_eq!(syncs.len(), 9);
    assert!(syncs.iter().all(|s| s.source_id != "ruc3"));
}

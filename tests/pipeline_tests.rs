//! Integration tests for the scrape pipeline
//!
//! These tests run the real runner and fetch client against wiremock
//! servers standing in for the back-office and the remote sink, covering
//! the gate decision, deep extraction, auth recovery and spool fallback
//! end-to-end.

use digiscrape::auth::session::AuthMode;
use digiscrape::config::{AuthConfig, BackofficeConfig, Config, ScraperConfig, StorageConfig};
use digiscrape::fetch::client::FetchClient;
use digiscrape::run::control::RunLimits;
use digiscrape::run::runner::{Runner, RunnerOptions};
use digiscrape::state::{ProgressStatus, StateLedger};
use digiscrape::store::{SaleRecord, SpoolManager};
use digiscrape::FetchError;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const STATIC_COOKIE: &str = "DigifactoryBO=static-token";

fn test_config(backoffice_url: &str, sink_url: Option<&str>, data_dir: &Path) -> Config {
    Config {
        backoffice: BackofficeConfig {
            base_url: backoffice_url.to_string(),
            login_path: "/digi/com/login".to_string(),
            session_cookie_name: "DigifactoryBO".to_string(),
            username: Some("scraper".to_string()),
            password: Some("secret".to_string()),
            session_cookie: Some(STATIC_COOKIE.to_string()),
        },
        scraper: ScraperConfig {
            concurrency: 4,
            batch_size: 100,
            chunk_size: 100,
            rate_per_domain: 0.0, // no pacing in tests
            timeout_secs: 5,
            max_retries: 2,
            explorer_max_links: 200,
            max_html_bytes: 1_500_000,
        },
        auth: AuthConfig::default(),
        storage: StorageConfig {
            data_dir: data_dir.to_path_buf(),
            sink_url: sink_url.map(String::from),
            sink_key: sink_url.map(|_| "test-key".to_string()),
            runs_table: "cto_runs".to_string(),
            pages_table: "cto_pages".to_string(),
            errors_table: "cto_errors".to_string(),
        },
    }
}

fn runner_options(start: u32, end: u32) -> RunnerOptions {
    RunnerOptions {
        start,
        end,
        resume: false,
        dev_mode: false,
        dry_run: false,
        store_html: false,
        store_jsinfos: true,
        store_explorer: true,
        auth_mode: AuthMode::Default,
        limits: RunLimits::default(),
    }
}

/// Mounts a healthy sink: probe plus accepting upsert/insert endpoints.
async fn mount_sink(sink: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/cto_runs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(sink)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cto_runs"))
        .respond_with(ResponseTemplate::new(201))
        .mount(sink)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cto_pages"))
        .respond_with(ResponseTemplate::new(201))
        .mount(sink)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cto_errors"))
        .respond_with(ResponseTemplate::new(201))
        .mount(sink)
        .await;
}

fn posts_to<'a>(requests: &'a [Request], table_path: &str) -> Vec<Value> {
    requests
        .iter()
        .filter(|r| r.method.to_string() == "POST" && r.url.path() == table_path)
        .map(|r| serde_json::from_slice(&r.body).expect("valid JSON body"))
        .collect()
}

#[tokio::test]
async fn test_gate_failed_record_is_minimal_and_marked_ok() {
    let bo = MockServer::start().await;
    let sink = MockServer::start().await;
    mount_sink(&sink).await;

    // The view mock requires the session cookie: an unauthenticated fetch
    // would fall through to wiremock's 404 and show up as not_found.
    Mock::given(method("GET"))
        .and(path("/digi/com/cto/view"))
        .and(query_param("nr", "52001"))
        .and(header("Cookie", STATIC_COOKIE))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><p>Vente normale</p></body></html>"),
        )
        .mount(&bo)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&bo.uri(), Some(&sink.uri()), dir.path());
    let runner = Runner::new(config, runner_options(52001, 52001)).unwrap();
    runner.run().await.unwrap();
    drop(runner);

    let requests = sink.received_requests().await.unwrap();
    let run_posts = posts_to(&requests, "/rest/v1/cto_runs");
    assert_eq!(run_posts.len(), 1);
    assert_eq!(run_posts[0]["nr"], 52001);
    assert_eq!(run_posts[0]["gate_passed"], false);
    assert_eq!(run_posts[0]["gate_reason"], "no_match");

    // Gate failure skips deep extraction entirely: no page rows at all.
    assert!(posts_to(&requests, "/rest/v1/cto_pages").is_empty());

    // Gate-fail is a successful outcome in the ledger.
    let ledger = StateLedger::open(&dir.path().join("state.db")).unwrap();
    assert!(ledger.is_done(52001).unwrap());
}

#[tokio::test]
async fn test_gate_passed_fetches_all_pages_and_persists_five_entries() {
    let bo = MockServer::start().await;
    let sink = MockServer::start().await;
    mount_sink(&sink).await;

    let duplicate_link = r#"<a href="/digi/com/cto/viewPayment?nr=52002">Paiement</a>"#;

    Mock::given(method("GET"))
        .and(path("/digi/com/cto/view"))
        .and(query_param("nr", "52002"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body>
            <h5>Location de véhicule</h5>
            <a href="/digi/mod-ep/vehicles/view?nr=28953">TOYOTA PRIUS (GK-345-BT)</a>
            <span class="semaine">2024-08</span>
            {duplicate_link}
            <script>jBasketComposer([{{"nom": "Semaine", "prix": 95.0, "qtty": 1}}]);</script>
            </body></html>"#
        )))
        .mount(&bo)
        .await;

    Mock::given(method("GET"))
        .and(path("/digi/com/cto/viewLogistic"))
        .and(query_param("nr", "52002"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body>
            <span class="tracking">COLIS-42</span>
            {duplicate_link}
            </body></html>"#
        )))
        .mount(&bo)
        .await;

    Mock::given(method("GET"))
        .and(path("/digi/com/cto/viewPayment"))
        .and(query_param("nr", "52002"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><span class="JSinfos">{"data": [
                {"nr": 201, "ordernr": 52002, "billnr": 9, "amount": "95,00",
                 "date": "01/08/2024", "num": "T-1", "paymentmethodnr": 3}
            ]}</span></body></html>"#,
        ))
        .mount(&bo)
        .await;

    Mock::given(method("GET"))
        .and(path("/digi/com/cto/viewInfos"))
        .and(query_param("nr", "52002"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><dl><dt>Zone</dt><dd>Sud</dd></dl></body></html>",
        ))
        .mount(&bo)
        .await;

    Mock::given(method("GET"))
        .and(path("/digi/com/cto/viewOrders"))
        .and(query_param("nr", "52002"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><table>
            <tr data-line><td>Pneus hiver</td><td>320,00 €</td><td>4</td></tr>
            </table></body></html>"#,
        ))
        .mount(&bo)
        .await;

    // Detail modal for the one transaction discovered on the payment page.
    Mock::given(method("GET"))
        .and(path("/digi/cfg/modal/ajax/viewTransaction"))
        .and(query_param("nr", "201"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<section><fieldset>
            <article><label>Type de paiement</label><div>Prélèvement</div></article>
            <article><label>Montant</label><div>210,00 €</div></article>
            <article><label>Date</label><div>03/02/2024</div></article>
            </fieldset></section>"#,
        ))
        .mount(&bo)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&bo.uri(), Some(&sink.uri()), dir.path());
    let runner = Runner::new(config, runner_options(52002, 52002)).unwrap();
    runner.run().await.unwrap();
    drop(runner);

    let requests = sink.received_requests().await.unwrap();
    let run_posts = posts_to(&requests, "/rest/v1/cto_runs");
    assert_eq!(run_posts.len(), 1);
    assert_eq!(run_posts[0]["gate_passed"], true);
    assert_eq!(run_posts[0]["summary"]["nb_pages"], 5);

    // Exactly five keyed page entries.
    let page_posts = posts_to(&requests, "/rest/v1/cto_pages");
    assert_eq!(page_posts.len(), 5);
    let page_types: HashSet<&str> = page_posts
        .iter()
        .map(|p| p["page_type"].as_str().unwrap())
        .collect();
    assert_eq!(
        page_types,
        HashSet::from(["view", "logistic", "payment", "infos", "orders"])
    );

    // The transaction item was enriched with the modal's normalized fields.
    let payment = page_posts
        .iter()
        .find(|p| p["page_type"] == "payment")
        .unwrap();
    let transaction = &payment["extracted"]["extracted"]["transactions"][0];
    assert_eq!(transaction["nr"], 201);
    assert_eq!(transaction["amount"], 210.0);
    assert_eq!(transaction["currency"], "EUR");
    assert_eq!(transaction["date"], "2024-02-03");

    // Aggregate link list is deduplicated: the link shared by two pages
    // appears exactly once, and no URL repeats.
    let links = run_posts[0]["explorer_links_all"].as_array().unwrap();
    let urls: Vec<&str> = links.iter().map(|l| l["url"].as_str().unwrap()).collect();
    let unique: HashSet<&str> = urls.iter().copied().collect();
    assert_eq!(urls.len(), unique.len());
    let shared = format!("{}/digi/com/cto/viewPayment?nr=52002", bo.uri());
    assert_eq!(urls.iter().filter(|u| **u == shared).count(), 1);

    let ledger = StateLedger::open(&dir.path().join("state.db")).unwrap();
    assert!(ledger.is_done(52002).unwrap());
}

#[tokio::test]
async fn test_not_found_is_terminal_and_not_an_error() {
    let bo = MockServer::start().await;
    let sink = MockServer::start().await;
    mount_sink(&sink).await;

    Mock::given(method("GET"))
        .and(path("/digi/com/cto/view"))
        .and(query_param("nr", "60000"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&bo)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&bo.uri(), Some(&sink.uri()), dir.path());
    let runner = Runner::new(config, runner_options(60000, 60000)).unwrap();
    runner.run().await.unwrap();
    drop(runner);

    let ledger = StateLedger::open(&dir.path().join("state.db")).unwrap();
    let entry = ledger.entry(60000).unwrap().unwrap();
    assert_eq!(entry.status, ProgressStatus::NotFound);
    assert!(!ledger.is_done(60000).unwrap());

    // No record is produced for a not-found id.
    let requests = sink.received_requests().await.unwrap();
    assert!(posts_to(&requests, "/rest/v1/cto_runs").is_empty());
}

#[tokio::test]
async fn test_double_session_persisting_raises_distinct_error() {
    let bo = MockServer::start().await;
    let conflict_body = "<html><body><p>Double session détectée. Session en trop: \
                         quittez et reconnectez-vous.</p></body></html>";
    Mock::given(method("GET"))
        .and(path("/digi/com/cto/view"))
        .respond_with(ResponseTemplate::new(200).set_body_string(conflict_body))
        .mount(&bo)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&bo.uri(), None, dir.path());
    let client = FetchClient::new(&config, AuthMode::Default).unwrap();

    let err = client
        .fetch(&format!("{}/digi/com/cto/view?nr=5", bo.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::DoubleSessionPersists { .. }));
}

#[tokio::test]
async fn test_relogin_on_login_page_then_success() {
    let bo = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/digi/com/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "DigifactoryBO=fresh-token; Path=/; HttpOnly"),
        )
        .mount(&bo)
        .await;

    // First hit lands on a login page; after the relogin the real page
    // comes back.
    Mock::given(method("GET"))
        .and(path("/digi/com/cto/view"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form><input name="username"><input name="password"></form>"#,
        ))
        .up_to_n_times(1)
        .mount(&bo)
        .await;
    Mock::given(method("GET"))
        .and(path("/digi/com/cto/view"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><h5>Location de véhicule</h5></body></html>"),
        )
        .mount(&bo)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&bo.uri(), None, dir.path());
    config.backoffice.session_cookie = None;
    let client = FetchClient::new(&config, AuthMode::LoginOnly).unwrap();

    let page = client
        .fetch(&format!("{}/digi/com/cto/view?nr=7", bo.uri()))
        .await
        .unwrap();
    assert!(page.body.contains("Location de véhicule"));
}

#[tokio::test]
async fn test_sink_failure_spools_whole_batch_and_ledger_still_marks() {
    let bo = MockServer::start().await;
    let sink = MockServer::start().await;

    // Probe succeeds, but every upsert is rejected outright.
    Mock::given(method("GET"))
        .and(path("/rest/v1/cto_runs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&sink)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cto_runs"))
        .respond_with(ResponseTemplate::new(400).set_body_string("schema mismatch"))
        .mount(&sink)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cto_errors"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&sink)
        .await;

    Mock::given(method("GET"))
        .and(path("/digi/com/cto/view"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><p>Vente normale</p></body></html>"),
        )
        .mount(&bo)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&bo.uri(), Some(&sink.uri()), dir.path());
    let runner = Runner::new(config, runner_options(52010, 52011)).unwrap();
    runner.run().await.unwrap();
    drop(runner);

    // The whole batch landed in exactly one spool file.
    let spool = SpoolManager::new(&dir.path().join("spool")).unwrap();
    let batches = spool.list_batches();
    assert_eq!(batches.len(), 1);
    let records = spool.read_batch(batches[0]).await.unwrap();
    let nrs: HashSet<u32> = records.iter().map(|r| r.nr).collect();
    assert_eq!(nrs, HashSet::from([52010, 52011]));

    // The ledger marks the ids per their fetch outcome, independent of the
    // sink failure.
    let ledger = StateLedger::open(&dir.path().join("state.db")).unwrap();
    assert!(ledger.is_done(52010).unwrap());
    assert!(ledger.is_done(52011).unwrap());
}

#[tokio::test]
async fn test_flush_spool_replays_batches_and_deletes_files() {
    let bo = MockServer::start().await;
    let sink = MockServer::start().await;
    mount_sink(&sink).await;

    let dir = TempDir::new().unwrap();

    // Seed a spooled batch from a previous failed run.
    {
        let spool = SpoolManager::new(&dir.path().join("spool")).unwrap();
        let record = SaleRecord::new(52020, "ok", json!({"nr": 52020, "gate_passed": false}));
        spool.write_record(&record, 3).await.unwrap();
    }

    let config = test_config(&bo.uri(), Some(&sink.uri()), dir.path());
    let runner = Runner::new(config, runner_options(0, 0)).unwrap();
    let (batches, records) = runner.flush_spool().await.unwrap();
    assert_eq!(batches, 1);
    assert_eq!(records, 1);

    // The batch file is gone and the record reached the sink.
    let spool = SpoolManager::new(&dir.path().join("spool")).unwrap();
    assert!(spool.list_batches().is_empty());
    let requests = sink.received_requests().await.unwrap();
    let run_posts = posts_to(&requests, "/rest/v1/cto_runs");
    assert_eq!(run_posts.len(), 1);
    assert_eq!(run_posts[0]["nr"], 52020);
}

#[tokio::test]
async fn test_resume_skips_completed_ids() {
    let bo = MockServer::start().await;
    let sink = MockServer::start().await;
    mount_sink(&sink).await;

    Mock::given(method("GET"))
        .and(path("/digi/com/cto/view"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><p>Vente normale</p></body></html>"),
        )
        .mount(&bo)
        .await;

    let dir = TempDir::new().unwrap();

    // Pre-mark one id as done.
    {
        let ledger = StateLedger::open(&dir.path().join("state.db")).unwrap();
        ledger.mark_done(52030).unwrap();
    }

    let config = test_config(&bo.uri(), Some(&sink.uri()), dir.path());
    let mut options = runner_options(52030, 52031);
    options.resume = true;
    let runner = Runner::new(config, options).unwrap();
    runner.run().await.unwrap();
    drop(runner);

    // Only the undone id was fetched.
    let fetched: Vec<String> = bo
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.query().unwrap_or("").to_string())
        .collect();
    assert!(fetched.iter().any(|q| q.contains("nr=52031")));
    assert!(!fetched.iter().any(|q| q.contains("nr=52030")));
}

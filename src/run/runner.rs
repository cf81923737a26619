//! The orchestrator: drives fetch, gate, extraction and persistence
//!
//! For each record id: fetch the view page, check the gate, and either emit
//! a minimal record (gate failed) or fetch the remaining pages, run full
//! extraction, redact and buffer the result. Ids are processed in fixed
//! chunks; within a chunk all ids run concurrently under a counting
//! admission gate, and the batch buffer is flushed once per chunk. An
//! interrupt lets the in-flight chunk finish, then flushes and reports.

use crate::auth::session::AuthMode;
use crate::config::Config;
use crate::fetch::client::{FetchClient, FetchedPage};
use crate::fetch::endpoints::{
    page_type_of, page_urls, payment_request_details_url, transaction_details_url, view_url,
    PageType,
};
use crate::parse::content_hash;
use crate::parse::explorer::{filter_and_tag_explorer_links, ExplorerLink};
use crate::parse::gate::{check_gate_verbose, GateOutcome};
use crate::parse::payment::{
    extract_payment_tables, item_nr, parse_payment_request_modal, parse_transaction_modal,
};
use crate::parse::redact::{redact_str, redact_value};
use crate::parse::tabs::{extract_infos_data, extract_logistic_data, extract_orders_data,
    extract_payment_page};
use crate::parse::view::extract_view_data;
use crate::run::control::{RunControl, RunLimits};
use crate::run::metrics::{Metrics, MetricsExporter};
use crate::state::StateLedger;
use crate::store::{DevStorage, PageResult, RestSink, SaleRecord, SpoolManager};
use crate::{FetchError, ScrapeError};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Seconds between metrics exports
const METRICS_EXPORT_INTERVAL_SECS: u64 = 30;

/// Per-run options, mostly mapped from CLI flags
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub start: u32,
    pub end: u32,
    /// Skip ids the ledger already marks `ok`
    pub resume: bool,
    /// Verbose diagnostics, local dumps, no skip-if-done
    pub dev_mode: bool,
    /// No sink writes at all
    pub dry_run: bool,
    pub store_html: bool,
    pub store_jsinfos: bool,
    pub store_explorer: bool,
    pub auth_mode: AuthMode,
    pub limits: RunLimits,
}

/// Drives the whole pipeline for one id range
pub struct Runner {
    config: Arc<Config>,
    options: RunnerOptions,
    run_id: String,
    client: FetchClient,
    semaphore: Arc<Semaphore>,
    control: Mutex<RunControl>,
    ledger: Mutex<StateLedger>,
    sink: Option<RestSink>,
    spool: SpoolManager,
    dev_storage: Option<DevStorage>,
    metrics: Mutex<Metrics>,
    exporter: MetricsExporter,
    buffer: Mutex<Vec<SaleRecord>>,
    batch_counter: AtomicU64,
    last_export: Mutex<Instant>,
    interrupted: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(config: Config, options: RunnerOptions) -> crate::Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, "run id assigned");

        std::fs::create_dir_all(&config.storage.data_dir)?;
        let ledger = StateLedger::open(&config.storage.ledger_path())?;
        let spool = SpoolManager::new(&config.storage.spool_dir())?;

        let sink = if options.dry_run {
            None
        } else {
            RestSink::from_config(&config.storage)?
        };
        if sink.is_none() && !options.dry_run {
            tracing::warn!("no sink configured; records will only reach the ledger and dev dumps");
        }

        let dev_storage = if options.dev_mode {
            Some(DevStorage::new(&config.storage.dev_dir())?)
        } else {
            None
        };

        let total = u64::from(options.end.saturating_sub(options.start)) + 1;
        let client = FetchClient::new(&config, options.auth_mode)?;
        let exporter = MetricsExporter::new(&config.storage.metrics_path(), &run_id);

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.scraper.concurrency)),
            control: Mutex::new(RunControl::new(options.limits)),
            ledger: Mutex::new(ledger),
            sink,
            spool,
            dev_storage,
            metrics: Mutex::new(Metrics::new(total)),
            exporter,
            buffer: Mutex::new(Vec::new()),
            batch_counter: AtomicU64::new(0),
            last_export: Mutex::new(Instant::now()),
            interrupted: Arc::new(AtomicBool::new(false)),
            config: Arc::new(config),
            options,
            run_id,
            client,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Runs the scrape over the configured id range.
    pub async fn run(&self) -> crate::Result<()> {
        if let Some(sink) = &self.sink {
            if !sink.test_connection().await {
                if self.options.dev_mode {
                    tracing::warn!("sink connection failed, continuing in dev mode");
                } else {
                    return Err(ScrapeError::Aborted(
                        "sink connection failed at startup".to_string(),
                    ));
                }
            }
        }

        let nrs: Vec<u32> = if self.options.resume {
            let remaining = self
                .ledger
                .lock()
                .unwrap()
                .next_undone(self.options.start, self.options.end)?;
            tracing::info!("resuming: {} remaining records", remaining.len());
            remaining
        } else {
            tracing::info!(
                "starting fresh: {} records",
                self.options.end - self.options.start + 1
            );
            (self.options.start..=self.options.end).collect()
        };

        // The interrupt flag lets the in-flight chunk finish naturally; we
        // stop taking new chunks, flush, and report.
        let flag = self.interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, finishing current chunk");
                flag.store(true, Ordering::SeqCst);
            }
        });

        let mut abort: Option<ScrapeError> = None;
        for chunk in nrs.chunks(self.config.scraper.chunk_size) {
            if self.interrupted.load(Ordering::SeqCst) {
                break;
            }
            if let Some(reason) = self.control.lock().unwrap().should_stop() {
                tracing::warn!("stop condition met before chunk: {reason}");
                break;
            }

            let results =
                futures::future::join_all(chunk.iter().map(|nr| self.process_nr(*nr))).await;
            self.flush_buffer().await?;

            if let Some(err) = results.into_iter().find_map(Result::err) {
                abort = Some(err);
                break;
            }
        }

        self.flush_buffer().await?;
        self.final_report().await;

        match abort {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Processes one id under the admission gate. Per-id errors are
    /// absorbed here (recorded in ledger, sink log and counters) unless
    /// fail-fast is set, in which case they propagate and end the run.
    async fn process_nr(&self, nr: u32) -> crate::Result<()> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ScrapeError::Aborted("admission gate closed".to_string()))?;

        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(reason) = self.control.lock().unwrap().should_stop() {
            tracing::debug!(nr, "skipping, stop condition met: {reason}");
            return Ok(());
        }

        let result = self.process_single(nr).await;
        self.maybe_export_metrics().await;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                self.handle_failure(nr, &e).await;
                if self.options.limits.fail_fast {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn process_single(&self, nr: u32) -> crate::Result<()> {
        let started = Instant::now();

        // Presence with status=ok means never re-fetch, unless forced.
        // Dev mode always reprocesses for fresh inspection output.
        if !self.options.dev_mode && self.ledger.lock().unwrap().is_done(nr)? {
            self.metrics.lock().unwrap().increment("skipped");
            return Ok(());
        }

        let base_url = &self.config.backoffice.base_url;
        let view = self.client.fetch(&view_url(base_url, nr)).await?;

        if view.is_not_found() {
            self.ledger.lock().unwrap().mark_not_found(nr)?;
            {
                let mut metrics = self.metrics.lock().unwrap();
                metrics.increment("not_found");
                metrics.increment("processed");
            }
            self.control.lock().unwrap().record_success();
            tracing::debug!(nr, "not found (404)");
            return Ok(());
        }

        if view.status == 403 {
            self.control.lock().unwrap().record_error(Some(403));
            if let Some(sink) = &self.sink {
                sink.log_error(
                    &self.run_id,
                    "auth_error",
                    "403 Forbidden on view page",
                    json!({"nr": nr, "url": view.url, "status_code": 403}),
                    Some(nr),
                    Some(&view.url),
                )
                .await;
            }
            if self.options.limits.fail_fast {
                return Err(ScrapeError::Aborted(format!("403 Forbidden for nr {nr}")));
            }
        }

        let gate = check_gate_verbose(&view.body, self.options.dev_mode);
        if self.options.dev_mode {
            tracing::info!(
                nr,
                passed = gate.passed,
                reason = %gate.reason,
                "gate checked"
            );
        }

        if !gate.passed {
            return self.commit_gate_failed(nr, &view, gate).await;
        }

        self.control.lock().unwrap().record_gated();
        tracing::debug!(nr, "gate passed, fetching all pages");

        let (record, html_pages) = self.build_full_record(nr, gate).await?;
        self.commit_record(nr, record, true, html_pages).await?;

        tracing::debug!(nr, elapsed_ms = started.elapsed().as_millis() as u64, "processed");
        Ok(())
    }

    /// Minimal record for a gate-failed id. Gate failure is a successful
    /// outcome: the id is marked done and never re-fetched.
    async fn commit_gate_failed(
        &self,
        nr: u32,
        view: &FetchedPage,
        gate: GateOutcome,
    ) -> crate::Result<()> {
        let mut data = Map::new();
        data.insert("nr".to_string(), json!(nr));
        data.insert("gate_passed".to_string(), json!(false));
        data.insert("gate_reason".to_string(), json!(gate.reason));
        if self.options.dev_mode {
            data.insert("gate_match_count".to_string(), json!(gate.match_count));
            if let Some(text) = gate.matched_text {
                data.insert("gate_matched_text".to_string(), json!(text));
            }
        }

        let record = SaleRecord::new(nr, "ok", redact_value(Value::Object(data)));

        let html_pages = self.options.store_html.then(|| {
            let mut pages = HashMap::new();
            pages.insert("view".to_string(), view.body.clone());
            pages
        });

        self.metrics.lock().unwrap().increment("gate_failed");
        self.commit_record(nr, record, false, html_pages).await
    }

    /// Deep fetch and full extraction for a gated-in id.
    async fn build_full_record(
        &self,
        nr: u32,
        gate: GateOutcome,
    ) -> crate::Result<(SaleRecord, Option<HashMap<String, String>>)> {
        let base_url = &self.config.backoffice.base_url;
        let urls = page_urls(base_url, nr);
        let responses = self.client.fetch_all(&urls).await;

        // Payment tables come out first so their detail modals can be
        // fetched alongside page assembly.
        let payment_url = urls
            .iter()
            .find(|u| page_type_of(u) == PageType::Payment)
            .cloned()
            .unwrap_or_default();
        let payment_tables = responses
            .get(&payment_url)
            .and_then(|r| r.as_ref())
            .map(|page| extract_payment_tables(&page.body))
            .unwrap_or_default();

        let mut detail_targets: HashMap<String, (&'static str, Map<String, Value>)> =
            HashMap::new();
        for item in &payment_tables.payment_requests {
            if let Some(request_nr) = item_nr(item) {
                detail_targets.insert(
                    payment_request_details_url(base_url, request_nr),
                    ("gocardless", item.clone()),
                );
            }
        }
        for item in &payment_tables.transactions {
            if let Some(transaction_nr) = item_nr(item) {
                detail_targets.insert(
                    transaction_details_url(base_url, transaction_nr),
                    ("transaction", item.clone()),
                );
            }
        }

        let detail_responses = if detail_targets.is_empty() {
            HashMap::new()
        } else {
            tracing::debug!(nr, "fetching {} payment detail modals", detail_targets.len());
            let detail_urls: Vec<String> = detail_targets.keys().cloned().collect();
            self.client.fetch_all(&detail_urls).await
        };

        let (requests_enriched, transactions_enriched) =
            enrich_payment_items(&detail_targets, &detail_responses);

        // Assemble the per-page results.
        let mut pages = Map::new();
        let mut all_links: Vec<ExplorerLink> = Vec::new();
        let mut html_pages: HashMap<String, String> = HashMap::new();

        for url in &urls {
            let Some(page) = responses.get(url).and_then(|r| r.as_ref()) else {
                continue;
            };
            let page_type = page_type_of(url);

            let mut extracted = match page_type {
                PageType::View => extract_view_data(&page.body),
                PageType::Payment => extract_payment_page(&page.body),
                PageType::Logistic => extract_logistic_data(&page.body),
                PageType::Infos => extract_infos_data(&page.body),
                PageType::Orders => extract_orders_data(&page.body),
            };

            if !self.options.store_jsinfos {
                extracted.remove("jsinfos");
            }
            if self.options.store_explorer {
                let links = filter_and_tag_explorer_links(
                    &page.body,
                    base_url,
                    self.config.scraper.explorer_max_links,
                );
                extracted.insert("explorer_links".to_string(), serde_json::to_value(&links)?);
                all_links.extend(links);
            }

            let result = PageResult {
                url: page.url.clone(),
                status_code: page.status,
                final_url: page.final_url.clone(),
                content_hash: content_hash(&page.body),
                content_length: page.body.len(),
                extracted: Value::Object(extracted),
            };
            pages.insert(
                page_type.as_str().to_string(),
                serde_json::to_value(&result)?,
            );

            if self.options.store_html {
                html_pages.insert(page_type.as_str().to_string(), page.body.clone());
            }
        }

        // Replace the raw payment tables with the modal-enriched items.
        if let Some(extracted) = pages
            .get_mut(PageType::Payment.as_str())
            .and_then(|p| p.get_mut("extracted"))
        {
            if !requests_enriched.is_empty() {
                extracted["payment_requests"] = Value::Array(requests_enriched);
            }
            if !transactions_enriched.is_empty() {
                extracted["transactions"] = Value::Array(transactions_enriched);
            }
        }

        // Aggregate link list, deduplicated by URL across all pages.
        let mut seen = HashSet::new();
        let mut aggregate: Vec<ExplorerLink> = Vec::new();
        for link in all_links {
            if seen.insert(link.url.clone()) {
                aggregate.push(link);
            }
        }
        aggregate.sort_by(|a, b| a.url.cmp(&b.url));

        let nb_jsinfos: usize = pages
            .values()
            .filter_map(|page| {
                page.get("extracted")
                    .and_then(|e| e.get("jsinfos"))
                    .and_then(Value::as_object)
                    .map(|m| m.len())
            })
            .sum();

        let mut data = Map::new();
        data.insert("nr".to_string(), json!(nr));
        data.insert("gate_passed".to_string(), json!(true));
        data.insert("gate_reason".to_string(), json!(gate.reason));
        if self.options.dev_mode {
            data.insert("gate_match_count".to_string(), json!(gate.match_count));
            if let Some(text) = gate.matched_text {
                data.insert("gate_matched_text".to_string(), json!(text));
            }
        }
        data.insert("run_id".to_string(), json!(self.run_id));
        data.insert(
            "summary".to_string(),
            json!({
                "nb_pages": pages.len(),
                "nb_jsinfos": nb_jsinfos,
                "nb_explorer_links": aggregate.len(),
            }),
        );
        data.insert("pages".to_string(), Value::Object(pages));
        if self.options.store_explorer && !aggregate.is_empty() {
            data.insert(
                "explorer_links_all".to_string(),
                serde_json::to_value(&aggregate)?,
            );
        }

        let record = SaleRecord::new(nr, "ok", redact_value(Value::Object(data)));
        let html_pages = self.options.store_html.then_some(html_pages);
        Ok((record, html_pages))
    }

    /// Buffers a finished record and updates ledger, counters and dumps.
    async fn commit_record(
        &self,
        nr: u32,
        record: SaleRecord,
        gate_passed: bool,
        html_pages: Option<HashMap<String, String>>,
    ) -> crate::Result<()> {
        if let Some(dev) = &self.dev_storage {
            if let Err(e) = dev.save_record(
                nr,
                &record.data,
                html_pages.as_ref(),
                self.config.scraper.max_html_bytes,
            ) {
                tracing::warn!(nr, "dev dump failed: {e}");
            }
        }

        let should_flush = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(record);
            buffer.len() >= self.config.scraper.batch_size
        };
        if should_flush {
            self.flush_buffer().await?;
        }

        self.ledger.lock().unwrap().mark_done(nr)?;
        let processed = {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.increment("ok");
            metrics.increment("processed");
            if gate_passed {
                metrics.increment("gate_passed");
            }
            metrics.get("processed")
        };
        self.control.lock().unwrap().record_success();

        if processed % 100 == 0 {
            self.metrics.lock().unwrap().report();
        }
        Ok(())
    }

    /// Records one id's failure in ledger, counters and the remote error
    /// log. The error text is redacted before leaving the process.
    async fn handle_failure(&self, nr: u32, error: &ScrapeError) {
        let message = redact_str(&error.to_string());
        tracing::error!(nr, "error processing record: {message}");

        if let Err(e) = self.ledger.lock().unwrap().mark_failed(nr, &message) {
            tracing::error!(nr, "failed to record failure in ledger: {e}");
        }

        let status_code = match error {
            ScrapeError::Fetch(FetchError::RetryableStatus { status, .. }) => Some(*status),
            _ => None,
        };
        self.control.lock().unwrap().record_error(status_code);
        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.increment("failed");
            metrics.increment("processed");
        }

        if let Some(sink) = &self.sink {
            sink.log_error(
                &self.run_id,
                classify_error(&message),
                &message,
                json!({"nr": nr}),
                Some(nr),
                None,
            )
            .await;
        }
    }

    /// Flushes the batch buffer to the sink, spooling the whole batch on
    /// sink failure. The failure stays isolated to this batch.
    async fn flush_buffer(&self) -> crate::Result<()> {
        let records: Vec<SaleRecord> = {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };
        let batch_id = self.batch_counter.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(sink) = &self.sink else {
            tracing::debug!(
                "no sink ({}), dropping {} buffered records after ledger update",
                if self.options.dry_run { "dry-run" } else { "unconfigured" },
                records.len()
            );
            return Ok(());
        };

        tracing::debug!("flushing {} records (batch {batch_id})", records.len());
        let mut failure: Option<crate::store::SinkError> = None;
        for record in &records {
            if let Err(e) = sink.upsert_run_and_pages(&self.run_id, record).await {
                failure = Some(e);
                break;
            }
        }

        match failure {
            None => {
                // Clear any leftover file from a previous failed attempt.
                let _ = self.spool.delete_batch(batch_id).await;
            }
            Some(e) => {
                tracing::warn!("sink write failed, spooling batch {batch_id} to disk: {e}");
                sink.log_error(
                    &self.run_id,
                    "sink_write_error",
                    &e.to_string(),
                    json!({"batch_id": batch_id, "records_count": records.len()}),
                    None,
                    None,
                )
                .await;
                for record in &records {
                    let redacted = SaleRecord {
                        data: redact_value(record.data.clone()),
                        ..record.clone()
                    };
                    if let Err(e) = self.spool.write_record(&redacted, batch_id).await {
                        tracing::error!("spool write failed for nr {}: {e}", record.nr);
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-uploads spooled batches, deleting each file only once its whole
    /// batch is durable. Returns (batches flushed, records written).
    pub async fn flush_spool(&self) -> crate::Result<(usize, usize)> {
        let Some(sink) = &self.sink else {
            return Err(ScrapeError::Aborted(
                "spool flush requires a configured sink".to_string(),
            ));
        };

        let mut batches_flushed = 0;
        let mut records_written = 0;
        for batch_id in self.spool.list_batches() {
            let records = self.spool.read_batch(batch_id).await?;
            let mut all_ok = true;
            for record in &records {
                if let Err(e) = sink.upsert_run_and_pages(&self.run_id, record).await {
                    tracing::warn!("spool replay failed for batch {batch_id}: {e}");
                    all_ok = false;
                    break;
                }
            }
            if all_ok {
                self.spool.delete_batch(batch_id).await?;
                batches_flushed += 1;
                records_written += records.len();
            }
        }
        Ok((batches_flushed, records_written))
    }

    async fn maybe_export_metrics(&self) {
        let due = {
            let mut last = self.last_export.lock().unwrap();
            if last.elapsed().as_secs() >= METRICS_EXPORT_INTERVAL_SECS {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            let metrics = self.metrics.lock().unwrap().summary();
            let control = self.control.lock().unwrap().summary();
            if let Err(e) = self.exporter.export(&metrics, &control).await {
                tracing::debug!("metrics export failed: {e}");
            }
        }
    }

    async fn final_report(&self) {
        let metrics = self.metrics.lock().unwrap().summary();
        let control = self.control.lock().unwrap().summary();

        tracing::info!("==================== final report ====================");
        tracing::info!(run_id = %self.run_id, "run finished");
        tracing::info!(
            "elapsed: {:.2} minutes",
            control["elapsed_minutes"].as_f64().unwrap_or(0.0)
        );
        tracing::info!(
            "processed: {}/{} | ok: {} | failed: {} | not found: {} | skipped: {}",
            metrics["processed"],
            metrics["total"],
            metrics["ok"],
            metrics["failed"],
            metrics["not_found"],
            metrics["skipped"],
        );
        tracing::info!(
            "gate passed: {} | gate failed: {}",
            metrics["gate_passed"],
            metrics["gate_failed"],
        );
        tracing::info!(
            "403 errors: {} | 429 errors: {} | throughput: {:.2} req/s",
            control["error_403_count"],
            control["error_429_count"],
            metrics["rate"].as_f64().unwrap_or(0.0),
        );
        tracing::info!("======================================================");

        if let Err(e) = self.exporter.export(&metrics, &control).await {
            tracing::debug!("final metrics export failed: {e}");
        }
    }
}

/// Merges detail-modal fields back onto the payment items that produced
/// them. Per-item fetch or parse failures annotate the item and keep it.
fn enrich_payment_items(
    detail_targets: &HashMap<String, (&'static str, Map<String, Value>)>,
    detail_responses: &HashMap<String, Option<FetchedPage>>,
) -> (Vec<Value>, Vec<Value>) {
    /// Modal fields copied onto a transaction item
    const TRANSACTION_MODAL_KEYS: &[&str] = &[
        "type",
        "method",
        "date",
        "amount",
        "currency",
        "bank_account_label",
        "bank_account_href",
        "transaction_id",
        "invoice_ref",
    ];

    let mut requests = Vec::new();
    let mut transactions = Vec::new();

    for (url, (kind, item)) in detail_targets {
        let mut item = item.clone();
        let response = detail_responses.get(url).and_then(|r| r.as_ref());

        match response {
            Some(page) if page.status == 200 => match *kind {
                "gocardless" => {
                    let modal = redact_value(Value::Object(parse_payment_request_modal(&page.body)));
                    item.insert(
                        "details".to_string(),
                        modal.get("details").cloned().unwrap_or(Value::Null),
                    );
                    item.insert(
                        "raw".to_string(),
                        modal.get("raw_fields").cloned().unwrap_or(Value::Null),
                    );
                }
                _ => {
                    let modal = redact_value(Value::Object(parse_transaction_modal(&page.body)));
                    for key in TRANSACTION_MODAL_KEYS {
                        if let Some(value) = modal.get(*key) {
                            item.insert(key.to_string(), value.clone());
                        }
                    }
                    item.insert(
                        "raw".to_string(),
                        modal.get("raw_fields").cloned().unwrap_or(Value::Null),
                    );
                }
            },
            Some(page) if matches!(page.status, 302 | 401 | 403) => {
                tracing::warn!("auth error on {kind} details: HTTP {}", page.status);
                item.insert(
                    "fetch_error".to_string(),
                    json!(format!("auth_error_{}", page.status)),
                );
            }
            Some(page) => {
                tracing::warn!("HTTP error on {kind} details: {}", page.status);
                item.insert(
                    "fetch_error".to_string(),
                    json!(format!("http_error_{}", page.status)),
                );
            }
            None => {
                tracing::warn!("no response for {kind} details at {url}");
                item.insert("fetch_error".to_string(), json!("no_response"));
            }
        }

        match *kind {
            "gocardless" => requests.push(Value::Object(item)),
            _ => transactions.push(Value::Object(item)),
        }
    }

    (requests, transactions)
}

/// Error classification for the remote error log, inferred from the
/// message content.
fn classify_error(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("auth") || lower.contains("login") || lower.contains("session") {
        "auth_error"
    } else if lower.contains("fetch") || lower.contains("http") || lower.contains("network") {
        "fetch_error"
    } else if lower.contains("parse") || lower.contains("json") {
        "parse_error"
    } else {
        "processing_error"
    }
}

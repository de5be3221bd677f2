use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use cadence::StatsdClient;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::{self, DispatchError};
use crate::export::health::HealthMetrics;
use crate::report::ReportError;
use crate::source::{HttpSource, ReportSource};
use crate::statsd::Endpoint;

/// Outcome of a successful poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Data rows read from the report.
    pub rows: usize,
    /// Gauges written to statsd.
    pub gauges: usize,
}

/// A poll cycle failed. The next cycle is unaffected.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("opening statsd sink")]
    Connect(#[source] anyhow::Error),

    #[error("fetching stats report")]
    Fetch(#[source] anyhow::Error),

    #[error("parsing stats report")]
    Parse(#[from] ReportError),

    #[error("dispatching metrics")]
    Dispatch(#[from] DispatchError),
}

impl CycleError {
    /// Pipeline stage that failed, used as a metric label.
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::Connect(_) => "connect",
            CycleError::Fetch(_) => "fetch",
            CycleError::Parse(_) => "parse",
            CycleError::Dispatch(_) => "dispatch",
        }
    }
}

/// Runs fetch, parse and dispatch for one report.
///
/// Rows are dispatched as they are parsed; the first error stops the cycle,
/// leaving gauges of earlier rows already sent.
pub async fn run_cycle<R: ReportSource>(
    source: &R,
    client: &StatsdClient,
) -> Result<CycleSummary, CycleError> {
    let report = source.fetch_report().await.map_err(CycleError::Fetch)?;

    let mut summary = CycleSummary::default();
    for record in report.records() {
        let record = record?;
        summary.rows += 1;
        summary.gauges += dispatch::dispatch(&record, client)?;
    }

    Ok(summary)
}

/// Periodically forwards HAProxy stats to statsd.
pub struct Bridge {
    cfg: Config,
    source: Arc<HttpSource>,
    health: Arc<HealthMetrics>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Creates a new Bridge, building the HTTP client and health metrics.
    pub fn new(cfg: Config) -> Result<Self> {
        let source = Arc::new(HttpSource::new(&cfg.haproxy).context("creating stats client")?);
        let health =
            Arc::new(HealthMetrics::new(&cfg.health.addr).context("creating health metrics")?);

        Ok(Self {
            cfg,
            source,
            health,
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    /// Health metrics shared with the poll loop.
    pub fn health(&self) -> &Arc<HealthMetrics> {
        &self.health
    }

    /// Start the health server (if enabled) and the poll loop.
    pub async fn start(&mut self) -> Result<()> {
        if self.cfg.health.enabled {
            self.health
                .start()
                .await
                .context("starting health metrics server")?;
        }

        let cfg = self.cfg.clone();
        let source = Arc::clone(&self.source);
        let health = Arc::clone(&self.health);
        let cancel = self.cancel.child_token();

        self.task = Some(tokio::spawn(async move {
            poll_loop(cfg, source, health, cancel).await;
        }));

        info!(
            url = %self.source.url(),
            statsd = %self.cfg.statsd.address,
            interval = ?self.cfg.poll_interval,
            "bridge started",
        );

        Ok(())
    }

    /// Run exactly one cycle, returning its error.
    pub async fn run_once(&self) -> Result<CycleSummary> {
        let summary = poll_once(&self.cfg, self.source.as_ref(), &self.health).await?;
        Ok(summary)
    }

    /// Stop the poll loop and the health server.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "poll loop ended abnormally");
            }
        }

        self.health.stop().await?;

        Ok(())
    }
}

/// Polls until cancelled, sleeping `poll_interval` between cycles.
async fn poll_loop(
    cfg: Config,
    source: Arc<HttpSource>,
    health: Arc<HealthMetrics>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            result = poll_once(&cfg, source.as_ref(), &health) => {
                if let Err(e) = result {
                    let stage = e.stage();
                    let error = format!("{:#}", anyhow::Error::from(e));
                    warn!(stage, error = %error, "poll cycle failed");
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(cfg.poll_interval) => {}
        }
    }
}

/// One cycle with its own statsd socket, recorded in health metrics.
async fn poll_once<R: ReportSource>(
    cfg: &Config,
    source: &R,
    health: &HealthMetrics,
) -> Result<CycleSummary, CycleError> {
    let start = Instant::now();
    health.cycles.inc();

    let result: Result<CycleSummary, CycleError> = async {
        let client = Endpoint::open(&cfg.statsd.address, cfg.statsd.timeout)
            .await
            .and_then(|endpoint| endpoint.client(&cfg.statsd.prefix))
            .map_err(CycleError::Connect)?;

        run_cycle(source, &client).await
    }
    .await;

    health.cycle_duration.observe(start.elapsed().as_secs_f64());

    match &result {
        Ok(summary) => {
            health.rows_parsed.inc_by(summary.rows as f64);
            health.gauges_sent.inc_by(summary.gauges as f64);
            health.last_success.set(unix_now());

            debug!(
                rows = summary.rows,
                gauges = summary.gauges,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "poll cycle complete",
            );
        }
        Err(e) => {
            health.cycle_failures.with_label_values(&[e.stage()]).inc();
        }
    }

    result
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use stocklink_events::ReconciliationReport;

/// Sink for before/after reports.
///
/// Reports are informational: delivery is best effort and must never affect
/// the pass that produced them, so `notify` is synchronous and infallible.
pub trait ReportNotifier: Send + Sync + 'static {
    fn notify(&self, report: ReconciliationReport);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ReportNotifier for NoopNotifier {
    fn notify(&self, report: ReconciliationReport) {
        debug!(tenant = %report.tenant_id, master = %report.master_id, writes = report.writes(), "report discarded (no report URL)");
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryReportNotifier {
    inner: Mutex<Vec<ReconciliationReport>>,
}

impl InMemoryReportNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ReconciliationReport> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportNotifier for InMemoryReportNotifier {
    fn notify(&self, report: ReconciliationReport) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }
}

/// POSTs each report as JSON to a merchant URL from a detached task.
#[derive(Debug, Clone)]
pub struct WebhookReportNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookReportNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ReportNotifier for WebhookReportNotifier {
    fn notify(&self, report: ReconciliationReport) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(master = %report.master_id, "no async runtime; report dropped");
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        runtime.spawn(async move {
            let tenant = report.tenant_id;
            let sent = client
                .post(&url)
                .header("X-Stocklink-Event", report.event_type())
                .json(&report)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            match sent {
                Ok(_) => debug!(tenant = %tenant, master = %report.master_id, "report delivered"),
                Err(e) => warn!(tenant = %tenant, master = %report.master_id, error = %e, "report delivery failed"),
            }
        });
    }
}

//! One report cycle: fetch, aggregate, diff, format, deliver, persist.
use crate::aggregate::aggregate;
use crate::census::{CensusClient, SnapshotSource};
use crate::config::{Config, Credentials};
use crate::delta::delta;
use crate::error::Error;
use crate::report::{self, ReportZone};
use crate::state::{PersistedState, StateStore};
use crate::telegram::{ReportSink, TelegramClient};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub top_n: usize,
    pub zone: ReportZone,
    pub interval: Duration,
}

/// What a successful cycle did, for the log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub ts: i64,
    pub total: u64,
    pub first_run: bool,
    pub messages: usize,
}

pub struct Reporter {
    source: Arc<dyn SnapshotSource>,
    sink: Arc<dyn ReportSink>,
    store: StateStore,
    settings: ReportSettings,
}

impl Reporter {
    /// Wires the real Bitnodes and Telegram clients from configuration.
    pub fn new(config: &Config, credentials: &Credentials) -> Result<Self, String> {
        let timeout = Duration::from_millis(config.max_http_timeout_ms);
        let source = CensusClient::new(config.census_url.clone(), timeout)?;
        let sink = TelegramClient::new(
            &config.telegram_api_base,
            credentials,
            timeout,
            config.max_message_chars,
        )?;
        let zone = ReportZone::new(config.timezone.utc_offset_minutes, config.timezone.label.clone())
            .ok_or_else(|| "timezone offset out of range".to_string())?;

        Ok(Self::with_parts(
            Arc::new(source),
            Arc::new(sink),
            StateStore::new(&config.state_path),
            ReportSettings {
                top_n: config.top_n,
                zone,
                interval: Duration::from_secs(config.report_interval_sec),
            },
        ))
    }

    /// Allows injecting any source and sink, e.g. fixtures in tests.
    pub fn with_parts(
        source: Arc<dyn SnapshotSource>,
        sink: Arc<dyn ReportSink>,
        store: StateStore,
        settings: ReportSettings,
    ) -> Self {
        Reporter {
            source,
            sink,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    /// Runs the pipeline once. The baseline only advances after the report
    /// went out, so a failed cycle leaves the next one comparing against the
    /// same observation.
    pub async fn run_cycle(&self) -> Result<CycleSummary, Error> {
        let snapshot = self.source.fetch().await?;
        let ts = snapshot_time(snapshot.timestamp);

        let current = aggregate(&snapshot);
        drop(snapshot);

        let baseline = self.store.load().map(|state| state.aggregation());
        let report = delta(&current, baseline.as_ref(), self.settings.top_n);
        let text = report::format(&report, ts, &self.settings.zone, self.settings.interval);

        let messages = self.sink.deliver(&text).await?;

        let summary = CycleSummary {
            ts,
            total: current.total,
            first_run: report.is_first_run(),
            messages,
        };
        self.store.save(&PersistedState::new(ts, current))?;
        Ok(summary)
    }
}

/// The census timestamp when it is a usable instant, the local clock otherwise.
fn snapshot_time(timestamp: Option<i64>) -> i64 {
    match timestamp {
        Some(ts) if chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0).is_some() => ts,
        Some(ts) => {
            tracing::warn!(timestamp = ts, "census timestamp out of range, using local clock");
            chrono::Utc::now().timestamp()
        }
        None => chrono::Utc::now().timestamp(),
    }
}

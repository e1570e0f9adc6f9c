use crate::dataset::reconcile;
use crate::dataset::sink::{DatasetKey, DatasetSink, SinkReceipt};
use crate::error::{FailureKind, IngestError};
use crate::ingest::flatten;
use crate::ingest::provider::ReadingFetcher;
use crate::ingest::types::{FeatureRecord, HistoricalRecord};
use crate::time::calendar::DayCursor;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BackfillRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub location: String,
    pub credential: String,
}

#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    /// Pause between consecutive day fetches.
    pub request_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySuccess {
    pub date: NaiveDate,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayFailure {
    pub date: NaiveDate,
    pub kind: FailureKind,
    pub message: String,
}

pub type DayResult = Result<DaySuccess, DayFailure>;

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub run_id: Uuid,
    pub successes: Vec<DaySuccess>,
    pub failures: Vec<DayFailure>,
}

impl BackfillReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn push(&mut self, day: DayResult) {
        match day {
            Ok(s) => self.successes.push(s),
            Err(f) => self.failures.push(f),
        }
    }

    pub fn days_processed(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn records(&self) -> usize {
        self.successes.iter().map(|s| s.records).sum()
    }
}

#[derive(Debug, Clone)]
pub enum BackfillOutcome {
    Written {
        receipt: SinkReceipt,
        report: BackfillReport,
    },
    /// Every day failed or produced no rows. Not an error.
    NoData { report: BackfillReport },
}

impl BackfillOutcome {
    pub fn report(&self) -> &BackfillReport {
        match self {
            Self::Written { report, .. } | Self::NoData { report } => report,
        }
    }
}

/// Append-only accumulator owned by a single run.
#[derive(Debug, Default)]
pub struct HistoricalBuffer {
    records: Vec<HistoricalRecord>,
}

impl HistoricalBuffer {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<HistoricalRecord> {
        self.records
    }

    fn extend(&mut self, date: NaiveDate, batch: Vec<FeatureRecord>) {
        self.records.extend(batch.into_iter().map(|record| HistoricalRecord {
            record,
            historical_date: date,
        }));
    }
}

pub async fn fetch_day(
    fetcher: &dyn ReadingFetcher,
    location: &str,
    credential: &str,
) -> Result<Vec<FeatureRecord>, IngestError> {
    let raw = fetcher.fetch(location, credential).await?;
    flatten(&raw)
}

/// Folds one day's outcome into the buffer. A failed day leaves the buffer
/// untouched.
pub fn record_day(
    mut buffer: HistoricalBuffer,
    date: NaiveDate,
    fetched: Result<Vec<FeatureRecord>, IngestError>,
) -> (HistoricalBuffer, DayResult) {
    match fetched {
        Ok(batch) => {
            let records = batch.len();
            buffer.extend(date, batch);
            (buffer, Ok(DaySuccess { date, records }))
        }
        Err(err) => {
            let failure = DayFailure {
                date,
                kind: err.kind(),
                message: err.to_string(),
            };
            (buffer, Err(failure))
        }
    }
}

/// Fetches the current snapshot once per day in `[start_date, end_date]`,
/// tags each row with the day, and writes everything once at the end.
///
/// Per-day failures are logged, collected in the report, and skipped.
/// A blank credential or a sink failure aborts the run.
pub async fn backfill(
    fetcher: &dyn ReadingFetcher,
    sink: &dyn DatasetSink,
    request: &BackfillRequest,
    options: &BackfillOptions,
) -> anyhow::Result<BackfillOutcome> {
    if request.credential.trim().is_empty() {
        return Err(IngestError::CredentialMissing.into());
    }

    let run_id = Uuid::new_v4();
    let mut report = BackfillReport::new(run_id);
    let mut buffer = HistoricalBuffer::default();

    tracing::info!(
        %run_id,
        start_date = %request.start_date,
        end_date = %request.end_date,
        location = %request.location,
        provider = fetcher.provider_name(),
        "backfill started"
    );

    for (idx, date) in DayCursor::new(request.start_date, request.end_date).enumerate() {
        if idx != 0 && !options.request_delay.is_zero() {
            tokio::time::sleep(options.request_delay).await;
        }

        let fetched = fetch_day(fetcher, &request.location, &request.credential).await;
        if let Err(err) = &fetched {
            if !err.is_per_day() {
                return Err(err.clone().into());
            }
        }

        let (next, day) = record_day(buffer, date, fetched);
        buffer = next;

        match &day {
            Ok(s) => tracing::info!(%run_id, date = %s.date, records = s.records, "fetched and processed data for day"),
            Err(f) => tracing::warn!(
                %run_id,
                date = %f.date,
                kind = %f.kind,
                error = %f.message,
                "failed to fetch data for day; skipping"
            ),
        }
        report.push(day);
    }

    if buffer.is_empty() {
        tracing::info!(
            %run_id,
            days = report.days_processed(),
            failed_days = report.failures.len(),
            "no data fetched during the backfill process"
        );
        return Ok(BackfillOutcome::NoData { report });
    }

    let batch = reconcile(buffer.into_records());
    let key = DatasetKey::for_range(request.start_date, request.end_date);
    let receipt = sink
        .write(&batch, &key)
        .with_context(|| format!("failed to write dataset {}", key.as_str()))?;

    tracing::info!(
        %run_id,
        path = %receipt.path.display(),
        rows = receipt.rows,
        columns = receipt.columns,
        ok_days = report.successes.len(),
        failed_days = report.failures.len(),
        "backfilled data saved"
    );

    Ok(BackfillOutcome::Written { receipt, report })
}

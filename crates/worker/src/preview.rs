use aqicast_core::backfill::fetch_day;
use aqicast_core::dataset::reconcile;
use aqicast_core::ingest::types::HISTORICAL_DATE;
use aqicast_core::ingest::{HistoricalRecord, ReadingFetcher};
use aqicast_core::time::calendar;
use anyhow::Context;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;

pub async fn print_features(
    fetcher: &dyn ReadingFetcher,
    location: &str,
    credential: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let rows = fetch_day(fetcher, location, credential).await?;
    let total = rows.len();

    // The batch layout needs a backfill day; a live preview has none.
    let today = calendar::today_utc();
    let head: Vec<_> = rows
        .into_iter()
        .take(limit)
        .map(|record| HistoricalRecord {
            record,
            historical_date: today,
        })
        .collect();

    let batch = without_column(reconcile(head).to_record_batch()?, HISTORICAL_DATE)?;
    let table = pretty_format_batches(&[batch]).context("formatting feature table")?;
    println!("{table}");

    tracing::info!(location, rows = total, shown = total.min(limit), "flattened feed payload");
    Ok(())
}

pub async fn print_raw(
    fetcher: &dyn ReadingFetcher,
    location: &str,
    credential: &str,
) -> anyhow::Result<()> {
    let raw = fetcher.fetch(location, credential).await?;
    let pretty = serde_json::to_string_pretty(&raw).context("serializing raw payload")?;
    println!("{pretty}");
    Ok(())
}

fn without_column(batch: RecordBatch, name: &str) -> anyhow::Result<RecordBatch> {
    let schema = batch.schema();
    let Ok(drop) = schema.index_of(name) else {
        return Ok(batch);
    };
    let keep: Vec<usize> = (0..schema.fields().len()).filter(|&i| i != drop).collect();
    batch
        .project(&keep)
        .with_context(|| format!("dropping column {name}"))
}

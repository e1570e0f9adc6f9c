pub mod sink;

use crate::ingest::types::{
    HistoricalRecord, AQI, CURRENT_COLUMNS, DOMINANT_POLLUTANT, FORECAST_AVG, FORECAST_COLUMNS,
    FORECAST_DATE, FORECAST_MAX, FORECAST_MIN, HISTORICAL_DATE, LATITUDE, LONGITUDE, POLLUTANT,
    TIMESTAMP,
};
use crate::time::calendar::format_date;
use anyhow::Context;
use arrow::array::{ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Date32Type, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::collections::HashSet;
use std::sync::Arc;

/// Rows from many payloads under one column layout. Pollutant columns are
/// the union of every `iaqi` key seen, in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledBatch {
    pub pollutant_columns: Vec<String>,
    pub records: Vec<HistoricalRecord>,
}

pub fn reconcile(records: Vec<HistoricalRecord>) -> ReconciledBatch {
    let mut seen = HashSet::new();
    let mut pollutant_columns = Vec::new();
    for rec in &records {
        for (code, _) in &rec.record.current.pollutants {
            if seen.insert(code.as_str()) {
                pollutant_columns.push(code.clone());
            }
        }
    }

    ReconciledBatch {
        pollutant_columns,
        records,
    }
}

impl ReconciledBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        CURRENT_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.pollutant_columns.iter().cloned())
            .chain(FORECAST_COLUMNS.iter().map(|c| c.to_string()))
            .chain(std::iter::once(HISTORICAL_DATE.to_string()))
            .collect()
    }

    pub fn schema(&self) -> Schema {
        let mut fields = vec![
            Field::new(TIMESTAMP, DataType::Utf8, true),
            Field::new(LATITUDE, DataType::Float64, true),
            Field::new(LONGITUDE, DataType::Float64, true),
            Field::new(AQI, DataType::Float64, true),
            Field::new(DOMINANT_POLLUTANT, DataType::Utf8, true),
        ];
        fields.extend(
            self.pollutant_columns
                .iter()
                .map(|c| Field::new(c.as_str(), DataType::Float64, true)),
        );
        fields.extend([
            Field::new(FORECAST_DATE, DataType::Date32, false),
            Field::new(POLLUTANT, DataType::Utf8, false),
            Field::new(FORECAST_AVG, DataType::Float64, true),
            Field::new(FORECAST_MIN, DataType::Float64, true),
            Field::new(FORECAST_MAX, DataType::Float64, true),
            Field::new(HISTORICAL_DATE, DataType::Utf8, false),
        ]);
        Schema::new(fields)
    }

    pub fn to_record_batch(&self) -> anyhow::Result<RecordBatch> {
        let rows = &self.records;
        let floats = |f: fn(&HistoricalRecord) -> Option<f64>| -> ArrayRef {
            Arc::new(rows.iter().map(f).collect::<Float64Array>())
        };

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(
                rows.iter()
                    .map(|r| r.record.current.timestamp.as_deref())
                    .collect::<StringArray>(),
            ),
            floats(|r| r.record.current.latitude),
            floats(|r| r.record.current.longitude),
            floats(|r| r.record.current.aqi),
            Arc::new(
                rows.iter()
                    .map(|r| r.record.current.dominant_pollutant.as_deref())
                    .collect::<StringArray>(),
            ),
        ];

        for code in &self.pollutant_columns {
            columns.push(Arc::new(
                rows.iter()
                    .map(|r| r.record.current.pollutant(code))
                    .collect::<Float64Array>(),
            ));
        }

        columns.push(Arc::new(Date32Array::from_iter_values(
            rows.iter()
                .map(|r| Date32Type::from_naive_date(r.record.forecast_date)),
        )));
        columns.push(Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.record.pollutant.as_str()),
        )));
        columns.push(floats(|r| r.record.forecast_avg));
        columns.push(floats(|r| r.record.forecast_min));
        columns.push(floats(|r| r.record.forecast_max));
        columns.push(Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| format_date(r.historical_date)),
        )));

        RecordBatch::try_new(Arc::new(self.schema()), columns)
            .context("building reconciled record batch")
    }
}

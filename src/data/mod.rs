use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDate;

use crate::core::{LedgerSnapshot, PriceSeries, Result, SimError};

#[derive(Debug, Clone, PartialEq)]
pub struct CsvOptions {
    pub date_column: String,
    pub price_column: String,
    pub date_format: String,
    /// Multiplier applied to every price before validation, e.g. to turn index
    /// points into currency per unit.
    pub currency_scale: f64,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            date_column: "Date".to_string(),
            price_column: "Price".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            currency_scale: 1.0,
        }
    }
}

pub fn load_prices_csv_path(path: impl AsRef<Path>, options: &CsvOptions) -> Result<PriceSeries> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| SimError::Ingest(format!("open {}: {e}", path.display())))?;
    load_prices_csv(file, options)
}

pub fn load_prices_csv<R: Read>(reader: R, options: &CsvOptions) -> Result<PriceSeries> {
    if !options.currency_scale.is_finite() || options.currency_scale <= 0.0 {
        return Err(SimError::invalid_configuration(
            "currency_scale",
            format!("must be a positive number, got {}", options.currency_scale),
        ));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| SimError::Ingest(format!("read header row: {e}")))?
        .clone();
    let date_idx = column_index(&headers, &options.date_column)?;
    let price_idx = column_index(&headers, &options.price_column)?;

    let mut points = Vec::new();
    for (row, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| SimError::Ingest(format!("row {}: {e}", row + 1)))?;
        if rec.iter().all(str::is_empty) {
            continue;
        }

        let raw_date = rec.get(date_idx).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, &options.date_format).map_err(|e| {
            SimError::Ingest(format!(
                "row {}: date {raw_date:?} does not match {:?}: {e}",
                row + 1,
                options.date_format
            ))
        })?;

        let raw_price = rec.get(price_idx).unwrap_or_default();
        let price = raw_price
            .replace(',', "")
            .parse::<f64>()
            .map_err(|e| SimError::Ingest(format!("row {}: price {raw_price:?}: {e}", row + 1)))?;

        points.push((date, price * options.currency_scale));
    }

    PriceSeries::from_points(points)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| SimError::Ingest(format!("missing column {name:?}")))
}

pub fn write_ledger_csv<W: Write>(writer: W, snapshots: &[LedgerSnapshot]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let to_export = |e: csv::Error| SimError::Export(e.to_string());

    wtr.write_record([
        "period_index",
        "date",
        "price",
        "contribution",
        "shares_acquired",
        "shares_owned",
        "available_cash",
        "total_contributed",
        "asset_value",
    ])
    .map_err(to_export)?;

    for snap in snapshots {
        wtr.write_record([
            snap.period_index.to_string(),
            snap.date.to_string(),
            snap.price.to_string(),
            snap.contribution.to_string(),
            snap.shares_acquired.to_string(),
            snap.shares_owned.to_string(),
            snap.available_cash.to_string(),
            snap.total_contributed.to_string(),
            snap.asset_value.to_string(),
        ])
        .map_err(to_export)?;
    }

    wtr.flush()
        .map_err(|e| SimError::Export(format!("flush: {e}")))
}

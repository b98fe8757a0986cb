use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer};
use std::io::Write;
use std::path::Path;

use crate::signal::ChannelSeries;
use crate::timebase::MergedTable;

/// Load a `time,value` channel export. The time column may also be called
/// `timestamp`; an empty or `nan` value is a gap.
pub fn read_channel_csv(path: &Path) -> Result<ChannelSeries> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let time_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("time") || h.eq_ignore_ascii_case("timestamp"))
        .context("missing time column")?;
    let value_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("value"))
        .or_else(|| (0..headers.len()).find(|&i| i != time_idx))
        .context("missing value column")?;

    let mut timestamps = Vec::new();
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading record {}", row + 1))?;
        let time_str = record.get(time_idx).unwrap_or_default();
        let t: f64 = time_str
            .parse()
            .with_context(|| format!("parsing time {:?} in record {}", time_str, row + 1))?;
        let value_str = record.get(value_idx).unwrap_or_default();
        let value = if value_str.is_empty() {
            f64::NAN
        } else {
            value_str
                .parse()
                .with_context(|| format!("parsing value {:?} in record {}", value_str, row + 1))?
        };
        timestamps.push(t);
        values.push(value);
    }
    ChannelSeries::new(timestamps, values)
        .with_context(|| format!("invalid channel in {}", path.display()))
}

pub fn write_channel_csv(path: &Path, series: &ChannelSeries) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["time", "value"])?;
    for (t, v) in series.iter() {
        writer.write_record([t.to_string(), format_value(Some(v))])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the table as `time,<channel>...` with empty cells for gaps.
pub fn write_table_csv<W: Write>(out: W, table: &MergedTable) -> Result<()> {
    let mut writer = Writer::from_writer(out);
    let names: Vec<&str> = table.channel_names().collect();
    let mut header = vec!["time"];
    header.extend(names.iter().copied());
    writer.write_record(&header)?;

    let columns: Vec<&[Option<f64>]> = names
        .iter()
        .filter_map(|name| table.column(name))
        .collect();
    for (row, t) in table.timestamps().iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(t.to_string());
        record.extend(columns.iter().map(|column| format_value(column[row])));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}

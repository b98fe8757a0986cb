//! Common time base for channels recorded at different rates.
//!
//! [`align`] performs an outer join on exact timestamps: the merged axis is
//! the sorted union of all channel timestamps and a channel without a sample
//! at some timestamp holds a gap there. Gap filling is a separate, explicit
//! step ([`MergedTable::fill_gaps`]) meant for display and playback only;
//! detection always runs on the real samples.
use crate::error::{Result, VitalsError};
use crate::signal::ChannelSeries;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;

/// Channels keyed by name.
pub type Channels = BTreeMap<String, ChannelSeries>;

/// Channels merged onto one shared, strictly increasing timestamp axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedTable {
    timestamps: Vec<f64>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

/// Outer-join `channels` on timestamp. Non-finite values become gaps.
pub fn align(channels: &Channels) -> MergedTable {
    let mut axis: Vec<f64> = channels
        .values()
        .flat_map(|series| series.timestamps().iter().copied())
        .collect();
    sort_dedup(&mut axis);
    let columns = channels
        .iter()
        .map(|(name, series)| (name.clone(), scatter_series(&axis, series)))
        .collect();
    MergedTable {
        timestamps: axis,
        columns,
    }
}

impl MergedTable {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    fn require(&self, name: &str) -> Result<&[Option<f64>]> {
        self.column(name)
            .ok_or_else(|| VitalsError::MissingChannel(name.to_string()))
    }

    /// Rows where `name` has a real value, with those values.
    pub fn present(&self, name: &str) -> Result<(Vec<usize>, Vec<f64>)> {
        Ok(self
            .require(name)?
            .iter()
            .enumerate()
            .filter_map(|(row, v)| v.map(|v| (row, v)))
            .unzip())
    }

    /// Column `name` as a dense slice with NaN in the gaps.
    pub fn dense(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self
            .require(name)?
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    }

    /// Column `name` with interior gaps linearly interpolated in time between
    /// the nearest real values. Leading and trailing gaps stay gaps.
    pub fn interpolated(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self.require(name)?;
        let mut out = column.to_vec();
        let mut last_known: Option<usize> = None;
        for (row, value) in column.iter().enumerate() {
            let Some(value) = value else { continue };
            if let Some(prev) = last_known {
                if row > prev + 1 {
                    let (t0, t1) = (self.timestamps[prev], self.timestamps[row]);
                    let v0 = out[prev].unwrap_or(*value);
                    for gap in prev + 1..row {
                        let frac = (self.timestamps[gap] - t0) / (t1 - t0);
                        out[gap] = Some(v0 + (value - v0) * frac);
                    }
                }
            }
            last_known = Some(row);
        }
        Ok(out)
    }

    /// New table with every column interpolated, for dense playback.
    ///
    /// Columns named in `markers` hold point events rather than a sampled
    /// signal and are copied unchanged.
    pub fn fill_gaps(&self, markers: &[&str]) -> MergedTable {
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| {
                let filled = if markers.contains(&name.as_str()) {
                    column.clone()
                } else {
                    self.interpolated(name)
                        .unwrap_or_else(|_| vec![None; self.len()])
                };
                (name.clone(), filled)
            })
            .collect();
        MergedTable {
            timestamps: self.timestamps.clone(),
            columns,
        }
    }

    /// New table holding this table's rows and columns plus `extra`, joined
    /// on timestamp. A channel in `extra` replaces a column of the same name.
    pub fn merge(&self, extra: &Channels) -> MergedTable {
        let mut axis = self.timestamps.clone();
        axis.extend(
            extra
                .values()
                .flat_map(|series| series.timestamps().iter().copied()),
        );
        sort_dedup(&mut axis);

        let mut columns = BTreeMap::new();
        for (name, column) in &self.columns {
            if extra.contains_key(name) {
                continue;
            }
            let pairs = self.timestamps.iter().copied().zip(column.iter().copied());
            columns.insert(name.clone(), scatter(&axis, pairs));
        }
        for (name, series) in extra {
            columns.insert(name.clone(), scatter_series(&axis, series));
        }
        MergedTable {
            timestamps: axis,
            columns,
        }
    }

    /// Rows in `range` (clamped to the table).
    pub fn slice_rows(&self, range: Range<usize>) -> MergedTable {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        MergedTable {
            timestamps: self.timestamps[start..end].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column[start..end].to_vec()))
                .collect(),
        }
    }

    /// Rows with `start_s <= t < end_s`.
    pub fn slice_time(&self, start_s: f64, end_s: f64) -> MergedTable {
        let start = self.timestamps.partition_point(|t| *t < start_s);
        let end = self.timestamps.partition_point(|t| *t < end_s);
        self.slice_rows(start..end.max(start))
    }
}

fn sort_dedup(axis: &mut Vec<f64>) {
    axis.sort_by(f64::total_cmp);
    axis.dedup();
}

fn scatter_series(axis: &[f64], series: &ChannelSeries) -> Vec<Option<f64>> {
    scatter(
        axis,
        series.iter().map(|(t, v)| (t, v.is_finite().then_some(v))),
    )
}

/// Place ascending `(timestamp, value)` pairs onto `axis`, which contains
/// every one of those timestamps.
fn scatter(axis: &[f64], pairs: impl Iterator<Item = (f64, Option<f64>)>) -> Vec<Option<f64>> {
    let mut column = vec![None; axis.len()];
    let mut row = 0;
    for (t, value) in pairs {
        while axis[row] < t {
            row += 1;
        }
        column[row] = value;
    }
    column
}

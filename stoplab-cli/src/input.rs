//! Bar file loading.
//!
//! CSV with a header row: `time,open,high,low,close,volume,signal[,atr]`.
//! `time` is RFC 3339 or a plain `YYYY-MM-DD` date (midnight UTC).
//! `signal` is `long`, `short` or `flat` (also `buy`/`sell`, `enter_long`/
//! `enter_short`, `none`, `1`, `-1`, `0`).

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::path::Path;
use stoplab_core::domain::{Bar, Signal, SignalDirection};

#[derive(Debug, Deserialize)]
struct Row {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    signal: String,
    #[serde(default)]
    atr: Option<f64>,
}

/// Bars with the signal each one produced.
#[derive(Debug, Clone, Default)]
pub struct BarFile {
    pub bars: Vec<Bar>,
    pub signals: Vec<Signal>,
}

pub fn load_bar_file(path: &Path) -> Result<BarFile> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_rows(&mut reader).with_context(|| format!("in {}", path.display()))
}

fn read_rows<R: std::io::Read>(reader: &mut csv::Reader<R>) -> Result<BarFile> {
    let mut file = BarFile::default();
    for (line, row) in reader.deserialize::<Row>().enumerate() {
        // header is line 1
        let row = row.with_context(|| format!("line {}", line + 2))?;
        let time = parse_time(&row.time).with_context(|| format!("line {}", line + 2))?;
        let direction = parse_direction(&row.signal).with_context(|| format!("line {}", line + 2))?;

        file.bars
            .push(Bar::new(time, row.open, row.high, row.low, row.close, row.volume));
        let signal = Signal::new(direction);
        file.signals.push(match row.atr {
            Some(atr) => signal.with_atr(atr),
            None => signal,
        });
    }
    Ok(file)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid time '{s}'"))?;
    match date.and_hms_opt(0, 0, 0) {
        Some(dt) => Ok(dt.and_utc()),
        None => bail!("invalid time '{s}'"),
    }
}

fn parse_direction(s: &str) -> Result<SignalDirection> {
    s.parse::<SignalDirection>().map_err(anyhow::Error::msg)
}

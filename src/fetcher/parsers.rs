use crate::fetcher::FetchError;
use crate::models::{DailySeries, Ohlcv, SeriesMeta, TimeSeries};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const SERIES_KEY: &str = "Time Series (Daily)";
const META_KEY: &str = "Meta Data";
const ERROR_KEY: &str = "Error Message";
/// Both keys carry throttle notices; newer responses use "Information".
const RATE_LIMIT_KEYS: [&str; 2] = ["Note", "Information"];

// ── Raw bar ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawDailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

// ── Field parsers ─────────────────────────────────────────────────────────────

/// "100.5000" → 100.5. Rejects blanks and non-finite values.
pub fn parse_price(s: &str) -> Option<f64> {
    let v: f64 = s.trim().parse().ok()?;
    v.is_finite().then_some(v)
}

/// "1000000" → 1000000. A trailing ".0" is tolerated; negatives are not.
pub fn parse_volume(s: &str) -> Option<i64> {
    let s = s.trim();
    let s = s.strip_suffix(".0").unwrap_or(s);
    s.parse().ok().filter(|v: &i64| *v >= 0)
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

// ── Response classification ───────────────────────────────────────────────────

/// Classify a provider body and parse the daily series out of it.
///
/// Checked in order: error message, throttle notice, missing series key,
/// then every bar. The first failure wins and nothing partial is returned.
pub fn parse_daily_response(body: &str) -> Result<DailySeries, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("invalid JSON: {}", e)))?;

    let Value::Object(mut obj) = value else {
        return Err(FetchError::Malformed("response is not a JSON object".into()));
    };

    if let Some(msg) = obj.get(ERROR_KEY) {
        return Err(FetchError::Provider(text_of(msg)));
    }

    for key in RATE_LIMIT_KEYS {
        if let Some(note) = obj.get(key) {
            return Err(FetchError::RateLimited(text_of(note)));
        }
    }

    let Some(raw_series) = obj.remove(SERIES_KEY) else {
        return Err(FetchError::MissingSeries(keys_of(&obj)));
    };

    let meta = obj
        .remove(META_KEY)
        .and_then(|m| serde_json::from_value::<SeriesMeta>(m).ok());

    let raw: BTreeMap<String, RawDailyBar> = serde_json::from_value(raw_series)
        .map_err(|e| FetchError::Malformed(format!("{}: {}", SERIES_KEY, e)))?;

    Ok(DailySeries {
        meta,
        series: clean_series(raw)?,
    })
}

fn clean_series(raw: BTreeMap<String, RawDailyBar>) -> Result<TimeSeries, FetchError> {
    let mut series = TimeSeries::new();

    for (date_str, bar) in raw {
        let date = parse_date(&date_str)
            .ok_or_else(|| FetchError::Malformed(format!("bad date key {:?}", date_str)))?;

        let price = |field: &str, s: &str| {
            parse_price(s)
                .ok_or_else(|| FetchError::Malformed(format!("{}: bad {} {:?}", date, field, s)))
        };

        let ohlcv = Ohlcv {
            open: price("open", &bar.open)?,
            high: price("high", &bar.high)?,
            low: price("low", &bar.low)?,
            close: price("close", &bar.close)?,
            volume: parse_volume(&bar.volume).ok_or_else(|| {
                FetchError::Malformed(format!("{}: bad volume {:?}", date, bar.volume))
            })?,
        };

        series.insert(date, ohlcv);
    }

    Ok(series)
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn keys_of(obj: &Map<String, Value>) -> String {
    if obj.is_empty() {
        return "empty object".to_string();
    }
    let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    format!("keys: {}", keys.join(", "))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Display helpers for prices, percentages and chart timestamps.

use chrono::{DateTime, TimeZone, Utc};

/// Compact dollar amount: `$1.23B`, `$4.56M`, `$7.89K`, `$1.00`.
/// Missing values render as `N/A`.
pub fn format_currency(value: Option<f64>, decimals: usize) -> String {
  let Some(value) = value else {
    return "N/A".to_string();
  };

  if value > 1_000_000_000.0 {
    format!("${:.*}B", decimals, value / 1_000_000_000.0)
  } else if value > 1_000_000.0 {
    format!("${:.*}M", decimals, value / 1_000_000.0)
  } else if value > 1_000.0 {
    format!("${:.*}K", decimals, value / 1_000.0)
  } else {
    format!("${:.*}", decimals, value)
  }
}

pub fn format_percentage(value: Option<f64>) -> String {
  match value {
    Some(value) => format!("{:.2}%", value),
    None => "N/A".to_string(),
  }
}

/// Calendar date for a millisecond timestamp, in the given zone.
pub fn format_chart_date<Tz: TimeZone>(timestamp_ms: f64, tz: &Tz) -> String
where
  Tz::Offset: std::fmt::Display,
{
  match DateTime::<Utc>::from_timestamp_millis(timestamp_ms as i64) {
    Some(utc) => utc.with_timezone(tz).format("%Y-%m-%d").to_string(),
    None => "N/A".to_string(),
  }
}

/// Supply figures with thousands separators and no decimals.
pub fn format_supply(value: Option<f64>) -> String {
  let Some(value) = value else {
    return "N/A".to_string();
  };
  let digits = format!("{:.0}", value.abs());
  let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, ch) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(ch);
  }
  if value < 0.0 {
    grouped.insert(0, '-');
  }
  grouped
}

//! Date and amount decoding shared by all format adapters
//!
//! Export files disagree on how dates and amounts are written. These helpers
//! accept the shapes seen in the wild and produce canonical values:
//! dates as [`NaiveDate`], amounts as an absolute decimal plus a sign flag.

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Canonical time layout used in the normalized table
pub const TRANSACTION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Decode a date in one of the supported shapes
///
/// - `DD.MM.YYYY` / `DD.MM.YY` (dot separated, day first)
/// - `MM/DD/YYYY` / `MM/DD/YY` (slash separated, US order)
/// - `YYYY-MM-DD` (dash separated with a 4-digit first part)
/// - `MM-DD-YY` (dash separated, any other first part)
///
/// Two-digit years of 70 and above map to 19xx, the rest to 20xx.
pub fn decode_date(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    let invalid = || Error::Import(format!("Invalid date format: {}", raw));

    let (separator, day_first) = if s.contains('.') {
        ('.', true)
    } else if s.contains('/') {
        ('/', false)
    } else if s.contains('-') {
        ('-', false)
    } else {
        return Err(invalid());
    };

    let parts: Vec<&str> = s.split(separator).map(str::trim).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid());
    }

    let (year, month, day) = if day_first {
        (parts[2], parts[1], parts[0])
    } else if separator == '-' && parts[0].len() == 4 {
        (parts[0], parts[1], parts[2])
    } else {
        (parts[2], parts[0], parts[1])
    };

    let year: i32 = match year.len() {
        2 => {
            let short: i32 = year.parse().map_err(|_| invalid())?;
            if short >= 70 {
                1900 + short
            } else {
                2000 + short
            }
        }
        4 => year.parse().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Format a decoded date as a normalized transaction time (midnight)
pub fn format_transaction_time(date: NaiveDate) -> String {
    format!("{} 00:00:00", date.format("%Y-%m-%d"))
}

/// Parse a UTC offset into minutes east of UTC
///
/// Without a format, accepts `Z`, `UTC`, `+03:00`, `+0300` and `-05`.
/// With a format, the value is parsed with chrono's offset specifiers (`%z`, `%:z`).
pub fn parse_utc_offset(raw: &str, format: Option<&str>) -> Result<i32> {
    let s = raw.trim();
    let invalid = || Error::Import(format!("Invalid timezone: {}", raw));

    if let Some(fmt) = format.filter(|f| !f.is_empty()) {
        let parsed = chrono::DateTime::parse_from_str(
            &format!("2000-01-01 00:00:00 {}", s),
            &format!("%Y-%m-%d %H:%M:%S {}", fmt),
        )
        .map_err(|_| invalid())?;
        return Ok(parsed.offset().local_minus_utc() / 60);
    }

    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(0);
    }

    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.as_str(), "0"),
        4 => (&digits[..2], &digits[2..]),
        _ => return Err(invalid()),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes >= 60 {
        return Err(invalid());
    }

    Ok(sign * (hours * 60 + minutes))
}

/// Format minutes east of UTC as `+HH:MM`
pub fn format_utc_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.abs();
    format!("{}{:02}:{:02}", sign, abs / 60, abs % 60)
}

/// Number formatting conventions of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountFormat {
    pub decimal_separator: char,
    /// Digit grouping symbol removed before parsing (whitespace is always removed)
    pub grouping_symbol: Option<char>,
}

impl Default for AmountFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_symbol: Some(','),
        }
    }
}

/// A decoded amount: absolute value and original sign
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedAmount {
    /// Absolute value, rounded to two decimal places
    pub value: f64,
    pub is_negative: bool,
}

impl DecodedAmount {
    /// Absolute value in minor units (cents)
    pub fn minor_units(&self) -> i64 {
        (self.value * 100.0).round() as i64
    }

    /// Absolute value as a decimal string without trailing zeros
    pub fn to_decimal_string(&self) -> String {
        format!("{}", self.value)
    }
}

/// Decode an amount with the default `.` decimal / `,` grouping convention
pub fn decode_amount(raw: &str) -> Result<DecodedAmount> {
    decode_amount_with(raw, &AmountFormat::default())
}

/// Decode an amount
///
/// - `(264)` is positive, `(-559.08)` and `-(559.08)` are negative
/// - a leading `-` marks a debit, a leading `+` is dropped
/// - whitespace and the grouping symbol are removed before parsing
/// - an empty string decodes to zero
pub fn decode_amount_with(raw: &str, format: &AmountFormat) -> Result<DecodedAmount> {
    let invalid = || Error::Import(format!("Invalid amount: {}", raw));

    let mut s = raw.trim();
    if s.is_empty() {
        return Ok(DecodedAmount {
            value: 0.0,
            is_negative: false,
        });
    }

    let mut is_negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        is_negative = true;
        s = rest.trim_start();
    }

    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        s = s[1..s.len() - 1].trim();
    }

    if let Some(rest) = s.strip_prefix('-') {
        is_negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && Some(*c) != format.grouping_symbol)
        .map(|c| if c == format.decimal_separator { '.' } else { c })
        .collect();

    let digits_only = !cleaned.is_empty()
        && cleaned.chars().all(|c| c.is_ascii_digit() || c == '.')
        && cleaned.chars().filter(|c| *c == '.').count() <= 1
        && cleaned.chars().any(|c| c.is_ascii_digit());
    if !digits_only {
        return Err(invalid());
    }

    let value: f64 = cleaned.parse().map_err(|_| invalid())?;

    Ok(DecodedAmount {
        value: (value * 100.0).round() / 100.0,
        is_negative,
    })
}

/// Format a minor-unit count as a decimal string (`55908` -> `559.08`, `1400000` -> `14000`)
pub fn format_minor_units(units: i64) -> String {
    let abs = units.unsigned_abs();
    let whole = abs / 100;
    let cents = abs % 100;
    let sign = if units < 0 { "-" } else { "" };
    match cents {
        0 => format!("{}{}", sign, whole),
        c if c % 10 == 0 => format!("{}{}.{}", sign, whole, c / 10),
        c => format!("{}{}.{:02}", sign, whole, c),
    }
}

/// Parse a normalized decimal amount (`"559.08"`) into minor units
pub fn parse_minor_units(s: &str) -> Result<i64> {
    let decoded = decode_amount_with(
        s,
        &AmountFormat {
            decimal_separator: '.',
            grouping_symbol: None,
        },
    )?;
    let units = decoded.minor_units();
    Ok(if decoded.is_negative { -units } else { units })
}

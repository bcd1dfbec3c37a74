use crate::error::{FpaError, Result};
use chrono::{Datelike, NaiveDate};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month, serialized as `YYYY-MM`.
///
/// Ordering is chronological and agrees with the lexical order of the
/// string form. All arithmetic is plain year/month carry arithmetic so no
/// timezone or day-of-month can shift a result into the wrong month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(FpaError::InvalidPeriod(format!(
                "month {} out of range in {}-{:02}",
                month, year, month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn add_months(&self, months: i32) -> Self {
        Self::from_index(self.index() + months as i64)
    }

    pub fn next(&self) -> Self {
        self.add_months(1)
    }

    pub fn prev(&self) -> Self {
        self.add_months(-1)
    }

    /// Signed number of months from `self` to `other`.
    pub fn months_until(&self, other: Period) -> i32 {
        (other.index() - self.index()) as i32
    }

    /// Same calendar month, one year earlier.
    pub fn prior_year(&self) -> Self {
        Self {
            year: self.year - 1,
            month: self.month,
        }
    }

    /// Calendar quarter, 1..=4.
    pub fn quarter(&self) -> u32 {
        (self.month - 1) / 3 + 1
    }

    pub fn quarter_start(&self) -> Self {
        Self {
            year: self.year,
            month: (self.quarter() - 1) * 3 + 1,
        }
    }

    /// First month of the fiscal year that contains this period.
    pub fn fiscal_year_start(&self, fiscal_year_end_month: u32) -> Self {
        let start_month = if fiscal_year_end_month == 12 {
            1
        } else {
            fiscal_year_end_month + 1
        };

        if self.month >= start_month {
            Self {
                year: self.year,
                month: start_month,
            }
        } else {
            Self {
                year: self.year - 1,
                month: start_month,
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Accepts `YYYY-MM`, or a full `YYYY-MM-DD` date whose day is ignored.
impl FromStr for Period {
    type Err = FpaError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let date = if trimmed.len() > 7 {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        } else {
            NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d")
        }
        .map_err(|_| {
            FpaError::InvalidPeriod(format!("'{}'. Expected YYYY-MM or YYYY-MM-DD", s))
        })?;

        Ok(Self::from_date(date))
    }
}

impl TryFrom<String> for Period {
    type Error = FpaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl JsonSchema for Period {
    fn schema_name() -> String {
        "Period".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        let mut schema = String::json_schema(gen).into_object();
        schema.string().pattern = Some(r"^\d{4}-\d{2}(-\d{2})?$".to_string());
        schema.metadata().description =
            Some("Calendar month in YYYY-MM format (a YYYY-MM-DD date is accepted)".to_string());
        schema.into()
    }
}

/// Every period from `start` to `end` inclusive; empty when `end < start`.
pub fn periods_between(start: Period, end: Period) -> Vec<Period> {
    let count = start.months_until(end) + 1;
    if count <= 0 {
        return Vec::new();
    }
    (0..count).map(|offset| start.add_months(offset)).collect()
}

/// Inclusive number of calendar months from `start` to `end`, 0 when reversed.
pub fn month_count(start: Period, end: Period) -> usize {
    (start.months_until(end) + 1).max(0) as usize
}

pub fn validate_fiscal_year_end_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(FpaError::InvalidFiscalYearEndMonth(month));
    }
    Ok(())
}

/// Rounds to the nearest whole currency unit, halves away from zero.
///
/// Only applied when a value is materialized or displayed, never while
/// accumulating sums.
pub fn round_currency(value: f64) -> f64 {
    value.round()
}

/// Whole-unit display with thousands separators, e.g. `-1,234,568`.
pub fn format_amount(value: f64) -> String {
    let rounded = round_currency(value);
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

use crate::error::{FpaError, Result};
use crate::schema::FinancialRecord;
use crate::utils::Period;
use csv::{ReaderBuilder, Trim};
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// One imported historical fact. Becomes an Actual record with no plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActualRow {
    pub period: Period,
    pub account_code: String,
    #[serde(default)]
    pub cost_center_code: String,
    #[serde(default)]
    pub product_line_code: String,
    pub amount: f64,
}

impl ActualRow {
    pub fn to_record(&self) -> FinancialRecord {
        FinancialRecord::actual(
            self.period,
            self.account_code.clone(),
            self.cost_center_code.clone(),
            self.product_line_code.clone(),
            self.amount,
        )
    }
}

/// Reads `period,accountCode,costCenterCode,productLineCode,amount` rows.
///
/// The header row is required; column order follows the header.
pub fn read_actuals_csv<R: Read>(reader: R) -> Result<Vec<ActualRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, result) in rdr.deserialize::<ActualRow>().enumerate() {
        let row = result.map_err(|e| FpaError::ImportError {
            line: e.position().map(|p| p.line()).unwrap_or(idx as u64 + 2),
            details: e.to_string(),
        })?;

        if row.account_code.is_empty() {
            return Err(FpaError::ImportError {
                line: idx as u64 + 2,
                details: "account code is empty".to_string(),
            });
        }
        rows.push(row);
    }

    debug!("Parsed {} actual rows from CSV", rows.len());
    Ok(rows)
}

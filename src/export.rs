use crate::error::Result;
use crate::registry::DimensionRegistry;
use crate::schema::{DimensionMapping, FinancialRecord};
use csv::Writer;
use log::debug;
use std::io::Write;

const HEADER: [&str; 11] = [
    "period",
    "type",
    "plan",
    "account",
    "account_external",
    "category",
    "cost_center",
    "cost_center_external",
    "product_line",
    "product_line_external",
    "amount",
];

/// Writes records as CSV with the registry's external mapping codes.
///
/// Read-only: records are written in period order without touching the
/// caller's collection. Unmapped codes export an empty external code.
pub fn records_to_csv<W: Write>(
    records: &[FinancialRecord],
    registry: &DimensionRegistry,
    writer: W,
) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(HEADER)?;

    let mut ordered: Vec<&FinancialRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.period
            .cmp(&b.period)
            .then_with(|| a.account_code.cmp(&b.account_code))
    });

    for record in &ordered {
        let account = registry.account(&record.account_code);
        wtr.write_record([
            record.period.to_string(),
            format!("{:?}", record.record_type),
            record.plan_id.clone().unwrap_or_default(),
            record.account_code.clone(),
            external(account),
            account
                .and_then(|a| a.category)
                .map(|c| c.label().to_string())
                .unwrap_or_default(),
            record.cost_center_code.clone(),
            external(registry.cost_center(&record.cost_center_code)),
            record.product_line_code.clone(),
            external(registry.product_line(&record.product_line_code)),
            format!("{:.2}", record.amount),
        ])?;
    }

    wtr.flush()?;
    debug!("Exported {} records to CSV", ordered.len());
    Ok(())
}

fn external(mapping: Option<&DimensionMapping>) -> String {
    mapping.map(|m| m.external_code.clone()).unwrap_or_default()
}

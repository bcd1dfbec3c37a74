use crate::schema::{FinancialRecord, RiskOpportunity};
use crate::utils::Period;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CellKey {
    period: Period,
    plan_id: String,
    account_code: String,
    cost_center_code: String,
    product_line_code: String,
}

impl CellKey {
    fn of(record: &FinancialRecord) -> Option<Self> {
        Some(Self {
            period: record.period,
            plan_id: record.plan_id.clone()?,
            account_code: record.account_code.clone(),
            cost_center_code: record.cost_center_code.clone(),
            product_line_code: record.product_line_code.clone(),
        })
    }
}

/// One monthly amount an overlay placed on a plan record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverlayAdjustment {
    pub plan_id: String,
    pub entry_id: String,
    pub record_id: String,
    pub amount: f64,
    #[schemars(description = "True when the overlay created the record rather than adjusting an existing one.")]
    pub created: bool,
}

/// Superimposes the included risks and opportunities of `plan_id` onto a
/// copy of `base`.
///
/// Each entry's impact is spread evenly over `duration_months` consecutive
/// periods from its start. An existing plan record on the same cell absorbs
/// the monthly amount; otherwise a new Budget record is appended. `base` is
/// left untouched.
pub fn apply_risks_and_ops(
    base: &[FinancialRecord],
    register: &[RiskOpportunity],
    plan_id: &str,
) -> Vec<FinancialRecord> {
    overlay_with_adjustments(base, register, plan_id).0
}

/// Same as [`apply_risks_and_ops`], also returning every amount placed so
/// the overlay can later be taken back out with [`strip_adjustments`].
pub fn overlay_with_adjustments(
    base: &[FinancialRecord],
    register: &[RiskOpportunity],
    plan_id: &str,
) -> (Vec<FinancialRecord>, Vec<OverlayAdjustment>) {
    let mut working = base.to_vec();
    let mut adjustments = Vec::new();

    let mut cells: HashMap<CellKey, usize> = working
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| CellKey::of(record).map(|key| (key, idx)))
        .collect();

    let selected = register
        .iter()
        .filter(|entry| entry.included_in_budget && entry.plan_id == plan_id);

    let mut applied = 0usize;
    for entry in selected {
        let Some(account_code) = entry.impact_account_code.as_deref().filter(|c| !c.is_empty())
        else {
            warn!(
                "Skipping {:?} '{}' ({}): no impact account",
                entry.kind, entry.title, entry.id
            );
            continue;
        };

        if entry.validate().is_err() {
            warn!(
                "Skipping {:?} '{}' ({}): duration of {} months",
                entry.kind, entry.title, entry.id, entry.duration_months
            );
            continue;
        }

        let monthly_impact = entry.monthly_impact();
        let cost_center = entry.impact_scope.cost_center_code();
        let product_line = entry.impact_scope.product_line_code();

        for offset in 0..entry.duration_months {
            let period = entry.start_date.add_months(offset as i32);
            let key = CellKey {
                period,
                plan_id: plan_id.to_string(),
                account_code: account_code.to_string(),
                cost_center_code: cost_center.to_string(),
                product_line_code: product_line.to_string(),
            };

            let created = match cells.get(&key) {
                Some(&idx) => {
                    working[idx].amount += monthly_impact;
                    false
                }
                None => {
                    working.push(FinancialRecord::budget(
                        plan_id,
                        period,
                        account_code,
                        cost_center,
                        product_line,
                        monthly_impact,
                    ));
                    cells.insert(key.clone(), working.len() - 1);
                    true
                }
            };

            let idx = cells[&key];
            adjustments.push(OverlayAdjustment {
                plan_id: plan_id.to_string(),
                entry_id: entry.id.clone(),
                record_id: working[idx].id.clone(),
                amount: monthly_impact,
                created,
            });
        }
        applied += 1;
    }

    debug!(
        "Overlay for plan {}: {} entries applied, {} -> {} records",
        plan_id,
        applied,
        base.len(),
        working.len()
    );
    (working, adjustments)
}

/// Takes previously applied overlay amounts back out of `records`.
///
/// Records the overlay created are dropped; absorbed amounts are
/// subtracted. Adjustments whose record no longer exists are ignored.
pub fn strip_adjustments(
    records: &[FinancialRecord],
    adjustments: &[OverlayAdjustment],
) -> Vec<FinancialRecord> {
    let created: HashSet<&str> = adjustments
        .iter()
        .filter(|a| a.created)
        .map(|a| a.record_id.as_str())
        .collect();

    let mut absorbed: HashMap<&str, f64> = HashMap::new();
    for adjustment in adjustments.iter().filter(|a| !created.contains(a.record_id.as_str())) {
        *absorbed.entry(adjustment.record_id.as_str()).or_default() += adjustment.amount;
    }

    records
        .iter()
        .filter(|r| !created.contains(r.id.as_str()))
        .map(|r| {
            let mut record = r.clone();
            if let Some(amount) = absorbed.get(r.id.as_str()) {
                record.amount -= amount;
            }
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ImpactScope, RiskOpportunityStatus, RiskOpportunityType};

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn entry(kind: RiskOpportunityType, impact: f64, months: u32) -> RiskOpportunity {
        RiskOpportunity {
            id: "ro".to_string(),
            plan_id: "plan".to_string(),
            title: "Enterprise upsell".to_string(),
            description: String::new(),
            kind,
            estimated_impact: impact,
            status: RiskOpportunityStatus::Identified,
            owner: "CFO".to_string(),
            included_in_budget: true,
            start_date: p("2025-01"),
            duration_months: months,
            impact_account_code: Some("REV_SUB".to_string()),
            impact_scope: ImpactScope::ProductLine("PL_IOT".to_string()),
        }
    }

    #[test]
    fn test_opportunity_spreads_evenly() {
        let out = apply_risks_and_ops(&[], &[entry(RiskOpportunityType::Opportunity, 1200.0, 12)], "plan");

        assert_eq!(out.len(), 12);
        for (i, record) in out.iter().enumerate() {
            assert_eq!(record.period, p("2025-01").add_months(i as i32));
            assert!((record.amount - 100.0).abs() < 1e-9);
            assert_eq!(record.product_line_code, "PL_IOT");
            assert_eq!(record.cost_center_code, "");
        }
        assert_eq!(out.last().unwrap().period, p("2025-12"));
    }

    #[test]
    fn test_risk_is_negative() {
        let out = apply_risks_and_ops(&[], &[entry(RiskOpportunityType::Risk, 1200.0, 12)], "plan");
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|r| (r.amount + 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_existing_cell_absorbs_impact_without_mutating_input() {
        let base = vec![
            FinancialRecord::budget("plan", p("2025-02"), "REV_SUB", "", "PL_IOT", 5000.0),
            FinancialRecord::budget("plan", p("2025-02"), "REV_SUB", "", "PL_ANL", 3000.0),
        ];
        let out = apply_risks_and_ops(&base, &[entry(RiskOpportunityType::Risk, 300.0, 3)], "plan");

        assert_eq!(base[0].amount, 5000.0);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].amount, 4900.0);
        assert_eq!(out[0].id, base[0].id);
        assert_eq!(out[1].amount, 3000.0);
        assert!(out[2..].iter().all(|r| r.amount == -100.0));
    }

    #[test]
    fn test_crosses_year_boundary() {
        let mut e = entry(RiskOpportunityType::Opportunity, 400.0, 4);
        e.start_date = p("2025-11");
        let out = apply_risks_and_ops(&[], &[e], "plan");
        let periods: Vec<String> = out.iter().map(|r| r.period.to_string()).collect();
        assert_eq!(periods, vec!["2025-11", "2025-12", "2026-01", "2026-02"]);
    }

    #[test]
    fn test_selection_rules() {
        let mut excluded = entry(RiskOpportunityType::Opportunity, 1200.0, 12);
        excluded.included_in_budget = false;

        let mut other_plan = entry(RiskOpportunityType::Opportunity, 1200.0, 12);
        other_plan.plan_id = "other".to_string();

        let mut no_account = entry(RiskOpportunityType::Opportunity, 1200.0, 12);
        no_account.impact_account_code = None;

        let mut zero_duration = entry(RiskOpportunityType::Opportunity, 1200.0, 12);
        zero_duration.duration_months = 0;

        let out = apply_risks_and_ops(&[], &[excluded, other_plan, no_account, zero_duration], "plan");
        assert!(out.is_empty());
    }

    #[test]
    fn test_actuals_are_never_adjusted() {
        let base = vec![FinancialRecord::actual(p("2025-01"), "REV_SUB", "", "PL_IOT", 777.0)];
        let out = apply_risks_and_ops(&base, &[entry(RiskOpportunityType::Opportunity, 100.0, 1)], "plan");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].amount, 777.0);
        assert_eq!(out[1].amount, 100.0);
        assert_eq!(out[1].plan_id.as_deref(), Some("plan"));
    }

    #[test]
    fn test_strip_restores_base() {
        let base = vec![
            FinancialRecord::budget("plan", p("2025-01"), "REV_SUB", "", "PL_IOT", 5000.0),
            FinancialRecord::actual(p("2025-01"), "REV_SUB", "", "PL_IOT", 4000.0),
        ];
        let (out, adjustments) =
            overlay_with_adjustments(&base, &[entry(RiskOpportunityType::Risk, 300.0, 3)], "plan");
        assert_eq!(out.len(), 4);
        assert_eq!(adjustments.len(), 3);
        assert!(!adjustments[0].created);
        assert!(adjustments[1..].iter().all(|a| a.created && a.entry_id == "ro"));

        let stripped = strip_adjustments(&out, &adjustments);
        assert_eq!(stripped, base);
    }
}

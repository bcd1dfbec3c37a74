use crate::error::{FpaError, Result};
use crate::schema::{FinancialRecord, ForecastAssumption, ForecastMethod, RecordType};
use crate::utils::{month_count, round_currency, Period};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ForecastSettings {
    #[schemars(description = "Account codes starting with this prefix count as revenue for PercentOfRevenue.")]
    pub revenue_account_prefix: String,

    #[schemars(description = "GrowthYearOverYear base when neither the history nor the assumption supplies one.")]
    pub default_fallback_value: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            revenue_account_prefix: "REV".to_string(),
            default_fallback_value: 0.0,
        }
    }
}

/// Projects Budget records for one assumption over a period range.
///
/// The engine holds only settings. Every call reads the records it is
/// given and returns fresh records; committing them is the store's job.
#[derive(Debug, Clone, Default)]
pub struct ForecastEngine {
    settings: ForecastSettings,
}

impl ForecastEngine {
    pub fn new(settings: ForecastSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    /// Generates one rounded Budget record per month of `start..=end`.
    ///
    /// Returns an empty vector when `end` is before `start`.
    ///
    /// `PercentOfRevenue` reads the plan's committed revenue Budget records
    /// from `records`, so revenue assumptions must be committed before any
    /// percent-of-revenue assumption of the same plan.
    pub fn generate_forecast(
        &self,
        assumption: &ForecastAssumption,
        records: &[FinancialRecord],
        start: Period,
        end: Period,
    ) -> Result<Vec<FinancialRecord>> {
        let months = month_count(start, end);
        if months == 0 {
            debug!(
                "Empty forecast range {}..{} for {}; nothing generated",
                start, end, assumption.account_code
            );
            return Ok(Vec::new());
        }

        let values: Vec<f64> = match assumption.method {
            ForecastMethod::Trend => {
                let history = self.history(assumption, records);
                project_trend(&history.values().copied().collect::<Vec<_>>(), months)
            }
            ForecastMethod::GrowthYearOverYear => {
                let history = self.history(assumption, records);
                self.project_growth(assumption, &history, start, months)
            }
            ForecastMethod::Manual => (0..months)
                .map(|i| {
                    let period = start.add_months(i as i32);
                    assumption
                        .parameters
                        .manual_values
                        .get(&period)
                        .copied()
                        .unwrap_or(0.0)
                })
                .collect(),
            ForecastMethod::PercentOfRevenue => {
                self.project_percent_of_revenue(assumption, records, start, months)
            }
            ForecastMethod::CustomFormula => {
                return Err(FpaError::UnsupportedMethod(assumption.method));
            }
        };

        let cost_center = assumption.cost_center_code.as_deref().unwrap_or("");
        let product_line = assumption.product_line_code.as_deref().unwrap_or("");

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                FinancialRecord::budget(
                    assumption.plan_id.clone(),
                    start.add_months(i as i32),
                    assumption.account_code.clone(),
                    cost_center,
                    product_line,
                    round_currency(value),
                )
            })
            .collect())
    }

    /// Actual amounts for the assumption's intersection, summed per period.
    ///
    /// A dimension the assumption leaves unscoped is not filtered on.
    fn history(
        &self,
        assumption: &ForecastAssumption,
        records: &[FinancialRecord],
    ) -> BTreeMap<Period, f64> {
        let mut history: BTreeMap<Period, f64> = BTreeMap::new();

        for record in records {
            if record.record_type != RecordType::Actual
                || record.account_code != assumption.account_code
            {
                continue;
            }
            if let Some(pl) = &assumption.product_line_code {
                if record.product_line_code != *pl {
                    continue;
                }
            }
            if let Some(cc) = &assumption.cost_center_code {
                if record.cost_center_code != *cc {
                    continue;
                }
            }
            *history.entry(record.period).or_default() += record.amount;
        }

        debug!(
            "History for {} ({:?}): {} periods",
            assumption.account_code,
            assumption.method,
            history.len()
        );
        history
    }

    fn project_growth(
        &self,
        assumption: &ForecastAssumption,
        history: &BTreeMap<Period, f64>,
        start: Period,
        months: usize,
    ) -> Vec<f64> {
        let growth_rate = assumption.parameters.growth_rate.unwrap_or(0.0);
        let fallback = assumption
            .parameters
            .fallback_value
            .unwrap_or(self.settings.default_fallback_value);

        let mut missing = 0usize;
        let values: Vec<f64> = (0..months)
            .map(|i| {
                let target = start.add_months(i as i32);
                let base = match history.get(&target.prior_year()) {
                    Some(amount) => *amount,
                    None => {
                        missing += 1;
                        fallback
                    }
                };
                base * (1.0 + growth_rate)
            })
            .collect();

        if missing > 0 {
            warn!(
                "{} of {} months for {} had no prior-year actual; used fallback {}",
                missing, months, assumption.account_code, fallback
            );
        }

        values
    }

    fn project_percent_of_revenue(
        &self,
        assumption: &ForecastAssumption,
        records: &[FinancialRecord],
        start: Period,
        months: usize,
    ) -> Vec<f64> {
        let percent = assumption.parameters.percent_of_revenue.unwrap_or(0.0);
        let prefix = self.settings.revenue_account_prefix.as_str();

        let mut revenue: BTreeMap<Period, f64> = BTreeMap::new();
        for record in records.iter().filter(|r| {
            r.record_type == RecordType::Budget
                && r.belongs_to_plan(&assumption.plan_id)
                && r.account_code.starts_with(prefix)
        }) {
            *revenue.entry(record.period).or_default() += record.amount;
        }

        if revenue.is_empty() {
            warn!(
                "No committed revenue budget in plan {} for {}; commit revenue first",
                assumption.plan_id, assumption.account_code
            );
        }

        (0..months)
            .map(|i| {
                let period = start.add_months(i as i32);
                revenue.get(&period).copied().unwrap_or(0.0) * percent
            })
            .collect()
    }
}

/// Ordinary least squares over `(i, values[i])`; returns `(slope, intercept)`.
pub fn linear_regression(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return (0.0, sum_y / n);
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    (slope, intercept)
}

/// Continues the fitted line past the history, never below zero.
///
/// With fewer than two points the single known value (or 0) is repeated.
pub fn project_trend(history: &[f64], months: usize) -> Vec<f64> {
    if history.len() < 2 {
        let flat = history.first().copied().unwrap_or(0.0);
        return vec![flat; months];
    }

    let (slope, intercept) = linear_regression(history);
    let n = history.len();
    (n..n + months)
        .map(|x| (slope * x as f64 + intercept).max(0.0))
        .collect()
}

pub fn generate_forecast(
    assumption: &ForecastAssumption,
    records: &[FinancialRecord],
    start: Period,
    end: Period,
) -> Result<Vec<FinancialRecord>> {
    ForecastEngine::default().generate_forecast(assumption, records, start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForecastParameters;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn actual(period: &str, account: &str, pl: &str, amount: f64) -> FinancialRecord {
        FinancialRecord::actual(p(period), account, "", pl, amount)
    }

    fn amounts(records: &[FinancialRecord]) -> Vec<f64> {
        records.iter().map(|r| r.amount).collect()
    }

    #[test]
    fn test_trend_on_linear_history() {
        let records = vec![
            actual("2025-03", "REV_SUB", "", 120.0),
            actual("2025-01", "REV_SUB", "", 100.0),
            actual("2025-02", "REV_SUB", "", 110.0),
        ];
        let assumption = ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::Trend);

        let out = generate_forecast(&assumption, &records, p("2025-04"), p("2025-05")).unwrap();
        assert_eq!(amounts(&out), vec![130.0, 140.0]);
        assert_eq!(out[0].period, p("2025-04"));
        assert_eq!(out[1].period, p("2025-05"));
        assert!(out.iter().all(|r| r.record_type == RecordType::Budget));
        assert!(out.iter().all(|r| r.plan_id.as_deref() == Some("plan")));
    }

    #[test]
    fn test_trend_clamps_at_zero() {
        let history = vec![300.0, 200.0, 100.0];
        let projected = project_trend(&history, 3);
        assert_eq!(projected, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_trend_with_short_history_is_flat() {
        assert_eq!(project_trend(&[250.0], 3), vec![250.0, 250.0, 250.0]);
        assert_eq!(project_trend(&[], 2), vec![0.0, 0.0]);
    }

    #[test]
    fn test_linear_regression() {
        let (slope, intercept) = linear_regression(&[100.0, 110.0, 120.0]);
        assert!((slope - 10.0).abs() < 1e-12);
        assert!((intercept - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_history_scoping() {
        let records = vec![
            actual("2025-01", "REV_SUB", "PL_IOT", 100.0),
            actual("2025-01", "REV_SUB", "PL_ANL", 50.0),
            actual("2025-02", "REV_SUB", "PL_IOT", 110.0),
            actual("2025-02", "REV_SUB", "PL_ANL", 50.0),
        ];

        let scoped = ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::Trend)
            .with_product_line("PL_IOT");
        let out = generate_forecast(&scoped, &records, p("2025-03"), p("2025-03")).unwrap();
        assert_eq!(amounts(&out), vec![120.0]);
        assert_eq!(out[0].product_line_code, "PL_IOT");
        assert_eq!(out[0].cost_center_code, "");

        let unscoped = ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::Trend);
        let out = generate_forecast(&unscoped, &records, p("2025-03"), p("2025-03")).unwrap();
        assert_eq!(amounts(&out), vec![170.0]);
        assert_eq!(out[0].product_line_code, "");
    }

    #[test]
    fn test_growth_year_over_year() {
        let records = vec![actual("2024-01", "REV_SUB", "", 1000.0)];
        let assumption = ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::GrowthYearOverYear)
            .with_parameters(ForecastParameters {
                growth_rate: Some(0.10),
                fallback_value: Some(500.0),
                ..ForecastParameters::default()
            });

        let out = generate_forecast(&assumption, &records, p("2025-01"), p("2025-02")).unwrap();
        assert_eq!(amounts(&out), vec![1100.0, 550.0]);
    }

    #[test]
    fn test_growth_fallback_defaults_to_zero() {
        let assumption = ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::GrowthYearOverYear)
            .with_parameters(ForecastParameters {
                growth_rate: Some(0.5),
                ..ForecastParameters::default()
            });
        let out = generate_forecast(&assumption, &[], p("2025-01"), p("2025-03")).unwrap();
        assert_eq!(amounts(&out), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_manual_values() {
        let mut manual = BTreeMap::new();
        manual.insert(p("2025-01"), 42.0);
        manual.insert(p("2025-03"), 7.0);
        let assumption = ForecastAssumption::new("plan", "EXP_GEN_PPL", ForecastMethod::Manual)
            .with_parameters(ForecastParameters {
                manual_values: manual,
                ..ForecastParameters::default()
            });

        let out = generate_forecast(&assumption, &[], p("2025-01"), p("2025-04")).unwrap();
        assert_eq!(amounts(&out), vec![42.0, 0.0, 7.0, 0.0]);
    }

    #[test]
    fn test_percent_of_revenue_reads_committed_budget() {
        let records = vec![
            FinancialRecord::budget("plan", p("2025-01"), "REV_SUB", "200", "PL_IOT", 1000.0),
            FinancialRecord::budget("plan", p("2025-01"), "REV_SERV", "200", "PL_SERV", 1000.0),
            FinancialRecord::budget("other", p("2025-01"), "REV_SUB", "200", "PL_IOT", 9999.0),
            FinancialRecord::budget("plan", p("2025-01"), "COGS_HOST", "100", "", 700.0),
            FinancialRecord::actual(p("2025-01"), "REV_SUB", "200", "PL_IOT", 5555.0),
        ];
        let assumption = ForecastAssumption::new("plan", "COGS_HOST", ForecastMethod::PercentOfRevenue)
            .with_parameters(ForecastParameters {
                percent_of_revenue: Some(0.25),
                ..ForecastParameters::default()
            });

        let out = generate_forecast(&assumption, &records, p("2025-01"), p("2025-02")).unwrap();
        assert_eq!(amounts(&out), vec![500.0, 0.0]);
    }

    #[test]
    fn test_rounding_to_whole_units() {
        let records = vec![
            actual("2025-01", "REV_SUB", "", 100.0),
            actual("2025-02", "REV_SUB", "", 100.4),
        ];
        let assumption = ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::Trend);
        let out = generate_forecast(&assumption, &records, p("2025-03"), p("2025-03")).unwrap();
        // slope 0.4, intercept 100 -> 100.8
        assert_eq!(amounts(&out), vec![101.0]);
        assert!(out.iter().all(|r| r.amount.fract() == 0.0));
    }

    #[test]
    fn test_reversed_range_is_empty() {
        let assumption = ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::Trend);
        let out = generate_forecast(&assumption, &[], p("2025-05"), p("2025-04")).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_custom_formula_is_unsupported() {
        let assumption = ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::CustomFormula);
        let result = generate_forecast(&assumption, &[], p("2025-01"), p("2025-02"));
        assert!(matches!(
            result,
            Err(FpaError::UnsupportedMethod(ForecastMethod::CustomFormula))
        ));
    }

    #[test]
    fn test_custom_revenue_prefix() {
        let records = vec![FinancialRecord::budget("plan", p("2025-01"), "4000", "", "", 800.0)];
        let engine = ForecastEngine::new(ForecastSettings {
            revenue_account_prefix: "4".to_string(),
            ..ForecastSettings::default()
        });
        let assumption = ForecastAssumption::new("plan", "5000", ForecastMethod::PercentOfRevenue)
            .with_parameters(ForecastParameters {
                percent_of_revenue: Some(0.5),
                ..ForecastParameters::default()
            });

        let out = engine
            .generate_forecast(&assumption, &records, p("2025-01"), p("2025-01"))
            .unwrap();
        assert_eq!(amounts(&out), vec![400.0]);
    }
}

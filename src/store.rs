use crate::advisory;
use crate::aggregator::{PnlAggregator, PnlSummary, PnlWindow, RecordFilter, TimeBasis};
use crate::engine::{ForecastEngine, ForecastSettings};
use crate::error::{FpaError, Result};
use crate::export;
use crate::ingestion::ActualRow;
use crate::overlay::{overlay_with_adjustments, strip_adjustments, OverlayAdjustment};
use crate::registry::DimensionRegistry;
use crate::schema::{FinancialRecord, ForecastAssumption, Plan, RiskOpportunity};
use crate::utils::{validate_fiscal_year_end_month, Period};
use crate::variance::{self, ProfitWalk, VarianceDriver, DEFAULT_TOP_DRIVERS};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkbenchSettings {
    #[schemars(description = "Month the fiscal year ends (1-12). 12 for calendar-year companies.")]
    pub fiscal_year_end_month: u32,

    pub forecast: ForecastSettings,

    #[schemars(description = "Number of drivers kept by variance analysis.")]
    pub variance_top_n: usize,
}

impl Default for WorkbenchSettings {
    fn default() -> Self {
        Self {
            fiscal_year_end_month: 12,
            forecast: ForecastSettings::default(),
            variance_top_n: DEFAULT_TOP_DRIVERS,
        }
    }
}

/// The whole persisted state of the workbench.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub settings: WorkbenchSettings,
    #[serde(default)]
    pub registry: DimensionRegistry,
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub records: Vec<FinancialRecord>,
    #[serde(default)]
    pub assumptions: Vec<ForecastAssumption>,
    #[serde(default)]
    pub risks_and_opportunities: Vec<RiskOpportunity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(description = "Amounts placed by the last committed overlay of each plan.")]
    pub overlay_adjustments: Vec<OverlayAdjustment>,
}

impl Dataset {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Dataset)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let dataset: Dataset = serde_json::from_str(json)?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        validate_fiscal_year_end_month(self.settings.fiscal_year_end_month)?;
        self.registry.validate()?;

        for record in &self.records {
            record.validate()?;
        }

        for plan in &self.plans {
            plan.validate()?;
        }

        let working = self.plans.iter().filter(|p| p.is_working).count();
        if working > 1 {
            return Err(FpaError::ValidationError {
                entity: "plans".to_string(),
                details: format!("{} plans are flagged as the working plan", working),
            });
        }

        for (i, assumption) in self.assumptions.iter().enumerate() {
            if self.assumptions[..i].iter().any(|a| a.same_target(assumption)) {
                return Err(FpaError::ValidationError {
                    entity: format!("assumption {}", assumption.id),
                    details: "another assumption targets the same plan/account/dimensions"
                        .to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Single owner of the dataset.
///
/// Every mutation builds a new record collection and swaps it in whole, so
/// a reader never observes a half-applied change. Mutation takes
/// `&mut self`; share it across threads behind a `Mutex`.
#[derive(Debug, Clone, Default)]
pub struct Workbench {
    dataset: Dataset,
}

impl Workbench {
    pub fn new(dataset: Dataset) -> Result<Self> {
        dataset.validate()?;
        Ok(Self { dataset })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let dataset = Dataset::from_json(&json)?;
        info!(
            "Loaded snapshot {} with {} records, {} plans",
            path.display(),
            dataset.records.len(),
            dataset.plans.len()
        );
        Ok(Self { dataset })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.dataset.to_json()?)?;
        info!(
            "Saved snapshot {} with {} records",
            path.display(),
            self.dataset.records.len()
        );
        Ok(())
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    pub fn records(&self) -> &[FinancialRecord] {
        &self.dataset.records
    }

    pub fn registry(&self) -> &DimensionRegistry {
        &self.dataset.registry
    }

    pub fn settings(&self) -> &WorkbenchSettings {
        &self.dataset.settings
    }

    pub fn engine(&self) -> ForecastEngine {
        ForecastEngine::new(self.dataset.settings.forecast.clone())
    }

    // Plans

    pub fn plan(&self, plan_id: &str) -> Result<&Plan> {
        self.dataset
            .plans
            .iter()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| FpaError::PlanNotFound(plan_id.to_string()))
    }

    fn unlocked_plan(&self, plan_id: &str) -> Result<&Plan> {
        let plan = self.plan(plan_id)?;
        if plan.is_locked {
            return Err(FpaError::PlanLocked(plan_id.to_string()));
        }
        Ok(plan)
    }

    pub fn add_plan(&mut self, plan: Plan) -> Result<()> {
        plan.validate()?;
        if self.dataset.plans.iter().any(|p| p.id == plan.id) {
            return Err(FpaError::ValidationError {
                entity: format!("plan {}", plan.id),
                details: "plan id already exists".to_string(),
            });
        }
        let make_working = plan.is_working;
        let plan_id = plan.id.clone();
        self.dataset.plans.push(plan);
        if make_working {
            self.set_working_plan(&plan_id)?;
        }
        Ok(())
    }

    /// Flags `plan_id` as the working plan and clears the flag everywhere else.
    pub fn set_working_plan(&mut self, plan_id: &str) -> Result<()> {
        self.plan(plan_id)?;
        for plan in &mut self.dataset.plans {
            plan.is_working = plan.id == plan_id;
        }
        info!("Working plan set to {}", plan_id);
        Ok(())
    }

    pub fn working_plan(&self) -> Option<&Plan> {
        self.dataset.plans.iter().find(|p| p.is_working)
    }

    pub fn set_plan_locked(&mut self, plan_id: &str, locked: bool) -> Result<()> {
        let plan = self
            .dataset
            .plans
            .iter_mut()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| FpaError::PlanNotFound(plan_id.to_string()))?;
        plan.is_locked = locked;
        Ok(())
    }

    // Records

    /// Replaces the whole record collection.
    pub fn replace_records(&mut self, records: Vec<FinancialRecord>) -> Result<()> {
        for record in &records {
            record.validate()?;
        }
        debug!(
            "Replacing record set: {} -> {} records",
            self.dataset.records.len(),
            records.len()
        );
        self.dataset.records = records;
        Ok(())
    }

    pub fn add_record(&mut self, record: FinancialRecord) -> Result<()> {
        record.validate()?;
        if let Some(plan_id) = &record.plan_id {
            self.unlocked_plan(plan_id)?;
        }
        let mut next = self.dataset.records.clone();
        next.push(record);
        self.dataset.records = next;
        Ok(())
    }

    pub fn delete_record(&mut self, record_id: &str) -> Result<FinancialRecord> {
        let idx = self
            .dataset
            .records
            .iter()
            .position(|r| r.id == record_id)
            .ok_or_else(|| FpaError::RecordNotFound(record_id.to_string()))?;
        if let Some(plan_id) = &self.dataset.records[idx].plan_id {
            self.unlocked_plan(plan_id)?;
        }
        let mut next = self.dataset.records.clone();
        let removed = next.remove(idx);
        self.dataset.records = next;
        Ok(removed)
    }

    /// Applies imported actuals, replacing any Actual with the same
    /// period, account, cost center and product line.
    pub fn import_actuals(&mut self, rows: &[ActualRow]) -> Result<usize> {
        // Later rows win over earlier rows with the same key.
        let mut latest: HashMap<(Period, &str, &str, &str), usize> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            latest.insert(
                (
                    row.period,
                    row.account_code.as_str(),
                    row.cost_center_code.as_str(),
                    row.product_line_code.as_str(),
                ),
                idx,
            );
        }
        let imported: Vec<FinancialRecord> = rows
            .iter()
            .enumerate()
            .filter(|(idx, row)| {
                latest.get(&(
                    row.period,
                    row.account_code.as_str(),
                    row.cost_center_code.as_str(),
                    row.product_line_code.as_str(),
                )) == Some(idx)
            })
            .map(|(_, row)| row.to_record())
            .collect();

        let mut next: Vec<FinancialRecord> = {
            let keys: HashSet<(Period, &str, &str, &str)> = imported
                .iter()
                .map(|r| {
                    (
                        r.period,
                        r.account_code.as_str(),
                        r.cost_center_code.as_str(),
                        r.product_line_code.as_str(),
                    )
                })
                .collect();

            self.dataset
                .records
                .iter()
                .filter(|r| {
                    !(r.is_actual()
                        && keys.contains(&(
                            r.period,
                            r.account_code.as_str(),
                            r.cost_center_code.as_str(),
                            r.product_line_code.as_str(),
                        )))
                })
                .cloned()
                .collect()
        };
        let replaced = self.dataset.records.len() - next.len();
        let count = imported.len();
        next.extend(imported);

        info!("Imported {} actuals ({} replaced)", count, replaced);
        self.replace_records(next)?;
        Ok(count)
    }

    // Assumptions and forecasting

    pub fn assumptions(&self) -> &[ForecastAssumption] {
        &self.dataset.assumptions
    }

    /// Stores `assumption`, replacing any assumption for the same target.
    pub fn upsert_assumption(&mut self, assumption: ForecastAssumption) -> Result<()> {
        self.plan(&assumption.plan_id)?;
        self.dataset
            .assumptions
            .retain(|a| !a.same_target(&assumption) && a.id != assumption.id);
        self.dataset.assumptions.push(assumption);
        Ok(())
    }

    pub fn delete_assumption(&mut self, assumption_id: &str) -> Result<ForecastAssumption> {
        let idx = self
            .dataset
            .assumptions
            .iter()
            .position(|a| a.id == assumption_id)
            .ok_or_else(|| FpaError::AssumptionNotFound(assumption_id.to_string()))?;
        Ok(self.dataset.assumptions.remove(idx))
    }

    /// Generates and commits the stored assumption over its plan's range.
    pub fn commit_assumption(&mut self, assumption_id: &str) -> Result<usize> {
        let assumption = self
            .dataset
            .assumptions
            .iter()
            .find(|a| a.id == assumption_id)
            .cloned()
            .ok_or_else(|| FpaError::AssumptionNotFound(assumption_id.to_string()))?;
        let plan = self.plan(&assumption.plan_id)?;
        let (start, end) = (plan.start_period, plan.end_period);
        self.commit_forecast(&assumption, start, end)
    }

    /// Stores the assumption, then fully replaces its intersection's records
    /// with a fresh generation over `start..=end`.
    ///
    /// Every prior record of the same plan, account and dimensions is
    /// dropped first, so re-forecasting never accumulates generations.
    pub fn commit_forecast(
        &mut self,
        assumption: &ForecastAssumption,
        start: Period,
        end: Period,
    ) -> Result<usize> {
        self.unlocked_plan(&assumption.plan_id)?;

        let generated =
            self.engine()
                .generate_forecast(assumption, &self.dataset.records, start, end)?;

        let mut next: Vec<FinancialRecord> = self
            .dataset
            .records
            .iter()
            .filter(|r| !assumption.owns_record(r))
            .cloned()
            .collect();
        let removed = self.dataset.records.len() - next.len();
        let count = generated.len();
        next.extend(generated);

        self.upsert_assumption(assumption.clone())?;
        self.replace_records(next)?;

        info!(
            "Committed {:?} forecast for {} in plan {}: {} records ({} replaced)",
            assumption.method, assumption.account_code, assumption.plan_id, count, removed
        );
        Ok(count)
    }

    // Risks and opportunities

    pub fn risks_and_opportunities(&self) -> &[RiskOpportunity] {
        &self.dataset.risks_and_opportunities
    }

    pub fn upsert_risk(&mut self, entry: RiskOpportunity) -> Result<()> {
        entry.validate()?;
        self.plan(&entry.plan_id)?;
        self.dataset
            .risks_and_opportunities
            .retain(|r| r.id != entry.id);
        self.dataset.risks_and_opportunities.push(entry);
        Ok(())
    }

    pub fn delete_risk(&mut self, risk_id: &str) -> Result<RiskOpportunity> {
        let idx = self
            .dataset
            .risks_and_opportunities
            .iter()
            .position(|r| r.id == risk_id)
            .ok_or_else(|| FpaError::RecordNotFound(risk_id.to_string()))?;
        Ok(self.dataset.risks_and_opportunities.remove(idx))
    }

    /// Overlay result for `plan_id` without committing it.
    pub fn preview_overlay(&self, plan_id: &str) -> Vec<FinancialRecord> {
        self.overlay(plan_id).0
    }

    /// Records of `plan_id` with the last committed overlay taken out, then
    /// the current register laid over them.
    fn overlay(&self, plan_id: &str) -> (Vec<FinancialRecord>, Vec<OverlayAdjustment>) {
        let previous: Vec<OverlayAdjustment> = self
            .dataset
            .overlay_adjustments
            .iter()
            .filter(|a| a.plan_id == plan_id)
            .cloned()
            .collect();
        let base = strip_adjustments(&self.dataset.records, &previous);
        overlay_with_adjustments(&base, &self.dataset.risks_and_opportunities, plan_id)
    }

    /// Commits the overlay for `plan_id` as the new record collection.
    ///
    /// The previous overlay of the plan is replaced, not added to, so
    /// applying twice leaves the same amounts as applying once. Returns the
    /// number of records the overlay created.
    pub fn apply_overlay(&mut self, plan_id: &str) -> Result<usize> {
        self.unlocked_plan(plan_id)?;
        let (next, adjustments) = self.overlay(plan_id);
        let created = adjustments.iter().filter(|a| a.created).count();

        self.replace_records(next)?;
        self.dataset
            .overlay_adjustments
            .retain(|a| a.plan_id != plan_id);
        self.dataset.overlay_adjustments.extend(adjustments);

        info!(
            "Applied risk/opportunity overlay to plan {}: {} new records",
            plan_id, created
        );
        Ok(created)
    }

    // Read side

    pub fn pnl(&self, filter: &RecordFilter) -> PnlSummary {
        PnlAggregator::new(&self.dataset.registry).aggregate(&self.dataset.records, filter)
    }

    pub fn pnl_window(&self, basis: TimeBasis, selected: Period, filter: &RecordFilter) -> PnlWindow {
        PnlAggregator::new(&self.dataset.registry).aggregate_window(
            &self.dataset.records,
            basis,
            selected,
            self.dataset.settings.fiscal_year_end_month,
            filter,
        )
    }

    pub fn variance_drivers(
        &self,
        plan_id: &str,
        range: Option<(Period, Period)>,
    ) -> Vec<VarianceDriver> {
        variance::analyze_variance_top(
            &self.dataset.records,
            &self.dataset.registry,
            plan_id,
            range,
            self.dataset.settings.variance_top_n,
        )
    }

    pub fn profit_walk(&self, plan_id: &str, year: i32) -> ProfitWalk {
        variance::generate_profit_walk(&self.dataset.records, &self.dataset.registry, plan_id, year)
    }

    /// Advisory context for one plan and calendar year. Read-only.
    pub fn advisory_context(&self, plan_id: &str, year: i32) -> Result<String> {
        let plan = self.plan(plan_id)?;
        let range = (Period::new(year, 1)?, Period::new(year, 12)?);
        let drivers = self.variance_drivers(plan_id, Some(range));
        let walk = self.profit_walk(plan_id, year);
        Ok(advisory::build_context(&plan.name, &walk, &drivers))
    }

    pub fn export_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        export::records_to_csv(&self.dataset.records, &self.dataset.registry, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        ForecastMethod, ForecastParameters, ImpactScope, RecordType, RiskOpportunityStatus,
        RiskOpportunityType,
    };

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn workbench() -> Workbench {
        let mut wb = Workbench::default();
        wb.add_plan(Plan::new("plan", "Base 2025", p("2025-01"), p("2025-12")))
            .unwrap();
        wb.add_plan(Plan::new("alt", "Downside", p("2025-01"), p("2025-12")))
            .unwrap();
        let history = (1..=12)
            .map(|m| FinancialRecord::actual(Period::new(2024, m).unwrap(), "REV_SUB", "", "", 1000.0))
            .collect();
        wb.replace_records(history).unwrap();
        wb
    }

    fn growth(rate: f64) -> ForecastAssumption {
        ForecastAssumption::new("plan", "REV_SUB", ForecastMethod::GrowthYearOverYear).with_parameters(
            ForecastParameters {
                growth_rate: Some(rate),
                ..ForecastParameters::default()
            },
        )
    }

    fn plan_records<'a>(wb: &'a Workbench, plan: &'a str) -> impl Iterator<Item = &'a FinancialRecord> {
        wb.records().iter().filter(move |r| r.belongs_to_plan(plan))
    }

    #[test]
    fn test_recommit_replaces_generation() {
        let mut wb = workbench();
        let first = growth(0.1);
        wb.commit_forecast(&first, p("2025-01"), p("2025-12")).unwrap();
        assert_eq!(plan_records(&wb, "plan").count(), 12);

        let second = growth(0.2);
        wb.commit_forecast(&second, p("2025-01"), p("2025-06")).unwrap();

        let committed: Vec<&FinancialRecord> = plan_records(&wb, "plan").collect();
        assert_eq!(committed.len(), 6);
        assert!(committed.iter().all(|r| r.amount == 1200.0));
        assert_eq!(wb.assumptions().len(), 1);
        assert_eq!(wb.assumptions()[0].id, second.id);
        assert_eq!(wb.records().iter().filter(|r| r.is_actual()).count(), 12);
    }

    #[test]
    fn test_commit_keeps_other_intersections() {
        let mut wb = workbench();
        let scoped = FinancialRecord::budget("plan", p("2025-01"), "REV_SUB", "", "PL_IOT", 55.0);
        let other_plan = FinancialRecord::budget("alt", p("2025-01"), "REV_SUB", "", "", 66.0);
        wb.add_record(scoped.clone()).unwrap();
        wb.add_record(other_plan.clone()).unwrap();

        wb.commit_forecast(&growth(0.0), p("2025-01"), p("2025-03")).unwrap();

        assert!(wb.records().iter().any(|r| r.id == scoped.id));
        assert!(wb.records().iter().any(|r| r.id == other_plan.id));
        let unscoped = plan_records(&wb, "plan")
            .filter(|r| r.product_line_code.is_empty())
            .count();
        assert_eq!(unscoped, 3);
    }

    #[test]
    fn test_commit_assumption_uses_plan_range() {
        let mut wb = workbench();
        let assumption = growth(0.0);
        let id = assumption.id.clone();
        wb.upsert_assumption(assumption).unwrap();
        assert_eq!(wb.commit_assumption(&id).unwrap(), 12);
        assert!(matches!(
            wb.commit_assumption("missing"),
            Err(FpaError::AssumptionNotFound(_))
        ));
    }

    #[test]
    fn test_locked_plan_rejects_mutations() {
        let mut wb = workbench();
        wb.set_plan_locked("plan", true).unwrap();
        let result = wb.commit_forecast(&growth(0.1), p("2025-01"), p("2025-03"));
        assert!(matches!(result, Err(FpaError::PlanLocked(_))));
        assert!(matches!(wb.apply_overlay("plan"), Err(FpaError::PlanLocked(_))));
        assert_eq!(wb.records().len(), 12);
    }

    #[test]
    fn test_single_working_plan() {
        let mut wb = workbench();
        wb.set_working_plan("plan").unwrap();
        wb.set_working_plan("alt").unwrap();
        let working: Vec<&str> = wb
            .dataset()
            .plans
            .iter()
            .filter(|p| p.is_working)
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(working, vec!["alt"]);
        assert_eq!(wb.working_plan().unwrap().id, "alt");
        assert!(wb.set_working_plan("nope").is_err());
    }

    #[test]
    fn test_import_replaces_matching_actuals() {
        let mut wb = workbench();
        let rows = vec![
            ActualRow {
                period: p("2024-01"),
                account_code: "REV_SUB".to_string(),
                cost_center_code: String::new(),
                product_line_code: String::new(),
                amount: 1500.0,
            },
            ActualRow {
                period: p("2025-01"),
                account_code: "REV_SUB".to_string(),
                cost_center_code: String::new(),
                product_line_code: String::new(),
                amount: 1600.0,
            },
        ];
        assert_eq!(wb.import_actuals(&rows).unwrap(), 2);

        let jan_2024: Vec<&FinancialRecord> = wb
            .records()
            .iter()
            .filter(|r| r.period == p("2024-01"))
            .collect();
        assert_eq!(jan_2024.len(), 1);
        assert_eq!(jan_2024[0].amount, 1500.0);
        assert_eq!(wb.records().len(), 13);
        assert!(wb.records().iter().all(|r| r.record_type == RecordType::Actual));
    }

    #[test]
    fn test_add_record_validates() {
        let mut wb = workbench();
        let mut bad = FinancialRecord::actual(p("2025-01"), "REV_SUB", "", "", 1.0);
        bad.plan_id = Some("plan".to_string());
        assert!(wb.add_record(bad).is_err());

        let orphan = FinancialRecord::budget("ghost", p("2025-01"), "REV_SUB", "", "", 1.0);
        assert!(matches!(wb.add_record(orphan), Err(FpaError::PlanNotFound(_))));
    }

    #[test]
    fn test_dataset_validation() {
        let mut dataset = workbench().into_dataset();
        dataset.plans[0].is_working = true;
        dataset.plans[1].is_working = true;
        assert!(dataset.validate().is_err());

        let mut dataset = workbench().into_dataset();
        dataset.settings.fiscal_year_end_month = 13;
        assert!(Workbench::new(dataset).is_err());
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = Dataset::schema_as_json().unwrap();
        assert!(schema_json.contains("records"));
        assert!(schema_json.contains("risksAndOpportunities"));
        assert!(schema_json.contains("fiscalYearEndMonth"));
    }

    #[test]
    fn test_advisory_context_is_read_only() {
        let mut wb = workbench();
        wb.commit_forecast(&growth(0.1), p("2025-01"), p("2025-12")).unwrap();
        let before = wb.records().to_vec();

        let context = wb.advisory_context("plan", 2025).unwrap();
        assert!(context.contains("Base 2025 (2025)"));
        assert!(context.contains("REV_SUB"));
        assert_eq!(wb.records(), &before[..]);
        assert!(matches!(
            wb.advisory_context("ghost", 2025),
            Err(FpaError::PlanNotFound(_))
        ));
    }

    fn churn_risk(impact: f64) -> RiskOpportunity {
        RiskOpportunity {
            id: "churn".to_string(),
            plan_id: "plan".to_string(),
            title: "Churn".to_string(),
            description: String::new(),
            kind: RiskOpportunityType::Risk,
            estimated_impact: impact,
            status: RiskOpportunityStatus::Identified,
            owner: String::new(),
            included_in_budget: true,
            start_date: p("2025-01"),
            duration_months: 1,
            impact_account_code: Some("REV_SUB".to_string()),
            impact_scope: ImpactScope::Unscoped,
        }
    }

    fn budget_amount(wb: &Workbench, period: &str) -> Vec<f64> {
        plan_records(wb, "plan")
            .filter(|r| r.period == p(period) && r.account_code == "REV_SUB")
            .map(|r| r.amount)
            .collect()
    }

    #[test]
    fn test_reapplying_overlay_replaces_previous_result() {
        let mut wb = workbench();
        wb.add_record(FinancialRecord::budget("plan", p("2025-01"), "REV_SUB", "", "", 1000.0))
            .unwrap();
        wb.upsert_risk(churn_risk(100.0)).unwrap();

        wb.apply_overlay("plan").unwrap();
        assert_eq!(budget_amount(&wb, "2025-01"), vec![900.0]);

        wb.apply_overlay("plan").unwrap();
        assert_eq!(budget_amount(&wb, "2025-01"), vec![900.0]);
        assert_eq!(wb.preview_overlay("plan"), wb.records().to_vec());

        // A changed register is laid over the un-overlaid plan.
        wb.upsert_risk(churn_risk(300.0)).unwrap();
        wb.apply_overlay("plan").unwrap();
        assert_eq!(budget_amount(&wb, "2025-01"), vec![700.0]);

        wb.delete_risk("churn").unwrap();
        wb.apply_overlay("plan").unwrap();
        assert_eq!(budget_amount(&wb, "2025-01"), vec![1000.0]);
        assert!(wb.dataset().overlay_adjustments.is_empty());
    }

    #[test]
    fn test_reapplying_overlay_drops_created_records() {
        let mut wb = workbench();
        let mut entry = churn_risk(1200.0);
        entry.duration_months = 12;
        wb.upsert_risk(entry).unwrap();

        assert_eq!(wb.apply_overlay("plan").unwrap(), 12);
        assert_eq!(wb.apply_overlay("plan").unwrap(), 12);
        assert_eq!(plan_records(&wb, "plan").count(), 12);
        assert!(plan_records(&wb, "plan").all(|r| r.amount == -100.0));
    }

    #[test]
    fn test_import_keeps_last_duplicate_row() {
        let mut wb = Workbench::default();
        let row = |amount: f64| ActualRow {
            period: p("2025-01"),
            account_code: "REV_SUB".to_string(),
            cost_center_code: String::new(),
            product_line_code: String::new(),
            amount,
        };

        assert_eq!(wb.import_actuals(&[row(100.0), row(200.0)]).unwrap(), 1);
        assert_eq!(wb.records().len(), 1);
        assert_eq!(wb.records()[0].amount, 200.0);
    }

    #[test]
    fn test_reversed_plan_range_rejected() {
        let mut wb = Workbench::default();
        let reversed = Plan::new("bad", "Backwards", p("2025-12"), p("2025-01"));
        assert!(matches!(
            wb.add_plan(reversed.clone()),
            Err(FpaError::ValidationError { .. })
        ));
        assert!(wb.dataset().plans.is_empty());

        let dataset = Dataset {
            plans: vec![reversed],
            ..Dataset::default()
        };
        assert!(Workbench::new(dataset).is_err());
    }
}

use crate::registry::DimensionRegistry;
use crate::schema::{AccountCategory, FinancialRecord, RecordType};
use crate::utils::{periods_between, Period};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Narrows an aggregation to one product line or one cost center.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "entity", content = "code", rename_all = "camelCase")]
pub enum EntityFilter {
    #[default]
    All,
    ProductLine(String),
    CostCenter(String),
}

impl EntityFilter {
    pub fn matches(&self, record: &FinancialRecord) -> bool {
        match self {
            EntityFilter::All => true,
            EntityFilter::ProductLine(code) => record.product_line_code == *code,
            EntityFilter::CostCenter(code) => record.cost_center_code == *code,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub record_type: Option<RecordType>,
    pub plan_id: Option<String>,
    pub periods: Option<BTreeSet<Period>>,
    pub entity: EntityFilter,
}

impl RecordFilter {
    pub fn actuals() -> Self {
        Self {
            record_type: Some(RecordType::Actual),
            ..Self::default()
        }
    }

    /// Budget and Forecast records of one plan.
    pub fn plan(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: Some(plan_id.into()),
            ..Self::default()
        }
    }

    pub fn with_periods(mut self, periods: impl IntoIterator<Item = Period>) -> Self {
        self.periods = Some(periods.into_iter().collect());
        self
    }

    pub fn with_entity(mut self, entity: EntityFilter) -> Self {
        self.entity = entity;
        self
    }

    pub fn matches(&self, record: &FinancialRecord) -> bool {
        if let Some(record_type) = self.record_type {
            if record.record_type != record_type {
                return false;
            }
        }
        if let Some(plan_id) = &self.plan_id {
            if !record.belongs_to_plan(plan_id) {
                return false;
            }
        }
        if let Some(periods) = &self.periods {
            if !periods.contains(&record.period) {
                return false;
            }
        }
        self.entity.matches(record)
    }
}

/// Standard P&L roll-up. Sums are never rounded; round at display time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PnlSummary {
    pub revenue: f64,
    pub cogs: f64,
    pub gross_profit: f64,
    pub opex: f64,
    pub depreciation: f64,
    pub total_opex: f64,
    pub other_income: f64,
    pub ebit: f64,
    pub ebitda: f64,
    pub taxes: f64,
    pub net_income: f64,
    pub cash_flow_items: f64,
    pub fcf: f64,
}

impl PnlSummary {
    pub fn from_category_totals(totals: &HashMap<AccountCategory, f64>) -> Self {
        let get = |c: AccountCategory| totals.get(&c).copied().unwrap_or(0.0);

        let revenue = get(AccountCategory::Revenue);
        let cogs = get(AccountCategory::Cogs);
        let opex = get(AccountCategory::OpEx);
        let depreciation = get(AccountCategory::Depreciation);
        let other_income = get(AccountCategory::OtherIncome);
        let taxes = get(AccountCategory::Taxes);
        let cash_flow_items = get(AccountCategory::CashFlowItems);

        let gross_profit = revenue - cogs;
        let total_opex = opex + depreciation;
        let ebit = gross_profit - total_opex + other_income;
        let ebitda = ebit + depreciation;
        let net_income = ebit - taxes;
        let fcf = net_income + depreciation - cash_flow_items;

        Self {
            revenue,
            cogs,
            gross_profit,
            opex,
            depreciation,
            total_opex,
            other_income,
            ebit,
            ebitda,
            taxes,
            net_income,
            cash_flow_items,
            fcf,
        }
    }

    pub fn gross_margin_pct(&self) -> Option<f64> {
        (self.revenue != 0.0).then(|| self.gross_profit / self.revenue)
    }

    pub fn ebitda_margin_pct(&self) -> Option<f64> {
        (self.revenue != 0.0).then(|| self.ebitda / self.revenue)
    }
}

pub struct PnlAggregator<'a> {
    registry: &'a DimensionRegistry,
}

impl<'a> PnlAggregator<'a> {
    pub fn new(registry: &'a DimensionRegistry) -> Self {
        Self { registry }
    }

    /// Sums matching records per category. Unmapped accounts are skipped.
    pub fn category_totals(
        &self,
        records: &[FinancialRecord],
        filter: &RecordFilter,
    ) -> HashMap<AccountCategory, f64> {
        let index = self.registry.category_index();
        let mut totals: HashMap<AccountCategory, f64> = HashMap::new();
        let mut unmapped = 0usize;

        for record in records.iter().filter(|r| filter.matches(r)) {
            match index.get(record.account_code.as_str()) {
                Some(category) => *totals.entry(*category).or_default() += record.amount,
                None => unmapped += 1,
            }
        }

        if unmapped > 0 {
            debug!(
                "{} records with unmapped account codes contributed zero to the roll-up",
                unmapped
            );
        }

        totals
    }

    pub fn aggregate(&self, records: &[FinancialRecord], filter: &RecordFilter) -> PnlSummary {
        PnlSummary::from_category_totals(&self.category_totals(records, filter))
    }

    /// Aggregates a time window together with its prior-year comparison.
    pub fn aggregate_window(
        &self,
        records: &[FinancialRecord],
        basis: TimeBasis,
        selected: Period,
        fiscal_year_end_month: u32,
        filter: &RecordFilter,
    ) -> PnlWindow {
        let periods = resolve_periods(basis, selected, fiscal_year_end_month);
        let prior_periods = prior_year_periods(&periods);
        debug!(
            "Resolved {:?} window at {} to {} periods ({}..{})",
            basis,
            selected,
            periods.len(),
            periods.first().map(|p| p.to_string()).unwrap_or_default(),
            periods.last().map(|p| p.to_string()).unwrap_or_default()
        );

        let current = self.aggregate(records, &filter.clone().with_periods(periods.clone()));
        let prior_year =
            self.aggregate(records, &filter.clone().with_periods(prior_periods.clone()));

        PnlWindow {
            basis,
            periods,
            prior_periods,
            current,
            prior_year,
        }
    }
}

pub fn aggregate(
    records: &[FinancialRecord],
    registry: &DimensionRegistry,
    filter: &RecordFilter,
) -> PnlSummary {
    PnlAggregator::new(registry).aggregate(records, filter)
}

/// Sum of amounts of the records whose account maps to `category`.
pub fn sum_by_category(
    records: &[FinancialRecord],
    registry: &DimensionRegistry,
    category: AccountCategory,
) -> f64 {
    records
        .iter()
        .filter(|r| registry.category_of(&r.account_code) == Some(category))
        .map(|r| r.amount)
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum TimeBasis {
    Monthly,
    Quarterly,
    YearToDate,
    TrailingTwelveMonths,
    FiscalYear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlWindow {
    pub basis: TimeBasis,
    pub periods: Vec<Period>,
    pub prior_periods: Vec<Period>,
    pub current: PnlSummary,
    pub prior_year: PnlSummary,
}

/// Ordered periods covered by `basis` at the selected month.
///
/// Year-to-date and fiscal-year windows start at the first month of the
/// fiscal year; with a December year end that is January of the selected
/// year.
pub fn resolve_periods(basis: TimeBasis, selected: Period, fiscal_year_end_month: u32) -> Vec<Period> {
    match basis {
        TimeBasis::Monthly => vec![selected],
        TimeBasis::Quarterly => {
            let start = selected.quarter_start();
            periods_between(start, start.add_months(2))
        }
        TimeBasis::YearToDate => {
            periods_between(selected.fiscal_year_start(fiscal_year_end_month), selected)
        }
        TimeBasis::TrailingTwelveMonths => periods_between(selected.add_months(-11), selected),
        TimeBasis::FiscalYear => {
            let start = selected.fiscal_year_start(fiscal_year_end_month);
            periods_between(start, start.add_months(11))
        }
    }
}

pub fn prior_year_periods(periods: &[Period]) -> Vec<Period> {
    periods.iter().map(Period::prior_year).collect()
}

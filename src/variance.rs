use crate::registry::DimensionRegistry;
use crate::schema::{AccountCategory, FinancialRecord};
use crate::utils::Period;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_TOP_DRIVERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VarianceDriver {
    pub account_code: String,
    pub account_name: String,
    pub actual: f64,
    pub plan: f64,
    /// `actual - plan`
    pub variance: f64,
    /// Fraction of plan. ±1.0 when plan is zero and actual is not.
    pub variance_pct: f64,
}

/// Signed percentage variance with the zero-plan sentinel.
pub fn variance_pct(actual: f64, plan: f64) -> f64 {
    if plan != 0.0 {
        (actual - plan) / plan
    } else if actual > 0.0 {
        1.0
    } else if actual < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Top five accounts by absolute actual-vs-plan variance.
pub fn analyze_variance(
    records: &[FinancialRecord],
    registry: &DimensionRegistry,
    plan_id: &str,
    range: Option<(Period, Period)>,
) -> Vec<VarianceDriver> {
    analyze_variance_top(records, registry, plan_id, range, DEFAULT_TOP_DRIVERS)
}

pub fn analyze_variance_top(
    records: &[FinancialRecord],
    registry: &DimensionRegistry,
    plan_id: &str,
    range: Option<(Period, Period)>,
    top_n: usize,
) -> Vec<VarianceDriver> {
    let in_range = |period: Period| match range {
        Some((start, end)) => period >= start && period <= end,
        None => true,
    };

    // account -> (actual, plan)
    let mut totals: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for record in records.iter().filter(|r| in_range(r.period)) {
        if record.is_actual() {
            totals.entry(record.account_code.as_str()).or_default().0 += record.amount;
        } else if record.belongs_to_plan(plan_id) {
            totals.entry(record.account_code.as_str()).or_default().1 += record.amount;
        }
    }

    let mut drivers: Vec<VarianceDriver> = totals
        .into_iter()
        .map(|(code, (actual, plan))| {
            if registry.account(code).is_none() {
                warn!("Account {} is not in the registry; reporting it by code", code);
            }
            VarianceDriver {
                account_code: code.to_string(),
                account_name: registry.account_name(code).to_string(),
                actual,
                plan,
                variance: actual - plan,
                variance_pct: variance_pct(actual, plan),
            }
        })
        .collect();

    drivers.sort_by(|a, b| {
        b.variance
            .abs()
            .partial_cmp(&a.variance.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.account_code.cmp(&b.account_code))
    });

    debug!(
        "Variance for plan {}: {} accounts compared, keeping {}",
        plan_id,
        drivers.len(),
        top_n.min(drivers.len())
    );
    drivers.truncate(top_n);
    drivers
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalkLine {
    pub actual: f64,
    pub plan: f64,
    pub diff: f64,
}

impl WalkLine {
    pub fn new(actual: f64, plan: f64) -> Self {
        Self {
            actual,
            plan,
            diff: actual - plan,
        }
    }
}

/// Revenue-to-EBITDA bridge of actual against plan for one calendar year.
///
/// `interest` carries the Other Income accounts and is reported alongside
/// the bridge; it does not enter EBITDA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfitWalk {
    pub year: i32,
    pub plan_id: String,
    pub revenue: WalkLine,
    pub cogs: WalkLine,
    pub gross_margin: WalkLine,
    pub opex: WalkLine,
    pub depreciation: WalkLine,
    pub interest: WalkLine,
    pub taxes: WalkLine,
    pub ebitda: WalkLine,
}

pub fn generate_profit_walk(
    records: &[FinancialRecord],
    registry: &DimensionRegistry,
    plan_id: &str,
    year: i32,
) -> ProfitWalk {
    let index = registry.category_index();
    let mut actual: HashMap<AccountCategory, f64> = HashMap::new();
    let mut plan: HashMap<AccountCategory, f64> = HashMap::new();

    for record in records.iter().filter(|r| r.period.year() == year) {
        let Some(&category) = index.get(record.account_code.as_str()) else {
            continue;
        };

        if record.is_actual() {
            *actual.entry(category).or_default() += record.amount;
        } else if record.belongs_to_plan(plan_id) {
            *plan.entry(category).or_default() += record.amount;
        }
    }

    let line = |category: AccountCategory| {
        WalkLine::new(
            actual.get(&category).copied().unwrap_or(0.0),
            plan.get(&category).copied().unwrap_or(0.0),
        )
    };

    let revenue = line(AccountCategory::Revenue);
    let cogs = line(AccountCategory::Cogs);
    let opex = line(AccountCategory::OpEx);
    let gross_margin = WalkLine::new(revenue.actual - cogs.actual, revenue.plan - cogs.plan);
    let ebitda = WalkLine::new(
        gross_margin.actual - opex.actual,
        gross_margin.plan - opex.plan,
    );

    ProfitWalk {
        year,
        plan_id: plan_id.to_string(),
        revenue,
        cogs,
        gross_margin,
        opex,
        depreciation: line(AccountCategory::Depreciation),
        interest: line(AccountCategory::OtherIncome),
        taxes: line(AccountCategory::Taxes),
        ebitda,
    }
}

use crate::error::{FpaError, Result};
use crate::utils::Period;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum RecordType {
    #[schemars(description = "Historical fact. Never carries a plan id.")]
    Actual,

    #[schemars(description = "Plan figure, user-entered or generated by the forecast engine.")]
    Budget,

    #[schemars(description = "Plan figure flagged as a rolling forecast.")]
    Forecast,
}

/// Atomic financial fact.
///
/// Records are replaced, never edited in place. An empty cost center or
/// product line code means "unassigned".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialRecord {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Owning plan. Absent for Actual records, required otherwise.")]
    pub plan_id: Option<String>,

    pub period: Period,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    pub account_code: String,

    #[serde(default)]
    pub cost_center_code: String,

    #[serde(default)]
    pub product_line_code: String,

    #[schemars(description = "Signed amount in currency units.")]
    pub amount: f64,
}

impl FinancialRecord {
    pub fn actual(
        period: Period,
        account_code: impl Into<String>,
        cost_center_code: impl Into<String>,
        product_line_code: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: new_record_id(),
            plan_id: None,
            period,
            record_type: RecordType::Actual,
            account_code: account_code.into(),
            cost_center_code: cost_center_code.into(),
            product_line_code: product_line_code.into(),
            amount,
        }
    }

    pub fn budget(
        plan_id: impl Into<String>,
        period: Period,
        account_code: impl Into<String>,
        cost_center_code: impl Into<String>,
        product_line_code: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: new_record_id(),
            plan_id: Some(plan_id.into()),
            period,
            record_type: RecordType::Budget,
            account_code: account_code.into(),
            cost_center_code: cost_center_code.into(),
            product_line_code: product_line_code.into(),
            amount,
        }
    }

    pub fn is_actual(&self) -> bool {
        self.record_type == RecordType::Actual
    }

    pub fn belongs_to_plan(&self, plan_id: &str) -> bool {
        self.plan_id.as_deref() == Some(plan_id)
    }

    pub fn validate(&self) -> Result<()> {
        match (self.record_type, &self.plan_id) {
            (RecordType::Actual, Some(plan)) => Err(FpaError::ValidationError {
                entity: format!("record {}", self.id),
                details: format!("Actual record carries plan id '{}'", plan),
            }),
            (RecordType::Budget | RecordType::Forecast, None) => Err(FpaError::ValidationError {
                entity: format!("record {}", self.id),
                details: format!("{:?} record has no plan id", self.record_type),
            }),
            _ if self.account_code.trim().is_empty() => Err(FpaError::ValidationError {
                entity: format!("record {}", self.id),
                details: "account code is empty".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub enum AccountCategory {
    #[schemars(description = "Sales of goods or services")]
    Revenue,

    #[serde(rename = "COGS")]
    #[schemars(description = "Direct cost of goods or services sold")]
    Cogs,

    #[schemars(description = "Operating expenses excluding depreciation")]
    OpEx,

    Depreciation,

    #[serde(rename = "Other Income")]
    OtherIncome,

    Taxes,

    #[serde(rename = "Cash Flow Items")]
    #[schemars(description = "Capex, working capital movements and other non-P&L cash items")]
    CashFlowItems,
}

impl AccountCategory {
    pub const ALL: [AccountCategory; 7] = [
        AccountCategory::Revenue,
        AccountCategory::Cogs,
        AccountCategory::OpEx,
        AccountCategory::Depreciation,
        AccountCategory::OtherIncome,
        AccountCategory::Taxes,
        AccountCategory::CashFlowItems,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AccountCategory::Revenue => "Revenue",
            AccountCategory::Cogs => "COGS",
            AccountCategory::OpEx => "OpEx",
            AccountCategory::Depreciation => "Depreciation",
            AccountCategory::OtherIncome => "Other Income",
            AccountCategory::Taxes => "Taxes",
            AccountCategory::CashFlowItems => "Cash Flow Items",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DimensionMapping {
    #[schemars(description = "Stable internal identifier. Immutable once referenced by records.")]
    pub code: String,

    pub name: String,

    #[serde(default)]
    #[schemars(description = "Code of this item in the external accounting system, used on export.")]
    pub external_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Required for accounts, absent for cost centers and product lines.")]
    pub category: Option<AccountCategory>,
}

impl DimensionMapping {
    pub fn account(
        code: impl Into<String>,
        name: impl Into<String>,
        external_code: impl Into<String>,
        category: AccountCategory,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            external_code: external_code.into(),
            category: Some(category),
        }
    }

    pub fn dimension(
        code: impl Into<String>,
        name: impl Into<String>,
        external_code: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            external_code: external_code.into(),
            category: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum PlanStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub start_period: Period,
    pub end_period: Period,

    #[serde(default)]
    pub status: PlanStatus,

    #[serde(default)]
    #[schemars(description = "At most one plan is the working plan: default context for advisory and risk linkage.")]
    pub is_working: bool,

    #[serde(default)]
    pub is_locked: bool,
}

impl Plan {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        start_period: Period,
        end_period: Period,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            start_period,
            end_period,
            status: PlanStatus::Draft,
            is_working: false,
            is_locked: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.end_period < self.start_period {
            return Err(FpaError::ValidationError {
                entity: format!("plan {}", self.id),
                details: format!(
                    "end period {} is before start period {}",
                    self.end_period, self.start_period
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ForecastMethod {
    #[schemars(description = "Explicit period -> amount values, 0 where absent.")]
    Manual,

    #[schemars(
        description = "Least-squares linear trend over the sorted actual history, clamped at zero."
    )]
    Trend,

    #[schemars(
        description = "Same month of the prior year multiplied by (1 + growth rate), fallback value when that month has no actual."
    )]
    GrowthYearOverYear,

    #[schemars(
        description = "Percentage of the plan's committed revenue budget for the same period. Revenue must be committed first."
    )]
    PercentOfRevenue,

    #[schemars(description = "Reserved. Not implemented by the engine.")]
    CustomFormula,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForecastParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Fractional growth rate for GrowthYearOverYear, e.g. 0.1 for 10%.")]
    pub growth_rate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Fraction of revenue for PercentOfRevenue, e.g. 0.25 for 25%.")]
    pub percent_of_revenue: Option<f64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub manual_values: BTreeMap<Period, f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Base value used by GrowthYearOverYear when the prior-year month is missing.")]
    pub fallback_value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

/// Saved forecasting rule for one plan x account x dimension intersection.
///
/// `None` for a dimension means the assumption is unscoped on that axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForecastAssumption {
    pub id: String,
    pub plan_id: String,
    pub account_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_line_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_center_code: Option<String>,

    pub method: ForecastMethod,

    #[serde(default)]
    pub parameters: ForecastParameters,
}

impl ForecastAssumption {
    pub fn new(
        plan_id: impl Into<String>,
        account_code: impl Into<String>,
        method: ForecastMethod,
    ) -> Self {
        Self {
            id: new_record_id(),
            plan_id: plan_id.into(),
            account_code: account_code.into(),
            product_line_code: None,
            cost_center_code: None,
            method,
            parameters: ForecastParameters::default(),
        }
    }

    pub fn with_product_line(mut self, code: impl Into<String>) -> Self {
        self.product_line_code = Some(code.into());
        self
    }

    pub fn with_cost_center(mut self, code: impl Into<String>) -> Self {
        self.cost_center_code = Some(code.into());
        self
    }

    pub fn with_parameters(mut self, parameters: ForecastParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// True when both assumptions target the same plan, account and dimensions.
    pub fn same_target(&self, other: &ForecastAssumption) -> bool {
        self.plan_id == other.plan_id
            && self.account_code == other.account_code
            && self.product_line_code == other.product_line_code
            && self.cost_center_code == other.cost_center_code
    }

    /// True when `record` belongs to this assumption's generated intersection.
    ///
    /// An unscoped dimension matches only records whose field is empty.
    pub fn owns_record(&self, record: &FinancialRecord) -> bool {
        record.belongs_to_plan(&self.plan_id)
            && record.account_code == self.account_code
            && record.product_line_code == self.product_line_code.as_deref().unwrap_or("")
            && record.cost_center_code == self.cost_center_code.as_deref().unwrap_or("")
    }
}

/// Where a risk or opportunity lands besides its account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "scope", content = "code", rename_all = "camelCase")]
pub enum ImpactScope {
    #[default]
    Unscoped,
    ProductLine(String),
    CostCenter(String),
}

impl ImpactScope {
    pub fn product_line_code(&self) -> &str {
        match self {
            ImpactScope::ProductLine(code) => code,
            _ => "",
        }
    }

    pub fn cost_center_code(&self) -> &str {
        match self {
            ImpactScope::CostCenter(code) => code,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum RiskOpportunityType {
    Risk,
    Opportunity,
}

impl RiskOpportunityType {
    pub fn sign(&self) -> f64 {
        match self {
            RiskOpportunityType::Risk => -1.0,
            RiskOpportunityType::Opportunity => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum RiskOpportunityStatus {
    #[default]
    Identified,
    Monitoring,
    Mitigated,
    Realized,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskOpportunity {
    pub id: String,
    pub plan_id: String,
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub kind: RiskOpportunityType,

    #[schemars(description = "Total unsigned impact over the whole window. The type supplies the sign.")]
    pub estimated_impact: f64,

    #[serde(default)]
    pub status: RiskOpportunityStatus,

    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    #[schemars(description = "Only included entries are overlaid onto the plan.")]
    pub included_in_budget: bool,

    pub start_date: Period,

    #[schemars(description = "Number of consecutive months the impact is spread over. At least 1.")]
    pub duration_months: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_account_code: Option<String>,

    #[serde(default)]
    pub impact_scope: ImpactScope,
}

impl RiskOpportunity {
    pub fn monthly_impact(&self) -> f64 {
        self.kind.sign() * self.estimated_impact / self.duration_months.max(1) as f64
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration_months == 0 {
            return Err(FpaError::InvalidDuration {
                id: self.id.clone(),
                months: self.duration_months,
            });
        }
        Ok(())
    }
}

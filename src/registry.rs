use crate::error::{FpaError, Result};
use crate::schema::{AccountCategory, DimensionMapping};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Mapping tables that classify records for roll-up.
///
/// List order is significant: it drives row order in rendered reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRegistry {
    #[serde(default)]
    pub accounts: Vec<DimensionMapping>,
    #[serde(default)]
    pub cost_centers: Vec<DimensionMapping>,
    #[serde(default)]
    pub product_lines: Vec<DimensionMapping>,
}

impl DimensionRegistry {
    pub fn new(
        accounts: Vec<DimensionMapping>,
        cost_centers: Vec<DimensionMapping>,
        product_lines: Vec<DimensionMapping>,
    ) -> Self {
        Self {
            accounts,
            cost_centers,
            product_lines,
        }
    }

    pub fn account(&self, code: &str) -> Option<&DimensionMapping> {
        self.accounts.iter().find(|a| a.code == code)
    }

    pub fn cost_center(&self, code: &str) -> Option<&DimensionMapping> {
        self.cost_centers.iter().find(|c| c.code == code)
    }

    pub fn product_line(&self, code: &str) -> Option<&DimensionMapping> {
        self.product_lines.iter().find(|p| p.code == code)
    }

    /// Category of an account; `None` for unmapped or deleted codes.
    pub fn category_of(&self, account_code: &str) -> Option<AccountCategory> {
        self.account(account_code).and_then(|a| a.category)
    }

    /// Display name, falling back to the code itself.
    pub fn account_name<'a>(&'a self, account_code: &'a str) -> &'a str {
        self.account(account_code)
            .map(|a| a.name.as_str())
            .unwrap_or(account_code)
    }

    /// Code-to-category table for repeated lookups over large record sets.
    pub fn category_index(&self) -> HashMap<&str, AccountCategory> {
        self.accounts
            .iter()
            .filter_map(|a| a.category.map(|c| (a.code.as_str(), c)))
            .collect()
    }

    pub fn accounts_in(&self, category: AccountCategory) -> impl Iterator<Item = &DimensionMapping> {
        self.accounts
            .iter()
            .filter(move |a| a.category == Some(category))
    }

    /// Every account has exactly one category, and codes are unique per table.
    pub fn validate(&self) -> Result<()> {
        for account in &self.accounts {
            if account.category.is_none() {
                return Err(FpaError::ValidationError {
                    entity: format!("account {}", account.code),
                    details: "account has no category".to_string(),
                });
            }
        }

        for (table, entries) in [
            ("account", &self.accounts),
            ("cost center", &self.cost_centers),
            ("product line", &self.product_lines),
        ] {
            let mut seen = HashSet::new();
            for entry in entries {
                if !seen.insert(entry.code.as_str()) {
                    return Err(FpaError::ValidationError {
                        entity: format!("{} {}", table, entry.code),
                        details: "duplicate code".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn total_entries(&self) -> usize {
        self.accounts.len() + self.cost_centers.len() + self.product_lines.len()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Chart of Accounts\n\n");

        for category in AccountCategory::ALL {
            output.push_str(&format!("## {}\n\n", category.label()));
            for account in self.accounts_in(category) {
                output.push_str(&format!("- {} ({})", account.name, account.code));
                if !account.external_code.is_empty() {
                    output.push_str(&format!(" -> {}", account.external_code));
                }
                output.push('\n');
            }
            output.push('\n');
        }

        output.push_str("## Cost Centers\n\n");
        for cc in &self.cost_centers {
            output.push_str(&format!("- {} ({})\n", cc.name, cc.code));
        }
        output.push('\n');

        output.push_str("## Product Lines\n\n");
        for pl in &self.product_lines {
            output.push_str(&format!("- {} ({})\n", pl.name, pl.code));
        }
        output.push('\n');

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DimensionRegistry {
        DimensionRegistry::new(
            vec![
                DimensionMapping::account("REV_SUB", "Subscription Revenue", "4000", AccountCategory::Revenue),
                DimensionMapping::account("REV_SERV", "Services Revenue", "4100", AccountCategory::Revenue),
                DimensionMapping::account("COGS_HOST", "Hosting", "5000", AccountCategory::Cogs),
            ],
            vec![DimensionMapping::dimension("100", "Operations", "CC100")],
            vec![DimensionMapping::dimension("PL_IOT", "IoT Platform", "P01")],
        )
    }

    #[test]
    fn test_lookups() {
        let reg = registry();
        assert_eq!(reg.category_of("COGS_HOST"), Some(AccountCategory::Cogs));
        assert_eq!(reg.category_of("DELETED"), None);
        assert_eq!(reg.account_name("REV_SUB"), "Subscription Revenue");
        assert_eq!(reg.account_name("DELETED"), "DELETED");
        assert_eq!(reg.cost_center("100").unwrap().external_code, "CC100");
        assert_eq!(reg.total_entries(), 5);
        assert_eq!(reg.category_index().len(), 3);
    }

    #[test]
    fn test_accounts_in_preserves_list_order() {
        let reg = registry();
        let codes: Vec<&str> = reg
            .accounts_in(AccountCategory::Revenue)
            .map(|a| a.code.as_str())
            .collect();
        assert_eq!(codes, vec!["REV_SUB", "REV_SERV"]);
    }

    #[test]
    fn test_validate() {
        let mut reg = registry();
        assert!(reg.validate().is_ok());

        reg.accounts.push(DimensionMapping::dimension("EXP_X", "No category", ""));
        assert!(reg.validate().is_err());

        let mut dup = registry();
        dup.product_lines
            .push(DimensionMapping::dimension("PL_IOT", "Again", ""));
        assert!(dup.validate().is_err());
    }

    #[test]
    fn test_to_markdown() {
        let markdown = registry().to_markdown();
        assert!(markdown.contains("# Chart of Accounts"));
        assert!(markdown.contains("## COGS"));
        assert!(markdown.contains("- Hosting (COGS_HOST) -> 5000"));
        let sub = markdown.find("Subscription Revenue").unwrap();
        let serv = markdown.find("Services Revenue").unwrap();
        assert!(sub < serv);
    }
}

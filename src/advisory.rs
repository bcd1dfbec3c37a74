use crate::utils::format_amount;
use crate::variance::{ProfitWalk, VarianceDriver, WalkLine};
use log::debug;

/// Reference range for one ratio, as a fraction of revenue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Benchmark {
    pub metric: &'static str,
    pub low: f64,
    pub high: f64,
}

impl Benchmark {
    pub fn assess(&self, value: f64) -> &'static str {
        if value < self.low {
            "below range"
        } else if value > self.high {
            "above range"
        } else {
            "within range"
        }
    }
}

/// SaaS reference ranges.
pub const BENCHMARKS: [Benchmark; 3] = [
    Benchmark {
        metric: "Gross Margin",
        low: 0.70,
        high: 0.85,
    },
    Benchmark {
        metric: "EBITDA Margin",
        low: 0.10,
        high: 0.30,
    },
    Benchmark {
        metric: "OpEx Ratio",
        low: 0.40,
        high: 0.60,
    },
];

fn pct(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn ratio(numerator: f64, revenue: f64) -> Option<f64> {
    (revenue != 0.0).then(|| numerator / revenue)
}

fn walk_row(output: &mut String, label: &str, line: &WalkLine) {
    output.push_str(&format!(
        "| {} | {} | {} | {} |\n",
        label,
        format_amount(line.actual),
        format_amount(line.plan),
        format_amount(line.diff)
    ));
}

/// Renders the read-only context block handed to an advisory assistant.
///
/// Contains the profit walk, the ranked variance drivers and the actual
/// ratios measured against [`BENCHMARKS`]. Ratios are omitted when actual
/// revenue is zero.
pub fn build_context(plan_name: &str, walk: &ProfitWalk, drivers: &[VarianceDriver]) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Financial Context: {} ({})\n\n",
        plan_name, walk.year
    ));

    output.push_str("## Profit Walk\n\n");
    output.push_str("| Line | Actual | Plan | Diff |\n|---|---|---|---|\n");
    walk_row(&mut output, "Revenue", &walk.revenue);
    walk_row(&mut output, "COGS", &walk.cogs);
    walk_row(&mut output, "Gross Margin", &walk.gross_margin);
    walk_row(&mut output, "OpEx", &walk.opex);
    walk_row(&mut output, "EBITDA", &walk.ebitda);
    walk_row(&mut output, "Depreciation", &walk.depreciation);
    walk_row(&mut output, "Interest", &walk.interest);
    walk_row(&mut output, "Taxes", &walk.taxes);
    output.push('\n');

    output.push_str("## Top Variance Drivers\n\n");
    if drivers.is_empty() {
        output.push_str("No variances recorded.\n");
    }
    for (rank, driver) in drivers.iter().enumerate() {
        output.push_str(&format!(
            "{}. {} ({}): actual {}, plan {}, variance {} ({})\n",
            rank + 1,
            driver.account_name,
            driver.account_code,
            format_amount(driver.actual),
            format_amount(driver.plan),
            format_amount(driver.variance),
            pct(driver.variance_pct)
        ));
    }
    output.push('\n');

    output.push_str("## Benchmarks\n\n");
    let revenue = walk.revenue.actual;
    let actuals = [
        ratio(walk.gross_margin.actual, revenue),
        ratio(walk.ebitda.actual, revenue),
        ratio(walk.opex.actual, revenue),
    ];
    for (benchmark, actual) in BENCHMARKS.iter().zip(actuals) {
        output.push_str(&format!(
            "- {}: reference {} to {}",
            benchmark.metric,
            pct(benchmark.low),
            pct(benchmark.high)
        ));
        if let Some(value) = actual {
            output.push_str(&format!(", actual {} ({})", pct(value), benchmark.assess(value)));
        }
        output.push('\n');
    }

    debug!(
        "Built advisory context for {} {} ({} chars)",
        plan_name,
        walk.year,
        output.len()
    );
    output
}

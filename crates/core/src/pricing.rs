use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::cart::CartLineItem;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub line: CartLineItem,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSummary {
    pub lines: Vec<PricedLine>,
    pub item_count: u64,
    pub total: Decimal,
    pub currency: String,
}

/// Σ(unit_price × quantity).
pub fn total(lines: &[CartLineItem]) -> Decimal {
    lines.iter().map(CartLineItem::line_total).sum()
}

pub fn summarize(lines: &[CartLineItem], currency: &str) -> PricingSummary {
    PricingSummary {
        lines: lines
            .iter()
            .map(|line| PricedLine { line: line.clone(), line_total: line.line_total() })
            .collect(),
        item_count: lines.iter().map(|line| u64::from(line.quantity)).sum(),
        total: total(lines),
        currency: currency.to_string(),
    }
}

/// `$269.97` for dollars, `269.97 EUR` for anything else.
pub fn format_money(amount: Decimal, currency: &str) -> String {
    let rounded = amount.round_dp(2);
    if currency.eq_ignore_ascii_case("USD") {
        format!("${rounded:.2}")
    } else {
        format!("{rounded:.2} {currency}")
    }
}

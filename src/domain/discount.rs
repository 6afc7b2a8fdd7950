//! Discount rules, their conditions, and the decision the engine produces.
//!
//! Condition rows arrive from storage as string tags plus string values.
//! They are decoded exactly once, when a rule set is loaded, into
//! [`RuleCondition`] variants with typed payloads; evaluation never touches
//! the raw strings again.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::money::round_currency;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscountRule {
    pub rule_id: i64,
    pub rule_name: String,
    /// Percentage granted when the rule applies.
    pub discount_value: Decimal,
    /// Load order, ascending. Advisory only; ties on discount_value keep the
    /// earliest rule in load order.
    pub priority: i32,
    pub is_active: bool,
}

/// Raw condition row as stored. `operator` is carried but unused.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscountCondition {
    pub condition_id: i64,
    pub rule_id: i64,
    pub condition_type: String,
    pub operator: String,
    pub condition_value: String,
}

/// A rule with its raw condition rows, as loaded from storage.
#[derive(Clone, Debug)]
pub struct RuleWithConditions {
    pub rule: DiscountRule,
    pub conditions: Vec<DiscountCondition>,
}

/// A condition decoded into its typed form.
#[derive(Clone, Debug, PartialEq)]
pub enum RuleCondition {
    /// `condition_value` is `"true"` or `"false"`.
    FirstTimePurchase(bool),
    /// Subtotal must reach the threshold.
    OrderTotalMin(Decimal),
    /// Inclusive calendar window, `condition_value` encoded
    /// `YYYY-MM-DD..YYYY-MM-DD`.
    DateRange { start: NaiveDate, end: NaiveDate },
    /// Recognized type whose value failed to decode. Never satisfied.
    Invalid {
        condition_type: String,
        raw_value: String,
    },
    /// Unrecognized type. Does not restrict the rule.
    Unknown { condition_type: String },
}

impl RuleCondition {
    pub fn decode(row: &DiscountCondition) -> Self {
        let value = row.condition_value.trim();
        match row.condition_type.as_str() {
            "first_time_purchase" => match value {
                "true" => Self::FirstTimePurchase(true),
                "false" => Self::FirstTimePurchase(false),
                _ => Self::invalid(row),
            },
            "order_total_min" => match Decimal::from_str(value) {
                Ok(threshold) => Self::OrderTotalMin(threshold),
                Err(_) => Self::invalid(row),
            },
            "date_range" => match parse_date_range(value) {
                Some((start, end)) => Self::DateRange { start, end },
                None => Self::invalid(row),
            },
            other => Self::Unknown {
                condition_type: other.to_string(),
            },
        }
    }

    fn invalid(row: &DiscountCondition) -> Self {
        Self::Invalid {
            condition_type: row.condition_type.clone(),
            raw_value: row.condition_value.clone(),
        }
    }

    /// Whether the condition holds for the given checkout context.
    pub fn holds(&self, ctx: &CustomerContext, subtotal: Decimal, as_of: DateTime<Utc>) -> bool {
        match self {
            Self::FirstTimePurchase(required) => ctx.first_time_buyer == *required,
            Self::OrderTotalMin(threshold) => subtotal >= *threshold,
            Self::DateRange { start, end } => {
                let day = as_of.date_naive();
                *start <= day && day <= *end
            }
            Self::Invalid { .. } => false,
            Self::Unknown { .. } => true,
        }
    }
}

fn parse_date_range(value: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (start, end) = value.split_once("..")?;
    let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d").ok()?;
    let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").ok()?;
    Some((start, end))
}

/// Who is checking out, as far as the discount engine cares.
#[derive(Clone, Copy, Debug)]
pub struct CustomerContext {
    pub customer_id: i64,
    /// Customer has zero prior orders.
    pub first_time_buyer: bool,
}

/// Identity of the rule a decision applied.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: i64,
    pub rule_name: String,
}

/// Outcome of a discount evaluation. All four totals are final, rounded to
/// currency precision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscountDecision {
    pub original_total: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    pub applied_rule: Option<AppliedRule>,
    pub first_time_buyer: bool,
    /// Set when rule lookup failed and the engine fell back to zero discount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl DiscountDecision {
    pub fn no_discount(subtotal: Decimal, first_time_buyer: bool) -> Self {
        let subtotal = round_currency(subtotal);
        Self {
            original_total: subtotal,
            discount_percent: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            final_total: subtotal,
            applied_rule: None,
            first_time_buyer,
            degraded: None,
        }
    }

    pub fn degraded(subtotal: Decimal, first_time_buyer: bool, reason: impl Into<String>) -> Self {
        Self {
            degraded: Some(reason.into()),
            ..Self::no_discount(subtotal, first_time_buyer)
        }
    }

    pub fn with_rule(subtotal: Decimal, rule: &DiscountRule, first_time_buyer: bool) -> Self {
        let subtotal = round_currency(subtotal);
        let discount_amount = round_currency(subtotal * rule.discount_value / Decimal::ONE_HUNDRED);
        Self {
            original_total: subtotal,
            discount_percent: rule.discount_value,
            discount_amount,
            final_total: subtotal - discount_amount,
            applied_rule: Some(AppliedRule {
                rule_id: rule.rule_id,
                rule_name: rule.rule_name.clone(),
            }),
            first_time_buyer,
            degraded: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(condition_type: &str, condition_value: &str) -> DiscountCondition {
        DiscountCondition {
            condition_id: 1,
            rule_id: 1,
            condition_type: condition_type.to_string(),
            operator: String::new(),
            condition_value: condition_value.to_string(),
        }
    }

    fn ctx(first_time_buyer: bool) -> CustomerContext {
        CustomerContext {
            customer_id: 1,
            first_time_buyer,
        }
    }

    fn at(date: &str) -> DateTime<Utc> {
        format!("{date}T12:00:00Z").parse().unwrap()
    }

    #[test]
    fn test_decode_first_time_purchase() {
        assert_eq!(
            RuleCondition::decode(&row("first_time_purchase", "true")),
            RuleCondition::FirstTimePurchase(true)
        );
        assert_eq!(
            RuleCondition::decode(&row("first_time_purchase", " false ")),
            RuleCondition::FirstTimePurchase(false)
        );
        assert!(matches!(
            RuleCondition::decode(&row("first_time_purchase", "yes")),
            RuleCondition::Invalid { .. }
        ));
    }

    #[test]
    fn test_decode_order_total_min() {
        assert_eq!(
            RuleCondition::decode(&row("order_total_min", "150.00")),
            RuleCondition::OrderTotalMin(dec!(150.00))
        );
        assert!(matches!(
            RuleCondition::decode(&row("order_total_min", "lots")),
            RuleCondition::Invalid { .. }
        ));
    }

    #[test]
    fn test_decode_date_range() {
        let decoded = RuleCondition::decode(&row("date_range", "2026-11-27..2026-11-30"));
        assert_eq!(
            decoded,
            RuleCondition::DateRange {
                start: NaiveDate::from_ymd_opt(2026, 11, 27).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 11, 30).unwrap(),
            }
        );
        assert!(matches!(
            RuleCondition::decode(&row("date_range", "2026-11-27")),
            RuleCondition::Invalid { .. }
        ));
    }

    #[test]
    fn test_unknown_type_passes_invalid_value_blocks() {
        let unknown = RuleCondition::decode(&row("loyalty_tier", "gold"));
        assert!(unknown.holds(&ctx(false), dec!(10), at("2026-01-01")));

        let invalid = RuleCondition::decode(&row("order_total_min", "%%"));
        assert!(!invalid.holds(&ctx(true), dec!(1000000), at("2026-01-01")));
    }

    #[test]
    fn test_date_range_bounds_inclusive() {
        let cond = RuleCondition::decode(&row("date_range", "2026-11-27..2026-11-30"));
        let c = ctx(false);
        assert!(cond.holds(&c, dec!(0), at("2026-11-27")));
        assert!(cond.holds(&c, dec!(0), at("2026-11-30")));
        assert!(!cond.holds(&c, dec!(0), at("2026-11-26")));
        assert!(!cond.holds(&c, dec!(0), at("2026-12-01")));
    }

    #[test]
    fn test_order_total_min_boundary() {
        let cond = RuleCondition::decode(&row("order_total_min", "150.00"));
        let c = ctx(false);
        let when = at("2026-01-01");
        assert!(cond.holds(&c, dec!(150.00), when));
        assert!(!cond.holds(&c, dec!(149.99), when));
    }

    #[test]
    fn test_decision_arithmetic() {
        let rule = DiscountRule {
            rule_id: 3,
            rule_name: "First Time Buyer".to_string(),
            discount_value: dec!(35),
            priority: 10,
            is_active: true,
        };
        let decision = DiscountDecision::with_rule(dec!(200.00), &rule, true);
        assert_eq!(decision.original_total, dec!(200.00));
        assert_eq!(decision.discount_percent, dec!(35));
        assert_eq!(decision.discount_amount, dec!(70.00));
        assert_eq!(decision.final_total, dec!(130.00));
        assert_eq!(decision.applied_rule.as_ref().unwrap().rule_id, 3);
        assert!(decision.first_time_buyer);
        assert!(decision.degraded.is_none());
    }

    #[test]
    fn test_decision_rounding_half_away() {
        let rule = DiscountRule {
            rule_id: 1,
            rule_name: "Odd".to_string(),
            discount_value: dec!(15),
            priority: 100,
            is_active: true,
        };
        // 33.33 * 15% = 4.9995 rounds to 5.00
        let decision = DiscountDecision::with_rule(dec!(33.33), &rule, false);
        assert_eq!(decision.discount_amount, dec!(5.00));
        assert_eq!(decision.final_total, dec!(28.33));
    }

    #[test]
    fn test_degraded_decision_zeroes_discount() {
        let decision = DiscountDecision::degraded(dec!(80.00), true, "rule lookup failed");
        assert_eq!(decision.discount_percent, Decimal::ZERO);
        assert_eq!(decision.final_total, dec!(80.00));
        assert!(decision.applied_rule.is_none());
        assert!(decision.degraded.is_some());
    }
}

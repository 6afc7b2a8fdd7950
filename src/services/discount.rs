//! Rule evaluation for order discounts.
//!
//! Rules load in (priority, rule_id) order and a rule applies only when every
//! one of its recognized conditions holds. Among applicable rules the highest
//! discount percentage wins; on a tie the rule loaded first keeps the win, so
//! repeated evaluation of the same snapshot always picks the same rule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{CustomerContext, DiscountDecision, DiscountRule, RuleCondition};
use crate::store::DiscountRuleStore;

#[derive(Clone)]
pub struct DiscountEngine {
    rules: Arc<dyn DiscountRuleStore>,
}

impl DiscountEngine {
    pub fn new(rules: Arc<dyn DiscountRuleStore>) -> Self {
        Self { rules }
    }

    /// Picks the best applicable discount for this customer and subtotal.
    ///
    /// Never fails: if the rule source is unavailable the checkout continues
    /// with a zero discount and the decision is marked degraded.
    pub async fn select_best_discount(
        &self,
        ctx: &CustomerContext,
        subtotal: Decimal,
        as_of: DateTime<Utc>,
    ) -> DiscountDecision {
        let loaded = match self.rules.active_rules().await {
            Ok(rules) => rules,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    customer_id = ctx.customer_id,
                    "discount rules unavailable, continuing without discount"
                );
                return DiscountDecision::degraded(
                    subtotal,
                    ctx.first_time_buyer,
                    "discount rules unavailable",
                );
            }
        };

        let mut best: Option<&DiscountRule> = None;
        for entry in &loaded {
            let conditions: Vec<RuleCondition> =
                entry.conditions.iter().map(RuleCondition::decode).collect();
            for condition in &conditions {
                match condition {
                    RuleCondition::Unknown { condition_type } => {
                        tracing::warn!(
                            rule_id = entry.rule.rule_id,
                            condition_type = %condition_type,
                            "unrecognized condition type does not block the rule"
                        );
                    }
                    RuleCondition::Invalid {
                        condition_type,
                        raw_value,
                    } => {
                        tracing::warn!(
                            rule_id = entry.rule.rule_id,
                            condition_type = %condition_type,
                            raw_value = %raw_value,
                            "unreadable condition value disqualifies the rule"
                        );
                    }
                    _ => {}
                }
            }
            if !conditions.iter().all(|c| c.holds(ctx, subtotal, as_of)) {
                continue;
            }
            // Strictly-greater keeps the earliest applicable rule on ties.
            let better = match best {
                None => true,
                Some(current) => entry.rule.discount_value > current.discount_value,
            };
            if better {
                best = Some(&entry.rule);
            }
        }

        match best {
            Some(rule) => {
                tracing::info!(
                    rule_id = rule.rule_id,
                    rule_name = %rule.rule_name,
                    discount_percent = %rule.discount_value,
                    customer_id = ctx.customer_id,
                    "discount applied"
                );
                DiscountDecision::with_rule(subtotal, rule, ctx.first_time_buyer)
            }
            None => DiscountDecision::no_discount(subtotal, ctx.first_time_buyer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn first_timer() -> CustomerContext {
        CustomerContext {
            customer_id: 1,
            first_time_buyer: true,
        }
    }

    fn returning() -> CustomerContext {
        CustomerContext {
            customer_id: 1,
            first_time_buyer: false,
        }
    }

    fn engine(store: &Arc<MemoryStore>) -> DiscountEngine {
        DiscountEngine::new(store.clone())
    }

    #[tokio::test]
    async fn test_first_time_rule_applies_only_to_first_timers() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_rule("Welcome", dec!(35), 10, &[("first_time_purchase", "true")])
            .await;
        let engine = engine(&store);

        let granted = engine
            .select_best_discount(&first_timer(), dec!(200.00), Utc::now())
            .await;
        assert_eq!(granted.discount_percent, dec!(35));
        assert_eq!(granted.discount_amount, dec!(70.00));
        assert_eq!(granted.final_total, dec!(130.00));
        assert_eq!(granted.applied_rule.as_ref().unwrap().rule_name, "Welcome");

        let denied = engine
            .select_best_discount(&returning(), dec!(200.00), Utc::now())
            .await;
        assert_eq!(denied.discount_percent, dec!(0));
        assert_eq!(denied.final_total, dec!(200.00));
        assert!(denied.applied_rule.is_none());
    }

    #[tokio::test]
    async fn test_highest_value_wins_and_ties_keep_the_earliest() {
        let store = Arc::new(MemoryStore::new());
        store.add_rule("Small", dec!(5), 10, &[]).await;
        store.add_rule("Big", dec!(20), 20, &[]).await;
        store.add_rule("Big Too", dec!(20), 30, &[]).await;
        let engine = engine(&store);

        let decision = engine
            .select_best_discount(&returning(), dec!(100.00), Utc::now())
            .await;
        assert_eq!(decision.applied_rule.as_ref().unwrap().rule_name, "Big");
        assert_eq!(decision.discount_amount, dec!(20.00));
    }

    #[tokio::test]
    async fn test_selection_is_deterministic() {
        let store = Arc::new(MemoryStore::new());
        store.add_rule("A", dec!(15), 10, &[]).await;
        store.add_rule("B", dec!(15), 10, &[]).await;
        let engine = engine(&store);

        let first = engine
            .select_best_discount(&returning(), dec!(80.00), Utc::now())
            .await;
        for _ in 0..5 {
            let again = engine
                .select_best_discount(&returning(), dec!(80.00), Utc::now())
                .await;
            assert_eq!(
                again.applied_rule.as_ref().unwrap().rule_id,
                first.applied_rule.as_ref().unwrap().rule_id
            );
        }
    }

    #[tokio::test]
    async fn test_all_conditions_must_hold() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_rule(
                "Bulk Welcome",
                dec!(25),
                10,
                &[
                    ("first_time_purchase", "true"),
                    ("order_total_min", "150.00"),
                ],
            )
            .await;
        let engine = engine(&store);

        let under_minimum = engine
            .select_best_discount(&first_timer(), dec!(149.99), Utc::now())
            .await;
        assert!(under_minimum.applied_rule.is_none());

        let at_minimum = engine
            .select_best_discount(&first_timer(), dec!(150.00), Utc::now())
            .await;
        assert!(at_minimum.applied_rule.is_some());
    }

    #[tokio::test]
    async fn test_unknown_condition_passes_and_invalid_blocks() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_rule("Mystery", dec!(10), 10, &[("loyalty_tier", "gold")])
            .await;
        store
            .add_rule("Broken", dec!(50), 20, &[("order_total_min", "lots")])
            .await;
        let engine = engine(&store);

        let decision = engine
            .select_best_discount(&returning(), dec!(60.00), Utc::now())
            .await;
        assert_eq!(decision.applied_rule.as_ref().unwrap().rule_name, "Mystery");
        assert_eq!(decision.discount_percent, dec!(10));
    }

    #[tokio::test]
    async fn test_date_range_bounds_are_inclusive() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_rule(
                "Spring",
                dec!(12),
                10,
                &[("date_range", "2026-03-01..2026-03-31")],
            )
            .await;
        let engine = engine(&store);

        let last_day = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 4, 1, 0, 1, 0).unwrap();

        let inside = engine
            .select_best_discount(&returning(), dec!(40.00), last_day)
            .await;
        assert!(inside.applied_rule.is_some());

        let outside = engine
            .select_best_discount(&returning(), dec!(40.00), after)
            .await;
        assert!(outside.applied_rule.is_none());
    }

    #[tokio::test]
    async fn test_rule_source_failure_degrades_to_zero_discount() {
        let store = Arc::new(MemoryStore::new());
        store.add_rule("Welcome", dec!(35), 10, &[]).await;
        store.set_rules_unavailable(true).await;
        let engine = engine(&store);

        let decision = engine
            .select_best_discount(&first_timer(), dec!(200.00), Utc::now())
            .await;
        assert_eq!(decision.discount_percent, dec!(0));
        assert_eq!(decision.discount_amount, dec!(0.00));
        assert_eq!(decision.final_total, dec!(200.00));
        assert!(decision.applied_rule.is_none());
        assert!(decision.degraded.is_some());
    }

    #[tokio::test]
    async fn test_no_rules_means_no_discount() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);

        let decision = engine
            .select_best_discount(&first_timer(), dec!(75.50), Utc::now())
            .await;
        assert_eq!(decision.original_total, dec!(75.50));
        assert_eq!(decision.final_total, dec!(75.50));
        assert!(decision.applied_rule.is_none());
        assert!(decision.degraded.is_none());
    }
}

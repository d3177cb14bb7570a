use fxhash::FxHashMap;
use indexmap::{IndexMap, IndexSet};
use rust_decimal::Decimal;

use crate::{
    model::{
        AllocationOutcome, BreakdownEntry, Money, ParticipantCost, Receipt, DISCOUNT_LINE_ID,
        DISCOUNT_LINE_NAME,
    },
    services::LineClassifier,
};

/// Pure allocation of receipt line costs to participants.
pub struct CostAllocator;

impl CostAllocator {
    /// Computes every participant's owed amount from the current assignments.
    ///
    /// Each billable line's total is divided equally among its assignees with
    /// exact decimal arithmetic, then the receipt-level discount is
    /// distributed in proportion to each participant's base cost. Assignees
    /// that are not in `participants` are ignored entirely. An empty
    /// participant list yields an empty result.
    pub fn allocate<'a>(
        receipt: &'a Receipt,
        assignments: &IndexMap<&'a str, IndexSet<&'a str>>,
        participants: &'a [&'a str],
    ) -> AllocationOutcome<'a> {
        let billable = LineClassifier::billable_lines(receipt);

        tracing::debug!(
            line_count = billable.len(),
            participant_count = participants.len(),
            total_discount = %receipt.total_discount,
            "allocation started"
        );
        if !receipt.is_reconciled() {
            tracing::warn!(
                total = %receipt.total,
                expected_total = %receipt.expected_total(),
                gap = %receipt.reconciliation_gap(),
                "receipt totals do not reconcile; apportioning from line totals"
            );
        }

        let index_of: FxHashMap<&str, usize> = participants
            .iter()
            .enumerate()
            .map(|(idx, &participant)| (participant, idx))
            .collect();
        let mut costs: Vec<ParticipantCost<'a>> = participants
            .iter()
            .map(|&participant| ParticipantCost::unassigned(participant))
            .collect();

        let mut unassigned_line_ids = Vec::new();
        for line in billable {
            let assignees: Vec<&'a str> = assignments
                .get(line.id.as_str())
                .map(|set| {
                    set.iter()
                        .copied()
                        .filter(|assignee| index_of.contains_key(assignee))
                        .collect()
                })
                .unwrap_or_default();

            if assignees.is_empty() {
                unassigned_line_ids.push(line.id.as_str());
                continue;
            }

            let cost_per_person = line.line_total() / Decimal::from(assignees.len() as u64);
            for assignee in assignees {
                let cost = &mut costs[index_of[assignee]];
                cost.total_cost += cost_per_person;
                cost.breakdown.push(BreakdownEntry {
                    line_id: line.id.as_str(),
                    name: line.name.as_str(),
                    cost: cost_per_person,
                });
            }
        }

        let assigned_total: Money = costs.iter().map(|cost| cost.total_cost).sum();
        let undistributed_discount =
            Self::distribute_discount(receipt.total_discount, assigned_total, &mut costs);

        AllocationOutcome {
            per_participant: costs,
            unassigned_line_ids,
            undistributed_discount,
            assigned_total,
        }
    }

    /// Subtracts each participant's proportional discount share and returns
    /// the amount that could not be distributed.
    ///
    /// Proportional shares are computed without intermediate rounding. Every
    /// operation re-rounds at decimal precision, so after the subtraction
    /// pass the totals are re-pinned: the last participant with a positive
    /// base cost absorbs the precision residual, making the post-discount
    /// totals sum to `assigned_total - total_discount` exactly in
    /// participant order.
    fn distribute_discount(
        total_discount: Money,
        assigned_total: Money,
        costs: &mut [ParticipantCost<'_>],
    ) -> Money {
        if total_discount <= Money::ZERO {
            return Money::ZERO;
        }
        if assigned_total.is_zero() {
            return total_discount;
        }
        // Base costs are never negative, so a positive assigned total
        // implies at least one positive cost.
        let Some(absorber) = costs.iter().rposition(|cost| cost.total_cost > Money::ZERO) else {
            return total_discount;
        };

        for cost in costs.iter_mut() {
            let share = Money::from_decimal(
                cost.total_cost.as_decimal() / assigned_total.as_decimal()
                    * total_discount.as_decimal(),
            );
            cost.total_cost -= share;
            cost.breakdown.push(BreakdownEntry {
                line_id: DISCOUNT_LINE_ID,
                name: DISCOUNT_LINE_NAME,
                cost: -share,
            });
        }

        // Participants after the absorber carry a zero base cost and a zero
        // share, so pinning the absorber's total to the expected remainder
        // of the running sum restores the exact conservation invariant.
        let expected_sum = assigned_total - total_discount;
        let prefix: Money = costs[..absorber]
            .iter()
            .map(|cost| cost.total_cost)
            .sum();
        let corrected = expected_sum - prefix;
        let cost = &mut costs[absorber];
        let residual = corrected - cost.total_cost;
        if !residual.is_zero() {
            cost.total_cost = corrected;
            if let Some(entry) = cost.breakdown.last_mut() {
                entry.cost += residual;
            }
        }

        Money::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReceiptLine;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    fn line(id: &str, name: &str, cents: i64) -> ReceiptLine {
        ReceiptLine {
            id: id.to_owned(),
            name: name.to_owned(),
            quantity: Decimal::ONE,
            unit_price_with_discount: Some(Money::new(cents, 2)),
            unit_price_without_discount: None,
            category: None,
        }
    }

    fn receipt(lines: Vec<ReceiptLine>, discount_cents: i64) -> Receipt {
        let subtotal: Money = lines.iter().map(ReceiptLine::line_total).sum();
        let total = subtotal - Money::new(discount_cents, 2);
        Receipt {
            lines,
            subtotal,
            tax: Money::ZERO,
            tip: Money::ZERO,
            total_discount: Money::new(discount_cents, 2),
            total,
            currency: "USD".to_owned(),
        }
    }

    fn assignments<'a>(
        entries: &[(&'a str, &[&'a str])],
    ) -> IndexMap<&'a str, IndexSet<&'a str>> {
        entries
            .iter()
            .map(|(line_id, assigned)| (*line_id, assigned.iter().copied().collect()))
            .collect()
    }

    #[fixture]
    fn burger_and_fries() -> Receipt {
        receipt(
            vec![line("1", "Burger", 1000), line("2", "Fries", 400)],
            200,
        )
    }

    fn epsilon() -> Money {
        Money::new(1, 6)
    }

    #[rstest]
    fn worked_discount_scenario(burger_and_fries: Receipt) {
        let participants = ["a", "b"];
        let assignments = assignments(&[("1", &["a", "b"]), ("2", &["a"])]);

        let outcome = CostAllocator::allocate(&burger_and_fries, &assignments, &participants);

        assert_eq!(outcome.assigned_total, Money::new(1400, 2));
        assert!(outcome.unassigned_line_ids.is_empty());
        assert!(outcome.undistributed_discount.is_zero());

        let a = &outcome.per_participant[0];
        let b = &outcome.per_participant[1];
        assert_eq!(a.participant, "a");
        assert_eq!(b.participant, "b");

        // a: 5.00 + 4.00 - 2.00 * 9/14; b: 5.00 - 2.00 * 5/14
        assert!((a.total_cost - Money::new(7_714_286, 6)).abs() <= epsilon());
        assert!((b.total_cost - Money::new(4_285_714, 6)).abs() <= epsilon());
        assert_eq!(a.total_cost + b.total_cost, Money::new(1200, 2));

        let a_entries: Vec<&str> = a.breakdown.iter().map(|entry| entry.line_id).collect();
        assert_eq!(a_entries, ["1", "2", DISCOUNT_LINE_ID]);
        let b_discount = b.breakdown.last().expect("discount entry");
        assert_eq!(b_discount.name, DISCOUNT_LINE_NAME);
        assert!(b_discount.cost < Money::ZERO);
    }

    #[rstest]
    #[case::sole_assignee(&["a"], Money::new(1000, 2))]
    #[case::two_way(&["a", "b"], Money::new(500, 2))]
    #[case::four_way(&["a", "b", "c", "d"], Money::new(250, 2))]
    fn equal_split_per_assignee(#[case] assigned: &[&str], #[case] expected: Money) {
        let receipt = receipt(vec![line("1", "Burger", 1000)], 0);
        let participants = ["a", "b", "c", "d"];
        let assignments = assignments(&[("1", assigned)]);

        let outcome = CostAllocator::allocate(&receipt, &assignments, &participants);

        for cost in &outcome.per_participant {
            if assigned.contains(&cost.participant) {
                assert_eq!(cost.total_cost, expected);
            } else {
                assert!(cost.total_cost.is_zero());
                assert!(cost.breakdown.is_empty());
            }
        }
    }

    #[rstest]
    fn unassigned_lines_are_reported_and_cost_nothing(burger_and_fries: Receipt) {
        let participants = ["a", "b"];
        let assignments = assignments(&[("1", &["a"]), ("2", &[])]);

        let outcome = CostAllocator::allocate(&burger_and_fries, &assignments, &participants);

        assert_eq!(outcome.unassigned_line_ids, ["2"]);
        assert_eq!(outcome.assigned_total, Money::new(1000, 2));
        let b = &outcome.per_participant[1];
        assert!(b.breakdown.iter().all(|entry| entry.line_id != "2"));
    }

    #[rstest]
    fn discount_is_undistributed_when_nothing_assigned(burger_and_fries: Receipt) {
        let participants = ["a", "b"];
        let assignments = assignments(&[("1", &[]), ("2", &[])]);

        let outcome = CostAllocator::allocate(&burger_and_fries, &assignments, &participants);

        assert_eq!(outcome.undistributed_discount, Money::new(200, 2));
        assert_eq!(outcome.unassigned_line_ids, ["1", "2"]);
        for cost in &outcome.per_participant {
            assert!(cost.total_cost.is_zero());
        }
    }

    #[rstest]
    fn empty_participant_list_yields_empty_result(burger_and_fries: Receipt) {
        let assignments = assignments(&[("1", &["a"])]);

        let outcome = CostAllocator::allocate(&burger_and_fries, &assignments, &[]);

        assert!(outcome.per_participant.is_empty());
        assert_eq!(outcome.unassigned_line_ids, ["1", "2"]);
        assert_eq!(outcome.undistributed_discount, Money::new(200, 2));
    }

    #[rstest]
    fn unknown_assignees_are_ignored(burger_and_fries: Receipt) {
        let participants = ["a"];
        let assignments = assignments(&[("1", &["a", "ghost"]), ("2", &["ghost"])]);

        let outcome = CostAllocator::allocate(&burger_and_fries, &assignments, &participants);

        // "ghost" neither dilutes the burger split nor covers the fries.
        assert_eq!(outcome.unassigned_line_ids, ["2"]);
        let base: Money = outcome.per_participant[0]
            .breakdown
            .iter()
            .filter(|entry| entry.line_id != DISCOUNT_LINE_ID)
            .map(|entry| entry.cost)
            .sum();
        assert_eq!(base, Money::new(1000, 2));
    }

    #[rstest]
    fn discount_above_assigned_total_goes_negative(burger_and_fries: Receipt) {
        let mut receipt = burger_and_fries;
        receipt.total_discount = Money::new(2000, 2);
        let participants = ["a"];
        let assignments = assignments(&[("1", &["a"]), ("2", &["a"])]);

        let outcome = CostAllocator::allocate(&receipt, &assignments, &participants);

        // No clamping: 14.00 assigned minus a 20.00 discount.
        assert_eq!(outcome.per_participant[0].total_cost, Money::new(-600, 2));
    }

    #[rstest]
    fn conservation_is_exact_for_non_terminating_splits() {
        // 48.59 / 3 and 95.87 / 3 both repeat forever, so every operation
        // re-rounds at decimal precision; the totals must still sum exactly.
        let receipt = receipt(vec![line("1", "Tasting menu", 4859)], 9587);
        let participants = ["a", "b", "c"];
        let assignments = assignments(&[("1", &["a", "b", "c"])]);

        let outcome = CostAllocator::allocate(&receipt, &assignments, &participants);

        let after: Money = outcome
            .per_participant
            .iter()
            .map(|cost| cost.total_cost)
            .sum();
        assert_eq!(after, outcome.assigned_total - Money::new(9587, 2));

        // (48.59 - 95.87) / 3 = -15.76
        for cost in &outcome.per_participant {
            assert!((cost.total_cost - Money::new(-1576, 2)).abs() <= epsilon());
        }
    }

    #[rstest]
    fn allocate_is_idempotent(burger_and_fries: Receipt) {
        let participants = ["a", "b"];
        let assignments = assignments(&[("1", &["a", "b"]), ("2", &["b"])]);

        let first = CostAllocator::allocate(&burger_and_fries, &assignments, &participants);
        let second = CostAllocator::allocate(&burger_and_fries, &assignments, &participants);
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn base_costs_conserve_line_totals(
            prices in prop::collection::vec(1i64..=100_000, 1..=8),
            masks in prop::collection::vec(0u8..=15, 1..=8),
        ) {
            let participants = ["a", "b", "c", "d"];
            let lines: Vec<ReceiptLine> = prices
                .iter()
                .enumerate()
                .map(|(idx, &cents)| line(&format!("{idx}"), "Item", cents))
                .collect();
            let receipt = receipt(lines, 0);

            let ids: Vec<String> = (0..prices.len()).map(|idx| format!("{idx}")).collect();
            let mut assignments: IndexMap<&str, IndexSet<&str>> = IndexMap::new();
            let mut expected = Money::ZERO;
            for (idx, id) in ids.iter().enumerate() {
                let mask = masks.get(idx).copied().unwrap_or(0);
                let assigned: IndexSet<&str> = participants
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1 << bit) != 0)
                    .map(|(_, &p)| p)
                    .collect();
                if !assigned.is_empty() {
                    expected += Money::new(prices[idx], 2);
                }
                assignments.insert(id.as_str(), assigned);
            }

            let outcome = CostAllocator::allocate(&receipt, &assignments, &participants);
            let total: Money = outcome.per_participant.iter().map(|cost| cost.total_cost).sum();
            prop_assert!((total - expected).abs() <= Money::new(1, 6));
            prop_assert_eq!(outcome.assigned_total, total);
        }

        #[test]
        fn discount_distribution_conserves_total(
            prices in prop::collection::vec(1i64..=100_000, 1..=6),
            discount_cents in 1i64..=50_000,
        ) {
            let participants = ["a", "b", "c"];
            let lines: Vec<ReceiptLine> = prices
                .iter()
                .enumerate()
                .map(|(idx, &cents)| line(&format!("{idx}"), "Item", cents))
                .collect();
            let receipt = receipt(lines, discount_cents);

            let ids: Vec<String> = (0..prices.len()).map(|idx| format!("{idx}")).collect();
            let assignments: IndexMap<&str, IndexSet<&str>> = ids
                .iter()
                .enumerate()
                .map(|(idx, id)| {
                    let assigned: IndexSet<&str> =
                        participants.iter().copied().take(idx % 3 + 1).collect();
                    (id.as_str(), assigned)
                })
                .collect();

            let outcome = CostAllocator::allocate(&receipt, &assignments, &participants);
            let after: Money = outcome.per_participant.iter().map(|cost| cost.total_cost).sum();
            prop_assert_eq!(after, outcome.assigned_total - Money::new(discount_cents, 2));
            prop_assert!(outcome.undistributed_discount.is_zero());
        }
    }
}

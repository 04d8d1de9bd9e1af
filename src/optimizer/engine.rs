use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Result of one redistribution pass over a server's pledges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Actual charge per pledger, parallel to the input slice
    pub optimized_costs: Vec<Decimal>,
    /// Whether the server can take another pledger
    pub is_accepting_pledges: bool,
    /// Hard cap on pledger count given the floor
    pub max_people: usize,
    pub total_pledged: Decimal,
    /// Total monthly saving across all pledgers
    pub savings: Decimal,
}

/// What a prospective pledger would actually pay, shown before they commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PledgePreview {
    #[serde(with = "rust_decimal::serde::float")]
    pub estimated_payment: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub potential_savings: Decimal,
}

/// Round to cents, half away from zero. Applied after each computation,
/// never before, so rounding error does not compound.
fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Hard cap on pledger count: the server cost divided by the floor
pub fn max_people(server_cost: Decimal, min_cost_per_person: Decimal) -> usize {
    if min_cost_per_person <= Decimal::ZERO {
        return 0;
    }
    (server_cost / min_cost_per_person)
        .floor()
        .to_usize()
        .unwrap_or(0)
}

/// A new pledge fits only while the count stays under the cap
pub fn can_accept_pledge(
    current_count: usize,
    server_cost: Decimal,
    min_cost_per_person: Decimal,
) -> bool {
    current_count < max_people(server_cost, min_cost_per_person)
}

/// Compute each pledger's actual payment for one cycle.
///
/// Deterministic and side-effect free; `optimized_costs` is parallel to
/// `pledge_amounts`. Cases in order:
/// 1. no pledges: empty cost list, still accepting
/// 2. at/above capacity: everyone pays exactly the floor
/// 3. under-funded: everyone pays what they pledged
/// 4. over-funded: the excess is spread proportionally across pledges
///    above the floor; nobody is pushed below it
pub fn optimize(
    pledge_amounts: &[Decimal],
    server_cost: Decimal,
    min_cost_per_person: Decimal,
) -> OptimizationResult {
    let capacity = max_people(server_cost, min_cost_per_person);
    let count = pledge_amounts.len();

    // Case 1: nobody has pledged yet
    if count == 0 {
        return OptimizationResult {
            optimized_costs: Vec::new(),
            is_accepting_pledges: true,
            max_people: capacity,
            total_pledged: Decimal::ZERO,
            savings: Decimal::ZERO,
        };
    }

    let total_pledged: Decimal = pledge_amounts.iter().copied().sum();

    let optimized_costs: Vec<Decimal> = if count >= capacity {
        // Case 2: oversubscribed - the floor covers the cost, so every
        // pledger pays exactly the floor regardless of what they pledged
        vec![round_money(min_cost_per_person); count]
    } else if total_pledged < server_cost {
        // Case 3: goal not met - nobody subsidizes anyone yet
        pledge_amounts.iter().map(|a| round_money(*a)).collect()
    } else {
        // Case 4: over-funded
        redistribute(pledge_amounts, total_pledged, server_cost, min_cost_per_person)
    };

    let total_after: Decimal = optimized_costs.iter().copied().sum();

    OptimizationResult {
        optimized_costs,
        is_accepting_pledges: count < capacity,
        max_people: capacity,
        total_pledged,
        savings: round_money(total_pledged - total_after),
    }
}

/// Spread the over-funding across pledgers who are above the floor,
/// proportionally to how far above it each one sits.
fn redistribute(
    pledge_amounts: &[Decimal],
    total_pledged: Decimal,
    server_cost: Decimal,
    min_cost_per_person: Decimal,
) -> Vec<Decimal> {
    let excess = total_pledged - server_cost;

    let total_reducible: Decimal = pledge_amounts
        .iter()
        .filter(|a| **a > min_cost_per_person)
        .map(|a| *a - min_cost_per_person)
        .sum();

    if excess >= total_reducible {
        // More excess than headroom: everyone above the floor drops to it
        // and the remainder stays unallocated. The floor is never broken,
        // so the sum can land short of the cost here.
        return pledge_amounts
            .iter()
            .map(|a| {
                if *a > min_cost_per_person {
                    round_money(min_cost_per_person)
                } else {
                    round_money(*a)
                }
            })
            .collect();
    }

    pledge_amounts
        .iter()
        .map(|amount| {
            if *amount > min_cost_per_person {
                let max_reduction = *amount - min_cost_per_person;
                let reduction = max_reduction / total_reducible * excess;
                round_money(*amount - reduction)
            } else {
                round_money(*amount)
            }
        })
        .collect()
}

/// Run the full algorithm with the candidate appended and report what the
/// last slot would pay
pub fn preview_for_new_pledger(
    candidate_amount: Decimal,
    existing_amounts: &[Decimal],
    server_cost: Decimal,
    min_cost_per_person: Decimal,
) -> PledgePreview {
    let mut amounts = existing_amounts.to_vec();
    amounts.push(candidate_amount);

    let result = optimize(&amounts, server_cost, min_cost_per_person);
    let estimated_payment = result
        .optimized_costs
        .last()
        .copied()
        .unwrap_or(candidate_amount);

    PledgePreview {
        estimated_payment,
        potential_savings: round_money(candidate_amount - estimated_payment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MIN: Decimal = dec!(2.00);

    fn total(costs: &[Decimal]) -> Decimal {
        costs.iter().copied().sum()
    }

    #[test]
    fn test_no_pledges_reports_capacity() {
        let result = optimize(&[], dec!(20.00), MIN);

        assert!(result.optimized_costs.is_empty());
        assert!(result.is_accepting_pledges);
        assert_eq!(result.max_people, 10);
        assert_eq!(result.total_pledged, Decimal::ZERO);
        assert_eq!(result.savings, Decimal::ZERO);
    }

    #[test]
    fn test_proportional_reduction_over_funded() {
        // Three members pledging 10 toward a 20 cost server: excess 10,
        // each reducible by 8, so each pays 10 - (8/24)*10 = 6.67
        let amounts = vec![dec!(10), dec!(10), dec!(10)];
        let result = optimize(&amounts, dec!(20.00), MIN);

        assert_eq!(
            result.optimized_costs,
            vec![dec!(6.67), dec!(6.67), dec!(6.67)]
        );
        // Per-member rounding may land the sum a cent off the cost
        let diff = (total(&result.optimized_costs) - dec!(20.00)).abs();
        assert!(diff <= dec!(0.01) * Decimal::from(3));
        assert!(result.is_accepting_pledges);
        assert_eq!(result.max_people, 10);
        assert_eq!(result.total_pledged, dec!(30));
    }

    #[test]
    fn test_at_capacity_everyone_pays_floor() {
        // Five members at the floor for a 10 cost server fills capacity
        let amounts = vec![dec!(2), dec!(2), dec!(2), dec!(2), dec!(2)];
        let result = optimize(&amounts, dec!(10.00), MIN);

        assert_eq!(result.optimized_costs, vec![dec!(2.00); 5]);
        assert!(!result.is_accepting_pledges);
        assert_eq!(result.max_people, 5);
    }

    #[test]
    fn test_under_funded_no_redistribution() {
        let result = optimize(&[dec!(5)], dec!(30.00), MIN);

        assert_eq!(result.optimized_costs, vec![dec!(5.00)]);
        assert_eq!(result.savings, Decimal::ZERO);
        assert!(result.is_accepting_pledges);
    }

    #[test]
    fn test_over_funded_sum_matches_cost() {
        // excess 2 across reducible headroom 4: each drops by 1
        let result = optimize(&[dec!(4), dec!(4)], dec!(6.00), MIN);

        assert_eq!(result.optimized_costs, vec![dec!(3.00), dec!(3.00)]);
        assert_eq!(total(&result.optimized_costs), dec!(6.00));
        assert_eq!(result.savings, dec!(2.00));
    }

    #[test]
    fn test_bounds_hold_in_redistribution_cases() {
        let cases: Vec<(Vec<Decimal>, Decimal)> = vec![
            (vec![dec!(10), dec!(10), dec!(10)], dec!(20)),
            (vec![dec!(30), dec!(2.50), dec!(7)], dec!(25)),
            (vec![dec!(5)], dec!(30)),
            (vec![dec!(12.34), dec!(5.55), dec!(8.88), dec!(2)], dec!(22)),
            (vec![dec!(6)], dec!(4)),
        ];

        for (amounts, cost) in cases {
            let result = optimize(&amounts, cost, MIN);
            for (optimized, pledged) in result.optimized_costs.iter().zip(amounts.iter()) {
                assert!(
                    *optimized >= MIN || *optimized == *pledged,
                    "cost {} broke the floor for pledge {}",
                    optimized,
                    pledged
                );
                assert!(
                    *optimized <= *pledged,
                    "cost {} exceeds pledge {}",
                    optimized,
                    pledged
                );
            }
        }
    }

    #[test]
    fn test_over_funded_never_collects_above_cost_plus_rounding() {
        let cases: Vec<(Vec<Decimal>, Decimal)> = vec![
            (vec![dec!(10), dec!(10), dec!(10)], dec!(20)),
            (vec![dec!(30), dec!(30)], dec!(45)),
            (vec![dec!(9.99), dec!(3.33), dec!(7.77)], dec!(15)),
            (vec![dec!(6)], dec!(4)),
        ];

        for (amounts, cost) in cases {
            let result = optimize(&amounts, cost, MIN);
            let cent_slack = dec!(0.01) * Decimal::from(amounts.len() as u32);
            assert!(
                total(&result.optimized_costs) <= cost + cent_slack,
                "collected {} above cost {}",
                total(&result.optimized_costs),
                cost
            );
        }
    }

    #[test]
    fn test_optimize_is_deterministic() {
        let amounts = vec![dec!(12.34), dec!(5.55), dec!(8.88)];
        let first = optimize(&amounts, dec!(20.00), MIN);
        let second = optimize(&amounts, dec!(20.00), MIN);

        assert_eq!(first, second);
    }

    #[test]
    fn test_capacity_boundary() {
        // floor(20 / 2) = 10
        assert!(can_accept_pledge(9, dec!(20.00), MIN));
        assert!(!can_accept_pledge(10, dec!(20.00), MIN));
        assert!(!can_accept_pledge(11, dec!(20.00), MIN));

        // floor(15 / 2) = 7
        assert_eq!(max_people(dec!(15.00), MIN), 7);
        assert!(can_accept_pledge(6, dec!(15.00), MIN));
        assert!(!can_accept_pledge(7, dec!(15.00), MIN));
    }

    #[test]
    fn test_preview_matches_full_run() {
        let existing = vec![dec!(10), dec!(10)];
        let preview = preview_for_new_pledger(dec!(10), &existing, dec!(20.00), MIN);

        // Identical to scenario: third pledger joins [10, 10] on a 20 server
        assert_eq!(preview.estimated_payment, dec!(6.67));
        assert_eq!(preview.potential_savings, dec!(3.33));
    }

    #[test]
    fn test_preview_under_funded_pays_full_amount() {
        let preview = preview_for_new_pledger(dec!(5), &[], dec!(30.00), MIN);

        assert_eq!(preview.estimated_payment, dec!(5.00));
        assert_eq!(preview.potential_savings, Decimal::ZERO);
    }

    #[test]
    fn test_single_pledger_covering_cost_pays_cost() {
        let result = optimize(&[dec!(6)], dec!(4.00), MIN);

        // excess 2 against headroom 4: pays exactly the cost
        assert_eq!(result.optimized_costs, vec![dec!(4.00)]);
    }
}

use std::cmp::Reverse;

use crate::balance::MemberBalance;
use serde::{Deserialize, Serialize};

/// Balances within a cent of zero are considered settled.
pub const EPSILON: f64 = 0.01;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SuggestedPayment {
    pub from: String,
    pub to: String,
    pub amount: f64,
}

/// How debtors and creditors are lined up before settling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOrder {
    /// Group order, as members joined.
    #[default]
    Encounter,
    /// Biggest debts and credits first.
    LargestFirst,
}

#[derive(Clone, Debug)]
struct PersonalBalance<'a> {
    name: &'a str,
    cents: i64,
}

// Greedy two-pointer settlement over whole cents. Every round zeroes at
// least one side, so it emits at most debtors + creditors - 1 payments, and
// the emitted amounts are exactly the amounts the loop moves.
pub fn simplify_debts(balances: &[MemberBalance], order: SettlementOrder) -> Vec<SuggestedPayment> {
    // Members within a cent of zero are settled.
    let active: Vec<&MemberBalance> = balances
        .iter()
        .filter(|member| member.balance.abs() > EPSILON)
        .collect();
    let total: f64 = balances.iter().map(|member| member.balance).sum();
    let raw: Vec<f64> = active.iter().map(|member| member.balance).collect();
    let cents = to_cents(&raw, (total * 100.0).round() as i64);

    let mut debtors = Vec::new();
    let mut creditors = Vec::new();
    for (member, cents) in active.into_iter().zip(cents) {
        let person = PersonalBalance {
            name: &member.display_name,
            cents,
        };
        if cents < 0 {
            debtors.push(person);
        } else if cents > 0 {
            creditors.push(person);
        }
    }

    if order == SettlementOrder::LargestFirst {
        // Stable sorts keep group order among equal balances.
        debtors.sort_by_key(|person| person.cents);
        creditors.sort_by_key(|person| Reverse(person.cents));
    }

    let mut payments = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < debtors.len() && j < creditors.len() {
        let debtor = &mut debtors[i];
        let creditor = &mut creditors[j];
        let amount = (-debtor.cents).min(creditor.cents);

        payments.push(SuggestedPayment {
            from: debtor.name.to_string(),
            to: creditor.name.to_string(),
            amount: amount as f64 / 100.0,
        });

        debtor.cents += amount;
        creditor.cents -= amount;

        if debtor.cents == 0 {
            i += 1;
        }
        if creditor.cents == 0 {
            j += 1;
        }
    }
    payments
}

/// Rounds each balance to whole cents so that together they add up to
/// `target`. Leftover cents go to the largest fractional parts first.
fn to_cents(balances: &[f64], target: i64) -> Vec<i64> {
    let scaled: Vec<f64> = balances
        .iter()
        .map(|balance| {
            let scaled = balance * 100.0;
            // Whole-cent inputs come back from f64 a hair off.
            if (scaled - scaled.round()).abs() < 1e-6 {
                scaled.round()
            } else {
                scaled
            }
        })
        .collect();
    let mut cents: Vec<i64> = scaled.iter().map(|s| s.floor() as i64).collect();
    if cents.is_empty() {
        return cents;
    }

    let mut by_remainder: Vec<usize> = (0..cents.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let rest_a = scaled[a] - scaled[a].floor();
        let rest_b = scaled[b] - scaled[b].floor();
        rest_b.total_cmp(&rest_a)
    });

    let mut leftover = target - cents.iter().sum::<i64>();
    while leftover > 0 {
        for &k in by_remainder.iter().take(leftover as usize) {
            cents[k] += 1;
        }
        leftover -= leftover.min(cents.len() as i64);
    }
    while leftover < 0 {
        for &k in by_remainder.iter().rev().take(-leftover as usize) {
            cents[k] -= 1;
        }
        leftover += (-leftover).min(cents.len() as i64);
    }
    cents
}

/// Rounds half away from zero, like `toFixed(2)` on most inputs.
pub fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

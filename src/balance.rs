use serde::{Serialize, Serializer};

use crate::exchange::{round_to_2_decimals, simplify_debts, SettlementOrder, SuggestedPayment};
use crate::identity::DisplayNames;
use crate::schemas::{Expense, Member, UserId};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberBalance {
    pub user_id: UserId,
    #[serde(rename = "name")]
    pub display_name: String,
    /// Paid minus the even share; positive means the group owes this member.
    #[serde(serialize_with = "serialize_cents")]
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBalance {
    #[serde(rename = "members")]
    pub per_member_balance: Vec<MemberBalance>,
    pub suggested_payments: Vec<SuggestedPayment>,
    #[serde(rename = "currentActiveAmount", serialize_with = "serialize_cents")]
    pub total_active_amount: f64,
    #[serde(serialize_with = "serialize_cents")]
    pub total_historical_amount: f64,
}

/// Amounts stay exact in memory and are only rounded on the way out.
pub fn serialize_cents<S: Serializer>(amount: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to_2_decimals(*amount))
}

/// Splits every unsettled expense evenly across `members` and works out who
/// should pay whom.
///
/// Settled expenses only count towards `total_historical_amount`. Expenses
/// paid by someone who is no longer in `members` still raise the average.
pub fn compute_balances<'a, I>(
    members: &[Member],
    expenses: I,
    names: &DisplayNames,
    order: SettlementOrder,
) -> GroupBalance
where
    I: IntoIterator<Item = &'a Expense>,
{
    let mut total_historical_amount = 0.0;
    let mut active = Vec::new();
    for expense in expenses {
        total_historical_amount += expense.amount;
        if !expense.is_settled {
            active.push(expense);
        }
    }

    let total_active_amount: f64 = active.iter().map(|expense| expense.amount).sum();
    let average_per_person = total_active_amount / members.len().max(1) as f64;

    let per_member_balance: Vec<MemberBalance> = members
        .iter()
        .map(|member| {
            let paid: f64 = active
                .iter()
                .filter(|expense| expense.paid_by == member.user_id)
                .map(|expense| expense.amount)
                .sum();
            MemberBalance {
                user_id: member.user_id.clone(),
                display_name: names.name_for(&member.user_id),
                balance: paid - average_per_person,
            }
        })
        .collect();

    let suggested_payments = simplify_debts(&per_member_balance, order);

    GroupBalance {
        per_member_balance,
        suggested_payments,
        total_active_amount,
        total_historical_amount,
    }
}

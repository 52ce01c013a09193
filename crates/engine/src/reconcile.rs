//! Pure balance reconciliation.
//!
//! Replays a group's live (non-voided) facts into the derived balances: one
//! signed net amount per member and one canonical directed debt per user
//! pair. The replay is a pure function of its inputs and keeps everything in
//! `BTreeMap`s, so the same fact set always produces the same rows in the
//! same order — rerunning it on an unchanged group is bit-identical.
//!
//! Facts that contradict themselves (unknown users, non-positive totals,
//! shares that miss their total) abort the replay with
//! [`EngineError::LedgerCorruption`]; the caller must leave the existing
//! cache untouched in that case.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    EngineError, ResultEngine, expenses::Expense, money::MoneyCents, net_balances::NetBalance,
    pairwise_balances::PairwiseBalance, payments::Payment,
};

/// The derived balances of one group, ready to replace the cached rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Reconciliation {
    /// One row per membership row, zeros included, sorted by user id.
    pub net: Vec<NetBalance>,
    /// Strictly positive canonical rows, sorted by (from, to).
    pub pairwise: Vec<PairwiseBalance>,
}

/// Replay `expenses` and `payments` into balances for `members`.
pub(crate) fn reconcile(
    group_id: &str,
    members: &BTreeSet<String>,
    expenses: &[Expense],
    payments: &[Payment],
) -> ResultEngine<Reconciliation> {
    let mut net: BTreeMap<&str, i64> = members.iter().map(|m| (m.as_str(), 0)).collect();
    // Keyed by the unordered pair (low, high); positive = low owes high.
    let mut debt: BTreeMap<(&str, &str), i64> = BTreeMap::new();

    for expense in expenses {
        apply_expense(&mut net, &mut debt, expense)?;
    }
    for payment in payments {
        apply_payment(&mut net, &mut debt, payment)?;
    }

    let drift: i64 = net.values().sum();
    if drift != 0 {
        return Err(EngineError::LedgerCorruption(format!(
            "group {group_id} net balances sum to {} instead of zero",
            MoneyCents::new(drift)
        )));
    }

    let net = net
        .into_iter()
        .map(|(user_id, cents)| NetBalance {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            amount: MoneyCents::new(cents),
        })
        .collect();

    let mut pairwise: Vec<PairwiseBalance> = debt
        .into_iter()
        .filter_map(|((low, high), cents)| match cents.cmp(&0) {
            Ordering::Greater => Some(PairwiseBalance {
                group_id: group_id.to_string(),
                from_user_id: low.to_string(),
                to_user_id: high.to_string(),
                amount: MoneyCents::new(cents),
            }),
            Ordering::Less => Some(PairwiseBalance {
                group_id: group_id.to_string(),
                from_user_id: high.to_string(),
                to_user_id: low.to_string(),
                amount: MoneyCents::new(-cents),
            }),
            Ordering::Equal => None,
        })
        .collect();
    pairwise.sort_by(|a, b| {
        (&a.from_user_id, &a.to_user_id).cmp(&(&b.from_user_id, &b.to_user_id))
    });

    Ok(Reconciliation { net, pairwise })
}

fn apply_expense<'a>(
    net: &mut BTreeMap<&'a str, i64>,
    debt: &mut BTreeMap<(&'a str, &'a str), i64>,
    expense: &'a Expense,
) -> ResultEngine<()> {
    if !expense.total_amount.is_positive() {
        return Err(EngineError::LedgerCorruption(format!(
            "expense {} has a non-positive total",
            expense.id
        )));
    }
    if !net.contains_key(expense.payer_id.as_str()) {
        return Err(EngineError::LedgerCorruption(format!(
            "expense {} references unknown payer {}",
            expense.id, expense.payer_id
        )));
    }

    let mut assigned = 0i64;
    for share in &expense.shares {
        if share.amount.is_negative() {
            return Err(EngineError::LedgerCorruption(format!(
                "expense {} has a negative share for {}",
                expense.id, share.user_id
            )));
        }
        if !net.contains_key(share.user_id.as_str()) {
            return Err(EngineError::LedgerCorruption(format!(
                "expense {} references unknown participant {}",
                expense.id, share.user_id
            )));
        }
        assigned += share.amount.cents();

        // The payer's own share cancels out and moves no money.
        if share.user_id != expense.payer_id {
            *net.entry(expense.payer_id.as_str()).or_default() += share.amount.cents();
            *net.entry(share.user_id.as_str()).or_default() -= share.amount.cents();
            add_debt(debt, &share.user_id, &expense.payer_id, share.amount.cents());
        }
    }

    if assigned != expense.total_amount.cents() {
        return Err(EngineError::LedgerCorruption(format!(
            "expense {} shares sum to {} but the total is {}",
            expense.id,
            MoneyCents::new(assigned),
            expense.total_amount
        )));
    }
    Ok(())
}

fn apply_payment<'a>(
    net: &mut BTreeMap<&'a str, i64>,
    debt: &mut BTreeMap<(&'a str, &'a str), i64>,
    payment: &'a Payment,
) -> ResultEngine<()> {
    if !payment.amount.is_positive() {
        return Err(EngineError::LedgerCorruption(format!(
            "payment {} has a non-positive amount",
            payment.id
        )));
    }
    if payment.payer_id == payment.payee_id {
        return Err(EngineError::LedgerCorruption(format!(
            "payment {} pays its own payer",
            payment.id
        )));
    }
    for user_id in [&payment.payer_id, &payment.payee_id] {
        if !net.contains_key(user_id.as_str()) {
            return Err(EngineError::LedgerCorruption(format!(
                "payment {} references unknown user {user_id}",
                payment.id
            )));
        }
    }

    *net.entry(payment.payer_id.as_str()).or_default() += payment.amount.cents();
    *net.entry(payment.payee_id.as_str()).or_default() -= payment.amount.cents();
    // Handing money over creates (or cancels) debt from the payee back to
    // the payer.
    add_debt(debt, &payment.payee_id, &payment.payer_id, payment.amount.cents());
    Ok(())
}

/// Accumulate `cents` of debt from one user to another on the unordered pair
/// key, flipping the sign when the pair is stored the other way around.
fn add_debt<'a>(debt: &mut BTreeMap<(&'a str, &'a str), i64>, from: &'a str, to: &'a str, cents: i64) {
    if from < to {
        *debt.entry((from, to)).or_default() += cents;
    } else {
        *debt.entry((to, from)).or_default() -= cents;
    }
}

//! Split calculator.
//!
//! Turns an expense total plus a split method into exact per-participant
//! shares. All arithmetic is integer cents; percentages are basis points
//! (33.33% = 3333), so no floating point is involved anywhere.
//!
//! Whatever the method, the returned shares always sum to the total
//! *exactly*: leftover cents from truncating division are handed out one at
//! a time in ascending participant-id order, so the same inputs always
//! produce the same shares.

use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine, expense_shares::Share, money::MoneyCents};

/// Basis points in a whole (100%).
const FULL_SHARE_BPS: i64 = 10_000;

/// How an expense total is divided among its participants.
///
/// The method is a persisted fact on the expense, never inferred back from
/// the stored share amounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    Equal,
    Unequal,
    Percentage,
}

impl SplitMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Unequal => "unequal",
            Self::Percentage => "percentage",
        }
    }
}

impl TryFrom<&str> for SplitMethod {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "equal" => Ok(Self::Equal),
            "unequal" => Ok(Self::Unequal),
            "percentage" => Ok(Self::Percentage),
            other => Err(EngineError::InvalidAmount(format!(
                "invalid split method: {other}"
            ))),
        }
    }
}

/// Per-participant input to the split calculator.
///
/// `Equal` only needs the participant id; `Unequal` reads `amount`;
/// `Percentage` reads `percent_bps`. Fields the method does not use are
/// ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInput {
    pub user_id: String,
    pub amount: Option<MoneyCents>,
    pub percent_bps: Option<i64>,
}

impl ShareInput {
    /// Participant in an equal split.
    #[must_use]
    pub fn even(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            amount: None,
            percent_bps: None,
        }
    }

    /// Participant owing an explicit amount (unequal split).
    #[must_use]
    pub fn fixed(user_id: impl Into<String>, amount: MoneyCents) -> Self {
        Self {
            user_id: user_id.into(),
            amount: Some(amount),
            percent_bps: None,
        }
    }

    /// Participant owing a percentage, in basis points (percentage split).
    #[must_use]
    pub fn percent_bps(user_id: impl Into<String>, bps: i64) -> Self {
        Self {
            user_id: user_id.into(),
            amount: None,
            percent_bps: Some(bps),
        }
    }
}

/// Compute exact shares for `total` according to `method`.
///
/// Output is sorted by participant id and sums to `total` exactly.
pub fn compute_shares(
    total: MoneyCents,
    method: SplitMethod,
    inputs: &[ShareInput],
) -> ResultEngine<Vec<Share>> {
    if !total.is_positive() {
        return Err(EngineError::InvalidSplit(
            "total amount must be positive".to_string(),
        ));
    }
    if inputs.is_empty() {
        return Err(EngineError::InvalidSplit(
            "participant set must not be empty".to_string(),
        ));
    }

    let mut ordered: Vec<&ShareInput> = inputs.iter().collect();
    ordered.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    for input in &ordered {
        if input.user_id.trim().is_empty() {
            return Err(EngineError::InvalidSplit(
                "participant id must not be empty".to_string(),
            ));
        }
    }
    for pair in ordered.windows(2) {
        if pair[0].user_id == pair[1].user_id {
            return Err(EngineError::InvalidSplit(format!(
                "duplicate participant: {}",
                pair[0].user_id
            )));
        }
    }

    let provisional = match method {
        SplitMethod::Equal => equal_shares(total, &ordered),
        SplitMethod::Unequal => unequal_shares(total, &ordered)?,
        SplitMethod::Percentage => percentage_shares(total, &ordered)?,
    };

    reconcile_remainder(total, provisional)
}

fn equal_shares(total: MoneyCents, ordered: &[&ShareInput]) -> Vec<Share> {
    let base = total.cents() / ordered.len() as i64;
    ordered
        .iter()
        .map(|input| Share {
            user_id: input.user_id.clone(),
            amount: MoneyCents::new(base),
        })
        .collect()
}

fn unequal_shares(total: MoneyCents, ordered: &[&ShareInput]) -> ResultEngine<Vec<Share>> {
    let mut shares = Vec::with_capacity(ordered.len());
    let mut sum = 0i64;
    for input in ordered {
        let amount = input.amount.ok_or_else(|| {
            EngineError::InvalidSplit(format!("missing amount for participant {}", input.user_id))
        })?;
        if amount.is_negative() {
            return Err(EngineError::InvalidSplit(format!(
                "negative amount for participant {}",
                input.user_id
            )));
        }
        sum = sum
            .checked_add(amount.cents())
            .ok_or_else(|| EngineError::InvalidSplit("amounts too large".to_string()))?;
        shares.push(Share {
            user_id: input.user_id.clone(),
            amount,
        });
    }

    // Amounts may miss the total by at most one cent; the remainder pass
    // absorbs the gap.
    if (sum - total.cents()).abs() > 1 {
        return Err(EngineError::InvalidSplit(format!(
            "amounts sum to {}, expected {total}",
            MoneyCents::new(sum)
        )));
    }
    Ok(shares)
}

fn percentage_shares(total: MoneyCents, ordered: &[&ShareInput]) -> ResultEngine<Vec<Share>> {
    let mut shares = Vec::with_capacity(ordered.len());
    let mut sum_bps = 0i64;
    for input in ordered {
        let bps = input.percent_bps.ok_or_else(|| {
            EngineError::InvalidSplit(format!(
                "missing percentage for participant {}",
                input.user_id
            ))
        })?;
        if bps < 0 {
            return Err(EngineError::InvalidSplit(format!(
                "negative percentage for participant {}",
                input.user_id
            )));
        }
        sum_bps = sum_bps
            .checked_add(bps)
            .ok_or_else(|| EngineError::InvalidSplit("percentages too large".to_string()))?;

        let cents = i128::from(total.cents()) * i128::from(bps) / i128::from(FULL_SHARE_BPS);
        let cents = i64::try_from(cents)
            .map_err(|_| EngineError::InvalidSplit("share too large".to_string()))?;
        shares.push(Share {
            user_id: input.user_id.clone(),
            amount: MoneyCents::new(cents),
        });
    }

    // One basis point of slack, same tolerance as the unequal amounts.
    if (sum_bps - FULL_SHARE_BPS).abs() > 1 {
        return Err(EngineError::InvalidSplit(format!(
            "percentages sum to {sum_bps} bps, expected {FULL_SHARE_BPS}"
        )));
    }
    Ok(shares)
}

/// Adjust provisional shares one cent at a time, in participant order, until
/// they sum to `total` exactly. Never drives a share negative.
fn reconcile_remainder(total: MoneyCents, mut shares: Vec<Share>) -> ResultEngine<Vec<Share>> {
    let assigned: i64 = shares.iter().map(|s| s.amount.cents()).sum();
    let mut remainder = total.cents() - assigned;
    let mut index = 0usize;
    let mut skipped = 0usize;

    while remainder != 0 {
        if skipped == shares.len() {
            return Err(EngineError::InvalidSplit(
                "cannot reconcile shares to the total".to_string(),
            ));
        }
        let step = remainder.signum();
        let len = shares.len();
        let share = &mut shares[index % len];
        if step < 0 && !share.amount.is_positive() {
            index += 1;
            skipped += 1;
            continue;
        }
        share.amount += MoneyCents::new(step);
        remainder -= step;
        index += 1;
        skipped = 0;
    }

    Ok(shares)
}

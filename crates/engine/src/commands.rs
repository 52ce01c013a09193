//! Command structs for engine operations.
//!
//! These types group parameters for write operations (record/update of
//! expenses and payments), keeping call sites readable and avoiding long
//! argument lists. Timestamps default to "now" and can be pinned explicitly.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{money::MoneyCents, splits::ShareInput, splits::SplitMethod};

/// Record an expense fact.
#[derive(Clone, Debug)]
pub struct ExpenseCmd {
    pub group_id: String,
    pub payer_id: String,
    pub total_amount: MoneyCents,
    pub split_method: SplitMethod,
    pub participants: Vec<ShareInput>,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExpenseCmd {
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        payer_id: impl Into<String>,
        total_amount: MoneyCents,
        split_method: SplitMethod,
        participants: Vec<ShareInput>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            payer_id: payer_id.into(),
            total_amount,
            split_method,
            participants,
            note: None,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Record a payment fact.
#[derive(Clone, Debug)]
pub struct PaymentCmd {
    pub group_id: String,
    pub payer_id: String,
    pub payee_id: String,
    pub amount: MoneyCents,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentCmd {
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        payer_id: impl Into<String>,
        payee_id: impl Into<String>,
        amount: MoneyCents,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            payer_id: payer_id.into(),
            payee_id: payee_id.into(),
            amount,
            note: None,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Update an existing expense fact. Unset fields stay unchanged.
#[derive(Clone, Debug)]
pub struct UpdateExpenseCmd {
    pub expense_id: Uuid,

    pub payer_id: Option<String>,
    pub total_amount: Option<MoneyCents>,
    /// Fresh split inputs; required whenever the stored method needs
    /// explicit amounts or percentages for the new shares.
    pub split: Option<(SplitMethod, Vec<ShareInput>)>,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UpdateExpenseCmd {
    #[must_use]
    pub fn new(expense_id: Uuid) -> Self {
        Self {
            expense_id,
            payer_id: None,
            total_amount: None,
            split: None,
            note: None,
            created_at: None,
        }
    }

    #[must_use]
    pub fn payer_id(mut self, payer_id: impl Into<String>) -> Self {
        self.payer_id = Some(payer_id.into());
        self
    }

    #[must_use]
    pub fn total_amount(mut self, total_amount: MoneyCents) -> Self {
        self.total_amount = Some(total_amount);
        self
    }

    #[must_use]
    pub fn split(mut self, method: SplitMethod, participants: Vec<ShareInput>) -> Self {
        self.split = Some((method, participants));
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Update an existing payment fact. Unset fields stay unchanged.
#[derive(Clone, Debug)]
pub struct UpdatePaymentCmd {
    pub payment_id: Uuid,

    pub payer_id: Option<String>,
    pub payee_id: Option<String>,
    pub amount: Option<MoneyCents>,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UpdatePaymentCmd {
    #[must_use]
    pub fn new(payment_id: Uuid) -> Self {
        Self {
            payment_id,
            payer_id: None,
            payee_id: None,
            amount: None,
            note: None,
            created_at: None,
        }
    }

    #[must_use]
    pub fn payer_id(mut self, payer_id: impl Into<String>) -> Self {
        self.payer_id = Some(payer_id.into());
        self
    }

    #[must_use]
    pub fn payee_id(mut self, payee_id: impl Into<String>) -> Self {
        self.payee_id = Some(payee_id.into());
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: MoneyCents) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

use chrono::Utc;
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    commands::{PaymentCmd, UpdatePaymentCmd},
    payments::{self, Payment},
};

use super::{Engine, normalize_optional_text, with_tx};

impl Engine {
    /// Record a payment fact and fold it into the group's balances.
    ///
    /// Payer and payee must be distinct active members; the amount must be
    /// strictly positive.
    pub async fn record_payment(&self, cmd: PaymentCmd) -> ResultEngine<Payment> {
        let _guard = self.locks.acquire(&cmd.group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &cmd.group_id).await?;

            let payment = Payment::new(
                cmd.group_id.clone(),
                cmd.payer_id.clone(),
                cmd.payee_id.clone(),
                cmd.amount,
                cmd.created_at,
                normalize_optional_text(cmd.note.as_deref()),
                cmd.idempotency_key.clone(),
            )?;

            let active = self.active_member_ids(&db_tx, &cmd.group_id).await?;
            for user_id in [&payment.payer_id, &payment.payee_id] {
                if !active.contains(user_id) {
                    return Err(EngineError::InvalidAmount(format!(
                        "{user_id} is not an active member of the group"
                    )));
                }
            }

            if let Some(key) = payment.idempotency_key.as_deref() {
                self.require_unused_payment_key(&db_tx, &cmd.group_id, key)
                    .await?;
            }

            payments::ActiveModel::from(&payment).insert(&db_tx).await?;
            self.recalculate_group(&db_tx, &cmd.group_id).await?;
            Ok(payment)
        })
    }

    /// Rewrite a payment fact in place and recompute the group.
    ///
    /// Unset command fields keep their stored values; the rewritten fact
    /// must still be a valid payment.
    pub async fn update_payment(&self, cmd: UpdatePaymentCmd) -> ResultEngine<Payment> {
        let group_id = self.payment_group(cmd.payment_id).await?;
        let _guard = self.locks.acquire(&group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            let model = payments::Entity::find_by_id(cmd.payment_id.to_string())
                .filter(payments::Column::VoidedAt.is_null())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("payment not exists".to_string()))?;
            let mut payment = Payment::try_from(model)?;

            if let Some(payer_id) = &cmd.payer_id {
                payment.payer_id = payer_id.clone();
            }
            if let Some(payee_id) = &cmd.payee_id {
                payment.payee_id = payee_id.clone();
            }
            if let Some(amount) = cmd.amount {
                payment.amount = amount;
            }
            if let Some(note) = cmd.note.as_deref() {
                payment.note = normalize_optional_text(Some(note));
            }
            if let Some(created_at) = cmd.created_at {
                payment.created_at = created_at;
            }

            if !payment.amount.is_positive() {
                return Err(EngineError::InvalidAmount(
                    "amount must be > 0".to_string(),
                ));
            }
            if payment.payer_id == payment.payee_id {
                return Err(EngineError::InvalidAmount(
                    "payer and payee must differ".to_string(),
                ));
            }

            let active = self.active_member_ids(&db_tx, &group_id).await?;
            for (changed, user_id) in [
                (cmd.payer_id.is_some(), &payment.payer_id),
                (cmd.payee_id.is_some(), &payment.payee_id),
            ] {
                if changed && !active.contains(user_id) {
                    return Err(EngineError::InvalidAmount(format!(
                        "{user_id} is not an active member of the group"
                    )));
                }
            }

            payments::ActiveModel::from(&payment).update(&db_tx).await?;
            self.recalculate_group(&db_tx, &group_id).await?;
            Ok(payment)
        })
    }

    /// Void a payment fact and recompute the group.
    pub async fn delete_payment(&self, payment_id: Uuid) -> ResultEngine<()> {
        let group_id = self.payment_group(payment_id).await?;
        let _guard = self.locks.acquire(&group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            let model = payments::Entity::find_by_id(payment_id.to_string())
                .filter(payments::Column::VoidedAt.is_null())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("payment not exists".to_string()))?;

            let mut active: payments::ActiveModel = model.into();
            active.voided_at = ActiveValue::Set(Some(Utc::now()));
            active.update(&db_tx).await?;

            self.recalculate_group(&db_tx, &group_id).await?;
            Ok(())
        })
    }

    /// List a group's payments, oldest first.
    pub async fn list_payments(
        &self,
        group_id: &str,
        include_voided: bool,
    ) -> ResultEngine<Vec<Payment>> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.load_payments(&db_tx, group_id, include_voided).await
        })
    }

    /// Load a group's payments ordered by `(created_at, id)`.
    pub(super) async fn load_payments(
        &self,
        db_tx: &DatabaseTransaction,
        group_id: &str,
        include_voided: bool,
    ) -> ResultEngine<Vec<Payment>> {
        let mut query = payments::Entity::find()
            .filter(payments::Column::GroupId.eq(group_id.to_string()))
            .order_by_asc(payments::Column::CreatedAt)
            .order_by_asc(payments::Column::Id);
        if !include_voided {
            query = query.filter(payments::Column::VoidedAt.is_null());
        }
        let models = query.all(db_tx).await?;
        models.into_iter().map(Payment::try_from).collect()
    }

    /// Resolve which group a payment belongs to, for lock routing. The
    /// fact is re-read inside the transaction once the lock is held.
    async fn payment_group(&self, payment_id: Uuid) -> ResultEngine<String> {
        let model = payments::Entity::find_by_id(payment_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("payment not exists".to_string()))?;
        Ok(model.group_id)
    }

    /// An idempotency key may recur in a group only on voided payments.
    async fn require_unused_payment_key(
        &self,
        db_tx: &DatabaseTransaction,
        group_id: &str,
        key: &str,
    ) -> ResultEngine<()> {
        let taken = payments::Entity::find()
            .filter(payments::Column::GroupId.eq(group_id.to_string()))
            .filter(payments::Column::IdempotencyKey.eq(key.to_string()))
            .filter(payments::Column::VoidedAt.is_null())
            .one(db_tx)
            .await?
            .is_some();
        if taken {
            return Err(EngineError::ExistingKey(key.to_string()));
        }
        Ok(())
    }
}

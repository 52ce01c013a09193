use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveValue, DatabaseTransaction, JoinType, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    commands::{ExpenseCmd, UpdateExpenseCmd},
    expense_shares::{self, Share},
    expenses::{self, Expense},
    splits::{ShareInput, SplitMethod, compute_shares},
};

use super::{Engine, normalize_optional_text, with_tx};

impl Engine {
    /// Record an expense fact and fold it into the group's balances.
    ///
    /// The payer and every participant must be active members. Shares are
    /// computed before anything is written, so a split that cannot be made
    /// exact leaves no trace.
    pub async fn record_expense(&self, cmd: ExpenseCmd) -> ResultEngine<Expense> {
        let _guard = self.locks.acquire(&cmd.group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &cmd.group_id).await?;

            let mut expense = Expense::new(
                cmd.group_id.clone(),
                cmd.payer_id.clone(),
                cmd.total_amount,
                cmd.split_method,
                cmd.created_at,
                normalize_optional_text(cmd.note.as_deref()),
                cmd.idempotency_key.clone(),
            )?;
            expense.shares = compute_shares(cmd.total_amount, cmd.split_method, &cmd.participants)?;

            let active = self.active_member_ids(&db_tx, &cmd.group_id).await?;
            if !active.contains(&expense.payer_id) {
                return Err(EngineError::InvalidSplit(format!(
                    "payer {} is not an active member of the group",
                    expense.payer_id
                )));
            }
            for share in &expense.shares {
                if !active.contains(&share.user_id) {
                    return Err(EngineError::InvalidSplit(format!(
                        "participant {} is not an active member of the group",
                        share.user_id
                    )));
                }
            }

            if let Some(key) = expense.idempotency_key.as_deref() {
                self.require_unused_expense_key(&db_tx, &cmd.group_id, key)
                    .await?;
            }

            expenses::ActiveModel::from(&expense).insert(&db_tx).await?;
            for share in &expense.shares {
                expense_shares::ActiveModel::from((&expense.id, share))
                    .insert(&db_tx)
                    .await?;
            }

            self.recalculate_group(&db_tx, &cmd.group_id).await?;
            Ok(expense)
        })
    }

    /// Rewrite an expense fact in place and recompute the group.
    ///
    /// Unset command fields keep their stored values. When the total
    /// changes, the shares must be re-derived: equal splits re-divide over
    /// the existing participants on their own, the other methods require
    /// fresh split inputs.
    pub async fn update_expense(&self, cmd: UpdateExpenseCmd) -> ResultEngine<Expense> {
        let group_id = self.expense_group(cmd.expense_id).await?;
        let _guard = self.locks.acquire(&group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            let model = expenses::Entity::find_by_id(cmd.expense_id.to_string())
                .filter(expenses::Column::VoidedAt.is_null())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;
            let mut expense = Expense::try_from(model)?;
            expense.shares = self.load_shares(&db_tx, expense.id).await?;

            let total_changed = cmd
                .total_amount
                .is_some_and(|total| total != expense.total_amount);

            if let Some(payer_id) = &cmd.payer_id {
                expense.payer_id = payer_id.clone();
            }
            if let Some(total) = cmd.total_amount {
                if !total.is_positive() {
                    return Err(EngineError::InvalidAmount(
                        "total amount must be > 0".to_string(),
                    ));
                }
                expense.total_amount = total;
            }
            if let Some(note) = cmd.note.as_deref() {
                expense.note = normalize_optional_text(Some(note));
            }
            if let Some(created_at) = cmd.created_at {
                expense.created_at = created_at;
            }

            let active = self.active_member_ids(&db_tx, &group_id).await?;
            if cmd.payer_id.is_some() && !active.contains(&expense.payer_id) {
                return Err(EngineError::InvalidSplit(format!(
                    "payer {} is not an active member of the group",
                    expense.payer_id
                )));
            }

            if let Some((method, inputs)) = &cmd.split {
                let shares = compute_shares(expense.total_amount, *method, inputs)?;
                for share in &shares {
                    if !active.contains(&share.user_id) {
                        return Err(EngineError::InvalidSplit(format!(
                            "participant {} is not an active member of the group",
                            share.user_id
                        )));
                    }
                }
                expense.split_method = *method;
                expense.shares = shares;
            } else if total_changed {
                // The persisted method is authoritative; stored share rows
                // are never reverse-engineered into split inputs.
                if expense.split_method != SplitMethod::Equal {
                    return Err(EngineError::InvalidSplit(format!(
                        "{} expenses need fresh split inputs when the total changes",
                        expense.split_method.as_str()
                    )));
                }
                let inputs: Vec<ShareInput> = expense
                    .shares
                    .iter()
                    .map(|share| ShareInput::even(share.user_id.clone()))
                    .collect();
                expense.shares =
                    compute_shares(expense.total_amount, SplitMethod::Equal, &inputs)?;
            }

            expenses::ActiveModel::from(&expense).update(&db_tx).await?;
            expense_shares::Entity::delete_many()
                .filter(expense_shares::Column::ExpenseId.eq(expense.id.to_string()))
                .exec(&db_tx)
                .await?;
            for share in &expense.shares {
                expense_shares::ActiveModel::from((&expense.id, share))
                    .insert(&db_tx)
                    .await?;
            }

            self.recalculate_group(&db_tx, &group_id).await?;
            Ok(expense)
        })
    }

    /// Void an expense fact and recompute the group.
    ///
    /// The row survives for the audit trail but stops counting. Voided
    /// expenses cannot be voided again or edited.
    pub async fn delete_expense(&self, expense_id: Uuid) -> ResultEngine<()> {
        let group_id = self.expense_group(expense_id).await?;
        let _guard = self.locks.acquire(&group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            let model = expenses::Entity::find_by_id(expense_id.to_string())
                .filter(expenses::Column::VoidedAt.is_null())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;

            let mut active: expenses::ActiveModel = model.into();
            active.voided_at = ActiveValue::Set(Some(Utc::now()));
            active.update(&db_tx).await?;

            self.recalculate_group(&db_tx, &group_id).await?;
            Ok(())
        })
    }

    /// List a group's expenses, oldest first, shares attached.
    pub async fn list_expenses(
        &self,
        group_id: &str,
        include_voided: bool,
    ) -> ResultEngine<Vec<Expense>> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.load_expenses(&db_tx, group_id, include_voided).await
        })
    }

    /// Load a group's expenses with their share rows in one pass.
    ///
    /// Ordered by `(created_at, id)` so the replay sees facts in a stable
    /// order; shares are sorted by participant id.
    pub(super) async fn load_expenses(
        &self,
        db_tx: &DatabaseTransaction,
        group_id: &str,
        include_voided: bool,
    ) -> ResultEngine<Vec<Expense>> {
        let mut fact_query = expenses::Entity::find()
            .filter(expenses::Column::GroupId.eq(group_id.to_string()))
            .order_by_asc(expenses::Column::CreatedAt)
            .order_by_asc(expenses::Column::Id);
        let mut share_query = expense_shares::Entity::find()
            .join(JoinType::InnerJoin, expense_shares::Relation::Expenses.def())
            .filter(expenses::Column::GroupId.eq(group_id.to_string()));
        if !include_voided {
            fact_query = fact_query.filter(expenses::Column::VoidedAt.is_null());
            share_query = share_query.filter(expenses::Column::VoidedAt.is_null());
        }

        let mut shares_by_expense: HashMap<String, Vec<Share>> = HashMap::new();
        for row in share_query.all(db_tx).await? {
            let expense_id = row.expense_id.clone();
            shares_by_expense
                .entry(expense_id)
                .or_default()
                .push(Share::from(row));
        }

        let models = fact_query.all(db_tx).await?;
        let mut out = Vec::with_capacity(models.len());
        for model in models {
            let key = model.id.clone();
            let mut expense = Expense::try_from(model)?;
            let mut shares = shares_by_expense.remove(&key).unwrap_or_default();
            shares.sort_by(|a, b| a.user_id.cmp(&b.user_id));
            expense.shares = shares;
            out.push(expense);
        }
        Ok(out)
    }

    pub(super) async fn load_shares(
        &self,
        db_tx: &DatabaseTransaction,
        expense_id: Uuid,
    ) -> ResultEngine<Vec<Share>> {
        let rows = expense_shares::Entity::find()
            .filter(expense_shares::Column::ExpenseId.eq(expense_id.to_string()))
            .order_by_asc(expense_shares::Column::UserId)
            .all(db_tx)
            .await?;
        Ok(rows.into_iter().map(Share::from).collect())
    }

    /// Resolve which group an expense belongs to, for lock routing. The
    /// fact is re-read inside the transaction once the lock is held.
    async fn expense_group(&self, expense_id: Uuid) -> ResultEngine<String> {
        let model = expenses::Entity::find_by_id(expense_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;
        Ok(model.group_id)
    }

    /// An idempotency key may recur in a group only on voided expenses.
    async fn require_unused_expense_key(
        &self,
        db_tx: &DatabaseTransaction,
        group_id: &str,
        key: &str,
    ) -> ResultEngine<()> {
        let taken = expenses::Entity::find()
            .filter(expenses::Column::GroupId.eq(group_id.to_string()))
            .filter(expenses::Column::IdempotencyKey.eq(key.to_string()))
            .filter(expenses::Column::VoidedAt.is_null())
            .one(db_tx)
            .await?
            .is_some();
        if taken {
            return Err(EngineError::ExistingKey(key.to_string()));
        }
        Ok(())
    }
}

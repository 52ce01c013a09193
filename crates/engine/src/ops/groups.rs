use std::collections::BTreeSet;

use sea_orm::{ActiveValue, QueryFilter, QueryOrder, Statement, TransactionTrait, prelude::*};

use crate::{
    EngineError, Group, MemberStatus, ResultEngine, groups, memberships, money::MoneyCents,
    net_balances, users,
};

use super::{Engine, normalize_required, with_tx};

impl Engine {
    /// Register a user id with the engine.
    ///
    /// The engine only needs the id to resolve memberships and fact
    /// references; profiles live in the calling layer.
    pub async fn register_user(&self, user_id: &str) -> ResultEngine<()> {
        let user_id = normalize_required(user_id, "user id")?;
        with_tx!(self, |db_tx| {
            let exists = users::Entity::find_by_id(user_id.clone())
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(user_id));
            }

            let user = users::ActiveModel {
                id: ActiveValue::Set(user_id.clone()),
            };
            user.insert(&db_tx).await?;
            Ok(())
        })
    }

    /// Create a group with an initial set of active members.
    ///
    /// Every member id must belong to a registered user. The zero balance
    /// rows are written in the same transaction, so the group is readable
    /// the moment it exists.
    pub async fn new_group(&self, name: &str, member_ids: &[&str]) -> ResultEngine<Group> {
        let name = normalize_required(name, "group name")?;
        with_tx!(self, |db_tx| {
            let mut seen: BTreeSet<&str> = BTreeSet::new();
            for user_id in member_ids {
                if !seen.insert(user_id) {
                    return Err(EngineError::ExistingKey((*user_id).to_string()));
                }
                self.require_user_exists(&db_tx, user_id).await?;
            }

            let group = Group::new(name);
            groups::ActiveModel::from(&group).insert(&db_tx).await?;

            for user_id in &seen {
                let membership = memberships::ActiveModel {
                    group_id: ActiveValue::Set(group.id.clone()),
                    user_id: ActiveValue::Set((*user_id).to_string()),
                    status: ActiveValue::Set(MemberStatus::Active.as_str().to_string()),
                };
                membership.insert(&db_tx).await?;
            }

            // Nobody can race a group that is not committed yet, so no lock.
            self.recalculate_group(&db_tx, &group.id).await?;
            Ok(group)
        })
    }

    /// Delete a group and everything hanging off it.
    ///
    /// Refused while any member's net balance is nonzero; the smallest
    /// user id with debt or credit is reported.
    pub async fn delete_group(&self, group_id: &str) -> ResultEngine<()> {
        let _guard = self.locks.acquire(group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;

            let rows = net_balances::Entity::find()
                .filter(net_balances::Column::GroupId.eq(group_id.to_string()))
                .order_by_asc(net_balances::Column::UserId)
                .all(&db_tx)
                .await?;
            if let Some(unsettled) = rows.iter().find(|row| row.amount_minor != 0) {
                return Err(EngineError::OutstandingBalance(
                    MoneyCents::new(unsettled.amount_minor).abs(),
                ));
            }

            // Children first: share rows hang off expenses, everything else
            // hangs off the group directly.
            let backend = self.database.get_database_backend();
            db_tx
                .execute(Statement::from_sql_and_values(
                    backend,
                    "DELETE FROM expense_shares WHERE expense_id IN (SELECT id FROM expenses WHERE group_id = ?);",
                    vec![group_id.into()],
                ))
                .await?;
            for table in [
                "expenses",
                "payments",
                "net_balances",
                "pairwise_balances",
                "group_memberships",
            ] {
                db_tx
                    .execute(Statement::from_sql_and_values(
                        backend,
                        format!("DELETE FROM {table} WHERE group_id = ?;"),
                        vec![group_id.into()],
                    ))
                    .await?;
            }
            db_tx
                .execute(Statement::from_sql_and_values(
                    backend,
                    "DELETE FROM groups WHERE id = ?;",
                    vec![group_id.into()],
                ))
                .await?;
            Ok(())
        })
    }
}

use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*};

use crate::{EngineError, Member, MemberStatus, ResultEngine, memberships};

use super::{Engine, with_tx};

impl Engine {
    /// Add a registered user to a group as an active member.
    ///
    /// Re-adding an archived member reactivates the original membership
    /// row; adding an active member fails.
    pub async fn add_member(&self, group_id: &str, user_id: &str) -> ResultEngine<()> {
        let _guard = self.locks.acquire(group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.require_user_exists(&db_tx, user_id).await?;

            match self.find_membership(&db_tx, group_id, user_id).await? {
                None => {
                    let membership = memberships::ActiveModel {
                        group_id: ActiveValue::Set(group_id.to_string()),
                        user_id: ActiveValue::Set(user_id.to_string()),
                        status: ActiveValue::Set(MemberStatus::Active.as_str().to_string()),
                    };
                    membership.insert(&db_tx).await?;
                }
                Some(row) if row.status == MemberStatus::Archived.as_str() => {
                    let mut active: memberships::ActiveModel = row.into();
                    active.status =
                        ActiveValue::Set(MemberStatus::Active.as_str().to_string());
                    active.update(&db_tx).await?;
                }
                Some(_) => {
                    return Err(EngineError::ExistingKey(user_id.to_string()));
                }
            }

            // Write the member's zero net row alongside the membership.
            self.recalculate_group(&db_tx, group_id).await?;
            Ok(())
        })
    }

    /// List a group's members, archived ones included, sorted by user id.
    pub async fn list_members(&self, group_id: &str) -> ResultEngine<Vec<Member>> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            let rows = memberships::Entity::find()
                .filter(memberships::Column::GroupId.eq(group_id.to_string()))
                .order_by_asc(memberships::Column::UserId)
                .all(&db_tx)
                .await?;
            rows.into_iter().map(Member::try_from).collect()
        })
    }

    /// Whether `user_id` could be removed from the group right now.
    ///
    /// Advisory only: the answer can go stale the moment another writer
    /// commits. [`remove_member`](Engine::remove_member) re-checks under
    /// the group lock.
    pub async fn can_remove_member(&self, group_id: &str, user_id: &str) -> ResultEngine<bool> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            let net = self.cached_net_amount(&db_tx, group_id, user_id).await?;
            Ok(net.is_zero())
        })
    }

    /// Archive an active member.
    ///
    /// Refused with [`EngineError::OutstandingBalance`] while the member's
    /// net balance is nonzero; settle first, then remove. The membership
    /// row survives as `archived` so old facts keep resolving.
    pub async fn remove_member(&self, group_id: &str, user_id: &str) -> ResultEngine<()> {
        let _guard = self.locks.acquire(group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            let membership = self
                .find_membership(&db_tx, group_id, user_id)
                .await?
                .filter(|row| row.status == MemberStatus::Active.as_str())
                .ok_or_else(|| EngineError::KeyNotFound("membership not exists".to_string()))?;

            let net = self.cached_net_amount(&db_tx, group_id, user_id).await?;
            if !net.is_zero() {
                return Err(EngineError::OutstandingBalance(net.abs()));
            }

            let mut active: memberships::ActiveModel = membership.into();
            active.status = ActiveValue::Set(MemberStatus::Archived.as_str().to_string());
            active.update(&db_tx).await?;
            Ok(())
        })
    }
}

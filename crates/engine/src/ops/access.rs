use std::collections::BTreeSet;

use sea_orm::{DatabaseTransaction, QueryFilter, prelude::*};

use crate::{
    EngineError, MemberStatus, ResultEngine, groups, memberships, money::MoneyCents, net_balances,
    users,
};

use super::Engine;

impl Engine {
    pub(super) async fn require_group(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<groups::Model> {
        groups::Entity::find_by_id(group_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("group not exists".to_string()))
    }

    pub(super) async fn require_user_exists(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
    ) -> ResultEngine<()> {
        let exists = users::Entity::find_by_id(user_id.to_string())
            .one(db)
            .await?
            .is_some();
        if !exists {
            return Err(EngineError::KeyNotFound("user not exists".to_string()));
        }
        Ok(())
    }

    pub(super) async fn find_membership(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<Option<memberships::Model>> {
        memberships::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
            .one(db)
            .await
            .map_err(Into::into)
    }

    /// User ids currently allowed to appear on new facts of the group.
    pub(super) async fn active_member_ids(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<BTreeSet<String>> {
        let rows = memberships::Entity::find()
            .filter(memberships::Column::GroupId.eq(group_id.to_string()))
            .filter(memberships::Column::Status.eq(MemberStatus::Active.as_str()))
            .all(db)
            .await?;
        Ok(rows.into_iter().map(|m| m.user_id).collect())
    }

    /// Every user id that ever belonged to the group, archived included.
    /// Replay needs them all: archived members may still sit on old facts.
    pub(super) async fn membership_user_ids(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<BTreeSet<String>> {
        let rows = memberships::Entity::find()
            .filter(memberships::Column::GroupId.eq(group_id.to_string()))
            .all(db)
            .await?;
        Ok(rows.into_iter().map(|m| m.user_id).collect())
    }

    /// Cached net position of one member, zero when no row exists yet.
    pub(super) async fn cached_net_amount(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<MoneyCents> {
        let row = net_balances::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
            .one(db)
            .await?;
        Ok(row.map_or(MoneyCents::ZERO, |m| MoneyCents::new(m.amount_minor)))
    }
}

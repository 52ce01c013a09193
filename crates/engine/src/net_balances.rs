//! Net balance cache.
//!
//! One signed row per membership row of a group, positive meaning the group
//! owes the user. The rows are a pure projection of the group's facts: the
//! recalculation pass is their only writer and rewrites the whole group at
//! once, so readers never see a partial set.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::money::MoneyCents;

/// A user's single signed balance within one group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetBalance {
    pub group_id: String,
    pub user_id: String,
    pub amount: MoneyCents,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "net_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub group_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub amount_minor: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Groups,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&NetBalance> for ActiveModel {
    fn from(balance: &NetBalance) -> Self {
        Self {
            group_id: ActiveValue::Set(balance.group_id.clone()),
            user_id: ActiveValue::Set(balance.user_id.clone()),
            amount_minor: ActiveValue::Set(balance.amount.cents()),
        }
    }
}

impl From<Model> for NetBalance {
    fn from(model: Model) -> Self {
        Self {
            group_id: model.group_id,
            user_id: model.user_id,
            amount: MoneyCents::new(model.amount_minor),
        }
    }
}

//! Pairwise balance cache.
//!
//! At most one row per unordered user pair per group, held in canonical
//! direction: `from_user_id` owes `to_user_id` a strictly positive amount.
//! Pairs that net out to zero have no row. Written only by the recalculation
//! pass, together with the net rows.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::money::MoneyCents;

/// The canonical nonnegative debt one user owes another within a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseBalance {
    pub group_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: MoneyCents,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "pairwise_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub group_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub from_user_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub to_user_id: String,
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

impl From<&PairwiseBalance> for ActiveModel {
    fn from(balance: &PairwiseBalance) -> Self {
        Self {
            group_id: ActiveValue::Set(balance.group_id.clone()),
            from_user_id: ActiveValue::Set(balance.from_user_id.clone()),
            to_user_id: ActiveValue::Set(balance.to_user_id.clone()),
            amount_minor: ActiveValue::Set(balance.amount.cents()),
        }
    }
}

impl From<Model> for PairwiseBalance {
    fn from(model: Model) -> Self {
        Self {
            group_id: model.group_id,
            from_user_id: model.from_user_id,
            to_user_id: model.to_user_id,
            amount: MoneyCents::new(model.amount_minor),
        }
    }
}

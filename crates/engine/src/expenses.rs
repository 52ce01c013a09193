//! Expense facts.
//!
//! An `Expense` is an immutable ledger fact: one member paid a total which is
//! owed back by the participants according to the persisted split method and
//! share rows. Edits rewrite the fact (and its shares) in place; deletes are
//! soft voids. Balances are never stored here, they are derived by replaying
//! the facts.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    expense_shares::Share,
    money::MoneyCents,
    splits::SplitMethod,
    util::parse_uuid,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: String,
    pub payer_id: String,
    pub total_amount: MoneyCents,
    pub split_method: SplitMethod,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub voided_at: Option<DateTime<Utc>>,
    pub shares: Vec<Share>,
}

impl Expense {
    pub fn new(
        group_id: String,
        payer_id: String,
        total_amount: MoneyCents,
        split_method: SplitMethod,
        created_at: DateTime<Utc>,
        note: Option<String>,
        idempotency_key: Option<String>,
    ) -> ResultEngine<Self> {
        if !total_amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "total amount must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            group_id,
            payer_id,
            total_amount,
            split_method,
            note,
            idempotency_key,
            created_at,
            voided_at: None,
            shares: Vec::new(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub payer_id: String,
    pub total_amount_minor: i64,
    pub split_method: String,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTimeUtc,
    pub voided_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::expense_shares::Entity")]
    Shares,
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Groups,
}

impl Related<super::expense_shares::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shares.def()
    }
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            group_id: ActiveValue::Set(expense.group_id.clone()),
            payer_id: ActiveValue::Set(expense.payer_id.clone()),
            total_amount_minor: ActiveValue::Set(expense.total_amount.cents()),
            split_method: ActiveValue::Set(expense.split_method.as_str().to_string()),
            note: ActiveValue::Set(expense.note.clone()),
            idempotency_key: ActiveValue::Set(expense.idempotency_key.clone()),
            created_at: ActiveValue::Set(expense.created_at),
            voided_at: ActiveValue::Set(expense.voided_at),
        }
    }
}

impl TryFrom<Model> for Expense {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "expense")?,
            group_id: model.group_id,
            payer_id: model.payer_id,
            total_amount: MoneyCents::new(model.total_amount_minor),
            split_method: SplitMethod::try_from(model.split_method.as_str())?,
            note: model.note,
            idempotency_key: model.idempotency_key,
            created_at: model.created_at,
            voided_at: model.voided_at,
            shares: Vec::new(),
        })
    }
}

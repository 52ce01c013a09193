//! Payment facts.
//!
//! A `Payment` is the second kind of ledger fact: one member handing money to
//! another, typically to settle debt. Same lifecycle as an expense: edits
//! rewrite the fact, deletes are soft voids.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, money::MoneyCents, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub group_id: String,
    pub payer_id: String,
    pub payee_id: String,
    pub amount: MoneyCents,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        group_id: String,
        payer_id: String,
        payee_id: String,
        amount: MoneyCents,
        created_at: DateTime<Utc>,
        note: Option<String>,
        idempotency_key: Option<String>,
    ) -> ResultEngine<Self> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "amount must be > 0".to_string(),
            ));
        }
        if payer_id == payee_id {
            return Err(EngineError::InvalidAmount(
                "payer and payee must differ".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            group_id,
            payer_id,
            payee_id,
            amount,
            note,
            idempotency_key,
            created_at,
            voided_at: None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub payer_id: String,
    pub payee_id: String,
    pub amount_minor: i64,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTimeUtc,
    pub voided_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Groups,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Payment> for ActiveModel {
    fn from(payment: &Payment) -> Self {
        Self {
            id: ActiveValue::Set(payment.id.to_string()),
            group_id: ActiveValue::Set(payment.group_id.clone()),
            payer_id: ActiveValue::Set(payment.payer_id.clone()),
            payee_id: ActiveValue::Set(payment.payee_id.clone()),
            amount_minor: ActiveValue::Set(payment.amount.cents()),
            note: ActiveValue::Set(payment.note.clone()),
            idempotency_key: ActiveValue::Set(payment.idempotency_key.clone()),
            created_at: ActiveValue::Set(payment.created_at),
            voided_at: ActiveValue::Set(payment.voided_at),
        }
    }
}

impl TryFrom<Model> for Payment {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "payment")?,
            group_id: model.group_id,
            payer_id: model.payer_id,
            payee_id: model.payee_id,
            amount: MoneyCents::new(model.amount_minor),
            note: model.note,
            idempotency_key: model.idempotency_key,
            created_at: model.created_at,
            voided_at: model.voided_at,
        })
    }
}

use sea_orm::{QueryFilter, QueryOrder, Statement, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    ResultEngine,
    money::MoneyCents,
    net_balances::{self, NetBalance},
    pairwise_balances::{self, PairwiseBalance},
};

use super::{Engine, with_tx};

/// The cached balances of one group, as the recalculation pass wrote them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBalances {
    /// One signed row per membership row, archived members included,
    /// sorted by user id. Always sums to zero.
    pub net_by_user: Vec<NetBalance>,
    /// Canonical strictly positive debts, at most one row per user pair,
    /// sorted by `(from, to)`. Settled pairs have no row.
    pub pairwise: Vec<PairwiseBalance>,
}

impl Engine {
    /// Snapshot a group's cached balances.
    ///
    /// Takes no group lock: the cache is only ever replaced whole inside a
    /// committed transaction, so a read transaction already sees a
    /// consistent set.
    pub async fn get_group_balances(&self, group_id: &str) -> ResultEngine<GroupBalances> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;

            let net_rows = net_balances::Entity::find()
                .filter(net_balances::Column::GroupId.eq(group_id.to_string()))
                .order_by_asc(net_balances::Column::UserId)
                .all(&db_tx)
                .await?;
            let pairwise_rows = pairwise_balances::Entity::find()
                .filter(pairwise_balances::Column::GroupId.eq(group_id.to_string()))
                .order_by_asc(pairwise_balances::Column::FromUserId)
                .order_by_asc(pairwise_balances::Column::ToUserId)
                .all(&db_tx)
                .await?;

            Ok(GroupBalances {
                net_by_user: net_rows.into_iter().map(NetBalance::from).collect(),
                pairwise: pairwise_rows.into_iter().map(PairwiseBalance::from).collect(),
            })
        })
    }

    /// A user's net position summed over every group they belong to.
    pub async fn get_user_overall_balance(&self, user_id: &str) -> ResultEngine<MoneyCents> {
        with_tx!(self, |db_tx| {
            self.require_user_exists(&db_tx, user_id).await?;

            let stmt = Statement::from_sql_and_values(
                self.database.get_database_backend(),
                "SELECT COALESCE(SUM(amount_minor), 0) AS total FROM net_balances WHERE user_id = ?;",
                vec![user_id.into()],
            );
            let total = match db_tx.query_one(stmt).await? {
                Some(row) => row.try_get::<i64>("", "total")?,
                None => 0,
            };
            Ok(MoneyCents::new(total))
        })
    }
}

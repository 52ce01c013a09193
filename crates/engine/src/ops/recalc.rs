use sea_orm::{DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};

use crate::{ResultEngine, net_balances, pairwise_balances, reconcile::reconcile};

use super::{Engine, with_tx};

impl Engine {
    /// Rebuild a group's balance cache from its live facts.
    ///
    /// Runs inside the caller's transaction, which must hold the group
    /// lock (or own a group nobody else can see yet). The whole cache of
    /// the group is replaced in one sweep; on any replay error nothing is
    /// touched and the transaction rolls back.
    pub(super) async fn recalculate_group(
        &self,
        db_tx: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<()> {
        let members = self.membership_user_ids(db_tx, group_id).await?;
        let expenses = self.load_expenses(db_tx, group_id, false).await?;
        let payments = self.load_payments(db_tx, group_id, false).await?;

        let result = match reconcile(group_id, &members, &expenses, &payments) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(group_id, %err, "balance replay refused, cache left as is");
                return Err(err);
            }
        };

        net_balances::Entity::delete_many()
            .filter(net_balances::Column::GroupId.eq(group_id.to_string()))
            .exec(db_tx)
            .await?;
        pairwise_balances::Entity::delete_many()
            .filter(pairwise_balances::Column::GroupId.eq(group_id.to_string()))
            .exec(db_tx)
            .await?;

        for row in &result.net {
            net_balances::ActiveModel::from(row).insert(db_tx).await?;
        }
        for row in &result.pairwise {
            pairwise_balances::ActiveModel::from(row)
                .insert(db_tx)
                .await?;
        }

        tracing::debug!(
            group_id,
            expenses = expenses.len(),
            payments = payments.len(),
            net_rows = result.net.len(),
            pairwise_rows = result.pairwise.len(),
            "recalculated group balances"
        );
        Ok(())
    }

    /// Re-derive a group's balance cache from scratch.
    ///
    /// Every mutation already does this; the explicit entry point exists
    /// for audits and for recovery after a restored backup. Idempotent: an
    /// unchanged group yields byte-identical rows.
    pub async fn recompute_balances(&self, group_id: &str) -> ResultEngine<()> {
        let _guard = self.locks.acquire(group_id, self.lock_timeout).await?;
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_id).await?;
            self.recalculate_group(&db_tx, group_id).await?;
            Ok(())
        })
    }
}

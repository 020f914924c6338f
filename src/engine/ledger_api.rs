use super::Engine;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{types::Json, Executor, Row};
use uuid::Uuid;

use crate::{
    api::LedgerAPI,
    auth::User,
    entities::{CreditAccount, CreditTransaction},
    error::Error,
};

#[async_trait]
impl LedgerAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_balance(&self, user: User, account_id: Uuid) -> Result<i64, Error> {
        self.authorize(user.clone(), "read", CreditAccount::new(account_id))?;

        let mut conn = self.pool.acquire().await?;

        // the balance is always the newest row of the ledger, never
        // an independently writable column
        let maybe_result = conn
            .fetch_optional(
                sqlx::query(
                    "SELECT data FROM credit_transactions WHERE user_id = $1 ORDER BY seq DESC LIMIT 1",
                )
                .bind(&account_id),
            )
            .await?;

        match maybe_result {
            Some(row) => {
                let Json(newest): Json<CreditTransaction> = row.try_get("data")?;
                Ok(newest.balance_after)
            }
            None => Ok(0),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_credit_transactions(
        &self,
        user: User,
        account_id: Uuid,
    ) -> Result<Vec<CreditTransaction>, Error> {
        self.authorize(user.clone(), "read", CreditAccount::new(account_id))?;

        let mut conn = self.pool.acquire().await?;

        let mut results = conn.fetch(
            sqlx::query("SELECT data FROM credit_transactions WHERE user_id = $1 ORDER BY seq DESC")
                .bind(&account_id),
        );

        let mut transactions = vec![];

        while let Some(row) = results.try_next().await? {
            let Json(transaction): Json<CreditTransaction> = row.try_get("data")?;
            transactions.push(transaction);
        }

        Ok(transactions)
    }
}

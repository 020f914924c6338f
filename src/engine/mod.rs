mod booking_api;
mod helpers;
mod ledger_api;
mod payment_api;
mod trip_api;

use oso::Oso;
use sqlx::{Executor, Pool, Postgres};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::API,
    auth::authorizor,
    error::{unauthorized_error, Error},
    external::{Notifier, PaymentGateway},
};

type Database = Postgres;

pub const DEFAULT_CURRENCY: &str = "USD";

pub struct Engine {
    pool: Pool<Database>,
    authorizor: Oso,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub async fn new(
        pool: Pool<Database>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, Error> {
        // trip service
        pool.execute("CREATE TABLE IF NOT EXISTS trips (id UUID PRIMARY KEY, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;

        // booking service; trip_id and passenger_id are lifted out of
        // the document for the duplicate-booking check
        pool.execute("CREATE TABLE IF NOT EXISTS bookings (id UUID PRIMARY KEY, trip_id UUID NOT NULL, passenger_id UUID NOT NULL, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS bookings_trip_idx ON bookings (trip_id)")
            .await?;

        // payment service; external_reference is the reconciliation key
        pool.execute("CREATE TABLE IF NOT EXISTS payments (id UUID PRIMARY KEY, user_id UUID NOT NULL, booking_id UUID, external_reference VARCHAR, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS payments_reference_idx ON payments (external_reference)")
            .await?;

        // credit ledger; the accounts table exists solely to carry the
        // per-account row lock, the transactions table is append-only
        pool.execute("CREATE TABLE IF NOT EXISTS credit_accounts (user_id UUID PRIMARY KEY)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS credit_transactions (seq BIGSERIAL PRIMARY KEY, id UUID NOT NULL, user_id UUID NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS credit_transactions_user_idx ON credit_transactions (user_id)")
            .await?;

        // audit trail
        pool.execute("CREATE TABLE IF NOT EXISTS activities (id UUID PRIMARY KEY, user_id UUID NOT NULL, activity_type VARCHAR NOT NULL, description VARCHAR NOT NULL, data JSONB NOT NULL, created_at TIMESTAMPTZ NOT NULL DEFAULT now())")
            .await?;

        Ok(Self {
            pool,
            authorizor: authorizor::new(),
            gateway,
            notifier,
        })
    }
}

impl Engine {
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(unauthorized_error())
    }

    /// Append an audit record outside the business transaction; a
    /// failed audit write must never roll back the operation it
    /// describes.
    pub(crate) async fn record_activity(
        &self,
        user_id: Uuid,
        activity_type: &str,
        description: String,
        related: serde_json::Value,
    ) {
        let result = self
            .pool
            .execute(
                sqlx::query(
                    "INSERT INTO activities (id, user_id, activity_type, description, data) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(activity_type)
                .bind(&description)
                .bind(sqlx::types::Json(&related)),
            )
            .await;

        if let Err(err) = result {
            tracing::warn!(activity_type, "failed to record activity: {}", err);
        }
    }
}

impl API for Engine {}

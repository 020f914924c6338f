use super::Database;

use sqlx::{types::Json, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    entities::{Booking, CreditKind, CreditTransaction, Payment, Trip},
    error::{not_found_error, Error},
};

#[tracing::instrument(skip(tx))]
pub async fn fetch_trip_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Trip, Error> {
    let Json(trip): Json<Trip> = tx
        .fetch_optional(sqlx::query("SELECT data FROM trips WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(|| not_found_error())?
        .try_get("data")?;

    Ok(trip)
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_booking_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Booking, Error> {
    let Json(booking): Json<Booking> = tx
        .fetch_optional(sqlx::query("SELECT data FROM bookings WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(|| not_found_error())?
        .try_get("data")?;

    Ok(booking)
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_payment_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Payment, Error> {
    let Json(payment): Json<Payment> = tx
        .fetch_optional(sqlx::query("SELECT data FROM payments WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(|| not_found_error())?
        .try_get("data")?;

    Ok(payment)
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_payment_by_reference_for_update(
    tx: &mut Transaction<'_, Database>,
    external_reference: &str,
) -> Result<Payment, Error> {
    let Json(payment): Json<Payment> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM payments WHERE external_reference = $1 FOR UPDATE")
                .bind(external_reference),
        )
        .await?
        .ok_or_else(|| not_found_error())?
        .try_get("data")?;

    Ok(payment)
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_payment_by_booking_for_update(
    tx: &mut Transaction<'_, Database>,
    booking_id: &Uuid,
) -> Result<Payment, Error> {
    let Json(payment): Json<Payment> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM payments WHERE booking_id = $1 AND status = 'completed' FOR UPDATE")
                .bind(booking_id),
        )
        .await?
        .ok_or_else(|| not_found_error())?
        .try_get("data")?;

    Ok(payment)
}

#[tracing::instrument(skip(tx))]
pub async fn update_trip(tx: &mut Transaction<'_, Database>, trip: &Trip) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE trips SET status = $2, data = $3 WHERE id = $1")
            .bind(&trip.id)
            .bind(trip.status.name())
            .bind(Json(trip)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn insert_booking(
    tx: &mut Transaction<'_, Database>,
    booking: &Booking,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO bookings (id, trip_id, passenger_id, status, data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&booking.id)
        .bind(&booking.trip_id)
        .bind(&booking.passenger_id)
        .bind(booking.status.name())
        .bind(Json(booking)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn update_booking(
    tx: &mut Transaction<'_, Database>,
    booking: &Booking,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE bookings SET status = $2, data = $3 WHERE id = $1")
            .bind(&booking.id)
            .bind(booking.status.name())
            .bind(Json(booking)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(executor))]
pub async fn insert_payment<'c, E>(executor: E, payment: &Payment) -> Result<(), Error>
where
    E: Executor<'c, Database = Database>,
{
    executor
        .execute(
            sqlx::query(
                "INSERT INTO payments (id, user_id, booking_id, external_reference, status, data) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&payment.id)
            .bind(&payment.user_id)
            .bind(&payment.booking_id)
            .bind(&payment.external_reference)
            .bind(payment.status.name())
            .bind(Json(payment)),
        )
        .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn update_payment(
    tx: &mut Transaction<'_, Database>,
    payment: &Payment,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "UPDATE payments SET external_reference = $2, status = $3, data = $4 WHERE id = $1",
        )
        .bind(&payment.id)
        .bind(&payment.external_reference)
        .bind(payment.status.name())
        .bind(Json(payment)),
    )
    .await?;

    Ok(())
}

/// Append the next row of a user's credit ledger inside the caller's
/// transaction. The account row is locked first so concurrent appends
/// against the same account are serialized and the balance chain
/// stays gapless; the row commits or rolls back together with the
/// rest of the operation.
#[tracing::instrument(skip(tx))]
pub async fn append_credit_transaction(
    tx: &mut Transaction<'_, Database>,
    user_id: Uuid,
    kind: CreditKind,
    amount: i64,
    booking_id: Option<Uuid>,
    payment_id: Option<Uuid>,
) -> Result<CreditTransaction, Error> {
    tx.execute(
        sqlx::query("INSERT INTO credit_accounts (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(&user_id),
    )
    .await?;

    tx.fetch_one(
        sqlx::query("SELECT user_id FROM credit_accounts WHERE user_id = $1 FOR UPDATE")
            .bind(&user_id),
    )
    .await?;

    let maybe_newest = tx
        .fetch_optional(
            sqlx::query(
                "SELECT data FROM credit_transactions WHERE user_id = $1 ORDER BY seq DESC LIMIT 1",
            )
            .bind(&user_id),
        )
        .await?;

    let balance_before = match maybe_newest {
        Some(row) => {
            let Json(newest): Json<CreditTransaction> = row.try_get("data")?;
            newest.balance_after
        }
        None => 0,
    };

    let entry =
        CreditTransaction::next(user_id, kind, amount, balance_before, booking_id, payment_id)?;

    tx.execute(
        sqlx::query("INSERT INTO credit_transactions (id, user_id, data) VALUES ($1, $2, $3)")
            .bind(&entry.id)
            .bind(&user_id)
            .bind(Json(&entry)),
    )
    .await?;

    Ok(entry)
}

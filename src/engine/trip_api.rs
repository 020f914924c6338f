use super::helpers::{
    append_credit_transaction, fetch_payment_by_booking_for_update, fetch_trip_for_update,
    update_booking, update_payment, update_trip,
};
use super::Engine;

use async_trait::async_trait;
use serde_json::json;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::{TripAPI, TripDraft},
    auth::{Platform, User},
    entities::{Booking, CreditKind, Trip},
    error::{not_found_error, Error},
};

#[async_trait]
impl TripAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_trip(&self, user: User, draft: TripDraft) -> Result<Trip, Error> {
        self.authorize(user.clone(), "create_trip", Platform::default())?;

        let trip = Trip::new(
            user.id,
            draft.origin,
            draft.destination,
            draft.total_seats,
            draft.price_per_seat,
            draft.auto_accept,
            draft.departure_time,
        )?;

        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO trips (id, status, data) VALUES ($1, $2, $3)")
                .bind(&trip.id)
                .bind(trip.status.name())
                .bind(Json(&trip)),
        )
        .await?;

        self.record_activity(
            user.id,
            "trip_created",
            format!(
                "offered {} seat(s) from {} to {}",
                trip.total_seats, trip.origin, trip.destination
            ),
            json!({ "trip_id": trip.id }),
        )
        .await;

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn find_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM trips WHERE id = $1").bind(&id))
            .await?;

        let result = maybe_result.ok_or_else(|| not_found_error())?;
        let Json(trip): Json<Trip> = result.try_get("data")?;

        self.authorize(user.clone(), "read", trip.clone())?;

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn start_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "start", trip.clone())?;

        trip.start()?;

        update_trip(&mut tx, &trip).await?;

        tx.commit().await?;

        self.record_activity(
            user.id,
            "trip_started",
            format!("started trip {}", trip.id),
            json!({ "trip_id": trip.id }),
        )
        .await;

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "complete", trip.clone())?;

        trip.complete()?;

        let rows = tx
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bookings WHERE trip_id = $1 AND status IN ('pending', 'confirmed') FOR UPDATE",
                )
                .bind(&id),
            )
            .await?;

        let mut notifications = vec![];

        for row in rows.iter() {
            let Json(mut booking): Json<Booking> = row.try_get("data")?;

            if booking.is_confirmed() {
                // confirmed bookings ride through to completion
                booking.complete()?;
                notifications.push((booking.passenger_id, "booking_completed", booking.id));
            } else {
                // a booking never confirmed holds seats but owes
                // nothing; give its seats back and drop it
                booking.cancel(user.id, Some("trip completed".into()))?;
                trip.release_seats(booking.seats_booked)?;
                notifications.push((booking.passenger_id, "booking_cancelled", booking.id));
            }

            update_booking(&mut tx, &booking).await?;
        }

        update_trip(&mut tx, &trip).await?;

        tx.commit().await?;

        self.record_activity(
            user.id,
            "trip_completed",
            format!("completed trip {}", trip.id),
            json!({ "trip_id": trip.id }),
        )
        .await;

        for (passenger_id, event_type, booking_id) in notifications {
            self.notifier.notify(
                passenger_id,
                event_type,
                json!({ "booking_id": booking_id, "trip_id": trip.id }),
            );
        }

        Ok(trip)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_trip(&self, user: User, id: Uuid) -> Result<Trip, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "cancel", trip.clone())?;

        trip.cancel()?;

        let rows = tx
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bookings WHERE trip_id = $1 AND status IN ('pending', 'confirmed') FOR UPDATE",
                )
                .bind(&id),
            )
            .await?;

        let mut notifications = vec![];

        for row in rows.iter() {
            let Json(mut booking): Json<Booking> = row.try_get("data")?;

            let was_credit_settled = booking.is_credit_settled();

            booking.cancel(user.id, Some("trip cancelled".into()))?;
            trip.release_seats(booking.seats_booked)?;

            // a driver-initiated cancellation refunds settled credit
            // in full, bypassing the tier table; earlier refunds
            // reduce the remainder
            if was_credit_settled {
                let mut payment =
                    fetch_payment_by_booking_for_update(&mut tx, &booking.id).await?;

                let amount = booking.total_price.min(payment.refundable_amount());

                if amount > 0 {
                    payment.refund(amount)?;

                    append_credit_transaction(
                        &mut tx,
                        booking.passenger_id,
                        CreditKind::Refund,
                        amount,
                        Some(booking.id),
                        Some(payment.id),
                    )
                    .await?;

                    update_payment(&mut tx, &payment).await?;
                }

                booking.mark_refunded()?;
            }

            update_booking(&mut tx, &booking).await?;

            notifications.push((booking.passenger_id, booking.id));
        }

        update_trip(&mut tx, &trip).await?;

        tx.commit().await?;

        self.record_activity(
            user.id,
            "trip_cancelled",
            format!("cancelled trip {}", trip.id),
            json!({ "trip_id": trip.id }),
        )
        .await;

        for (passenger_id, booking_id) in notifications {
            self.notifier.notify(
                passenger_id,
                "booking_cancelled",
                json!({ "booking_id": booking_id, "trip_id": trip.id, "reason": "trip cancelled" }),
            );
        }

        Ok(trip)
    }
}

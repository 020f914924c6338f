use super::helpers::{
    append_credit_transaction, fetch_booking_for_update, fetch_payment_by_booking_for_update,
    fetch_trip_for_update, insert_booking, insert_payment, update_booking, update_payment,
    update_trip,
};
use super::{Engine, DEFAULT_CURRENCY};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::BookingAPI,
    auth::{Platform, User},
    entities::{Booking, CreditKind, Payment, PaymentMethod},
    error::{duplicate_booking_error, not_found_error, policy_violation_error, Error},
    policy,
};

#[async_trait]
impl BookingAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_booking(
        &self,
        user: User,
        trip_id: Uuid,
        seats: u32,
        method: PaymentMethod,
    ) -> Result<Booking, Error> {
        self.authorize(user.clone(), "create_booking", Platform::default())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &trip_id).await?;

        // a driver cannot book a seat on their own trip
        if trip.driver_id == user.id {
            return Err(policy_violation_error());
        }

        // at most one non-cancelled booking per (trip, passenger)
        let maybe_existing = tx
            .fetch_optional(
                sqlx::query(
                    "SELECT id FROM bookings WHERE trip_id = $1 AND passenger_id = $2 AND status != 'cancelled'",
                )
                .bind(&trip_id)
                .bind(&user.id),
            )
            .await?;

        if maybe_existing.is_some() {
            return Err(duplicate_booking_error());
        }

        trip.reserve_seats(seats)?;

        let mut booking = Booking::new(&trip, user.id, seats, method);

        match method {
            // credit settles synchronously; any failure here rolls the
            // seat reservation back with the rest of the transaction
            PaymentMethod::Credit => {
                let payment = Payment::new_settled(
                    user.id,
                    booking.id,
                    booking.total_price,
                    DEFAULT_CURRENCY.into(),
                )?;

                append_credit_transaction(
                    &mut tx,
                    user.id,
                    CreditKind::Payment,
                    -booking.total_price,
                    Some(booking.id),
                    Some(payment.id),
                )
                .await?;

                booking.confirm()?;
                booking.mark_paid()?;

                insert_payment(&mut tx, &payment).await?;
            }
            // external payment settles asynchronously via
            // reconciliation; auto-accept trips confirm immediately
            _ => {
                if trip.auto_accept {
                    booking.confirm()?;
                }
            }
        }

        update_trip(&mut tx, &trip).await?;
        insert_booking(&mut tx, &booking).await?;

        tx.commit().await?;

        self.record_activity(
            user.id,
            "booking_created",
            format!(
                "booked {} seat(s) on trip {} ({})",
                booking.seats_booked,
                trip.id,
                booking.status.name()
            ),
            json!({ "booking_id": booking.id, "trip_id": trip.id }),
        )
        .await;

        self.notifier.notify(
            trip.driver_id,
            "booking_created",
            json!({ "booking_id": booking.id, "trip_id": trip.id, "seats": booking.seats_booked }),
        );

        if booking.is_confirmed() {
            self.notifier.notify(
                booking.passenger_id,
                "booking_confirmed",
                json!({ "booking_id": booking.id, "trip_id": trip.id }),
            );
        }

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn find_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM bookings WHERE id = $1").bind(&id))
            .await?;

        let result = maybe_result.ok_or_else(|| not_found_error())?;
        let Json(booking): Json<Booking> = result.try_get("data")?;

        self.authorize(user.clone(), "read", booking.clone())?;

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_booking(&self, user: User, id: Uuid) -> Result<Booking, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut booking = fetch_booking_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "confirm", booking.clone())?;

        booking.confirm()?;

        update_booking(&mut tx, &booking).await?;

        tx.commit().await?;

        self.record_activity(
            user.id,
            "booking_confirmed",
            format!("confirmed booking {}", booking.id),
            json!({ "booking_id": booking.id, "trip_id": booking.trip_id }),
        )
        .await;

        self.notifier.notify(
            booking.passenger_id,
            "booking_confirmed",
            json!({ "booking_id": booking.id, "trip_id": booking.trip_id }),
        );

        Ok(booking)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_booking(
        &self,
        user: User,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<Booking, Error> {
        let mut conn = self.pool.acquire().await?;

        // authorization needs no lock; the trip row is locked before
        // the booking row everywhere to keep lock order consistent
        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM bookings WHERE id = $1").bind(&id))
            .await?;
        let Json(preview): Json<Booking> = maybe_result
            .ok_or_else(|| not_found_error())?
            .try_get("data")?;

        self.authorize(user.clone(), "cancel", preview.clone())?;

        let mut tx = conn.begin().await?;

        let mut trip = fetch_trip_for_update(&mut tx, &preview.trip_id).await?;
        let mut booking = fetch_booking_for_update(&mut tx, &id).await?;

        let was_credit_settled = booking.is_credit_settled();

        booking.cancel(user.id, reason)?;

        // seats return to the trip regardless of who cancelled
        trip.release_seats(booking.seats_booked)?;

        let mut refunded = 0;

        if was_credit_settled {
            let mut payment = fetch_payment_by_booking_for_update(&mut tx, &booking.id).await?;

            let percent = policy::refund_percent(trip.departure_time, Utc::now());
            let owed = policy::refund_amount(booking.total_price, percent);

            // earlier owner-initiated refunds reduce what is left to
            // return; with nothing left the ledger write is skipped
            let amount = owed.min(payment.refundable_amount());

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

                refunded = amount;
            }

            booking.mark_refunded()?;
        }

        update_trip(&mut tx, &trip).await?;
        update_booking(&mut tx, &booking).await?;

        tx.commit().await?;

        self.record_activity(
            user.id,
            "booking_cancelled",
            format!(
                "cancelled booking {} (refunded {})",
                booking.id, refunded
            ),
            json!({ "booking_id": booking.id, "trip_id": trip.id, "refunded": refunded }),
        )
        .await;

        self.notifier.notify(
            booking.passenger_id,
            "booking_cancelled",
            json!({ "booking_id": booking.id, "trip_id": trip.id, "refunded": refunded }),
        );
        self.notifier.notify(
            trip.driver_id,
            "booking_cancelled",
            json!({ "booking_id": booking.id, "trip_id": trip.id }),
        );

        Ok(booking)
    }
}

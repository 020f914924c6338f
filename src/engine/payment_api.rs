use super::helpers::{
    append_credit_transaction, fetch_booking_for_update, fetch_payment_by_reference_for_update,
    fetch_payment_for_update, insert_payment, update_booking, update_payment,
};
use super::{Engine, DEFAULT_CURRENCY};

use async_trait::async_trait;
use serde_json::json;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::{PaymentAPI, PaymentSession},
    auth::{Platform, User},
    entities::{Booking, CreditKind, Payment, PaymentMethod, PaymentState},
    error::{
        invalid_state_error, invariant_violation_error, not_found_error, unauthorized_error, Error,
    },
    external::ChargeStatus,
};

#[async_trait]
impl PaymentAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_trip_payment(
        &self,
        user: User,
        booking_id: Uuid,
    ) -> Result<PaymentSession, Error> {
        self.authorize(user.clone(), "create_payment", Platform::default())?;

        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM bookings WHERE id = $1").bind(&booking_id))
            .await?;
        let Json(booking): Json<Booking> = maybe_result
            .ok_or_else(|| not_found_error())?
            .try_get("data")?;

        if booking.passenger_id != user.id {
            return Err(unauthorized_error());
        }

        if booking.payment_method != PaymentMethod::Gateway
            || booking.payment_status != PaymentState::Unpaid
            || !booking.is_active()
        {
            return Err(invalid_state_error());
        }

        let payment = Payment::new(
            user.id,
            Some(booking.id),
            booking.total_price,
            DEFAULT_CURRENCY.into(),
            PaymentMethod::Gateway,
        )?;

        let session = self.open_charge(payment, user.id).await?;

        self.record_activity(
            user.id,
            "payment_initialized",
            format!(
                "payment {} for booking {} ({})",
                session.payment.id,
                booking.id,
                session.payment.status.name()
            ),
            json!({ "payment_id": session.payment.id, "booking_id": booking.id }),
        )
        .await;

        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn create_credit_purchase(
        &self,
        user: User,
        amount: i64,
    ) -> Result<PaymentSession, Error> {
        self.authorize(user.clone(), "create_payment", Platform::default())?;

        // no booking reference; reconciling this charge credits the
        // passenger's ledger with a purchase entry
        let payment = Payment::new(
            user.id,
            None,
            amount,
            DEFAULT_CURRENCY.into(),
            PaymentMethod::Gateway,
        )?;

        let session = self.open_charge(payment, user.id).await?;

        self.record_activity(
            user.id,
            "credit_purchase_initialized",
            format!(
                "credit purchase {} of {} ({})",
                session.payment.id,
                amount,
                session.payment.status.name()
            ),
            json!({ "payment_id": session.payment.id, "amount": amount }),
        )
        .await;

        Ok(session)
    }

    #[tracing::instrument(skip(self))]
    async fn find_payment(&self, user: User, id: Uuid) -> Result<Payment, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM payments WHERE id = $1").bind(&id))
            .await?;

        let result = maybe_result.ok_or_else(|| not_found_error())?;
        let Json(payment): Json<Payment> = result.try_get("data")?;

        self.authorize(user.clone(), "read", payment.clone())?;

        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    async fn reconcile_payment(
        &self,
        user: User,
        external_reference: String,
        outcome: ChargeStatus,
    ) -> Result<Payment, Error> {
        self.authorize(user.clone(), "reconcile_payment", Platform::default())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut payment =
            fetch_payment_by_reference_for_update(&mut tx, &external_reference).await?;

        // replaying a terminal outcome must not double-apply side
        // effects; the transaction is simply dropped
        if payment.already_reconciled(outcome) {
            tracing::info!("payment already reconciled, returning early...");
            return Ok(payment);
        }

        let mut notifications = vec![];

        match outcome {
            ChargeStatus::Charged => {
                payment.complete()?;

                match payment.booking_id {
                    Some(booking_id) => {
                        let mut booking = fetch_booking_for_update(&mut tx, &booking_id).await?;

                        if booking.is_cancelled() {
                            // the charge landed after the booking
                            // died; the payment completes and stays
                            // refundable, the booking is left alone
                            tracing::warn!(
                                booking_id = %booking.id,
                                "charge completed for a cancelled booking"
                            );

                            notifications.push((
                                booking.passenger_id,
                                "payment_refund_available",
                                json!({ "payment_id": payment.id, "booking_id": booking.id }),
                            ));
                        } else {
                            booking.mark_paid()?;

                            update_booking(&mut tx, &booking).await?;

                            notifications.push((
                                booking.passenger_id,
                                "payment_completed",
                                json!({ "payment_id": payment.id, "booking_id": booking.id }),
                            ));
                        }
                    }
                    None => {
                        let entry = append_credit_transaction(
                            &mut tx,
                            payment.user_id,
                            CreditKind::Purchase,
                            payment.amount,
                            None,
                            Some(payment.id),
                        )
                        .await?;

                        notifications.push((
                            payment.user_id,
                            "credit_purchased",
                            json!({ "payment_id": payment.id, "balance": entry.balance_after }),
                        ));
                    }
                }
            }
            ChargeStatus::Cancelled => payment.cancel()?,
            ChargeStatus::Other => {
                payment.fail("gateway reported an unsuccessful charge".into())?
            }
        }

        update_payment(&mut tx, &payment).await?;

        tx.commit().await?;

        self.record_activity(
            payment.user_id,
            "payment_reconciled",
            format!(
                "payment {} reconciled to {}",
                payment.id,
                payment.status.name()
            ),
            json!({ "payment_id": payment.id, "external_reference": external_reference }),
        )
        .await;

        for (user_id, event_type, payload) in notifications {
            self.notifier.notify(user_id, event_type, payload);
        }

        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    async fn refund_payment(
        &self,
        user: User,
        id: Uuid,
        amount: i64,
        reason: Option<String>,
    ) -> Result<Payment, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM payments WHERE id = $1").bind(&id))
            .await?;
        let Json(preview): Json<Payment> = maybe_result
            .ok_or_else(|| not_found_error())?
            .try_get("data")?;

        self.authorize(user.clone(), "refund", preview.clone())?;

        // rehearse the transition on a copy; the gateway must not be
        // asked to return money the locked re-check would refuse
        let mut projected = preview.clone();
        projected.refund(amount)?;

        match preview.method {
            PaymentMethod::Gateway => {
                let reference = preview.external_reference.clone().ok_or_else(|| {
                    invariant_violation_error("completed gateway payment has no external reference")
                })?;

                // the network round-trip stays outside any row lock,
                // as in open_charge
                self.gateway.refund(&reference, amount).await?;
            }
            PaymentMethod::Credit => {}
            // cash changes hands off-platform
            PaymentMethod::Cash => return Err(invalid_state_error()),
        }

        let mut tx = conn.begin().await?;

        // booking row before payment row, matching the lock order of
        // the cancellation path
        let mut linked_booking = match preview.booking_id {
            Some(booking_id) => Some(fetch_booking_for_update(&mut tx, &booking_id).await?),
            None => None,
        };

        let mut payment = fetch_payment_for_update(&mut tx, &id).await?;

        payment.refund(amount)?;

        if let PaymentMethod::Credit = payment.method {
            append_credit_transaction(
                &mut tx,
                payment.user_id,
                CreditKind::Refund,
                amount,
                payment.booking_id,
                Some(payment.id),
            )
            .await?;
        }

        // a fully refunded payment flips its booking out of Paid so
        // a later cancellation owes nothing further
        if payment.refundable_amount() == 0 {
            if let Some(booking) = linked_booking.as_mut() {
                if booking.payment_status == PaymentState::Paid {
                    booking.mark_refunded()?;

                    update_booking(&mut tx, booking).await?;
                }
            }
        }

        update_payment(&mut tx, &payment).await?;

        tx.commit().await?;

        self.record_activity(
            user.id,
            "payment_refunded",
            format!("refunded {} of payment {}", amount, payment.id),
            json!({ "payment_id": payment.id, "amount": amount, "reason": reason }),
        )
        .await;

        self.notifier.notify(
            payment.user_id,
            "payment_refunded",
            json!({ "payment_id": payment.id, "amount": amount }),
        );

        Ok(payment)
    }
}

impl Engine {
    /// Open an external charge for a pending payment. The gateway
    /// call happens before any row is written, so no partial state
    /// can reference a charge that was never opened; a gateway
    /// failure is recorded on the payment rather than dropped.
    #[tracing::instrument(skip(self))]
    async fn open_charge(&self, mut payment: Payment, payer: Uuid) -> Result<PaymentSession, Error> {
        let mut redirect_url = None;

        match self
            .gateway
            .authorize(payment.amount, &payment.currency, payer, payment.id)
            .await
        {
            Ok(authorization) => {
                payment.open(authorization.external_reference)?;
                redirect_url = authorization.redirect_url;
            }
            Err(err) => {
                tracing::warn!("gateway authorization failed: {}", err.message);
                payment.fail(format!("gateway authorization failed: {}", err.message))?;
            }
        }

        let mut conn = self.pool.acquire().await?;

        insert_payment(&mut *conn, &payment).await?;

        Ok(PaymentSession {
            payment,
            redirect_url,
        })
    }
}

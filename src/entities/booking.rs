use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{PaymentMethod, Trip};
use crate::error::{invalid_state_error, Error};

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Booking {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub status: Status,
    pub trip_id: Uuid,
    #[polar(attribute)]
    pub passenger_id: Uuid,
    #[polar(attribute)]
    pub driver_id: Uuid,
    pub seats_booked: u32,
    pub total_price: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentState,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Pending,
    Confirmed,
    Cancelled {
        cancelled_by: Uuid,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Unpaid,
    Paid,
    Refunded,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Confirmed => "confirmed".into(),
            Self::Cancelled {
                cancelled_by: _,
                reason: _,
                timestamp: _,
            } => "cancelled".into(),
            Self::Completed => "completed".into(),
        }
    }
}

impl PolarClass for Status {
    fn get_polar_class_builder() -> oso::ClassBuilder<Status> {
        oso::Class::builder()
            .name("BookingStatus")
            .add_attribute_getter("name", |recv: &Status| recv.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Status::get_polar_class_builder();
        builder.build()
    }
}

impl Booking {
    /// The price is fixed here; later price changes to the trip never
    /// retroactively affect existing bookings.
    pub fn new(trip: &Trip, passenger_id: Uuid, seats: u32, method: PaymentMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: Status::Pending,
            trip_id: trip.id,
            passenger_id,
            driver_id: trip.driver_id,
            seats_booked: seats,
            total_price: trip.price_per_seat * seats as i64,
            payment_method: method,
            payment_status: PaymentState::Unpaid,
            created_at: Utc::now(),
        }
    }

    /// Pending or confirmed, i.e. currently holding seats.
    pub fn is_active(&self) -> bool {
        match self.status {
            Status::Pending | Status::Confirmed => true,
            _ => false,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        match self.status {
            Status::Confirmed => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self.status {
            Status::Cancelled {
                cancelled_by: _,
                reason: _,
                timestamp: _,
            } => true,
            _ => false,
        }
    }

    /// A tier-based refund is owed only when a credit payment already
    /// settled against this booking.
    pub fn is_credit_settled(&self) -> bool {
        self.is_confirmed()
            && self.payment_method == PaymentMethod::Credit
            && self.payment_status == PaymentState::Paid
    }

    #[tracing::instrument]
    pub fn confirm(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.status = Status::Confirmed;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn cancel(&mut self, cancelled_by: Uuid, reason: Option<String>) -> Result<(), Error> {
        match self.status {
            Status::Pending | Status::Confirmed => {
                self.status = Status::Cancelled {
                    cancelled_by,
                    reason,
                    timestamp: Utc::now(),
                };
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Confirmed => {
                self.status = Status::Completed;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn mark_paid(&mut self) -> Result<(), Error> {
        // a charge that lands after cancellation never marks the
        // dead booking paid; the payment completes and is refunded
        if self.is_cancelled() {
            return Err(invalid_state_error());
        }

        match self.payment_status {
            PaymentState::Unpaid => {
                self.payment_status = PaymentState::Paid;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn mark_refunded(&mut self) -> Result<(), Error> {
        match self.payment_status {
            PaymentState::Paid => {
                self.payment_status = PaymentState::Refunded;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking(method: PaymentMethod) -> Booking {
        let trip = Trip::new(
            Uuid::new_v4(),
            "old harbour".into(),
            "north quarter".into(),
            4,
            500,
            false,
            Utc::now() + Duration::hours(48),
        )
        .unwrap();

        Booking::new(&trip, Uuid::new_v4(), 2, method)
    }

    #[test]
    fn price_is_fixed_at_creation() {
        let booking = booking(PaymentMethod::Cash);

        assert_eq!(booking.total_price, 1000);
    }

    #[test]
    fn confirm_is_legal_only_from_pending() {
        let mut booking = booking(PaymentMethod::Cash);

        booking.confirm().unwrap();
        assert_eq!(booking.confirm().unwrap_err().code, 100);
    }

    #[test]
    fn cancel_is_legal_from_pending_and_confirmed() {
        let mut first = booking(PaymentMethod::Cash);
        first.cancel(first.passenger_id, None).unwrap();
        assert!(!first.is_active());

        let mut second = booking(PaymentMethod::Cash);
        second.confirm().unwrap();
        second
            .cancel(second.driver_id, Some("vehicle breakdown".into()))
            .unwrap();
        assert_eq!(second.status.name(), "cancelled");
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut booking = booking(PaymentMethod::Cash);

        booking.cancel(booking.passenger_id, None).unwrap();

        assert_eq!(booking.confirm().unwrap_err().code, 100);
        assert_eq!(booking.complete().unwrap_err().code, 100);
        assert_eq!(
            booking.cancel(booking.passenger_id, None).unwrap_err().code,
            100
        );
    }

    #[test]
    fn complete_requires_confirmed() {
        let mut booking = booking(PaymentMethod::Cash);

        assert_eq!(booking.complete().unwrap_err().code, 100);

        booking.confirm().unwrap();
        booking.complete().unwrap();
    }

    #[test]
    fn mark_paid_is_refused_after_cancellation() {
        let mut booking = booking(PaymentMethod::Gateway);

        booking.cancel(booking.passenger_id, None).unwrap();

        assert!(booking.is_cancelled());
        assert_eq!(booking.mark_paid().unwrap_err().code, 100);
    }

    #[test]
    fn credit_settlement_flag() {
        let mut booking = booking(PaymentMethod::Credit);

        assert!(!booking.is_credit_settled());

        booking.confirm().unwrap();
        booking.mark_paid().unwrap();
        assert!(booking.is_credit_settled());

        booking.mark_refunded().unwrap();
        assert!(!booking.is_credit_settled());
    }
}

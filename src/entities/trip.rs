use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{
    capacity_exceeded_error, invalid_input_error, invalid_state_error, invariant_violation_error,
    Error,
};

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Trip {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub status: Status,
    #[polar(attribute)]
    pub driver_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub total_seats: u32,
    pub available_seats: u32,
    pub price_per_seat: i64,
    pub auto_accept: bool,
    pub departure_time: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Status {
    Active,
    InProgress,
    Completed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Active => "active".into(),
            Self::InProgress => "in_progress".into(),
            Self::Completed => "completed".into(),
            Self::Cancelled => "cancelled".into(),
        }
    }
}

impl PolarClass for Status {
    fn get_polar_class_builder() -> oso::ClassBuilder<Status> {
        oso::Class::builder()
            .name("TripStatus")
            .add_attribute_getter("name", |recv: &Status| recv.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Status::get_polar_class_builder();
        builder.build()
    }
}

impl Trip {
    pub fn new(
        driver_id: Uuid,
        origin: String,
        destination: String,
        total_seats: u32,
        price_per_seat: i64,
        auto_accept: bool,
        departure_time: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if total_seats < 1 || price_per_seat < 0 || departure_time <= Utc::now() {
            return Err(invalid_input_error());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            status: Status::Active,
            driver_id,
            origin,
            destination,
            total_seats,
            available_seats: total_seats,
            price_per_seat,
            auto_accept,
            departure_time,
        })
    }

    pub fn is_active(&self) -> bool {
        match self.status {
            Status::Active => true,
            _ => false,
        }
    }

    pub fn is_bookable(&self) -> bool {
        self.is_active() && self.departure_time > Utc::now()
    }

    /// Seats held by pending and confirmed bookings.
    pub fn seats_held(&self) -> u32 {
        self.total_seats - self.available_seats
    }

    /// Check-and-decrement of the seat counter. The caller must hold
    /// the trip row lock so that rival reservations on the same trip
    /// are serialized.
    #[tracing::instrument]
    pub fn reserve_seats(&mut self, seats: u32) -> Result<(), Error> {
        if seats < 1 {
            return Err(invalid_input_error());
        }

        if !self.is_bookable() {
            return Err(invalid_state_error());
        }

        if self.available_seats < seats {
            return Err(capacity_exceeded_error());
        }

        self.available_seats -= seats;

        Ok(())
    }

    /// Exact inverse of a reservation, used on cancellation.
    #[tracing::instrument]
    pub fn release_seats(&mut self, seats: u32) -> Result<(), Error> {
        let released = self.available_seats + seats;

        if released > self.total_seats {
            return Err(invariant_violation_error(
                "seat release would exceed total capacity",
            ));
        }

        self.available_seats = released;

        Ok(())
    }

    #[tracing::instrument]
    pub fn start(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Active => {
                self.status = Status::InProgress;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Active | Status::InProgress => {
                self.status = Status::Completed;
                Ok(())
            }
            _ => Err(invalid_state_error()),
        }
    }

    #[tracing::instrument]
    pub fn cancel(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Active => {
                self.status = Status::Cancelled;
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

    fn future_trip(total_seats: u32) -> Trip {
        Trip::new(
            Uuid::new_v4(),
            "old harbour".into(),
            "north quarter".into(),
            total_seats,
            500,
            false,
            Utc::now() + Duration::hours(48),
        )
        .unwrap()
    }

    #[test]
    fn reserve_decrements_available_seats() {
        let mut trip = future_trip(4);

        trip.reserve_seats(3).unwrap();
        assert_eq!(trip.available_seats, 1);
        assert_eq!(trip.seats_held(), 3);
    }

    #[test]
    fn reserve_beyond_capacity_is_rejected() {
        let mut trip = future_trip(2);

        trip.reserve_seats(2).unwrap();

        let err = trip.reserve_seats(1).unwrap_err();
        assert_eq!(err.code, 104);
        assert_eq!(trip.available_seats, 0);
    }

    #[test]
    fn second_reservation_for_last_seat_fails() {
        let mut trip = future_trip(1);

        trip.reserve_seats(1).unwrap();
        assert_eq!(trip.reserve_seats(1).unwrap_err().code, 104);
        assert_eq!(trip.available_seats, 0);
    }

    #[test]
    fn reserve_release_round_trip() {
        let mut trip = future_trip(4);

        trip.reserve_seats(2).unwrap();
        trip.release_seats(2).unwrap();

        assert_eq!(trip.available_seats, 4);
    }

    #[test]
    fn release_never_exceeds_total_capacity() {
        let mut trip = future_trip(4);

        trip.reserve_seats(1).unwrap();

        let err = trip.release_seats(2).unwrap_err();
        assert_eq!(err.code, 6);
        assert_eq!(trip.available_seats, 3);
    }

    #[test]
    fn departed_trip_is_not_bookable() {
        let mut trip = future_trip(4);
        trip.departure_time = Utc::now() - Duration::minutes(1);

        assert!(!trip.is_bookable());
        assert_eq!(trip.reserve_seats(1).unwrap_err().code, 100);
    }

    #[test]
    fn cancelled_trip_is_not_bookable() {
        let mut trip = future_trip(4);

        trip.cancel().unwrap();

        assert!(!trip.is_bookable());
        assert_eq!(trip.reserve_seats(1).unwrap_err().code, 100);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut trip = future_trip(4);

        trip.start().unwrap();
        assert_eq!(trip.cancel().unwrap_err().code, 100);

        trip.complete().unwrap();
        assert_eq!(trip.start().unwrap_err().code, 100);
        assert_eq!(trip.complete().unwrap_err().code, 100);
    }

    #[test]
    fn zero_seat_trip_is_rejected() {
        let result = Trip::new(
            Uuid::new_v4(),
            "a".into(),
            "b".into(),
            0,
            500,
            false,
            Utc::now() + Duration::hours(1),
        );

        assert_eq!(result.unwrap_err().code, 101);
    }
}

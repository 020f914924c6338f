use oso::{Oso, PolarClass};

use crate::auth::{Platform, User};
use crate::entities::{Booking, BookingStatus, CreditAccount, Payment, Trip, TripStatus};

pub fn new() -> Oso {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class()).unwrap();
    o.register_class(User::get_polar_class()).unwrap();
    o.register_class(Trip::get_polar_class()).unwrap();
    o.register_class(TripStatus::get_polar_class()).unwrap();
    o.register_class(Booking::get_polar_class()).unwrap();
    o.register_class(BookingStatus::get_polar_class()).unwrap();
    o.register_class(Payment::get_polar_class()).unwrap();
    o.register_class(CreditAccount::get_polar_class()).unwrap();

    o.load_str(include_str!("rules.polar")).unwrap();

    o
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PaymentMethod;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn trip(driver_id: Uuid) -> Trip {
        Trip::new(
            driver_id,
            "old harbour".into(),
            "north quarter".into(),
            4,
            500,
            false,
            Utc::now() + Duration::hours(48),
        )
        .unwrap()
    }

    #[test]
    fn platform_permissions() {
        let authorizor = new();

        let member = User::new(Uuid::new_v4());
        let system = User::new_system_user();

        let result = authorizor.is_allowed(member.clone(), "create_trip", Platform::default());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(member.clone(), "create_booking", Platform::default());
        assert_eq!(result.unwrap(), true);

        let result =
            authorizor.is_allowed(member.clone(), "reconcile_payment", Platform::default());
        assert_eq!(result.unwrap(), false);

        let result =
            authorizor.is_allowed(system.clone(), "reconcile_payment", Platform::default());
        assert_eq!(result.unwrap(), true);
    }

    #[test]
    fn trip_driver_role() {
        let authorizor = new();

        let driver = User::new(Uuid::new_v4());
        let stranger = User::new(Uuid::new_v4());
        let trip = trip(driver.id);

        let result = authorizor.query_rule("has_role", (driver.clone(), "driver", trip.clone()));
        assert!(result.unwrap().next().unwrap().is_ok());

        let result = authorizor.query_rule("has_role", (stranger.clone(), "driver", trip.clone()));
        assert!(result.unwrap().next().is_none());

        let result = authorizor.is_allowed(stranger.clone(), "read", trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(stranger.clone(), "cancel", trip.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(driver.clone(), "cancel", trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(driver.clone(), "complete", trip.clone());
        assert_eq!(result.unwrap(), true);
    }

    #[test]
    fn booking_passenger_and_driver_roles() {
        let authorizor = new();

        let driver = User::new(Uuid::new_v4());
        let passenger = User::new(Uuid::new_v4());
        let stranger = User::new(Uuid::new_v4());

        let trip = trip(driver.id);
        let booking = Booking::new(&trip, passenger.id, 2, PaymentMethod::Cash);

        let result = authorizor.is_allowed(passenger.clone(), "read", booking.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(stranger.clone(), "read", booking.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(passenger.clone(), "confirm", booking.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(driver.clone(), "confirm", booking.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(passenger.clone(), "cancel", booking.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(driver.clone(), "cancel", booking.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(stranger.clone(), "cancel", booking.clone());
        assert_eq!(result.unwrap(), false);
    }

    #[test]
    fn credit_account_owner_and_system_roles() {
        let authorizor = new();

        let owner = User::new(Uuid::new_v4());
        let stranger = User::new(Uuid::new_v4());
        let system = User::new_system_user();

        let account = CreditAccount::new(owner.id);

        let result = authorizor.is_allowed(owner.clone(), "read", account.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(stranger.clone(), "read", account.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(system.clone(), "read", account.clone());
        assert_eq!(result.unwrap(), true);
    }

    #[test]
    fn payment_owner_and_system_roles() {
        let authorizor = new();

        let owner = User::new(Uuid::new_v4());
        let stranger = User::new(Uuid::new_v4());
        let system = User::new_system_user();

        let payment = Payment::new(
            owner.id,
            Some(Uuid::new_v4()),
            1000,
            "USD".into(),
            PaymentMethod::Gateway,
        )
        .unwrap();

        let result = authorizor.is_allowed(owner.clone(), "read", payment.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(stranger.clone(), "read", payment.clone());
        assert_eq!(result.unwrap(), false);

        let result = authorizor.is_allowed(owner.clone(), "refund", payment.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(system.clone(), "refund", payment.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(stranger.clone(), "refund", payment.clone());
        assert_eq!(result.unwrap(), false);
    }
}

pub mod bookings;
pub mod credits;
pub mod payments;
pub mod trips;

mod booking;
mod credit;
mod payment;
mod trip;

pub use booking::{Booking, PaymentState, Status as BookingStatus};
pub use credit::{CreditAccount, CreditTransaction, Kind as CreditKind};
pub use payment::{Payment, PaymentMethod, Status as PaymentStatus};
pub use trip::{Status as TripStatus, Trip};

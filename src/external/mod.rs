mod gateway;
mod notifier;

pub use gateway::{Authorization, ChargeStatus, HttpGateway, PaymentGateway};
pub use notifier::{LogNotifier, Notifier};

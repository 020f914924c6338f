use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Booking, CreditTransaction, Payment, PaymentMethod, Trip};
use crate::error::Error;
use crate::external::ChargeStatus;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripDraft {
    pub origin: String,
    pub destination: String,
    pub total_seats: u32,
    pub price_per_seat: i64,
    pub auto_accept: bool,
    pub departure_time: DateTime<Utc>,
}

/// A payment plus the gateway redirect the payer must follow to
/// complete the charge. Absent for payments that failed to open.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentSession {
    pub payment: Payment,
    pub redirect_url: Option<String>,
}

#[async_trait]
pub trait TripAPI {
    async fn create_trip(&self, user: User, draft: TripDraft) -> Result<Trip, Error>;
    async fn find_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    async fn start_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    async fn complete_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
    async fn cancel_trip(&self, user: User, id: Uuid) -> Result<Trip, Error>;
}

#[async_trait]
pub trait BookingAPI {
    async fn create_booking(
        &self,
        user: User,
        trip_id: Uuid,
        seats: u32,
        method: PaymentMethod,
    ) -> Result<Booking, Error>;
    async fn find_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
    async fn confirm_booking(&self, user: User, id: Uuid) -> Result<Booking, Error>;
    async fn cancel_booking(
        &self,
        user: User,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<Booking, Error>;
}

#[async_trait]
pub trait PaymentAPI {
    async fn create_trip_payment(&self, user: User, booking_id: Uuid)
        -> Result<PaymentSession, Error>;
    async fn create_credit_purchase(&self, user: User, amount: i64)
        -> Result<PaymentSession, Error>;
    async fn find_payment(&self, user: User, id: Uuid) -> Result<Payment, Error>;
    async fn reconcile_payment(
        &self,
        user: User,
        external_reference: String,
        outcome: ChargeStatus,
    ) -> Result<Payment, Error>;
    async fn refund_payment(
        &self,
        user: User,
        id: Uuid,
        amount: i64,
        reason: Option<String>,
    ) -> Result<Payment, Error>;
}

#[async_trait]
pub trait LedgerAPI {
    async fn find_balance(&self, user: User, account_id: Uuid) -> Result<i64, Error>;
    async fn list_credit_transactions(
        &self,
        user: User,
        account_id: Uuid,
    ) -> Result<Vec<CreditTransaction>, Error>;
}

pub trait API: TripAPI + BookingAPI + PaymentAPI + LedgerAPI {}

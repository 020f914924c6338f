use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::PaymentSession;
use crate::auth::User;
use crate::entities::Payment;
use crate::error::Error;
use crate::external::ChargeStatus;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    booking_id: Uuid,
}

#[derive(Serialize, Deserialize)]
pub struct PurchaseParams {
    amount: i64,
}

#[derive(Serialize, Deserialize)]
pub struct ReconcileParams {
    external_reference: String,
    outcome: ChargeStatus,
}

#[derive(Serialize, Deserialize)]
pub struct RefundParams {
    amount: i64,
    reason: Option<String>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Json(params): Json<CreateParams>,
) -> Result<Json<PaymentSession>, Error> {
    let session = api.create_trip_payment(user, params.booking_id).await?;

    Ok(session.into())
}

pub async fn purchase_credit(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Json(params): Json<PurchaseParams>,
) -> Result<Json<PaymentSession>, Error> {
    let session = api.create_credit_purchase(user, params.amount).await?;

    Ok(session.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, Error> {
    let payment = api.find_payment(user, id).await?;

    Ok(payment.into())
}

pub async fn reconcile(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Json(params): Json<ReconcileParams>,
) -> Result<Json<Payment>, Error> {
    let payment = api
        .reconcile_payment(user, params.external_reference, params.outcome)
        .await?;

    Ok(payment.into())
}

pub async fn refund(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(params): Json<RefundParams>,
) -> Result<Json<Payment>, Error> {
    let payment = api
        .refund_payment(user, id, params.amount, params.reason)
        .await?;

    Ok(payment.into())
}

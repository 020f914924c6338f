use axum::extract::{Extension, Json, Path};
use serde_json::json;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::CreditTransaction;
use crate::error::Error;
use crate::server::DynAPI;

pub async fn balance(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    let balance = api.find_balance(user, account_id).await?;

    Ok(Json(json!({ "account_id": account_id, "balance": balance })))
}

pub async fn transactions(
    Extension(api): Extension<DynAPI>,
    Extension(user): Extension<User>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Vec<CreditTransaction>>, Error> {
    let transactions = api.list_credit_transactions(user, account_id).await?;

    Ok(transactions.into())
}

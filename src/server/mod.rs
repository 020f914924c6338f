mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch, post},
    Router,
};

use crate::server::handlers::{bookings, credits, payments, trips};
use crate::{api::API, auth::User};

type DynAPI = Arc<dyn API + Send + Sync>;

pub async fn serve<T: API + Sync + Send + 'static>(api: T) {
    let api = Arc::new(api) as DynAPI;

    let app = Router::new()
        .route("/trips", post(trips::create))
        .route("/trips/:id", get(trips::find))
        .route("/trips/:id/start", patch(trips::start))
        .route("/trips/:id/complete", patch(trips::complete))
        .route("/trips/:id/cancel", patch(trips::cancel))
        .route("/bookings", post(bookings::create))
        .route("/bookings/:id", get(bookings::find))
        .route("/bookings/:id/confirm", patch(bookings::confirm))
        .route("/bookings/:id/cancel", patch(bookings::cancel))
        .route("/payments", post(payments::create))
        .route("/payments/purchase", post(payments::purchase_credit))
        .route("/payments/reconcile", post(payments::reconcile))
        .route("/payments/:id", get(payments::find))
        .route("/payments/:id/refund", post(payments::refund))
        .route("/credits/:account_id/balance", get(credits::balance))
        .route(
            "/credits/:account_id/transactions",
            get(credits::transactions),
        )
        .layer(Extension(api))
        .layer(Extension(User::new_system_user()));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}

pub mod handlers;

pub use handlers::*;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

use crate::service::MathValidator;

/// All routes, sharing one validator (and with it the vendor mapping memo).
pub fn router(validator: Arc<MathValidator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/validate", post(validate_invoice))
        .route("/api/validate/batch", post(validate_batch))
        .route("/api/columns/solve", post(solve_columns_json))
        .route("/api/columns/solve/csv", post(solve_columns_csv))
        .route("/api/lines/validate", post(validate_lines))
        .route("/api/formats/extract", post(extract_formats))
        .route("/api/cascade", post(validate_totals))
        .layer(ServiceBuilder::new())
        .with_state(validator)
}

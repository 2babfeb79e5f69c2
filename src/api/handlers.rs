use crate::error::MathError;
use crate::models::{
    CascadeInput, CascadeResult, ConsensusOutcome, FormatExtraction, InvoiceInput, InvoiceReport,
    LineFields, LineValidation, Row, SolveOutcome,
};
use crate::service::{
    extract_all_formats, find_valid_formula, parse_csv_rows, solve_columns,
    solve_columns_consensus, validate_cascade, MathValidator,
};
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Single-invoice response
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub message: String,
    pub validated_at: DateTime<Local>,
    pub report: Option<InvoiceReport>,
}

#[derive(Debug, Deserialize)]
pub struct BatchValidateRequest {
    pub invoices: Vec<InvoiceInput>,
}

#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub report: Option<InvoiceReport>,
}

#[derive(Debug, Serialize)]
pub struct BatchValidateResponse {
    pub success: bool,
    pub message: String,
    pub validated_at: DateTime<Local>,
    pub results: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
pub struct SolveRequest {
    pub rows: Vec<Row>,
    #[serde(default)]
    pub description_column: Option<usize>,
    /// Overrides the configured `use_consensus`.
    #[serde(default)]
    pub consensus: Option<bool>,
}

/// Query string of the CSV variant, which takes the rows as the body.
#[derive(Debug, Deserialize)]
pub struct SolveQuery {
    #[serde(default)]
    pub description_column: Option<usize>,
    #[serde(default)]
    pub consensus: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SolveResponse {
    pub success: bool,
    pub message: String,
    pub outcome: Option<SolveOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct LinesRequest {
    pub lines: Vec<LineFields>,
}

#[derive(Debug, Serialize)]
pub struct LinesResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<LineValidation>,
}

#[derive(Debug, Deserialize)]
pub struct FormatsRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<FormatExtraction>,
}

#[derive(Debug, Serialize)]
pub struct CascadeResponse {
    pub success: bool,
    pub message: String,
    pub result: CascadeResult,
}

fn status_for(error: &MathError) -> StatusCode {
    match error {
        MathError::InvalidInput(_) | MathError::Csv(_) => StatusCode::BAD_REQUEST,
        MathError::Config(_) | MathError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check
pub async fn health_check() -> &'static str {
    "OK"
}

/// Validates one invoice
pub async fn validate_invoice(
    State(validator): State<Arc<MathValidator>>,
    Json(input): Json<InvoiceInput>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || validator.validate(&input)).await;
    match result {
        Ok(Ok(report)) => {
            let response = ValidateResponse {
                success: true,
                message: format!(
                    "{} (confidence {:.2}, {} diagnostics)",
                    report.status,
                    report.confidence,
                    report.diagnostics.len()
                ),
                validated_at: Local::now(),
                report: Some(report),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(e)) => {
            let response = ValidateResponse {
                success: false,
                message: format!("Error: {}", e),
                validated_at: Local::now(),
                report: None,
            };
            (status_for(&e), Json(response)).into_response()
        }
        Err(e) => {
            tracing::error!("validation task failed: {}", e);
            let response = ValidateResponse {
                success: false,
                message: format!("Error: {}", e),
                validated_at: Local::now(),
                report: None,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}

/// Validates many invoices in parallel; one bad invoice does not fail the batch
pub async fn validate_batch(
    State(validator): State<Arc<MathValidator>>,
    Json(req): Json<BatchValidateRequest>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || validator.validate_batch(&req.invoices)).await;
    match result {
        Ok(reports) => {
            let results: Vec<BatchItem> = reports
                .into_iter()
                .enumerate()
                .map(|(index, r)| match r {
                    Ok(report) => BatchItem {
                        index,
                        success: true,
                        error: None,
                        report: Some(report),
                    },
                    Err(e) => BatchItem {
                        index,
                        success: false,
                        error: Some(e.to_string()),
                        report: None,
                    },
                })
                .collect();
            let failed = results.iter().filter(|r| !r.success).count();
            let response = BatchValidateResponse {
                success: failed == 0,
                message: format!("Validated {} invoices, {} rejected", results.len(), failed),
                validated_at: Local::now(),
                results,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            tracing::error!("batch validation task failed: {}", e);
            let response = BatchValidateResponse {
                success: false,
                message: format!("Error: {}", e),
                validated_at: Local::now(),
                results: Vec::new(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}

fn solve(validator: &MathValidator, rows: &[Row], description_column: Option<usize>, consensus: Option<bool>) -> SolveResponse {
    let settings = validator.settings();
    let use_consensus = consensus.unwrap_or(settings.solver.use_consensus);
    let outcome = solve_columns(rows, description_column, &settings.solver, &settings.tolerances);
    let consensus = use_consensus
        .then(|| solve_columns_consensus(rows, description_column, &settings.solver, &settings.tolerances));

    let message = match (&outcome.mapping, &outcome.reason) {
        (Some(mapping), _) => format!("Mapping found: {}", mapping),
        (None, Some(reason)) => format!("No mapping: {}", reason),
        (None, None) => "No mapping".to_string(),
    };
    SolveResponse {
        success: outcome.found,
        message,
        outcome: Some(outcome),
        consensus,
    }
}

fn solved(result: Result<SolveResponse, tokio::task::JoinError>) -> Response {
    match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::error!("column solving task failed: {}", e);
            let response = SolveResponse {
                success: false,
                message: format!("Error: {}", e),
                outcome: None,
                consensus: None,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}

/// Infers the column mapping of raw rows
pub async fn solve_columns_json(
    State(validator): State<Arc<MathValidator>>,
    Json(req): Json<SolveRequest>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        solve(&validator, &req.rows, req.description_column, req.consensus)
    })
    .await;
    solved(result)
}

/// Same as `solve_columns_json` with rows read from a CSV body
pub async fn solve_columns_csv(
    State(validator): State<Arc<MathValidator>>,
    Query(query): Query<SolveQuery>,
    body: String,
) -> Response {
    match parse_csv_rows(&body) {
        Ok(rows) => {
            let result = tokio::task::spawn_blocking(move || {
                solve(&validator, &rows, query.description_column, query.consensus)
            })
            .await;
            solved(result)
        }
        Err(e) => {
            let response = SolveResponse {
                success: false,
                message: format!("Error: {}", e),
                outcome: None,
                consensus: None,
            };
            (status_for(&e), Json(response)).into_response()
        }
    }
}

/// Runs the formula search on structured lines
pub async fn validate_lines(
    State(validator): State<Arc<MathValidator>>,
    Json(req): Json<LinesRequest>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        let tolerances = &validator.settings().tolerances;
        req.lines
            .iter()
            .map(|line| find_valid_formula(line, tolerances))
            .collect::<Vec<LineValidation>>()
    })
    .await;
    match result {
        Ok(results) => {
            let valid = results.iter().filter(|r| r.found).count();
            let response = LinesResponse {
                success: true,
                message: format!("{} of {} lines validated", valid, results.len()),
                results,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            tracing::error!("line validation task failed: {}", e);
            let response = LinesResponse {
                success: false,
                message: format!("Error: {}", e),
                results: Vec::new(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}

/// Extracts packaging notation from free text
pub async fn extract_formats(Json(req): Json<FormatsRequest>) -> Response {
    let results: Vec<FormatExtraction> = req.texts.iter().map(|t| extract_all_formats(t)).collect();
    let found = results.iter().filter(|r| r.found).count();
    let response = FormatsResponse {
        success: true,
        message: format!("Formats found in {} of {} texts", found, results.len()),
        results,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Runs the totals cascade alone
pub async fn validate_totals(
    State(validator): State<Arc<MathValidator>>,
    Json(input): Json<CascadeInput>,
) -> Response {
    let settings = validator.settings();
    let result = validate_cascade(&input, &settings.tax, &settings.tolerances);
    let response = CascadeResponse {
        success: true,
        message: result.summary.message.clone(),
        result,
    };
    (StatusCode::OK, Json(response)).into_response()
}

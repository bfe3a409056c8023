//! HTTP route handlers for Axum.

use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, warn};

use crate::{
    api::types::{
        ExtendTermsRequest, HealthDto, MergeRequest, NormalizeRequest, NormalizeResponse,
        ParseReportRequest, TermsResponse,
    },
    data::report::ParsedReport,
    nlp::classifier::ClassifierProvider,
    series::{merge_reports, MergedReport},
};

use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

const MAX_TERMS_PER_REQUEST: usize = 500;

pub async fn health(State(state): State<AppState>) -> Json<HealthDto> {
    let classifier = match state.parser.normalizer().classifier() {
        ClassifierProvider::Remote(client) => client.endpoint().provider.to_string(),
        ClassifierProvider::Unconfigured { .. } => "unconfigured".to_string(),
    };
    Json(HealthDto {
        status: "healthy".to_string(),
        terms: state.parser.normalizer().dictionary().snapshot().len(),
        classifier,
    })
}

pub async fn normalize_terms(
    State(state): State<AppState>,
    Json(request): Json<NormalizeRequest>,
) -> ApiResult<NormalizeResponse> {
    if request.terms.len() > MAX_TERMS_PER_REQUEST {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("at most {MAX_TERMS_PER_REQUEST} terms per request"),
        ));
    }
    let normalizer = state.parser.normalizer();
    let threshold = request.threshold.unwrap_or(normalizer.threshold());
    if !(0.0..=1.0).contains(&threshold) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("threshold must lie in [0, 1], got {threshold}"),
        ));
    }

    let normalized_terms = if request.use_ai {
        normalizer
            .normalize_batch(&request.terms, threshold)
            .await
            .map_err(|err| {
                error!(error = %err, "normalization contract violation");
                (StatusCode::BAD_GATEWAY, err.to_string())
            })?
    } else {
        normalizer.normalize_lexical(&request.terms)
    };
    Ok(Json(NormalizeResponse { normalized_terms }))
}

pub async fn parse_report(
    State(state): State<AppState>,
    Json(request): Json<ParseReportRequest>,
) -> ApiResult<ParsedReport> {
    if request.text.trim().is_empty() {
        warn!("parse-report called with empty text");
    }
    let report = state.parser.parse(&request.text, request.report_type).await;
    Ok(Json(report))
}

pub async fn merge(Json(request): Json<MergeRequest>) -> ApiResult<MergedReport> {
    if request.reports.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "at least one report is required".to_string(),
        ));
    }
    Ok(Json(merge_reports(&request.reports)))
}

pub async fn list_terms(State(state): State<AppState>) -> Json<TermsResponse> {
    let snapshot = state.parser.normalizer().dictionary().snapshot();
    Json(TermsResponse {
        count: snapshot.len(),
        terms: snapshot.terms().cloned().collect(),
    })
}

pub async fn extend_terms(
    State(state): State<AppState>,
    Json(request): Json<ExtendTermsRequest>,
) -> ApiResult<TermsResponse> {
    if request.terms.is_empty() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, "no terms supplied".to_string()));
    }
    let snapshot = state.parser.normalizer().dictionary().extend(request.terms);
    Ok(Json(TermsResponse {
        count: snapshot.len(),
        terms: snapshot.terms().cloned().collect(),
    }))
}

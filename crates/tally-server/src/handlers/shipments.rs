//! Shipment handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::Deserialize;

use crate::{user_identity, AppError, AppState, SuccessResponse};
use tally_core::models::{
    Carrier, NewShipment, Shipment, ShipmentStats, ShipmentStatus, TrackingEvent,
};

/// Query params for listing shipments
#[derive(Debug, Deserialize)]
pub struct ListShipmentsQuery {
    /// Filter by status (pending, in_transit, delivered, returned)
    pub status: Option<String>,
}

/// GET /api/shipments - List shipments, optionally filtered by status
pub async fn list_shipments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListShipmentsQuery>,
    request: Request,
) -> Result<Json<Vec<Shipment>>, AppError> {
    let user_email = user_identity(&request);

    let status = query
        .status
        .as_deref()
        .map(str::parse::<ShipmentStatus>)
        .transpose()
        .map_err(|_| {
            AppError::bad_request("Invalid status. Use: pending, in_transit, delivered, returned")
        })?;

    let shipments = state.db.list_shipments(status)?;

    state.db.log_audit(
        &user_email,
        "list",
        Some("shipments"),
        None,
        Some(&format!("count={}", shipments.len())),
    )?;

    Ok(Json(shipments))
}

/// Request body for creating a shipment
#[derive(Debug, Deserialize)]
pub struct CreateShipmentRequest {
    pub tracking_number: String,
    #[serde(default)]
    pub transaction_id: Option<i64>,
    /// Inferred from the tracking number when omitted
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// YYYY-MM-DD
    #[serde(default)]
    pub estimated_delivery: Option<String>,
}

/// POST /api/shipments - Create a shipment
pub async fn create_shipment(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Shipment>, AppError> {
    let user_email = user_identity(&request);

    let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body: CreateShipmentRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    if body.tracking_number.trim().is_empty() {
        return Err(AppError::bad_request("Tracking number must not be empty"));
    }

    let carrier = body
        .carrier
        .as_deref()
        .map(str::parse::<Carrier>)
        .transpose()
        .map_err(|_| AppError::bad_request("Invalid carrier. Use: ups, fedex, usps, dhl, other"))?;

    let status = body
        .status
        .as_deref()
        .map(str::parse::<ShipmentStatus>)
        .transpose()
        .map_err(|_| {
            AppError::bad_request("Invalid status. Use: pending, in_transit, delivered, returned")
        })?
        .unwrap_or_default();

    let estimated_delivery = body
        .estimated_delivery
        .as_deref()
        .map(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .map_err(|_| AppError::bad_request("Invalid estimated_delivery (use YYYY-MM-DD)"))?;

    if let Some(transaction_id) = body.transaction_id {
        state
            .db
            .get_transaction(transaction_id)?
            .ok_or_else(|| AppError::not_found("Transaction not found"))?;
    }

    let shipment_id = state.db.create_shipment(&NewShipment {
        transaction_id: body.transaction_id,
        tracking_number: body.tracking_number.trim().to_string(),
        carrier,
        status,
        estimated_delivery,
    })?;

    state.db.log_audit(
        &user_email,
        "create",
        Some("shipment"),
        Some(shipment_id),
        Some(&format!("tx={:?}", body.transaction_id)),
    )?;

    let shipment = state
        .db
        .get_shipment(shipment_id)?
        .ok_or_else(|| AppError::internal("Shipment not found after creation"))?;

    Ok(Json(shipment))
}

/// GET /api/shipments/:id - Get a specific shipment
pub async fn get_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Shipment>, AppError> {
    let user_email = user_identity(&request);

    let shipment = state
        .db
        .get_shipment(id)?
        .ok_or_else(|| AppError::not_found("Shipment not found"))?;

    state
        .db
        .log_audit(&user_email, "view", Some("shipment"), Some(id), None)?;

    Ok(Json(shipment))
}

/// Request body for updating a shipment
#[derive(Debug, Deserialize)]
pub struct UpdateShipmentRequest {
    #[serde(default)]
    pub carrier: Option<String>,
    /// YYYY-MM-DD
    #[serde(default)]
    pub estimated_delivery: Option<String>,
}

/// PUT /api/shipments/:id - Update carrier/delivery estimate
pub async fn update_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Shipment>, AppError> {
    let user_email = user_identity(&request);

    let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body: UpdateShipmentRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    let existing = state
        .db
        .get_shipment(id)?
        .ok_or_else(|| AppError::not_found("Shipment not found"))?;

    let carrier = body
        .carrier
        .as_deref()
        .map(str::parse::<Carrier>)
        .transpose()
        .map_err(|_| AppError::bad_request("Invalid carrier. Use: ups, fedex, usps, dhl, other"))?;

    let estimated_delivery = match body.estimated_delivery.as_deref() {
        Some(d) => Some(
            chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| AppError::bad_request("Invalid estimated_delivery (use YYYY-MM-DD)"))?,
        ),
        None => existing.estimated_delivery,
    };

    state.db.update_shipment(id, carrier, estimated_delivery)?;

    state
        .db
        .log_audit(&user_email, "update", Some("shipment"), Some(id), None)?;

    let updated = state
        .db
        .get_shipment(id)?
        .ok_or_else(|| AppError::internal("Shipment not found after update"))?;

    Ok(Json(updated))
}

/// Request body for updating shipment status
#[derive(Debug, Deserialize)]
pub struct UpdateShipmentStatusRequest {
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// POST /api/shipments/:id/status - Update status, appending a tracking event
pub async fn update_shipment_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Shipment>, AppError> {
    let user_email = user_identity(&request);

    let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let body: UpdateShipmentStatusRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    state
        .db
        .get_shipment(id)?
        .ok_or_else(|| AppError::not_found("Shipment not found"))?;

    let status: ShipmentStatus = body.status.parse().map_err(|_| {
        AppError::bad_request("Invalid status. Use: pending, in_transit, delivered, returned")
    })?;

    state.db.update_shipment_status(
        id,
        status,
        body.description.as_deref(),
        body.location.as_deref(),
    )?;

    state.db.log_audit(
        &user_email,
        "update_status",
        Some("shipment"),
        Some(id),
        Some(&format!("status={}", body.status)),
    )?;

    let updated = state
        .db
        .get_shipment(id)?
        .ok_or_else(|| AppError::internal("Shipment not found after update"))?;

    Ok(Json(updated))
}

/// GET /api/shipments/:id/events - Tracking timeline, newest first
pub async fn list_tracking_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Vec<TrackingEvent>>, AppError> {
    let user_email = user_identity(&request);

    state
        .db
        .get_shipment(id)?
        .ok_or_else(|| AppError::not_found("Shipment not found"))?;

    let events = state.db.list_tracking_events(id)?;

    state.db.log_audit(
        &user_email,
        "view",
        Some("shipment_events"),
        Some(id),
        Some(&format!("count={}", events.len())),
    )?;

    Ok(Json(events))
}

/// DELETE /api/shipments/:id - Delete a shipment and its events
pub async fn delete_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_email = user_identity(&request);

    state
        .db
        .get_shipment(id)?
        .ok_or_else(|| AppError::not_found("Shipment not found"))?;

    state.db.delete_shipment(id)?;

    state
        .db
        .log_audit(&user_email, "delete", Some("shipment"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/shipments/stats - Counts by status
pub async fn shipment_stats(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ShipmentStats>, AppError> {
    let user_email = user_identity(&request);

    let stats = state.db.shipment_stats()?;

    state
        .db
        .log_audit(&user_email, "view", Some("shipment_stats"), None, None)?;

    Ok(Json(stats))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use super::{ensure_client, ensure_project, not_found};
use crate::middleware::AuthUser;
use crate::models::{
    validate_tax_rate, InvoiceChanges, InvoiceInput, InvoiceResponse, InvoiceStats,
    InvoiceStatus, InvoiceStatusUpdate, LineItemError, LineItems, NewInvoice, PageParams,
    Paginated,
};
use crate::services::metrics::{INVOICES_CREATED_TOTAL, INVOICE_AMOUNT_TOTAL};
use crate::services::numbering::{create_invoice_with_retry, peek_next_number};
use crate::services::totals::calculate_totals;
use crate::startup::AppState;

pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<InvoiceResponse>>, AppError> {
    let invoices = state
        .storage
        .list_invoices(user.tenant_id, params.limit(), params.offset())
        .await?
        .into_iter()
        .map(InvoiceResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let total = state.storage.count_invoices(user.tenant_id).await?;
    Ok(Json(Paginated::new(invoices, &params, total)))
}

pub async fn invoice_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<InvoiceStats>, AppError> {
    Ok(Json(state.storage.invoice_stats(user.tenant_id).await?))
}

/// Preview of the number the next invoice would receive.
pub async fn next_invoice_number(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let number = peek_next_number(&*state.storage, user.tenant_id).await?;
    Ok(Json(json!({ "invoice_number": number })))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .storage
        .get_invoice(user.tenant_id, id)
        .await?
        .ok_or_else(|| not_found("Invoice"))?;
    Ok(Json(invoice.try_into()?))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<InvoiceInput>,
) -> Result<impl IntoResponse, AppError> {
    let (client_id, raw_items) = match (input.client_id, input.items.as_deref()) {
        (Some(client_id), Some(items)) if !items.is_empty() => (client_id, items),
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Client and at least one item are required"
            )))
        }
    };

    let items = LineItems::from_inputs(raw_items).map_err(LineItemError::into_bad_request)?;
    let tax_rate = validate_tax_rate(input.tax_rate)?;
    ensure_client(&state, user.tenant_id, Some(client_id)).await?;
    ensure_project(&state, user.tenant_id, input.project_id).await?;

    let totals = calculate_totals(items.as_slice(), tax_rate);
    let draft = NewInvoice {
        tenant_id: user.tenant_id,
        client_id,
        project_id: input.project_id,
        invoice_number: String::new(),
        items,
        tax_rate,
        totals,
        status: input.status.unwrap_or(InvoiceStatus::Draft),
        issue_date: Utc::now().date_naive(),
        due_date: input.due_date,
        notes: input.notes,
        recurring_invoice_id: None,
    };

    let invoice = create_invoice_with_retry(
        &*state.storage,
        draft,
        state.config.recurring.max_number_attempts,
    )
    .await?;

    INVOICES_CREATED_TOTAL.with_label_values(&["manual"]).inc();
    INVOICE_AMOUNT_TOTAL
        .with_label_values(&["manual"])
        .inc_by(invoice.total);

    tracing::info!(
        tenant_id = %user.tenant_id,
        invoice_number = %invoice.invoice_number,
        "Invoice created"
    );

    let response: InvoiceResponse = invoice.try_into()?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Replace an invoice's content. Totals are recomputed from the new items.
pub async fn update_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<InvoiceInput>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let existing = state
        .storage
        .get_invoice(user.tenant_id, id)
        .await?
        .ok_or_else(|| not_found("Invoice"))?;

    let raw_items = input
        .items
        .as_deref()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Items must be an array")))?;
    let items = LineItems::from_inputs(raw_items).map_err(LineItemError::into_bad_request)?;
    let tax_rate = validate_tax_rate(input.tax_rate)?;
    let client_id = input.client_id.unwrap_or(existing.client_id);
    ensure_client(&state, user.tenant_id, Some(client_id)).await?;
    ensure_project(&state, user.tenant_id, input.project_id).await?;

    let changes = InvoiceChanges {
        client_id,
        project_id: input.project_id,
        totals: calculate_totals(items.as_slice(), tax_rate),
        items,
        tax_rate,
        status: input.status.unwrap_or_else(|| existing.status()),
        due_date: input.due_date,
        notes: input.notes,
    };

    let invoice = state
        .storage
        .update_invoice(user.tenant_id, id, &changes)
        .await?
        .ok_or_else(|| not_found("Invoice"))?;
    Ok(Json(invoice.try_into()?))
}

pub async fn update_invoice_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<InvoiceStatusUpdate>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .storage
        .update_invoice_status(user.tenant_id, id, body.status)
        .await?
        .ok_or_else(|| not_found("Invoice"))?;
    Ok(Json(invoice.try_into()?))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.storage.delete_invoice(user.tenant_id, id).await? {
        return Err(not_found("Invoice"));
    }
    Ok(Json(json!({ "message": "Invoice deleted successfully" })))
}

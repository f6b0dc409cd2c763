use axum::{
    extract::{Path, State},
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
    validate_tax_rate, InvoiceResponse, LineItemError, LineItems, RecurringInvoice,
    RecurringInvoiceFields, RecurringInvoiceInput, RecurringInvoiceResponse, TemplateStatus,
};
use crate::startup::AppState;

fn into_responses(
    templates: Vec<RecurringInvoice>,
) -> Result<Vec<RecurringInvoiceResponse>, AppError> {
    templates
        .into_iter()
        .map(RecurringInvoiceResponse::try_from)
        .collect()
}

pub async fn list_recurring_invoices(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<RecurringInvoiceResponse>>, AppError> {
    let templates = state
        .storage
        .list_recurring_invoices(user.tenant_id)
        .await?;
    Ok(Json(into_responses(templates)?))
}

/// Templates a batch run would pick up today.
pub async fn list_due_recurring_invoices(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<RecurringInvoiceResponse>>, AppError> {
    let templates = state
        .storage
        .list_due_recurring_invoices(user.tenant_id, Utc::now().date_naive())
        .await?;
    Ok(Json(into_responses(templates)?))
}

pub async fn get_recurring_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RecurringInvoiceResponse>, AppError> {
    let template = state
        .storage
        .get_recurring_invoice(user.tenant_id, id)
        .await?
        .ok_or_else(|| not_found("Recurring invoice"))?;
    Ok(Json(template.try_into()?))
}

pub async fn create_recurring_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<RecurringInvoiceInput>,
) -> Result<impl IntoResponse, AppError> {
    let (client_id, raw_items, frequency, next_invoice_date) = match (
        input.client_id,
        input.items.as_deref(),
        input.frequency,
        input.next_invoice_date,
    ) {
        (Some(client_id), Some(items), Some(frequency), Some(date)) if !items.is_empty() => {
            (client_id, items, frequency, date)
        }
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Client, items, frequency, and next invoice date are required"
            )))
        }
    };

    let fields = RecurringInvoiceFields {
        client_id,
        project_id: input.project_id.flatten(),
        items: LineItems::from_inputs(raw_items).map_err(LineItemError::into_bad_request)?,
        tax_rate: validate_tax_rate(input.tax_rate)?,
        frequency,
        next_invoice_date,
        status: input.status.unwrap_or(TemplateStatus::Active),
        notes: input.notes.flatten(),
    };
    ensure_client(&state, user.tenant_id, Some(fields.client_id)).await?;
    ensure_project(&state, user.tenant_id, fields.project_id).await?;

    let template = state
        .storage
        .create_recurring_invoice(user.tenant_id, &fields)
        .await?;
    let response: RecurringInvoiceResponse = template.try_into()?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Partial update; omitted fields keep their stored values and an explicit
/// `null` clears `project_id` or `notes`. Pausing and resuming go through
/// `status`.
pub async fn update_recurring_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RecurringInvoiceInput>,
) -> Result<Json<RecurringInvoiceResponse>, AppError> {
    let existing = state
        .storage
        .get_recurring_invoice(user.tenant_id, id)
        .await?
        .ok_or_else(|| not_found("Recurring invoice"))?;

    let items = match input.items.as_deref() {
        Some(raw) => LineItems::from_inputs(raw).map_err(LineItemError::into_bad_request)?,
        None => existing.line_items()?,
    };
    let tax_rate = match input.tax_rate {
        Some(rate) => validate_tax_rate(Some(rate))?,
        None => existing.tax_rate,
    };

    let fields = RecurringInvoiceFields {
        client_id: input.client_id.unwrap_or(existing.client_id),
        project_id: input.project_id.unwrap_or(existing.project_id),
        items,
        tax_rate,
        frequency: input.frequency.unwrap_or_else(|| existing.frequency()),
        next_invoice_date: input.next_invoice_date.unwrap_or(existing.next_invoice_date),
        status: input.status.unwrap_or_else(|| existing.status()),
        notes: input.notes.unwrap_or(existing.notes),
    };
    ensure_client(&state, user.tenant_id, Some(fields.client_id)).await?;
    ensure_project(&state, user.tenant_id, fields.project_id).await?;

    let template = state
        .storage
        .update_recurring_invoice(user.tenant_id, id, &fields)
        .await?
        .ok_or_else(|| not_found("Recurring invoice"))?;
    Ok(Json(template.try_into()?))
}

pub async fn delete_recurring_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state
        .storage
        .delete_recurring_invoice(user.tenant_id, id)
        .await?
    {
        return Err(not_found("Recurring invoice"));
    }
    Ok(Json(json!({ "message": "Recurring invoice deleted successfully" })))
}

/// "Generate now": one draft invoice from an active template, whatever its
/// next date.
pub async fn generate_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice: InvoiceResponse = state.generator.generate_one(user.tenant_id, id).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

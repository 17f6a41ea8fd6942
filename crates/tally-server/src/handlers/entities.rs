//! Read-only entity listings for the authenticated user

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};

use crate::{get_user_email, AppError, AppState};
use tally_core::{
    models::{Account, Category, Counterparty, Tag},
    AccountStore, CategoryStore, CounterpartyStore, TagStore,
};

fn current_uid(state: &AppState, headers: &HeaderMap) -> Result<i64, AppError> {
    let user = state.db.get_or_create_user(&get_user_email(headers))?;
    Ok(user.id)
}

/// GET /api/accounts - List accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Account>>, AppError> {
    let uid = current_uid(&state, &headers)?;
    Ok(Json(state.db.list_accounts(uid)?))
}

/// GET /api/categories - List categories, parents before their children
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Category>>, AppError> {
    let uid = current_uid(&state, &headers)?;
    Ok(Json(state.db.list_categories(uid)?))
}

/// GET /api/counterparties - List counterparties (deleted ones are left out)
pub async fn list_counterparties(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Counterparty>>, AppError> {
    let uid = current_uid(&state, &headers)?;
    let counterparties = state
        .db
        .list_counterparties(uid)?
        .into_iter()
        .filter(|c| !c.deleted)
        .collect();
    Ok(Json(counterparties))
}

/// GET /api/tags - List tags with their group names
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Tag>>, AppError> {
    let uid = current_uid(&state, &headers)?;
    Ok(Json(state.db.list_tags(uid)?))
}

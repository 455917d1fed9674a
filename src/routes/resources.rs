//! Ship part shop, inventory and equipment endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use serde_json::json;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::resources::model;
use crate::routes::envelope;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shop", get(shop))
        .route("/inventory", get(inventory))
        .route("/inventory/equipped", get(equipped))
        .route("/ship", get(ship))
        .route("/purchase/{part_id}", post(purchase))
        .route("/equip/{part_id}", put(equip))
        .route("/unequip/{inventory_id}", put(unequip))
}

/// Catalog split by the caller's ownership.
async fn shop(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let items = model::shop_items(&state.db, user.id)?;
    let (owned, available): (Vec<_>, Vec<_>) =
        items.into_iter().partition(|item| item.inventory_id.is_some());
    Ok(envelope(
        "Shop retrieved",
        json!({ "available": available, "owned": owned }),
    )
    .into_response())
}

async fn inventory(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let items = model::inventory(&state.db, user.id)?;
    Ok(envelope("Inventory retrieved", items).into_response())
}

async fn equipped(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let items = model::equipped(&state.db, user.id)?;
    Ok(envelope("Equipped parts retrieved", items).into_response())
}

async fn ship(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let view = model::ship(&state.db, user.id)?;
    Ok(envelope("Ship retrieved", view).into_response())
}

async fn purchase(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(part_id): Path<i64>,
) -> AppResult<Response> {
    let remaining_credits = model::purchase_part(&state.db, user.id, part_id)?;
    tracing::info!(user_id = user.id, part_id, remaining_credits, "part purchased");
    Ok((
        StatusCode::CREATED,
        envelope(
            "Part purchased",
            json!({ "remaining_credits": remaining_credits }),
        ),
    )
        .into_response())
}

async fn equip(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(part_id): Path<i64>,
) -> AppResult<Response> {
    let slots = model::equip_part(&state.db, user.id, part_id)?;
    Ok(envelope("Part equipped", slots).into_response())
}

async fn unequip(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(inventory_id): Path<i64>,
) -> AppResult<Response> {
    model::unequip_part(&state.db, user.id, inventory_id)?;
    Ok(envelope("Part unequipped", ()).into_response())
}

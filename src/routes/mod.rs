//! Route gateway: merges every sub-router and attaches the shared state.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::TokenKeys;
use crate::store::PgStore;
use crate::sync::SyncService;

mod admin;
mod auth;
mod data;
mod health;
mod users;

#[cfg(test)]
pub(crate) mod test_support;

// ---

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub store: PgStore,
    pub sync: Arc<SyncService>,
    pub tokens: Arc<TokenKeys>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(data::router())
        .merge(admin::router())
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) const DEFAULT_PAGE_SIZE: u32 = 20;
pub(crate) const MAX_PAGE_SIZE: u32 = 100;

/// Normalize optional paging parameters: `page >= 1`, `page_size` in `1..=100`.
pub(crate) fn paging(page: Option<u32>, page_size: Option<u32>) -> (u32, u32) {
    // ---
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

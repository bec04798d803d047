// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_database::postgrest::PostgrestClient;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::engine::SchedulingEngine;
use crate::services::records::PostgrestDocumentStore;
use crate::services::store::PostgrestSlotStore;

/// Routes backed by the relational store configured in `config`.
pub fn scheduling_routes(config: Arc<AppConfig>) -> Router {
    let client = Arc::new(PostgrestClient::new(&config));
    let engine = Arc::new(SchedulingEngine::new(
        Arc::new(PostgrestSlotStore::new(Arc::clone(&client))),
        Arc::new(PostgrestDocumentStore::new(client)),
    ));

    scheduling_routes_with_engine(config, engine)
}

/// Routes over an explicit engine; tests inject in-memory-backed engines
/// through here.
pub fn scheduling_routes_with_engine(
    config: Arc<AppConfig>,
    engine: Arc<SchedulingEngine>,
) -> Router {
    // Every slot operation requires an authenticated caller.
    let protected_routes = Router::new()
        .route("/", post(handlers::create_slot))
        .route("/", get(handlers::list_slots))
        .route("/{slot_id}", get(handlers::get_slot))
        .route("/{slot_id}", put(handlers::update_slot))
        .route("/{slot_id}/reschedule", patch(handlers::reschedule_slot))
        .route("/{slot_id}/confirm", post(handlers::confirm_arrival))
        .route("/{slot_id}/complete", post(handlers::complete_appointment))
        .route("/{slot_id}/no-show", post(handlers::mark_no_show))
        .route("/{slot_id}/cancel", post(handlers::cancel_slot))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(engine)
}

use axum::{
    http::{header, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod cart;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod orders;
pub mod params;
pub mod products;
pub mod promotions;
pub mod reports;
pub mod state;
pub mod users;

pub use state::AppState;

use crate::middleware::{admin_middleware, auth_middleware};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let member = Router::new()
        .merge(users::routes())
        .merge(cart::routes())
        .merge(orders::routes())
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    // Layers run bottom-up: authenticate, then require the admin role.
    let admin = Router::new()
        .merge(products::admin_routes())
        .merge(promotions::routes())
        .merge(reports::routes())
        .route_layer(from_fn(admin_middleware))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(users::public_routes())
        .merge(products::routes())
        .merge(member)
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

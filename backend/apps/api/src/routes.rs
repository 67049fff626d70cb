//! Route Table
//!
//! The forum's public routes and the admin subtree. Controllers live
//! outside this service; every route here answers with the page descriptor
//! the renderer consumes (route name plus CSP nonce).

use axum::extract::Extension;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use kernel::error::app_error::AppError;
use pipeline::RequestContext;
use pipeline::domain::value_object::csp::CspNonce;
use pipeline::domain::value_object::route::{PathPrefix, RouteTable};
use serde::Serialize;

/// `(method, pattern, name)` of every named public route
const NAMED_ROUTES: &[(&str, &str, &str)] = &[
    ("GET", "/threads", "threads.index"),
    ("POST", "/threads", "threads.store"),
    ("GET", "/threads/search", "threads.search"),
    ("GET", "/threads/tag/{tag}", "threads.tag"),
    ("GET", "/threads/category/{category}", "threads.category"),
    ("GET", "/threads/{thread}", "threads.show"),
    ("POST", "/threads/{thread}/responses", "responses.store"),
    ("GET", "/profile/{user}", "profile.show"),
    ("GET", "/login", "login"),
    ("POST", "/login", "login.store"),
    ("POST", "/verification", "verification.send"),
    ("GET", "/logout", "logout"),
    ("POST", "/logout", "logout"),
    ("GET", "/api/threads", "api.threads.index"),
];

/// Route names the pipeline resolves requests against.
pub fn route_table() -> RouteTable {
    NAMED_ROUTES
        .iter()
        .fold(RouteTable::new(), |table, (method, pattern, name)| {
            let method = Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET);
            table.route(method, pattern, *name)
        })
}

#[derive(Debug, Serialize)]
struct PageDescriptor {
    route: Option<String>,
    csp_nonce: Option<String>,
}

async fn page(
    context: Option<Extension<RequestContext>>,
    nonce: Option<Extension<CspNonce>>,
) -> Json<PageDescriptor> {
    Json(PageDescriptor {
        route: context.and_then(|Extension(context)| context.route_name),
        csp_nonce: nonce.map(|Extension(nonce)| nonce.as_str().to_string()),
    })
}

async fn not_found() -> AppError {
    AppError::not_found("No such page")
}

fn public_router() -> Router {
    NAMED_ROUTES
        .iter()
        .fold(Router::new(), |router, (method, pattern, _)| {
            let handler = match *method {
                "POST" => post(page),
                _ => get(page),
            };
            router.route(pattern, handler)
        })
        .route("/", get(page))
}

fn admin_router() -> Router {
    Router::new()
        .route("/", get(page))
        .route("/reports", get(page))
        .route("/suggestions", get(page))
        .route("/announcements", get(page).post(page))
}

/// Admin subtree nested under `admin_prefix`, registered before the
/// public routes so it cannot be shadowed.
pub fn app(admin_prefix: &PathPrefix) -> anyhow::Result<Router> {
    if admin_prefix.as_str() == "/" {
        anyhow::bail!("ADMIN_PATH_PREFIX must not be the site root");
    }

    Ok(Router::new()
        .nest(admin_prefix.as_str(), admin_router())
        .merge(public_router())
        .fallback(not_found))
}

//! HTTP endpoints for the landing page, admin panel, and the experiment API.

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{future::Future, net::SocketAddr, sync::Arc};

use crate::{
    config::Settings,
    model::User,
    pages,
    store::Store,
    validate::{self, Reject},
};

#[derive(Clone)]
struct HttpState {
    store: Store,
    settings: Settings,
}

/// Response body for the `/healthz` endpoint.
#[derive(Serialize, Deserialize)]
struct Health {
    /// Always "ok" when the server is running.
    status: String,
}

/// Start the HTTP server for pages and the experiment API.
pub async fn serve_http(
    addr: SocketAddr,
    store: Store,
    settings: Settings,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let state = Arc::new(HttpState { store, settings });
    let app = router(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/login", get(login))
        .route("/admin/experiments", get(admin_experiments))
        .route("/api/experiments", get(api_experiments))
        // any() so non-POST calls get the body-level error, not a bare 405
        .route("/api/create-experiment", any(create_experiment))
        .with_state(state)
}

/// Health check endpoint.
async fn healthz(State(state): State<Arc<HttpState>>) -> Json<Health> {
    if state.settings.verbose {
        println!("[http] GET /healthz");
    }
    Json(Health {
        status: "ok".to_string(),
    })
}

/// Landing page with the project blurb and submission link.
async fn index(State(state): State<Arc<HttpState>>) -> Html<String> {
    if state.settings.verbose {
        println!("[http] GET /");
    }
    Html(pages::index(state.settings.guoba_active))
}

/// Stub login page; the redirect target for unauthenticated admin requests.
async fn login() -> Html<String> {
    Html(pages::login())
}

/// Resolve the caller from the `session` cookie, if any.
fn session_user(state: &HttpState, headers: &HeaderMap) -> Option<User> {
    let cookie = headers.get(header::COOKIE)?.to_str().ok()?;
    let token = cookie
        .split(';')
        .find_map(|part| part.trim().strip_prefix("session="))?;
    state.store.session_user(token).ok().flatten()
}

/// Admin panel listing every experiment with its creator and submission
/// count. Unauthenticated callers go to the login flow, non-admins home.
async fn admin_experiments(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> Response {
    let Some(user) = session_user(&state, &headers) else {
        return Redirect::temporary("/login").into_response();
    };
    if !user.admin {
        return Redirect::temporary("/").into_response();
    }
    let experiments = match state.store.experiments() {
        Ok(experiments) => experiments,
        Err(err) => {
            eprintln!("[http] listing experiments failed: {err:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to load experiments")
                .into_response();
        }
    };
    if state.settings.verbose {
        println!(
            "[http] GET /admin/experiments -> {} experiments",
            experiments.len()
        );
    }
    Html(pages::admin_experiments(&user, &experiments)).into_response()
}

/// JSON listing of every experiment, admin-gated at the API level.
async fn api_experiments(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> Json<Value> {
    let Some(user) = session_user(&state, &headers) else {
        return Json(json!({"error": Reject::NotLoggedIn.message()}));
    };
    if !user.admin {
        return Json(json!({"error": Reject::NoPermission.message()}));
    }
    match state.store.experiments() {
        Ok(experiments) => {
            if state.settings.verbose {
                println!("[http] GET /api/experiments -> {} experiments", experiments.len());
            }
            Json(json!({"ok": true, "experiments": experiments}))
        }
        Err(err) => {
            eprintln!("[http] listing experiments failed: {err:#}");
            Json(json!({"error": Reject::Unknown.message()}))
        }
    }
}

/// Experiment creation endpoint.
async fn create_experiment(
    State(state): State<Arc<HttpState>>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    match create(&state, &method, &headers, &body) {
        Ok(()) => Json(json!({"ok": true})),
        Err(reject) => Json(json!({"error": reject.message()})),
    }
}

/// Run the creation pipeline: method, session, admin flag, field validation,
/// slug conflict, then the write. Every outcome shares the default status
/// code; a failure is carried only in the response body.
fn create(
    state: &HttpState,
    method: &Method,
    headers: &HeaderMap,
    body: &str,
) -> Result<(), Reject> {
    if *method != Method::POST {
        return Err(Reject::MethodNotAllowed);
    }
    let user = session_user(state, headers).ok_or(Reject::NotLoggedIn)?;
    if !user.admin {
        return Err(Reject::NoPermission);
    }
    let req = validate::parse_request(body)?;
    println!("[api] creating experiment {} for {}", req.name, user.id);
    match state.store.create_experiment(&req, &user.id) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(Reject::SlugTaken),
        Err(err) => {
            eprintln!("[api] creating experiment failed: {err:#}");
            Err(Reject::Unknown)
        }
    }
}

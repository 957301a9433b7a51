use crate::Result;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::net::{IpAddr, SocketAddr};

use super::routes;

/// All routes except credential issuance sit behind the token guard.
pub fn router() -> Router {
    let guarded = Router::new()
        .route("/api/daemons/", get(routes::daemons::list))
        .route("/api/daemons/{name}/start", post(routes::daemons::start))
        .route("/api/daemons/{name}/stop", post(routes::daemons::stop))
        .route(
            "/api/daemons/{name}/restart",
            post(routes::daemons::restart),
        )
        .route("/api/hell/start", post(routes::hell::start))
        .route("/api/hell/stop", post(routes::hell::stop))
        .route("/api/hell/restart", post(routes::hell::restart))
        .layer(middleware::from_fn(routes::access::require_token));

    Router::new()
        .route("/api/create/invitation", post(routes::access::create_invitation))
        .route("/api/create/token", post(routes::access::create_token))
        .merge(guarded)
}

pub async fn serve(bind: IpAddr, port: u16) -> Result<()> {
    let addr = SocketAddr::from((bind, port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| miette::miette!("Failed to bind control API on {addr}: {e}"))?;
    info!("control API listening on http://{addr}");

    axum::serve(
        listener,
        router().into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| miette::miette!("Control API error: {e}"))
}

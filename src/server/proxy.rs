//! Prefix-stripped reverse proxy with protocol-upgrade support.
//!
//! Each engine gets one of these nested at `/engine/<name>`; the UI engine
//! gets one as the router fallback. `nest_service` has already stripped the
//! prefix by the time a request lands here, so the remaining path maps 1:1
//! onto the engine.
//!
//! Upgrades (websockets mostly) are handled by forwarding the request
//! headers as-is and, when the engine answers 101, splicing the two upgraded
//! connections together in a background task.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper::upgrade::OnUpgrade;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tracing::{debug, warn};

pub type HttpClient = Client<HttpConnector, Body>;

pub fn client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

#[derive(Clone)]
struct ProxyTarget {
    client: HttpClient,
    base: String,
}

/// A service forwarding every request it sees to `target`.
pub fn proxy_to(client: HttpClient, target: &str) -> Router {
    Router::new().fallback(forward).with_state(ProxyTarget {
        client,
        base: target.trim_end_matches('/').to_string(),
    })
}

async fn forward(State(target): State<ProxyTarget>, mut request: Request) -> Response {
    let path_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = match format!("{}{}", target.base, path_query).parse() {
        Ok(uri) => uri,
        Err(err) => {
            warn!(error = %err, "failed to build proxy uri");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };
    *request.uri_mut() = uri;

    let wants_upgrade = request.headers().contains_key(header::UPGRADE);
    // Taken out before forwarding; hyper would otherwise refuse to reuse it.
    let downstream_upgrade = request.extensions_mut().remove::<OnUpgrade>();

    let mut response = match target.client.request(request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, target = %target.base, "proxy request failed");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    if wants_upgrade && response.status() == StatusCode::SWITCHING_PROTOCOLS {
        if let Some(downstream) = downstream_upgrade {
            let upstream = hyper::upgrade::on(&mut response);
            tokio::spawn(async move {
                match tokio::try_join!(downstream, upstream) {
                    Ok((downstream, upstream)) => {
                        let mut downstream = TokioIo::new(downstream);
                        let mut upstream = TokioIo::new(upstream);
                        if let Err(err) =
                            tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await
                        {
                            debug!(error = %err, "upgraded connection closed with error");
                        }
                    }
                    Err(err) => warn!(error = %err, "protocol upgrade failed"),
                }
            });
        }
    }

    response.map(Body::new).into_response()
}

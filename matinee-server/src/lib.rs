mod context;
mod docs;
mod errors;
mod rooms;
mod schemas;
mod serialized;
mod sse;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    thread,
};

use axum::routing::get;
use log::info;
use matinee_collab::Collab;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::context::ServerContext;
use crate::sse::ServerSentEvents;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9070;

pub type Router = axum::Router<ServerContext>;

/// Starts the matinee server
pub async fn run_server(collab: Arc<Collab>) {
    let port = env::var("MATINEE_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let sse = ServerSentEvents::new();
    forward_collab_events(&collab, &sse);

    let context = ServerContext { collab, sse };

    let version_one_router = Router::new().nest("/rooms", rooms::router().merge(sse::router()));

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", port);

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");
}

/// Pumps collab events into the per-room SSE connections. The receiver
/// is a blocking channel, so this lives on a plain thread.
fn forward_collab_events(collab: &Collab, sse: &Arc<ServerSentEvents>) {
    let receiver = collab.events();
    let sse = sse.clone();

    thread::spawn(move || {
        while let Ok(event) = receiver.recv() {
            sse.broadcast(event.into())
        }
    });
}

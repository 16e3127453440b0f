mod config;

mod app;
mod auth;
mod ctx;
mod db;
mod errors;
mod notes;
mod shared;
mod state;
mod users;

use std::net::SocketAddr;

use app::AppParams;
use axum::Router;
pub use config::config;
pub use db::{init_db, DB};
pub use errors::{Error, Result};
use state::AppState;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> errors::Result<()> {
    let config = config();

    shared::tracing::setup_tracing(false);

    let conn = init_db().await?;

    let app = app::create(AppParams {
        db: conn,
        router: |state: AppState| {
            Router::new()
                .merge(notes::router(state.clone()))
                .merge(auth::router(state))
        },
    })
    .await?;

    let app = shared::tracing::add_tracing_layer(app);

    let port = config.port;
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await.unwrap();

    tracing::info!("listening on http://{}", listener.local_addr().unwrap());

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();

    Ok(())
}

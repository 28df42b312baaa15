//! HTTP server setup.

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};
use keyward_core::LockCoordinator;

use crate::api::route::configure;

/// Creates and binds the lock service HTTP server.
///
/// Signal handling is left to the caller, see [`super::serve_until`].
pub fn main_server(
    coordinator: LockCoordinator,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    let coordinator = web::Data::new(coordinator);
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(coordinator.clone())
            .configure(configure)
    })
    .disable_signals()
    .bind((address, port))?
    .run())
}

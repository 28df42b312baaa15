//! Lock API routing configuration

use actix_web::{Scope, web};

use super::lock;

/// Create the lock routes
///
/// Routes:
/// - POST /api/lock - Acquire keys
/// - POST /api/unlock - Release keys
/// - POST /api/check - Query lock status
pub fn lock_routes() -> Scope {
    web::scope("/api")
        .service(lock::lock)
        .service(lock::unlock)
        .service(lock::check)
}

/// Register every endpoint of the service on an app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(lock::ping).service(lock_routes());
}

// API module organization
// HTTP handlers, request/response models and routing for the lock service

pub mod lock;
pub mod model;
pub mod route;

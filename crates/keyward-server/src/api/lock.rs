//! Lock API handlers
//!
//! Implements the lock coordinator HTTP endpoints:
//! - GET /ping - Liveness check
//! - POST /api/lock - Acquire one or more keys
//! - POST /api/unlock - Release keys with their fencing tokens
//! - POST /api/check - Report whether any key is locked
//!
//! Handlers only validate input and shape responses; every locking decision
//! is made by the `LockCoordinator`.

use std::time::Duration;

use actix_web::{HttpMessage, HttpRequest, HttpResponse, Responder, get, post, web};
use keyward_common::{dedup_keys, parse_positive};
use keyward_core::{LockCoordinator, LockError, LockToken};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::model::{
    CheckRequest, CheckResponse, KeyList, LockOutcome, LockRequest, LockResponse, TokenParam,
    UnlockRequest, UnlockResponse,
};
use crate::error::AppError;

pub const UID_REQUIRED: &str = "key `uid` is required";
pub const KEYS_REQUIRED: &str = "key `keys` is required";
pub const INVALID_EXP: &str = "invalid key `exp`, should be a number";
pub const INVALID_UNLOCK_KEYS: &str =
    "key `keys` should be an array of objects with keys `key` and `version`";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn invalid_body(e: impl std::fmt::Display) -> AppError {
    AppError::bad_request(format!("invalid request body: {}", e))
}

/// Parse a JSON or url-encoded form body.
///
/// An empty body is treated as `{}` so that field validation reports what is missing.
fn parse_body<T: DeserializeOwned + Default>(
    req: &HttpRequest,
    body: &[u8],
) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    if req.content_type() == FORM_CONTENT_TYPE {
        return serde_json::from_value(form_to_json(body)?).map_err(invalid_body);
    }
    serde_json::from_slice(body).map_err(invalid_body)
}

/// Flat form fields as a JSON object; a repeated field becomes an array of strings
fn form_to_json(body: &[u8]) -> Result<Value, AppError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).map_err(invalid_body)?;

    let mut fields = Map::new();
    for (name, value) in pairs {
        match fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                fields.insert(name, Value::String(value));
            }
        }
    }
    Ok(Value::Object(fields))
}

fn require_uid(uid: Option<String>) -> Result<String, AppError> {
    uid.filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(UID_REQUIRED))
}

fn require_keys(keys: Option<KeyList>) -> Result<Vec<String>, AppError> {
    let keys = dedup_keys(&keys.map(KeyList::into_vec).unwrap_or_default());
    if keys.is_empty() {
        return Err(AppError::bad_request(KEYS_REQUIRED));
    }
    Ok(keys)
}

fn parse_expiry(exp: Option<&Value>) -> Result<Option<Duration>, AppError> {
    let millis = match exp {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64().filter(|v| *v > 0),
        Some(Value::String(s)) => parse_positive(s),
        Some(_) => None,
    };
    millis
        .map(|m| Some(Duration::from_millis(m)))
        .ok_or_else(|| AppError::bad_request(INVALID_EXP))
}

fn require_tokens(keys: Option<Vec<TokenParam>>) -> Result<Vec<LockToken>, AppError> {
    let keys = keys.ok_or_else(|| AppError::bad_request(KEYS_REQUIRED))?;
    keys.into_iter()
        .map(|param| match (param.key, param.version) {
            (Some(key), Some(version)) => Ok(LockToken::new(key, version)),
            _ => Err(AppError::bad_request(INVALID_UNLOCK_KEYS)),
        })
        .collect()
}

/// Liveness check
///
/// GET /ping
#[get("/ping")]
pub async fn ping() -> impl Responder {
    HttpResponse::Ok().body("pong")
}

/// Acquire every requested key or none of them
///
/// POST /api/lock
///
/// A key held by another holder is reported in the body with status 200,
/// not as a transport error.
#[post("/lock")]
pub async fn lock(
    coordinator: web::Data<LockCoordinator>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let params: LockRequest = parse_body(&req, &body)?;
    let uid = require_uid(params.uid)?;
    let keys = require_keys(params.keys)?;
    let lease = parse_expiry(params.exp.as_ref())?;

    let outcome = match coordinator.lock(&uid, &keys, lease).await {
        Ok(tokens) => LockOutcome::Granted { tokens },
        Err(e @ LockError::AlreadyLocked) => LockOutcome::Refused {
            error: e.to_string(),
        },
        Err(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Ok().json(LockResponse { lock: outcome }))
}

/// Release keys whose tokens are still current
///
/// POST /api/unlock
///
/// Stale or foreign tokens are skipped silently; the response lists only
/// the keys that were actually released.
#[post("/unlock")]
pub async fn unlock(
    coordinator: web::Data<LockCoordinator>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let params: UnlockRequest = parse_body(&req, &body)?;
    let uid = require_uid(params.uid)?;
    let tokens = require_tokens(params.keys)?;

    let unlocked = coordinator.unlock(&uid, &tokens).await?;
    Ok(HttpResponse::Ok().json(UnlockResponse { unlocked }))
}

/// POST /api/check
#[post("/check")]
pub async fn check(
    coordinator: web::Data<LockCoordinator>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let params: CheckRequest = parse_body(&req, &body)?;
    let keys = require_keys(params.keys)?;

    let locked = coordinator.check(&keys).await?;
    Ok(HttpResponse::Ok().json(CheckResponse { locked }))
}

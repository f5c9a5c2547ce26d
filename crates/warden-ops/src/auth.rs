//! Secret checks for the ops surface.
//!
//! Read endpoints need `X-OS-SECRET`. Write endpoints need the read
//! secret AND a write secret, where either the current or the previous
//! write secret is accepted — rotation is a two-phase deploy (set
//! PREVIOUS to the old value, rotate CURRENT, then clear PREVIOUS).

use axum::http::{HeaderMap, StatusCode};
use subtle::ConstantTimeEq;

use warden_config::HttpSettings;

use crate::read::error_response;
use axum::response::Response;

/// Read-secret header.
pub const READ_SECRET_HEADER: &str = "X-OS-SECRET";
/// Write-secret header.
pub const WRITE_SECRET_HEADER: &str = "X-OS-WRITE-SECRET";

/// Constant-time string equality; unequal lengths compare false.
fn secret_eq(provided: &str, expected: &str) -> bool {
    // ct_eq on the byte slices is length-sensitive by construction.
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Check the read secret.
///
/// # Errors
///
/// Returns a ready-made 401 response on failure.
pub fn require_read(settings: &HttpSettings, headers: &HeaderMap) -> Result<(), Response> {
    let provided = header(headers, READ_SECRET_HEADER).unwrap_or_default();
    if secret_eq(provided, &settings.read_secret) {
        Ok(())
    } else {
        Err(error_response(StatusCode::UNAUTHORIZED, "FORBIDDEN"))
    }
}

/// Check the dual secret for write actions.
///
/// # Errors
///
/// Returns a ready-made 401 response on failure.
pub fn require_write(settings: &HttpSettings, headers: &HeaderMap) -> Result<(), Response> {
    require_read(settings, headers)?;
    let provided = header(headers, WRITE_SECRET_HEADER).unwrap_or_default();
    let current_ok = secret_eq(provided, &settings.write_secret_current);
    let previous_ok = settings
        .write_secret_previous
        .as_deref()
        .is_some_and(|previous| secret_eq(provided, previous));
    if current_ok || previous_ok {
        Ok(())
    } else {
        Err(error_response(StatusCode::UNAUTHORIZED, "FORBIDDEN"))
    }
}

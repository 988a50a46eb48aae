//! WebSocket upgrade validation
//!
//! Charge points connect to `ws://<host>:<port><ws_path>?<identity_param>=<id>`.
//! The upgrade is refused with 404 for any other path and 400 when the
//! identity is absent or empty.

use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tracing::{debug, warn};

use crate::ocpp::OCPP16_SUBPROTOCOL;

/// Validate an upgrade request and return the response plus the identity.
pub fn accept(
    req: &Request,
    mut response: Response,
    ws_path: &str,
    identity_param: &str,
) -> Result<(Response, String), ErrorResponse> {
    let path = req.uri().path();
    if path != ws_path {
        warn!(path, expected = ws_path, "Rejecting upgrade on unknown path");
        return Err(reject(StatusCode::NOT_FOUND, "Not Found"));
    }

    let Some(identity) = identity_from_query(req.uri().query(), identity_param) else {
        warn!(
            query = req.uri().query().unwrap_or(""),
            identity_param, "Rejecting upgrade without charge point identity"
        );
        return Err(reject(
            StatusCode::BAD_REQUEST,
            &format!("missing '{}' query parameter", identity_param),
        ));
    };

    if offers_ocpp16(req) {
        response.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(OCPP16_SUBPROTOCOL),
        );
    } else {
        debug!(charge_point_id = identity.as_str(), "Client did not offer ocpp1.6");
    }

    Ok((response, identity))
}

/// Percent-decoded value of `param`; empty values count as absent.
pub fn identity_from_query(query: Option<&str>, param: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == param)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn offers_ocpp16(req: &Request) -> bool {
    req.headers()
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|p| p.trim().eq_ignore_ascii_case(OCPP16_SUBPROTOCOL))
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

//! Structured errors for the catalogue HTTP surface.
//!
//! Error responses carry an EWP error-response XML body.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

const EWP_COMMON_TYPES_NS: &str =
    "https://github.com/erasmus-without-paper/ewp-specs-architecture/blob/stable-v1/common-types.xsd";

/// Structured errors for the catalogue server.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// No catalogue copy has been fetched or loaded yet.
    #[error("Local copy of the Catalogue is unavailable.")]
    Unavailable,

    /// Nothing is served at the requested path.
    #[error("No such resource: {0}")]
    NotFound(String),

    /// The catalogue only answers GET and HEAD.
    #[error("Method {0} is not allowed; use GET or HEAD.")]
    MethodNotAllowed(String),
}

impl ServeError {
    fn status(&self) -> StatusCode {
        match self {
            ServeError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = error_response_xml(&self.to_string());
        let mut response = (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response();
        if let ServeError::MethodNotAllowed(_) = self {
            response.headers_mut().insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        }
        response
    }
}

fn error_response_xml(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <error-response xmlns=\"{EWP_COMMON_TYPES_NS}\">\n    \
         <developer-message>{}</developer-message>\n\
         </error-response>\n",
        escape_xml(message)
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

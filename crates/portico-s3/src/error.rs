//! S3 error envelope rendering
//!
//! Every failure leaving the gateway is a well-formed S3 XML `Error`
//! body with a code from the closed set and the matching HTTP status.

use crate::xml::{ErrorEnvelope, to_xml_body};
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use portico_common::Error;
use uuid::Uuid;

/// Build an XML error response from a code, message, and status
#[must_use]
pub fn s3_error_response(code: &str, message: &str, status: StatusCode) -> Response {
    s3_error_response_for(code, message, status, None)
}

/// Build an XML error response naming the affected resource
#[must_use]
pub fn s3_error_response_for(
    code: &str,
    message: &str,
    status: StatusCode,
    resource: Option<&str>,
) -> Response {
    let envelope = ErrorEnvelope {
        code: code.to_string(),
        message: message.to_string(),
        resource: resource.map(ToString::to_string),
        request_id: Uuid::new_v4().to_string(),
    };

    let xml = to_xml_body(&envelope);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap()
        })
}

/// Render a gateway error through its S3 code and HTTP status mapping
#[must_use]
pub fn error_response(err: &Error, resource: Option<&str>) -> Response {
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    s3_error_response_for(err.s3_error_code(), &err.to_string(), status, resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_mapping() {
        let response = error_response(&Error::BucketNotFound("b".into()), Some("/b"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/xml"
        );
    }

    #[test]
    fn test_quota_error_maps_to_invalid_request() {
        let response = error_response(
            &Error::InsufficientQuota {
                requested: 10,
                available: 1,
            },
            None,
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Stable machine-readable error codes; part of the public API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ApiErrorCode {
    InvalidQueryParameter,
    MissingTenant,
    ValidationFailed,
    NotFound,
    Conflict,
    ConfigurationError,
    DependencyFailure,
    NotReady,
    Internal,
}

#[must_use]
pub const fn status_for_code(code: ApiErrorCode) -> u16 {
    match code {
        ApiErrorCode::InvalidQueryParameter
        | ApiErrorCode::MissingTenant
        | ApiErrorCode::ValidationFailed => 400,
        ApiErrorCode::NotFound => 404,
        ApiErrorCode::Conflict => 409,
        ApiErrorCode::ConfigurationError => 422,
        ApiErrorCode::DependencyFailure => 502,
        ApiErrorCode::NotReady => 503,
        ApiErrorCode::Internal => 500,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
    pub request_id: String,
}

impl ApiError {
    #[must_use]
    pub fn new(
        code: ApiErrorCode,
        message: impl Into<String>,
        details: Value,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            request_id: request_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_param(name: &str, value: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidQueryParameter,
            format!("invalid query parameter: {name}"),
            json!({"field_errors":[{"parameter": name, "reason": "invalid", "value": value}]}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn missing_tenant() -> Self {
        Self::new(
            ApiErrorCode::MissingTenant,
            "tenant path segment is required",
            json!({}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn validation_failed(field_errors: Value) -> Self {
        Self::new(
            ApiErrorCode::ValidationFailed,
            "validation failed",
            json!({"field_errors": field_errors}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::new(
            ApiErrorCode::NotFound,
            format!("{kind} not found: {id}"),
            json!({"kind": kind, "id": id}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(
            ApiErrorCode::ConfigurationError,
            message,
            json!({}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(
            ApiErrorCode::DependencyFailure,
            message,
            json!({}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

const _: fn() = || {
    fn assert_traits<T: Serialize + for<'de> Deserialize<'de>>() {}
    assert_traits::<ApiErrorCode>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_snake_case() {
        let raw = serde_json::to_value(ApiErrorCode::ConfigurationError).unwrap();
        assert_eq!(raw, "configuration_error");
        let back: ApiErrorCode = serde_json::from_value(raw).unwrap();
        assert_eq!(back, ApiErrorCode::ConfigurationError);
    }

    #[test]
    fn status_mapping_is_stable() {
        assert_eq!(status_for_code(ApiErrorCode::ValidationFailed), 400);
        assert_eq!(status_for_code(ApiErrorCode::NotFound), 404);
        assert_eq!(status_for_code(ApiErrorCode::ConfigurationError), 422);
        assert_eq!(status_for_code(ApiErrorCode::DependencyFailure), 502);
        assert_eq!(status_for_code(ApiErrorCode::NotReady), 503);
    }
}

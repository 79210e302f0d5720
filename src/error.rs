// HTTP-level error taxonomy. Handlers return these as values; the
// outermost middleware renders them to JSON bodies.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use thiserror::Error;

use crate::http::Response;

/// One field-level validation problem: (field name, message).
pub type FieldViolation = (String, String);

#[derive(Debug, Error)]
pub enum ApiError {
    // 400 Bad Request, aggregated per field
    #[error("Validation Error")]
    Validation(Vec<FieldViolation>),

    // 401 Unauthorized
    #[error("Invalid credentials")]
    Unauthorized,

    // 403 Forbidden: part of the taxonomy, currently unused by handlers
    #[error("Access denied")]
    Forbidden,

    // 404 Not Found: also masks ownership violations
    #[error("Not found")]
    NotFound,

    // 404 for unmatched (method, path) pairs
    #[error("Not found")]
    RouteNotFound,

    // 500: the fault is logged server-side, never serialized to the client
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        ApiError::Validation(violations)
    }

    pub fn violation(field: &str, message: &str) -> Self {
        ApiError::Validation(vec![(field.to_string(), message.to_string())])
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Unauthorized => 401,
            ApiError::Forbidden => 403,
            ApiError::NotFound => 404,
            ApiError::RouteNotFound => 404,
            ApiError::Internal(_) => 500,
        }
    }

    /// Client-safe description, used verbatim in the response body.
    pub fn description(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "Validation Error",
            ApiError::Unauthorized => "Invalid credentials",
            ApiError::Forbidden => "Access denied",
            ApiError::NotFound | ApiError::RouteNotFound => "Not found",
            ApiError::Internal(_) => "Internal server error",
        }
    }

    /// JSON body for this error. Validation errors carry their violations
    /// grouped by field, fields sorted by name, each field's messages in
    /// the order they were recorded.
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::Validation(violations) => {
                let mut fields: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
                for (field, message) in violations {
                    fields.entry(field.as_str()).or_default().push(message.as_str());
                }
                json!({
                    "description": self.description(),
                    "details": { "fields": fields },
                })
            }
            _ => json!({ "description": self.description() }),
        }
    }

    pub fn into_response(self) -> Response {
        Response::json(self.status_code(), &self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_body_groups_and_sorts_fields() {
        let error = ApiError::validation(vec![
            ("login".into(), "is missing".into()),
            ("city".into(), "must not be empty".into()),
            ("login".into(), "must be a string".into()),
        ]);
        let body = error.to_json();
        assert_eq!(body["description"], "Validation Error");

        let fields = body["details"]["fields"].as_object().unwrap();
        let names: Vec<&String> = fields.keys().collect();
        assert_eq!(names, ["city", "login"]);
        assert_eq!(
            fields["login"],
            json!(["is missing", "must be a string"]),
            "messages keep their recorded order"
        );
    }

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(ApiError::violation("id", "is missing").status_code(), 400);
        assert_eq!(ApiError::Unauthorized.status_code(), 401);
        assert_eq!(ApiError::Forbidden.status_code(), 403);
        assert_eq!(ApiError::NotFound.status_code(), 404);
        assert_eq!(ApiError::RouteNotFound.status_code(), 404);
    }

    #[test]
    fn non_validation_bodies_carry_only_a_description() {
        let body = ApiError::Unauthorized.to_json();
        assert_eq!(body, json!({"description": "Invalid credentials"}));

        let response = ApiError::NotFound.into_response();
        assert_eq!(response.status, 404);
        assert_eq!(response.content_type, "application/json");
    }
}

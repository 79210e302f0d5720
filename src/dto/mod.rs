// Wire shapes and validation for the two resources. Parsers return either
// the validated fields or every applicable (field, message) violation; a
// JSON `null` counts as an absent field.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::auth::PasswordManager;
use crate::database::models::{Timezone, User};
use crate::error::FieldViolation;
use crate::http::router::RouteArgs;

const GMT_DELTA_LIMIT: i64 = 15 * 60 * 60;

fn violation(field: &str, message: &str) -> FieldViolation {
    (field.to_string(), message.to_string())
}

fn type_error() -> Vec<FieldViolation> {
    vec![violation("", "type error")]
}

fn field<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get(name).filter(|value| !value.is_null())
}

/// Logins start with a letter followed by at least one alphanumeric.
fn well_formed_login(login: &str) -> bool {
    let mut chars = login.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    let mut tail = false;
    for c in chars {
        if !c.is_ascii_alphanumeric() {
            return false;
        }
        tail = true;
    }
    tail
}

/// Validated login payload, password still in the clear.
#[derive(Debug)]
pub struct LoginAttempt {
    pub login: String,
    pub password: String,
}

/// Validated user payload, password already digested for storage.
#[derive(Debug)]
pub struct NewUser {
    pub login: String,
    pub name: Option<String>,
    pub password: String,
}

/// Validated timezone payload.
#[derive(Debug)]
pub struct TimezoneFields {
    pub city: String,
    pub gmt_delta_seconds: i64,
}

/// Routing argument check shared by id-addressed operations.
pub fn ref_id(args: &RouteArgs) -> Result<i64, Vec<FieldViolation>> {
    args.id().ok_or_else(|| vec![violation("id", "is missing")])
}

pub struct UserDto {
    passwords: Arc<PasswordManager>,
}

impl UserDto {
    pub fn new(passwords: Arc<PasswordManager>) -> Self {
        Self { passwords }
    }

    pub fn to_msg(&self, user: &User) -> Value {
        json!({ "login": user.login, "name": user.name })
    }

    /// Full user payload: login, password and the optional name, every
    /// applicable violation collected per field.
    pub fn parse(&self, body: Option<&Value>) -> Result<NewUser, Vec<FieldViolation>> {
        let Some(map) = body.and_then(Value::as_object) else {
            return Err(type_error());
        };

        let mut errors = Vec::new();
        let login = Self::login_field(map).map_err(|e| errors.extend(e)).ok();
        let password = Self::password_field(map).map_err(|e| errors.extend(e)).ok();
        let name = Self::name_field(map).map_err(|e| errors.extend(e)).ok();

        match (login, password, name) {
            (Some(login), Some(password), Some(name)) if errors.is_empty() => Ok(NewUser {
                login,
                name,
                password: self.passwords.hash(&password),
            }),
            _ => Err(errors),
        }
    }

    /// Login payload: same login and password rules, no name.
    pub fn parse_login(&self, body: Option<&Value>) -> Result<LoginAttempt, Vec<FieldViolation>> {
        let Some(map) = body.and_then(Value::as_object) else {
            return Err(type_error());
        };

        let mut errors = Vec::new();
        let login = Self::login_field(map).map_err(|e| errors.extend(e)).ok();
        let password = Self::password_field(map).map_err(|e| errors.extend(e)).ok();

        match (login, password) {
            (Some(login), Some(password)) if errors.is_empty() => {
                Ok(LoginAttempt { login, password })
            }
            _ => Err(errors),
        }
    }

    fn login_field(map: &Map<String, Value>) -> Result<String, Vec<FieldViolation>> {
        let Some(value) = field(map, "login") else {
            return Err(vec![violation("login", "is missing")]);
        };
        let Some(login) = value.as_str() else {
            return Err(vec![violation("login", "must be a string")]);
        };

        let mut errors = Vec::new();
        let length = login.chars().count();
        if length > 50 {
            errors.push(violation("login", "must be shorter than 50 characters"));
        }
        if length < 5 {
            errors.push(violation("login", "must be at least 5 characters long"));
        }
        if !well_formed_login(login) {
            errors.push(violation(
                "login",
                "must begin with a letter followed by alphanumerics",
            ));
        }

        if errors.is_empty() {
            Ok(login.to_string())
        } else {
            Err(errors)
        }
    }

    fn password_field(map: &Map<String, Value>) -> Result<String, Vec<FieldViolation>> {
        let Some(value) = field(map, "password") else {
            return Err(vec![violation("password", "is missing")]);
        };
        let Some(password) = value.as_str() else {
            return Err(vec![violation("password", "must be a string")]);
        };
        if password.chars().count() < 5 {
            return Err(vec![violation("password", "must be at least 5 characters long")]);
        }
        Ok(password.to_string())
    }

    fn name_field(map: &Map<String, Value>) -> Result<Option<String>, Vec<FieldViolation>> {
        let Some(value) = field(map, "name") else {
            return Ok(None);
        };
        let Some(name) = value.as_str() else {
            return Err(vec![violation("name", "must be a string")]);
        };

        let mut errors = Vec::new();
        let length = name.chars().count();
        if length < 5 {
            errors.push(violation("name", "must be at least 5 characters long"));
        }
        if length > 50 {
            errors.push(violation("name", "must be shorter than 50 characters"));
        }

        if errors.is_empty() {
            Ok(Some(name.to_string()))
        } else {
            Err(errors)
        }
    }
}

#[derive(Default)]
pub struct TimezoneDto;

impl TimezoneDto {
    pub fn new() -> Self {
        Self
    }

    pub fn to_msg(&self, timezone: &Timezone) -> Value {
        json!({
            "id": timezone.id,
            "gmt_delta_seconds": timezone.gmt_delta_seconds,
            "city": timezone.city,
        })
    }

    pub fn parse(&self, body: Option<&Value>) -> Result<TimezoneFields, Vec<FieldViolation>> {
        let Some(map) = body.and_then(Value::as_object) else {
            return Err(type_error());
        };

        let mut errors = Vec::new();
        let delta = Self::delta_field(map).map_err(|e| errors.extend(e)).ok();
        let city = Self::city_field(map).map_err(|e| errors.extend(e)).ok();

        match (delta, city) {
            (Some(gmt_delta_seconds), Some(city)) if errors.is_empty() => Ok(TimezoneFields {
                city,
                gmt_delta_seconds,
            }),
            _ => Err(errors),
        }
    }

    fn delta_field(map: &Map<String, Value>) -> Result<i64, Vec<FieldViolation>> {
        let Some(value) = field(map, "gmt_delta_seconds") else {
            return Err(vec![violation("gmt_delta_seconds", "is missing")]);
        };
        let Some(delta) = value.as_i64() else {
            return Err(vec![violation("gmt_delta_seconds", "must be an integer")]);
        };
        if delta <= -GMT_DELTA_LIMIT || delta >= GMT_DELTA_LIMIT {
            return Err(vec![violation("gmt_delta_seconds", "value out of range")]);
        }
        Ok(delta)
    }

    fn city_field(map: &Map<String, Value>) -> Result<String, Vec<FieldViolation>> {
        let Some(value) = field(map, "city") else {
            return Err(vec![violation("city", "is missing")]);
        };
        let Some(city) = value.as_str() else {
            return Err(vec![violation("city", "must be a string")]);
        };
        if city.is_empty() {
            return Err(vec![violation("city", "must not be empty")]);
        }
        if city.chars().count() > 200 {
            return Err(vec![violation("city", "must be shorter than 200 characters")]);
        }
        Ok(city.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_dto() -> UserDto {
        UserDto::new(Arc::new(PasswordManager::new()))
    }

    fn fields_of(errors: Vec<FieldViolation>) -> Vec<String> {
        errors.into_iter().map(|(field, _)| field).collect()
    }

    #[test]
    fn a_valid_user_payload_parses_and_hashes_the_password() {
        let body = json!({"login": "alice1", "password": "secret", "name": "Alice Doe"});
        let user = user_dto().parse(Some(&body)).unwrap();
        assert_eq!(user.login, "alice1");
        assert_eq!(user.name.as_deref(), Some("Alice Doe"));
        assert_ne!(user.password, "secret", "stored form is a digest");
    }

    #[test]
    fn missing_body_and_non_object_bodies_are_type_errors() {
        let dto = user_dto();
        assert_eq!(fields_of(dto.parse(None).unwrap_err()), [""]);
        assert_eq!(fields_of(dto.parse(Some(&json!("nope"))).unwrap_err()), [""]);
    }

    #[test]
    fn all_applicable_login_violations_are_collected() {
        let body = json!({"login": "a!", "password": "secret"});
        let errors = user_dto().parse(Some(&body)).unwrap_err();
        let messages: Vec<&str> = errors
            .iter()
            .filter(|(field, _)| field == "login")
            .map(|(_, message)| message.as_str())
            .collect();
        assert_eq!(
            messages,
            [
                "must be at least 5 characters long",
                "must begin with a letter followed by alphanumerics",
            ]
        );
    }

    #[test]
    fn login_rules_match_between_user_and_login_payloads() {
        let dto = user_dto();
        let body = json!({"login": "1abcde", "password": "secret"});
        let from_user = fields_of(dto.parse(Some(&body)).unwrap_err());
        let from_login = fields_of(dto.parse_login(Some(&body)).unwrap_err());
        assert_eq!(from_user, ["login"]);
        assert_eq!(from_login, ["login"]);
    }

    #[test]
    fn null_fields_count_as_missing() {
        let body = json!({"login": null, "password": null});
        let errors = user_dto().parse_login(Some(&body)).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ("login".to_string(), "is missing".to_string()),
                ("password".to_string(), "is missing".to_string()),
            ]
        );
    }

    #[test]
    fn name_is_optional_but_validated_when_present() {
        let dto = user_dto();
        let without = json!({"login": "alice1", "password": "secret"});
        assert!(dto.parse(Some(&without)).is_ok());

        let short = json!({"login": "alice1", "password": "secret", "name": "Al"});
        assert_eq!(fields_of(dto.parse(Some(&short)).unwrap_err()), ["name"]);
    }

    #[test]
    fn gmt_delta_bounds_are_exclusive() {
        let dto = TimezoneDto::new();
        let ok = json!({"city": "Auckland", "gmt_delta_seconds": GMT_DELTA_LIMIT - 1});
        assert!(dto.parse(Some(&ok)).is_ok());

        for delta in [GMT_DELTA_LIMIT, -GMT_DELTA_LIMIT] {
            let body = json!({"city": "Nowhere", "gmt_delta_seconds": delta});
            let errors = dto.parse(Some(&body)).unwrap_err();
            assert_eq!(fields_of(errors), ["gmt_delta_seconds"]);
        }
    }

    #[test]
    fn non_integer_delta_is_rejected() {
        let dto = TimezoneDto::new();
        let body = json!({"city": "Lisbon", "gmt_delta_seconds": "3600"});
        let (field, message) = dto.parse(Some(&body)).unwrap_err().remove(0);
        assert_eq!(field, "gmt_delta_seconds");
        assert_eq!(message, "must be an integer");
    }

    #[test]
    fn city_rules() {
        let dto = TimezoneDto::new();
        let empty = json!({"city": "", "gmt_delta_seconds": 0});
        assert_eq!(fields_of(dto.parse(Some(&empty)).unwrap_err()), ["city"]);

        let long = json!({"city": "x".repeat(201), "gmt_delta_seconds": 0});
        assert_eq!(fields_of(dto.parse(Some(&long)).unwrap_err()), ["city"]);
    }

    #[test]
    fn ref_id_requires_the_argument() {
        assert!(ref_id(&RouteArgs::default()).is_err());
    }
}

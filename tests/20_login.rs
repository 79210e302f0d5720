mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn login_returns_a_usable_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let (login, token) = common::register_and_login(server, "prover").await?;
    assert!(!token.is_empty());

    let me: Value = reqwest::Client::new()
        .get(format!("{}/users/1", server.base_url))
        .header("JWT", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["login"], login);
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_login_are_both_401() -> Result<()> {
    let server = common::ensure_server().await?;
    let login = common::unique_login("victim");
    let created = common::register(server, &login, "hunter2").await?;
    assert_eq!(created.status(), StatusCode::OK);

    let client = reqwest::Client::new();
    for body in [
        json!({ "login": login, "password": "wrongpw" }),
        json!({ "login": common::unique_login("nobody"), "password": "hunter2" }),
    ] {
        let response = client
            .post(format!("{}/auth", server.base_url))
            .json(&body)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await?;
        assert_eq!(body["description"], "Invalid credentials");
    }
    Ok(())
}

#[tokio::test]
async fn malformed_login_payload_is_a_validation_error() -> Result<()> {
    let server = common::ensure_server().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/auth", server.base_url))
        .json(&json!({ "login": "ab" }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["description"], "Validation Error");
    let fields = body["details"]["fields"].as_object().unwrap();
    assert!(fields.contains_key("login"));
    assert!(fields.contains_key("password"));
    Ok(())
}

#[tokio::test]
async fn a_missing_body_is_a_type_error() -> Result<()> {
    let server = common::ensure_server().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/auth", server.base_url))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["details"]["fields"][""], json!(["type error"]));
    Ok(())
}

#[tokio::test]
async fn a_tampered_token_is_anonymous() -> Result<()> {
    let server = common::ensure_server().await?;
    let (_, token) = common::register_and_login(server, "tamper").await?;

    let response = reqwest::Client::new()
        .get(format!("{}/users/1", server.base_url))
        .header("JWT", format!("{token}x"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

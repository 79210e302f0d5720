mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn create_timezone(
    server: &common::TestServer,
    token: &str,
    city: &str,
    gmt_delta_seconds: i64,
) -> Result<Value> {
    let response = reqwest::Client::new()
        .post(format!("{}/timezones", server.base_url))
        .header("JWT", token)
        .json(&json!({ "city": city, "gmt_delta_seconds": gmt_delta_seconds }))
        .send()
        .await?;
    anyhow::ensure!(
        response.status() == StatusCode::OK,
        "create failed: {}",
        response.status()
    );
    Ok(response.json().await?)
}

#[tokio::test]
async fn create_get_round_trip() -> Result<()> {
    let server = common::ensure_server().await?;
    let (_, token) = common::register_and_login(server, "keeper").await?;

    let created = create_timezone(server, &token, "Auckland", 12 * 3600).await?;
    let id = created["id"].as_i64().unwrap();

    let fetched: Value = reqwest::Client::new()
        .get(format!("{}/timezones/{}", server.base_url, id))
        .header("JWT", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(
        fetched,
        json!({ "id": id, "city": "Auckland", "gmt_delta_seconds": 12 * 3600 })
    );
    Ok(())
}

#[tokio::test]
async fn updating_the_city_survives_a_refetch() -> Result<()> {
    let server = common::ensure_server().await?;
    let (_, token) = common::register_and_login(server, "mover").await?;

    let created = create_timezone(server, &token, "Old Town", 3600).await?;
    let id = created["id"].as_i64().unwrap();

    let client = reqwest::Client::new();
    let updated = client
        .put(format!("{}/timezones/{}", server.base_url, id))
        .header("JWT", &token)
        .json(&json!({ "city": "New Town", "gmt_delta_seconds": 3600 }))
        .send()
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);

    let fetched: Value = client
        .get(format!("{}/timezones/{}", server.base_url, id))
        .header("JWT", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(fetched["city"], "New Town");
    Ok(())
}

#[tokio::test]
async fn deleting_twice_yields_404_the_second_time() -> Result<()> {
    let server = common::ensure_server().await?;
    let (_, token) = common::register_and_login(server, "eraser").await?;

    let created = create_timezone(server, &token, "Gone City", 0).await?;
    let id = created["id"].as_i64().unwrap();

    let client = reqwest::Client::new();
    let url = format!("{}/timezones/{}", server.base_url, id);

    let first = client.delete(&url).header("JWT", &token).send().await?;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first.bytes().await?.is_empty());

    let second = client.delete(&url).header("JWT", &token).send().await?;
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    let body: Value = second.json().await?;
    assert_eq!(body["description"], "Not found");
    Ok(())
}

#[tokio::test]
async fn listing_filters_by_city_substring() -> Result<()> {
    let server = common::ensure_server().await?;
    let (_, token) = common::register_and_login(server, "lister").await?;

    create_timezone(server, &token, "New York", -5 * 3600).await?;
    create_timezone(server, &token, "New Orleans", -6 * 3600).await?;
    create_timezone(server, &token, "Lisbon", 0).await?;

    let client = reqwest::Client::new();
    let all: Value = client
        .get(format!("{}/timezones", server.base_url))
        .header("JWT", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let filtered: Value = client
        .get(format!("{}/timezones", server.base_url))
        .query(&[("q", "New")])
        .header("JWT", &token)
        .send()
        .await?
        .json()
        .await?;
    let cities: Vec<&str> = filtered
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["city"].as_str().unwrap())
        .collect();
    assert_eq!(cities, ["New York", "New Orleans"]);

    // An empty q is no filter at all
    let unfiltered: Value = client
        .get(format!("{}/timezones", server.base_url))
        .query(&[("q", "")])
        .header("JWT", &token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(unfiltered.as_array().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn out_of_range_delta_and_missing_city_are_reported_together() -> Result<()> {
    let server = common::ensure_server().await?;
    let (_, token) = common::register_and_login(server, "sloppy").await?;

    let response = reqwest::Client::new()
        .post(format!("{}/timezones", server.base_url))
        .header("JWT", &token)
        .json(&json!({ "gmt_delta_seconds": 16 * 3600 }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    let fields = body["details"]["fields"].as_object().unwrap();
    assert_eq!(fields["gmt_delta_seconds"], json!(["value out of range"]));
    assert_eq!(fields["city"], json!(["is missing"]));
    Ok(())
}

#[tokio::test]
async fn a_non_numeric_id_is_a_routing_404() -> Result<()> {
    let server = common::ensure_server().await?;
    let (_, token) = common::register_and_login(server, "typist").await?;

    let response = reqwest::Client::new()
        .get(format!("{}/timezones/abc", server.base_url))
        .header("JWT", &token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

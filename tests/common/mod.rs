use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::json;

static SERVER: OnceLock<TestServer> = OnceLock::new();
static LOGIN_COUNTER: AtomicU32 = AtomicU32::new(0);

pub struct TestServer {
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // One fresh database file per test binary
        let db_path = std::env::temp_dir().join(format!(
            "timezone-api-test-{}.sqlite",
            std::process::id()
        ));
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", db_path.display(), suffix));
        }

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_timezone-api"));
        cmd.env("SERVER_HOST", "127.0.0.1")
            .env("SERVER_PORT", port.to_string())
            .env("DATABASE_URL", format!("sqlite://{}", db_path.display()))
            .env("JWT_SECRET", "integration-test-secret")
            .env("CLIENT_DIR", "")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;
        Ok(Self { base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        let url = format!("{}/health", self.base_url);
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!(
            "server did not become ready on {} within {:?}",
            self.base_url,
            timeout
        )
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// A login no other test in this binary has used yet.
pub fn unique_login(prefix: &str) -> String {
    format!("{}{}", prefix, LOGIN_COUNTER.fetch_add(1, Ordering::SeqCst))
}

pub async fn register(
    server: &TestServer,
    login: &str,
    password: &str,
) -> Result<reqwest::Response> {
    let response = reqwest::Client::new()
        .post(format!("{}/users", server.base_url))
        .json(&json!({ "login": login, "password": password }))
        .send()
        .await?;
    Ok(response)
}

/// Register a user and exchange its credentials for a token.
pub async fn register_and_login(server: &TestServer, prefix: &str) -> Result<(String, String)> {
    let login = unique_login(prefix);
    let password = "hunter2";

    let created = register(server, &login, password).await?;
    anyhow::ensure!(
        created.status() == StatusCode::OK,
        "registration failed: {}",
        created.status()
    );

    let response = reqwest::Client::new()
        .post(format!("{}/auth", server.base_url))
        .json(&json!({ "login": login, "password": password }))
        .send()
        .await?;
    anyhow::ensure!(
        response.status() == StatusCode::OK,
        "login failed: {}",
        response.status()
    );

    let body: serde_json::Value = response.json().await?;
    let token = body["token"]
        .as_str()
        .context("login response carries no token")?
        .to_string();
    Ok((login, token))
}

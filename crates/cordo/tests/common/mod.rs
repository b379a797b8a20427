//! Shared test harness: an in-memory coordinator behind a real router.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use cordo::api::{AppState, create_router};
use cordo::config::CoordinatorConfig;
use cordo::db::Database;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    blueprint_root: TempDir,
}

/// Coordinator with default test configuration.
pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

/// Coordinator with a tweaked configuration (short TTLs etc.).
pub async fn test_app_with(tweak: impl FnOnce(&mut CoordinatorConfig)) -> TestApp {
    let blueprint_root = TempDir::new().expect("temp blueprint root");

    let mut config = CoordinatorConfig::default();
    config.blueprints.root = blueprint_root.path().to_path_buf();
    // Tests drive stop flows synchronously; no grace window needed.
    config.queue.stop_grace_secs = 0;
    tweak(&mut config);

    let db = Database::in_memory().await.expect("in-memory store");
    let state = AppState::initialize(&db, &config);
    let router = create_router(state.clone());

    TestApp {
        router,
        state,
        blueprint_root,
    }
}

impl TestApp {
    /// Write an agent blueprint with optional demand tags.
    pub fn write_agent_blueprint(&self, name: &str, demand_tags: &[&str]) {
        let dir = self.blueprint_root.path().join(name);
        std::fs::create_dir_all(&dir).expect("blueprint dir");
        std::fs::write(
            dir.join("agent.json"),
            json!({
                "name": name,
                "type": "agent",
                "demands": {"tags": demand_tags},
            })
            .to_string(),
        )
        .expect("manifest");
        std::fs::write(
            dir.join("agent.system-prompt.md"),
            format!("You are {name}."),
        )
        .expect("system prompt");
    }

    /// Write a blueprint from a raw manifest (plus companion files).
    pub fn write_blueprint_files(&self, name: &str, manifest: Value, files: &[(&str, &str)]) {
        let dir = self.blueprint_root.path().join(name);
        std::fs::create_dir_all(&dir).expect("blueprint dir");
        std::fs::write(dir.join("agent.json"), manifest.to_string()).expect("manifest");
        for (file, contents) in files {
            std::fs::write(dir.join(file), contents).expect("blueprint file");
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri).method(method);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    /// Register a runner and return its id.
    pub async fn register_runner(
        &self,
        hostname: &str,
        project_dir: &str,
        executor_type: &str,
        tags: &[&str],
    ) -> String {
        let (status, body) = self
            .post(
                "/runner/register",
                json!({
                    "hostname": hostname,
                    "project_dir": project_dir,
                    "executor_type": executor_type,
                    "tags": tags,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        body["runner_id"].as_str().expect("runner_id").to_string()
    }

    /// Poll for work with an explicit wait budget.
    pub async fn poll(&self, runner_id: &str, max_wait_ms: u64) -> (StatusCode, Value) {
        self.get(&format!(
            "/runner/runs?runner_id={runner_id}&max_wait_ms={max_wait_ms}"
        ))
        .await
    }

    /// Drive a claimed run through started → completed.
    pub async fn finish_run(
        &self,
        runner_id: &str,
        run_id: &str,
        status: &str,
        result_text: Option<&str>,
    ) {
        let (code, body) = self
            .post(
                &format!("/runner/runs/{run_id}/started?runner_id={runner_id}"),
                json!({}),
            )
            .await;
        assert_eq!(code, StatusCode::NO_CONTENT, "started failed: {body}");

        let mut report = json!({"status": status});
        if let Some(text) = result_text {
            report["result_text"] = json!(text);
        }
        let (code, body) = self
            .post(
                &format!("/runner/runs/{run_id}/completed?runner_id={runner_id}"),
                report,
            )
            .await;
        assert_eq!(code, StatusCode::NO_CONTENT, "completed failed: {body}");
    }
}

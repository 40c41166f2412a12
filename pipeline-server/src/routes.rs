//! HTTP route handlers.
//!
//! Flow routes (`/chat`, `/studio/pr`) always answer 200 with a run report
//! whose `status` says how the run went. The remaining routes answer with
//! their payload or a JSON error carrying `error_kind`.

use std::path::{Path as FsPath, PathBuf};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use pipeline::core::types::{BranchInfo, ChangeRequest, RunStatus};
use pipeline::error::PipelineError;
use pipeline::flow::RunReport;
use pipeline::interactive::run_interactive;
use pipeline::io::sandbox::{self, ExecRequest, SandboxOutput};
use pipeline::io::workspace::safe_relative_path;
use pipeline::review::{
    PrCreated, PrPreview, PrRequest, PrUpdateRequest, create_pull_request, list_branches,
    preview_pull_request, update_pull_request,
};
use pipeline::studio::{StudioRequest, run_studio};

use crate::state::AppState;

/// Build the router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/studio/pr", post(studio_pr))
        .route("/studio/pr/update", post(update_pr))
        .route("/branches/{*repo_path}", get(branches))
        .route("/pr/generate", post(generate_pr))
        .route("/pr/create", post(create_pr))
        .route("/execute", post(execute))
        .route("/install_requirements", post(install_requirements))
}

/// Pipeline error rendered as `{status, error, error_kind}`.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::RepoAccess(_) => StatusCode::NOT_FOUND,
            PipelineError::BranchOperation(_) => StatusCode::CONFLICT,
            PipelineError::PrHosting(_) | PipelineError::Completion(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(kind = self.0.kind(), err = %self.0, "request failed");
        let body = json!({
            "status": RunStatus::Error,
            "error": self.0.to_string(),
            "error_kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthResponse {
    status: &'static str,
    environment: HealthEnvironment,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthEnvironment {
    completion_endpoint: bool,
    completion_api_key: bool,
    model: String,
    api_version: String,
    hosting_token: bool,
}

/// GET /health - which settings are present, never their secret values.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let completion = &state.config.completion;
    Json(HealthResponse {
        status: "healthy",
        environment: HealthEnvironment {
            completion_endpoint: completion.endpoint.is_some(),
            completion_api_key: completion.api_key.is_some(),
            model: completion.deployment.clone(),
            api_version: completion.api_version.clone(),
            hosting_token: state.config.hosting.token.is_some(),
        },
    })
}

/// POST /chat - interactive run for one change request.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChangeRequest>,
) -> Result<Json<RunReport>, ApiError> {
    info!(requester = %request.requester, "chat request");
    let report = state
        .run_blocking(move |ctx| Ok(run_interactive(ctx, &request)))
        .await?;
    Ok(Json(report))
}

/// POST /studio/pr - commit supplied files and open a draft PR.
async fn studio_pr(
    State(state): State<AppState>,
    Json(request): Json<StudioRequest>,
) -> Result<Json<RunReport>, ApiError> {
    info!(username = %request.username, files = request.files.len(), "studio request");
    let at = chrono::Local::now().naive_local();
    let report = state
        .run_blocking(move |ctx| Ok(run_studio(ctx, &request, at)))
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: RunStatus,
}

/// POST /studio/pr/update - replace title and body of a pull request.
async fn update_pr(
    State(state): State<AppState>,
    Json(request): Json<PrUpdateRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state
        .run_blocking(move |ctx| update_pull_request(ctx, &request))
        .await?;
    Ok(Json(StatusResponse {
        status: RunStatus::Success,
    }))
}

#[derive(Debug, Serialize)]
struct BranchesResponse {
    branches: Vec<BranchInfo>,
}

/// GET /branches/{*repo_path} - local branches of a working copy.
///
/// The captured path is used as given: `/branches//srv/repo` names the
/// absolute path `/srv/repo`, `/branches/data/repo` is relative to the
/// server's working directory.
async fn branches(
    State(state): State<AppState>,
    Path(repo_path): Path<String>,
) -> Result<Json<BranchesResponse>, ApiError> {
    let branches = state
        .run_blocking(move |ctx| list_branches(ctx, FsPath::new(&repo_path)))
        .await?;
    Ok(Json(BranchesResponse { branches }))
}

/// POST /pr/generate - diff two branches and synthesize PR content.
async fn generate_pr(
    State(state): State<AppState>,
    Json(request): Json<PrRequest>,
) -> Result<Json<PrPreview>, ApiError> {
    let preview = state
        .run_blocking(move |ctx| preview_pull_request(ctx, &request))
        .await?;
    Ok(Json(preview))
}

/// POST /pr/create - push an existing branch and open a draft PR for it.
async fn create_pr(
    State(state): State<AppState>,
    Json(request): Json<PrRequest>,
) -> Result<Json<PrCreated>, ApiError> {
    info!(source = %request.source_branch, target = %request.target_branch, "create pr");
    let created = state
        .run_blocking(move |ctx| create_pull_request(ctx, &request))
        .await?;
    Ok(Json(created))
}

/// Sandbox request addressed by repository name under the data directory.
#[derive(Debug, Deserialize)]
struct SandboxRequest {
    repo_name: String,
    #[serde(flatten)]
    exec: ExecRequest,
}

/// POST /execute - run code or a command inside a working copy.
async fn execute(
    State(state): State<AppState>,
    Json(request): Json<SandboxRequest>,
) -> Json<SandboxOutput> {
    let SandboxRequest { repo_name, exec } = request;
    Json(
        in_working_copy(&state, &repo_name, move |root, state| {
            sandbox::execute(root, &exec, &state.config.sandbox)
        })
        .await,
    )
}

#[derive(Debug, Deserialize)]
struct InstallRequest {
    repo_name: String,
}

/// POST /install_requirements - merge the manifest addendum and install.
async fn install_requirements(
    State(state): State<AppState>,
    Json(request): Json<InstallRequest>,
) -> Json<SandboxOutput> {
    Json(
        in_working_copy(&state, &request.repo_name, |root, state| {
            sandbox::install_requirements(root, &state.config.parser, &state.config.sandbox)
        })
        .await,
    )
}

/// Resolve `repo_name` under the data directory and run `f` there on the
/// blocking pool while holding the repository lease.
async fn in_working_copy<F>(state: &AppState, repo_name: &str, f: F) -> SandboxOutput
where
    F: FnOnce(&FsPath, &AppState) -> SandboxOutput + Send + 'static,
{
    let Some(rel) = safe_relative_path(repo_name) else {
        return SandboxOutput {
            stdout: String::new(),
            stderr: format!("invalid repository name: {repo_name}"),
        };
    };
    let root: PathBuf = state.config.git.data_dir.join(rel);
    let state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let _lease = state.leases.acquire(&root);
        f(&root, &state)
    })
    .await;
    outcome.unwrap_or_else(|err| SandboxOutput {
        stdout: String::new(),
        stderr: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pipeline::io::config::AppConfig;
    use pipeline::test_support::TestRepo;

    fn state_with_data_dir(data_dir: &FsPath) -> AppState {
        let mut config = AppConfig::default();
        config.git.data_dir = data_dir.to_path_buf();
        AppState::new(config)
    }

    #[tokio::test]
    async fn health_reports_presence_not_values() {
        let mut config = AppConfig::default();
        config.completion.api_key = Some("sk-secret".to_string());
        let Json(health) = health(State(AppState::new(config))).await;

        assert_eq!(health.status, "healthy");
        assert!(health.environment.completion_api_key);
        assert!(!health.environment.completion_endpoint);
        assert!(!health.environment.hosting_token);
        assert_eq!(health.environment.model, "gpt-4.1");
        let rendered = serde_json::to_string(&health).expect("serialize");
        assert!(!rendered.contains("sk-secret"));
    }

    #[tokio::test]
    async fn chat_without_credentials_returns_error_report() {
        let repo = TestRepo::new();
        let state = AppState::new(AppConfig::default());
        let request = ChangeRequest {
            message: "add a greet function".to_string(),
            repository: repo.path().display().to_string(),
            requester: "alice".to_string(),
            descriptive_name: "greet".to_string(),
        };

        let Ok(Json(report)) = chat(State(state), Json(request)).await else {
            panic!("chat should answer with a report");
        };
        assert_eq!(report.status, RunStatus::Error);
        assert_eq!(report.error_kind.as_deref(), Some("config"));
    }

    #[tokio::test]
    async fn branches_lists_local_branches() {
        let repo = TestRepo::new();
        repo.git().checkout_new_branch("feature/alice/x").expect("branch");
        let state = AppState::new(AppConfig::default());

        let Ok(Json(body)) = branches(State(state), Path(repo.path().display().to_string())).await
        else {
            panic!("branches should succeed");
        };
        let names: Vec<&str> = body.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["feature/alice/x", "main"]);
    }

    #[tokio::test]
    async fn branches_of_missing_repo_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = AppState::new(AppConfig::default());
        let missing = temp.path().join("absent").display().to_string();

        let Err(err) = branches(State(state), Path(missing)).await else {
            panic!("expected an error");
        };
        assert_eq!(err.0.kind(), "repo_access");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_pr_of_missing_repo_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = AppState::new(AppConfig::default());
        let request = PrRequest {
            repo_path: temp.path().join("absent").display().to_string(),
            source_branch: "feature/alice/x".to_string(),
            target_branch: "main".to_string(),
            title: "t".to_string(),
            description: String::new(),
        };

        let Err(err) = create_pr(State(state), Json(request)).await else {
            panic!("expected an error");
        };
        assert_eq!(err.0.kind(), "repo_access");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_pr_without_completion_is_unavailable() {
        let repo = TestRepo::new();
        repo.git().checkout_new_branch("feature/alice/x").expect("branch");
        let state = AppState::new(AppConfig::default());
        let request = PrRequest {
            repo_path: repo.path().display().to_string(),
            source_branch: "feature/alice/x".to_string(),
            target_branch: "main".to_string(),
            title: "t".to_string(),
            description: String::new(),
        };

        let Err(err) = create_pr(State(state), Json(request)).await else {
            panic!("expected an error");
        };
        assert_eq!(err.0.kind(), "config");
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn update_with_invalid_url_is_a_hosting_error() {
        let state = AppState::new(AppConfig::default());
        let request = PrUpdateRequest {
            pr_url: "https://github.com/acme/widgets/issues/1".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
        };

        let Err(err) = update_pr(State(state), Json(request)).await else {
            panic!("expected an error");
        };
        assert_eq!(err.0.to_string(), "Pull request hosting failed: Invalid PR URL");
    }

    #[tokio::test]
    async fn execute_writes_file_and_runs_command() {
        let data = tempfile::tempdir().expect("tempdir");
        let state = state_with_data_dir(data.path());
        let request = SandboxRequest {
            repo_name: "demo".to_string(),
            exec: ExecRequest {
                filename: Some("hello.txt".to_string()),
                code: Some("hi there".to_string()),
                command: Some("cat hello.txt".to_string()),
            },
        };

        let Json(output) = execute(State(state), Json(request)).await;

        assert_eq!(output.stdout, "hi there");
        assert!(data.path().join("demo").join("hello.txt").is_file());
    }

    #[tokio::test]
    async fn execute_rejects_escaping_repo_name() {
        let data = tempfile::tempdir().expect("tempdir");
        let state = state_with_data_dir(data.path());
        let request = SandboxRequest {
            repo_name: "../outside".to_string(),
            exec: ExecRequest::default(),
        };

        let Json(output) = execute(State(state), Json(request)).await;

        assert!(output.stdout.is_empty());
        assert!(output.stderr.starts_with("invalid repository name"));
    }

    #[tokio::test]
    async fn install_without_manifest_reports_in_stderr() {
        let data = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(data.path().join("demo")).expect("mkdir");
        let state = state_with_data_dir(data.path());

        let Json(output) = install_requirements(
            State(state),
            Json(InstallRequest {
                repo_name: "demo".to_string(),
            }),
        )
        .await;

        assert_eq!(output.stderr, "requirements.txt not found");
    }

    #[test]
    fn sandbox_request_flattens_exec_fields() {
        let request: SandboxRequest = serde_json::from_value(json!({
            "repo_name": "demo",
            "filename": "main.py",
            "code": "print(1)",
        }))
        .expect("deserialize");
        assert_eq!(request.repo_name, "demo");
        assert_eq!(request.exec.filename.as_deref(), Some("main.py"));
        assert!(request.exec.command.is_none());
    }
}

use std::sync::Arc;

use projbot_core::config::{PaginationConfig, ZohoConfig};
use projbot_core::errors::ApiError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::models::{
    NewProject, NewTask, NewTaskList, NewTimeLog, Project, ProjectUpdate, Task, TaskList,
    TaskUpdate, TimeLog,
};
use crate::transport::{ApiRequest, HttpTransport, SendError, Transport};

/// A list result assembled from continuation windows. `truncated` is set
/// when the page budget ran out while the backend still had more to give.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub truncated: bool,
}

/// Typed operations against the Projects API, all scoped by one portal.
///
/// Every call acquires a token from the store first; an authentication
/// rejection triggers exactly one forced refresh and retry, and a network
/// or 5xx failure exactly one automatic retry. Rate limiting is never
/// absorbed here.
pub struct ProjectsClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    portal_id: String,
    max_pages: u32,
    page_size: u32,
}

impl ProjectsClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenStore>,
        portal_id: impl Into<String>,
        pagination: &PaginationConfig,
    ) -> Self {
        Self {
            transport,
            tokens,
            portal_id: portal_id.into(),
            max_pages: pagination.max_pages.max(1),
            page_size: pagination.page_size.max(1),
        }
    }

    pub fn over_http(
        config: &ZohoConfig,
        tokens: Arc<TokenStore>,
        pagination: &PaginationConfig,
    ) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config.api_base_url.clone(), config.timeout_secs)
            .map_err(|error| ApiError::Transient(error.to_string()))?;
        Ok(Self::new(Arc::new(transport), tokens, config.portal_id.clone(), pagination))
    }

    // -- projects ---------------------------------------------------------

    pub async fn list_projects(&self, status: Option<&str>) -> Result<Page<Project>, ApiError> {
        let status = status.unwrap_or("active").to_string();
        self.list_envelope("projects/", "projects", vec![("status".to_string(), status)]).await
    }

    /// Name filtering happens client-side; the backend has no search
    /// parameter on this endpoint.
    pub async fn search_projects(&self, query: &str) -> Result<Page<Project>, ApiError> {
        let page = self.list_projects(None).await?;
        let needle = query.to_lowercase();
        let items = page
            .items
            .into_iter()
            .filter(|project| project.name.to_lowercase().contains(&needle))
            .collect();
        Ok(Page { items, truncated: page.truncated })
    }

    pub async fn project(&self, project_id: &str) -> Result<Project, ApiError> {
        let path = self.portal_path(&format!("projects/{project_id}/"));
        let value = self.request(ApiRequest::get(path.clone())).await?;
        first_entity(&value, "projects", &format!("project {project_id}"))
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
        let path = self.portal_path("projects/");
        let value = self.request(ApiRequest::post(path, to_body(project)?)).await?;
        first_entity(&value, "projects", "created project")
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<Project, ApiError> {
        let path = self.portal_path(&format!("projects/{project_id}/"));
        let value = self.request(ApiRequest::post(path, to_body(update)?)).await?;
        first_entity(&value, "projects", &format!("project {project_id}"))
    }

    // -- tasks ------------------------------------------------------------

    pub async fn list_tasks(&self, project_id: &str) -> Result<Page<Task>, ApiError> {
        self.list_envelope(&format!("projects/{project_id}/tasks/"), "tasks", Vec::new()).await
    }

    pub async fn search_tasks(
        &self,
        project_id: &str,
        query: &str,
    ) -> Result<Page<Task>, ApiError> {
        let page = self.list_tasks(project_id).await?;
        let needle = query.to_lowercase();
        let items = page
            .items
            .into_iter()
            .filter(|task| task.name.to_lowercase().contains(&needle))
            .collect();
        Ok(Page { items, truncated: page.truncated })
    }

    pub async fn task(&self, project_id: &str, task_id: &str) -> Result<Task, ApiError> {
        let path = self.portal_path(&format!("projects/{project_id}/tasks/{task_id}/"));
        let value = self.request(ApiRequest::get(path)).await?;
        first_entity(&value, "tasks", &format!("task {task_id}"))
    }

    pub async fn create_task(&self, project_id: &str, task: &NewTask) -> Result<Task, ApiError> {
        let path = self.portal_path(&format!("projects/{project_id}/tasks/"));
        let value = self.request(ApiRequest::post(path, to_body(task)?)).await?;
        first_entity(&value, "tasks", "created task")
    }

    pub async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<Task, ApiError> {
        let path = self.portal_path(&format!("projects/{project_id}/tasks/{task_id}/"));
        let value = self.request(ApiRequest::post(path, to_body(update)?)).await?;
        first_entity(&value, "tasks", &format!("task {task_id}"))
    }

    // -- task lists -------------------------------------------------------

    pub async fn list_tasklists(&self, project_id: &str) -> Result<Page<TaskList>, ApiError> {
        self.list_envelope(&format!("projects/{project_id}/tasklists/"), "tasklists", Vec::new())
            .await
    }

    pub async fn create_tasklist(
        &self,
        project_id: &str,
        tasklist: &NewTaskList,
    ) -> Result<TaskList, ApiError> {
        let path = self.portal_path(&format!("projects/{project_id}/tasklists/"));
        let value = self.request(ApiRequest::post(path, to_body(tasklist)?)).await?;
        first_entity(&value, "tasklists", "created task list")
    }

    // -- time logs --------------------------------------------------------

    /// The time-log envelope nests entries by day; it is passed through
    /// opaquely and summarized by the operation layer.
    pub async fn task_time_logs(&self, project_id: &str, task_id: &str) -> Result<Value, ApiError> {
        let path = self.portal_path(&format!("projects/{project_id}/tasks/{task_id}/logs/"));
        let value = self.request(ApiRequest::get(path)).await?;
        Ok(value.get("timelogs").cloned().unwrap_or_else(|| json!({})))
    }

    pub async fn add_time_log(
        &self,
        project_id: &str,
        task_id: &str,
        log: &NewTimeLog,
    ) -> Result<TimeLog, ApiError> {
        let path = self.portal_path(&format!("projects/{project_id}/tasks/{task_id}/logs/"));
        let value = self.request(ApiRequest::post(path, to_body(log)?)).await?;
        let tasklogs = value
            .get("timelogs")
            .and_then(|timelogs| timelogs.get("tasklogs"))
            .cloned()
            .unwrap_or_else(|| json!([]));
        first_entity(&json!({ "tasklogs": tasklogs }), "tasklogs", "created time log")
    }

    // -- plumbing ---------------------------------------------------------

    fn portal_path(&self, suffix: &str) -> String {
        format!("/restapi/portal/{}/{suffix}", self.portal_id)
    }

    /// Follows `index`/`range` continuation windows up to the page budget,
    /// concatenating in backend order. Exhausting the budget while the last
    /// window came back full flags the result as truncated instead of
    /// silently dropping the tail.
    async fn list_envelope<T>(
        &self,
        suffix: &str,
        key: &str,
        extra_query: Vec<(String, String)>,
    ) -> Result<Page<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let path = self.portal_path(suffix);
        let mut items = Vec::new();
        let mut truncated = false;
        let mut index: u64 = 1;

        for page in 0..self.max_pages {
            let mut request = ApiRequest::get(path.clone())
                .query("index", index.to_string())
                .query("range", self.page_size.to_string());
            for (k, v) in &extra_query {
                request = request.query(k.clone(), v.clone());
            }

            let value = self.request(request).await?;
            // An empty portal answers with no list key at all.
            let batch = value.get(key).and_then(Value::as_array).cloned().unwrap_or_default();
            let batch_len = batch.len() as u32;
            for item in batch {
                items.push(parse_entity(item, key)?);
            }

            if batch_len < self.page_size {
                break;
            }
            index += u64::from(self.page_size);
            if page + 1 == self.max_pages {
                truncated = true;
                warn!(
                    event_name = "zoho.client.page_budget_exhausted",
                    resource = key,
                    max_pages = self.max_pages,
                    "list result truncated at the configured page budget"
                );
            }
        }

        Ok(Page { items, truncated })
    }

    async fn request(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let mut token = self.tokens.access_token().await?;
        let mut auth_retried = false;
        let mut transient_retried = false;

        loop {
            let mut attempt = request.clone();
            attempt.access_token = token.clone();

            match self.transport.send(attempt).await {
                Ok(value) => return Ok(value),
                Err(SendError::Status { code: 401, .. }) if !auth_retried => {
                    auth_retried = true;
                    debug!(
                        event_name = "zoho.client.auth_retry",
                        path = %request.path,
                        "authentication rejected; forcing one token refresh"
                    );
                    token = self.tokens.force_refresh().await?;
                }
                Err(error) if is_transient(&error) && !transient_retried => {
                    transient_retried = true;
                    warn!(
                        event_name = "zoho.client.transient_retry",
                        path = %request.path,
                        error = %error,
                        "transient failure; retrying once"
                    );
                }
                Err(error) => return Err(map_send_error(error, &request.path)),
            }
        }
    }
}

fn is_transient(error: &SendError) -> bool {
    match error {
        SendError::Network(_) => true,
        SendError::Status { code, .. } => (500..=599).contains(code),
    }
}

fn map_send_error(error: SendError, path: &str) -> ApiError {
    match error {
        SendError::Status { code: 401 | 403, .. } => {
            ApiError::Auth(format!("backend rejected credentials for {path}"))
        }
        SendError::Status { code: 404, .. } => ApiError::NotFound(path.to_string()),
        SendError::Status { code: 400 | 422, body, .. } => ApiError::Validation {
            field: "request".to_string(),
            message: clip(&body, 300),
        },
        SendError::Status { code: 429, retry_after_secs, .. } => {
            ApiError::RateLimited { retry_after_secs }
        }
        SendError::Status { code, .. } => ApiError::Transient(format!("backend status {code}")),
        SendError::Network(reason) => ApiError::Transient(reason),
    }
}

fn to_body<T: serde::Serialize>(payload: &T) -> Result<Value, ApiError> {
    serde_json::to_value(payload)
        .map_err(|error| ApiError::Transient(format!("payload serialization failed: {error}")))
}

fn parse_entity<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|error| ApiError::Transient(format!("unexpected {what} payload: {error}")))
}

fn first_entity<T: DeserializeOwned>(value: &Value, key: &str, what: &str) -> Result<T, ApiError> {
    let first = value
        .get(key)
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .cloned()
        .ok_or_else(|| ApiError::NotFound(what.to_string()))?;
    parse_entity(first, key)
}

fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

//! The built-in operation catalog: projects, tasks, task lists, time logs.
//!
//! Date parameters use the backend's MM-DD-YYYY convention and time log
//! hours use HH:MM; both are spelled out in the parameter descriptions so
//! the reasoning function formats them correctly.

use async_trait::async_trait;
use projbot_zoho::client::ProjectsClient;
use projbot_zoho::models::{
    NewProject, NewTask, NewTaskList, NewTimeLog, Project, Task, TaskList, TaskUpdate, TimeLog,
};
use serde_json::{json, Value};

use crate::tools::{
    optional_i64, optional_str, required_str, Operation, OperationRegistry, OperationResult,
    OperationSpec, ParamKind, ParamSpec,
};

/// Registry with every built-in operation.
pub fn default_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    registry.register(SearchProjects);
    registry.register(GetProjectDetails);
    registry.register(CreateProject);
    registry.register(SearchTasks);
    registry.register(GetTaskDetails);
    registry.register(CreateTask);
    registry.register(UpdateTask);
    registry.register(GetTasklists);
    registry.register(CreateTasklist);
    registry.register(GetTimeLogs);
    registry.register(AddTimeLog);
    registry
}

fn project_summary(project: &Project) -> Value {
    json!({
        "id": project.display_id(),
        "name": project.name,
        "status": project.status,
        "description": project.description,
        "start_date": project.start_date,
        "end_date": project.end_date,
    })
}

fn task_summary(task: &Task) -> Value {
    json!({
        "id": task.display_id(),
        "name": task.name,
        "status": task.status_name(),
        "percent_complete": task.percent_complete,
        "priority": task.priority,
        "start_date": task.start_date,
        "end_date": task.end_date,
    })
}

fn tasklist_summary(tasklist: &TaskList) -> Value {
    json!({
        "id": tasklist.display_id(),
        "name": tasklist.name,
        "flag": tasklist.flag,
        "completed": tasklist.completed,
    })
}

fn timelog_summary(log: &TimeLog) -> Value {
    json!({
        "id": log.display_id(),
        "hours": log.hours_display,
        "date": log.log_date,
        "bill_status": log.bill_status,
        "notes": log.notes,
        "owner": log.owner_name,
    })
}

struct SearchProjects;

#[async_trait]
impl Operation for SearchProjects {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "search_projects",
            description: "Search projects in the portal by name. Returns matching projects \
                          with their ids, statuses and dates.",
            params: vec![(
                "query",
                ParamSpec::required(ParamKind::String, "Text to match against project names"),
            )],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let query = required_str(args, "query");
        match client.search_projects(&query).await {
            Ok(page) => OperationResult::success(json!({
                "projects": page.items.iter().map(project_summary).collect::<Vec<_>>(),
                "count": page.items.len(),
                "truncated": page.truncated,
            })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct GetProjectDetails;

#[async_trait]
impl Operation for GetProjectDetails {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "get_project_details",
            description: "Fetch one project by its id.",
            params: vec![(
                "project_id",
                ParamSpec::required(ParamKind::String, "Project id"),
            )],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        match client.project(&project_id).await {
            Ok(project) => OperationResult::success(json!({ "project": project_summary(&project) })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct CreateProject;

#[async_trait]
impl Operation for CreateProject {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "create_project",
            description: "Create a new project in the portal.",
            params: vec![
                ("name", ParamSpec::required(ParamKind::String, "Project name")),
                ("description", ParamSpec::optional(ParamKind::String, "Project description")),
                ("start_date", ParamSpec::optional(ParamKind::String, "Start date, MM-DD-YYYY")),
                ("end_date", ParamSpec::optional(ParamKind::String, "End date, MM-DD-YYYY")),
            ],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let payload = NewProject {
            name: required_str(args, "name"),
            description: optional_str(args, "description"),
            start_date: optional_str(args, "start_date"),
            end_date: optional_str(args, "end_date"),
        };
        match client.create_project(&payload).await {
            Ok(project) => OperationResult::success(json!({ "project": project_summary(&project) })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct SearchTasks;

#[async_trait]
impl Operation for SearchTasks {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "search_tasks",
            description: "List tasks in a project, optionally filtered by name.",
            params: vec![
                ("project_id", ParamSpec::required(ParamKind::String, "Project id")),
                (
                    "query",
                    ParamSpec::optional(
                        ParamKind::String,
                        "Text to match against task names; omit to list all tasks",
                    ),
                ),
            ],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        let result = match optional_str(args, "query").filter(|query| !query.is_empty()) {
            Some(query) => client.search_tasks(&project_id, &query).await,
            None => client.list_tasks(&project_id).await,
        };
        match result {
            Ok(page) => OperationResult::success(json!({
                "tasks": page.items.iter().map(task_summary).collect::<Vec<_>>(),
                "count": page.items.len(),
                "truncated": page.truncated,
            })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct GetTaskDetails;

#[async_trait]
impl Operation for GetTaskDetails {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "get_task_details",
            description: "Fetch one task by its id.",
            params: vec![
                ("project_id", ParamSpec::required(ParamKind::String, "Project id")),
                ("task_id", ParamSpec::required(ParamKind::String, "Task id")),
            ],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        let task_id = required_str(args, "task_id");
        match client.task(&project_id, &task_id).await {
            Ok(task) => OperationResult::success(json!({ "task": task_summary(&task) })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct CreateTask;

#[async_trait]
impl Operation for CreateTask {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "create_task",
            description: "Create a task in a project.",
            params: vec![
                ("project_id", ParamSpec::required(ParamKind::String, "Project id")),
                ("name", ParamSpec::required(ParamKind::String, "Task name")),
                ("description", ParamSpec::optional(ParamKind::String, "Task description")),
                ("start_date", ParamSpec::optional(ParamKind::String, "Start date, MM-DD-YYYY")),
                ("end_date", ParamSpec::optional(ParamKind::String, "Due date, MM-DD-YYYY")),
                (
                    "priority",
                    ParamSpec::optional(ParamKind::String, "None, Low, Medium or High"),
                ),
                (
                    "tasklist_id",
                    ParamSpec::optional(ParamKind::String, "Task list to place the task in"),
                ),
            ],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        let payload = NewTask {
            name: required_str(args, "name"),
            description: optional_str(args, "description"),
            start_date: optional_str(args, "start_date"),
            end_date: optional_str(args, "end_date"),
            priority: optional_str(args, "priority"),
            tasklist_id: optional_str(args, "tasklist_id"),
        };
        match client.create_task(&project_id, &payload).await {
            Ok(task) => OperationResult::success(json!({ "task": task_summary(&task) })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct UpdateTask;

#[async_trait]
impl Operation for UpdateTask {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "update_task",
            description: "Update fields on an existing task. Only the provided fields change.",
            params: vec![
                ("project_id", ParamSpec::required(ParamKind::String, "Project id")),
                ("task_id", ParamSpec::required(ParamKind::String, "Task id")),
                ("name", ParamSpec::optional(ParamKind::String, "New task name")),
                ("description", ParamSpec::optional(ParamKind::String, "New description")),
                (
                    "percent_complete",
                    ParamSpec::optional(ParamKind::Integer, "Completion percentage, 0-100"),
                ),
                (
                    "priority",
                    ParamSpec::optional(ParamKind::String, "None, Low, Medium or High"),
                ),
            ],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        let task_id = required_str(args, "task_id");
        let percent_complete = optional_i64(args, "percent_complete");
        if let Some(percent) = percent_complete {
            if !(0..=100).contains(&percent) {
                return OperationResult::validation(format!(
                    "percent_complete must be between 0 and 100, got {percent}"
                ));
            }
        }

        let update = TaskUpdate {
            name: optional_str(args, "name"),
            description: optional_str(args, "description"),
            percent_complete,
            priority: optional_str(args, "priority"),
        };
        if update.name.is_none()
            && update.description.is_none()
            && update.percent_complete.is_none()
            && update.priority.is_none()
        {
            return OperationResult::validation("at least one field to update must be provided");
        }

        match client.update_task(&project_id, &task_id, &update).await {
            Ok(task) => OperationResult::success(json!({ "task": task_summary(&task) })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct GetTasklists;

#[async_trait]
impl Operation for GetTasklists {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "get_tasklists",
            description: "List the task lists of a project.",
            params: vec![(
                "project_id",
                ParamSpec::required(ParamKind::String, "Project id"),
            )],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        match client.list_tasklists(&project_id).await {
            Ok(page) => OperationResult::success(json!({
                "tasklists": page.items.iter().map(tasklist_summary).collect::<Vec<_>>(),
                "count": page.items.len(),
                "truncated": page.truncated,
            })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct CreateTasklist;

#[async_trait]
impl Operation for CreateTasklist {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "create_tasklist",
            description: "Create a task list in a project.",
            params: vec![
                ("project_id", ParamSpec::required(ParamKind::String, "Project id")),
                ("name", ParamSpec::required(ParamKind::String, "Task list name")),
                ("flag", ParamSpec::optional(ParamKind::String, "internal or external")),
            ],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        let payload = NewTaskList {
            name: required_str(args, "name"),
            flag: optional_str(args, "flag"),
        };
        match client.create_tasklist(&project_id, &payload).await {
            Ok(tasklist) => {
                OperationResult::success(json!({ "tasklist": tasklist_summary(&tasklist) }))
            }
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct GetTimeLogs;

#[async_trait]
impl Operation for GetTimeLogs {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "get_time_logs",
            description: "Fetch the time logs recorded against a task.",
            params: vec![
                ("project_id", ParamSpec::required(ParamKind::String, "Project id")),
                ("task_id", ParamSpec::required(ParamKind::String, "Task id")),
            ],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        let task_id = required_str(args, "task_id");
        match client.task_time_logs(&project_id, &task_id).await {
            // Day-grouped envelope, passed through for the model to read.
            Ok(timelogs) => OperationResult::success(json!({ "timelogs": timelogs })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

struct AddTimeLog;

#[async_trait]
impl Operation for AddTimeLog {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "add_time_log",
            description: "Record a time log against a task.",
            params: vec![
                ("project_id", ParamSpec::required(ParamKind::String, "Project id")),
                ("task_id", ParamSpec::required(ParamKind::String, "Task id")),
                ("date", ParamSpec::required(ParamKind::String, "Log date, MM-DD-YYYY")),
                ("hours", ParamSpec::required(ParamKind::String, "Time spent, HH:MM")),
                (
                    "bill_status",
                    ParamSpec::optional(ParamKind::String, "Billable or Non Billable"),
                ),
                ("notes", ParamSpec::optional(ParamKind::String, "Free-form notes")),
            ],
        }
    }

    async fn invoke(&self, args: &Value, client: &ProjectsClient) -> OperationResult {
        let project_id = required_str(args, "project_id");
        let task_id = required_str(args, "task_id");
        let payload = NewTimeLog {
            date: required_str(args, "date"),
            hours: required_str(args, "hours"),
            bill_status: optional_str(args, "bill_status")
                .unwrap_or_else(|| "Billable".to_string()),
            notes: optional_str(args, "notes"),
        };
        match client.add_time_log(&project_id, &task_id, &payload).await {
            Ok(log) => OperationResult::success(json!({ "timelog": timelog_summary(&log) })),
            Err(error) => OperationResult::from_error(error),
        }
    }
}

use serde::{Deserialize, Serialize};

/// Light views of the backend entities. Only the fields operations read are
/// modeled; everything else rides along in the raw payload and is ignored.

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub id_string: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl Project {
    pub fn display_id(&self) -> String {
        display_id(&self.id_string, self.id)
    }
}

/// Task status arrives as a nested object; only the label matters here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub id_string: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<StatusRef>,
    #[serde(default)]
    pub percent_complete: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl Task {
    pub fn display_id(&self) -> String {
        display_id(&self.id_string, self.id)
    }

    pub fn status_name(&self) -> &str {
        self.status.as_ref().and_then(|status| status.name.as_deref()).unwrap_or("Unknown")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub id_string: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl TaskList {
    pub fn display_id(&self) -> String {
        display_id(&self.id_string, self.id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeLog {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub id_string: Option<String>,
    #[serde(default)]
    pub hours_display: Option<String>,
    #[serde(default)]
    pub log_date: Option<String>,
    #[serde(default)]
    pub bill_status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
}

impl TimeLog {
    pub fn display_id(&self) -> String {
        display_id(&self.id_string, self.id)
    }
}

fn display_id(id_string: &Option<String>, id: Option<i64>) -> String {
    id_string
        .clone()
        .or_else(|| id.map(|value| value.to_string()))
        .unwrap_or_else(|| "N/A".to_string())
}

// Create/update payloads. Dates use the backend's MM-DD-YYYY convention;
// the operations document that in their parameter schemas.

#[derive(Clone, Debug, Default, Serialize)]
pub struct NewProject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct NewTask {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasklist_id: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct NewTaskList {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct NewTimeLog {
    pub date: String,
    pub hours: String,
    pub bill_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{NewTask, Project, Task};

    #[test]
    fn display_id_prefers_the_string_form() {
        let project: Project = serde_json::from_value(serde_json::json!({
            "id": 170876000001848022i64,
            "id_string": "170876000001848022",
            "name": "Website Redesign",
            "status": "active"
        }))
        .expect("project parses");

        assert_eq!(project.display_id(), "170876000001848022");
        assert_eq!(project.name, "Website Redesign");
    }

    #[test]
    fn task_status_name_unwraps_the_nested_object() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "id": 42,
            "name": "Review proposal",
            "status": { "name": "Open", "type": "open" },
            "percent_complete": "50"
        }))
        .expect("task parses");

        assert_eq!(task.status_name(), "Open");
        assert_eq!(task.display_id(), "42");
    }

    #[test]
    fn create_payloads_omit_unset_fields() {
        let payload = serde_json::to_value(NewTask {
            name: "Ship it".into(),
            priority: Some("High".into()),
            ..NewTask::default()
        })
        .expect("payload serializes");

        assert_eq!(payload["name"], "Ship it");
        assert_eq!(payload["priority"], "High");
        assert!(payload.get("description").is_none());
        assert!(payload.get("tasklist_id").is_none());
    }
}

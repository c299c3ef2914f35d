use std::env;
use std::sync::{Mutex, OnceLock};

use projbot_cli::commands::{doctor, operations};
use serde_json::Value;

#[test]
fn operations_lists_the_whole_catalog() {
    let output = operations::run();

    for name in [
        "search_projects",
        "get_project_details",
        "create_project",
        "search_tasks",
        "get_task_details",
        "create_task",
        "update_task",
        "get_tasklists",
        "create_tasklist",
        "get_time_logs",
        "add_time_log",
    ] {
        assert!(output.contains(name), "catalog output is missing {name}:\n{output}");
    }
    assert!(output.contains("(required)"), "parameter requirements are rendered");
}

#[test]
fn doctor_reports_config_failure_without_credentials() {
    with_env(&[], || {
        let output = doctor::run(true);

        let report: Value = serde_json::from_str(&output).expect("doctor --json emits valid JSON");
        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().expect("checks array present");
        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        // Downstream checks never run against a broken config.
        assert_eq!(checks[1]["status"], "skipped");
        assert_eq!(checks[2]["status"], "skipped");
    });
}

#[test]
fn doctor_human_output_marks_each_check() {
    with_env(&[], || {
        let output = doctor::run(false);

        assert!(output.starts_with("doctor:"), "summary leads the report:\n{output}");
        assert!(output.contains("[fail] config_validation"));
        assert!(output.contains("[skip] token_exchange"));
    });
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PROJBOT_ZOHO_CLIENT_ID",
        "PROJBOT_ZOHO_CLIENT_SECRET",
        "PROJBOT_ZOHO_REFRESH_TOKEN",
        "PROJBOT_ZOHO_PORTAL_ID",
        "PROJBOT_ZOHO_API_BASE_URL",
        "PROJBOT_ZOHO_AUTH_BASE_URL",
        "PROJBOT_ZOHO_TOKEN_SAFETY_MARGIN_SECS",
        "PROJBOT_ZOHO_TIMEOUT_SECS",
        "PROJBOT_LLM_API_KEY",
        "PROJBOT_LLM_BASE_URL",
        "PROJBOT_LLM_MODEL",
        "PROJBOT_AGENT_MAX_ITERATIONS",
        "PROJBOT_PAGINATION_MAX_PAGES",
        "PROJBOT_SERVER_BIND_ADDRESS",
        "PROJBOT_SERVER_PORT",
        "PROJBOT_CLIQ_BOT_ALIASES",
        "PROJBOT_LOGGING_LEVEL",
        "PROJBOT_LOGGING_FORMAT",
        "PROJBOT_LOG_LEVEL",
        "PROJBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

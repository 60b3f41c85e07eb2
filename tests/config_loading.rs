//! Loading deployments from TOML and wiring them to the SQL tools.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use agent_relay::items::Event;
use agent_relay::model::ReasoningOutcome;
use agent_relay::{
    AgentsError, AppConfig, Runner, ScriptedReasoner, SessionManager, SqlToolServer, ToolRouter,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::{NamedTempFile, TempDir};

fn bundled_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/driva_motors.toml")
}

#[test]
fn test_bundled_config_parses() {
    let config = AppConfig::from_file(bundled_config()).unwrap();
    assert_eq!(config.model, "gpt-4-1106-preview");
    assert_eq!(config.root_agent.as_deref(), Some("ReceptionAssistant"));
    assert_eq!(config.max_tool_concurrency, Some(1));

    let names: Vec<&str> = config.agents.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["ReceptionAssistant", "SalesAssistant", "MaintenanceAssistant"]
    );
    let reception = config.agents[0].to_definition(&config.model);
    assert!(!reception.model_settings.parallel_tool_calls);
    assert_eq!(reception.model_settings.temperature, Some(0.0));
    assert!(reception.can_hand_off_to("MaintenanceAssistant"));
}

#[test]
fn test_minimal_file_uses_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[[agents]]
name = "Solo"
instructions = "Answer questions"
"#
    )
    .unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.max_iterations, 10);
    assert_eq!(config.database_url, "sqlite::memory:");
    let agent = config.agents[0].to_definition(&config.model);
    assert_eq!(agent.model, config.model);
    assert!(agent.model_settings.parallel_tool_calls);
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "max_iterations = \"ten\"").unwrap();
    let err = AppConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, AgentsError::TomlError(_)));
    assert!(err.is_configuration_error());

    let missing = AppConfig::from_file("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(missing, AgentsError::IoError(_)));
}

#[tokio::test]
async fn test_bundled_deployment_against_file_database() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("driva.db").display());

    let mut config = AppConfig::from_file(bundled_config()).unwrap();
    config.database_url = url;

    let sql = SqlToolServer::connect(&config.database_url).await.unwrap();
    sqlx::query("CREATE TABLE veiculos (modelo TEXT, ano INTEGER)")
        .execute(sql.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO veiculos VALUES ('Onix', 2024)")
        .execute(sql.pool())
        .await
        .unwrap();

    let gateway = Arc::new(
        ToolRouter::builder()
            .tools(sql.tools())
            .max_concurrency(config.max_tool_concurrency.unwrap_or(1))
            .build(),
    );
    let registry = config.build_registry(gateway.as_ref()).unwrap();
    assert!(registry.get("SalesAssistant").unwrap().has_tool("query"));
    assert!(registry.get("ReceptionAssistant").unwrap().tools().is_empty());

    let reasoner = ScriptedReasoner::new()
        .with_handoff("SalesAssistant")
        .with_outcome(ReasoningOutcome::tool(
            "query",
            json!({"sql": "SELECT modelo, ano FROM veiculos"}),
        ))
        .with_message("We have a 2024 Onix.");
    let runner = Runner::new(registry.clone(), Arc::new(reasoner), gateway)
        .with_config(config.run_config());
    let sessions = SessionManager::new(registry);

    let outcome = sessions
        .append_user_turn("web-42", &runner, "Quais carros vocês têm?")
        .await
        .unwrap();
    assert_eq!(outcome.active_agent, "SalesAssistant");

    let session = sessions.get("web-42").unwrap();
    let session = session.lock().await;
    let result = session
        .log()
        .iter()
        .find_map(|e| match e {
            Event::ToolResult { output, .. } => Some(output.clone()),
            _ => None,
        })
        .unwrap();
    let rows: serde_json::Value = serde_json::from_str(&result).unwrap();
    assert_eq!(rows, json!([{"modelo": "Onix", "ano": 2024}]));
}

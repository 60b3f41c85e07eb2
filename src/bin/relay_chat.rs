//! Terminal chat against a configured agent relay.
//!
//! Usage: `relay-chat [config.toml]` (defaults to `config/driva_motors.toml`).
//! Type a message per line; `/log` prints the whole conversation, `/export`
//! prints the session as JSON and `/quit` exits.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use agent_relay::render::render_since;
use agent_relay::telemetry::init_tracing;
use agent_relay::{
    render_log, AppConfig, OpenAIProvider, Runner, SessionManager, SqlToolServer, ToolRouter,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> agent_relay::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/driva_motors.toml"));
    let config = AppConfig::load(Some(path.as_path()))?;
    init_tracing(config.debug_mode)?;
    info!(config = %path.display(), model = %config.model, "Starting relay chat");

    let sql = SqlToolServer::connect(&config.database_url).await?;
    if !sql.health_check().await {
        warn!("Database is not answering; SQL tools will report errors");
    }

    let mut gateway = ToolRouter::builder().tools(sql.tools());
    if let Some(limit) = config.max_tool_concurrency {
        gateway = gateway.max_concurrency(limit);
    }
    if let Some(timeout) = config.tool_timeout() {
        gateway = gateway.timeout(timeout);
    }
    let gateway = Arc::new(gateway.build());

    let registry = config.build_registry(gateway.as_ref())?;
    let runner = Runner::new(registry.clone(), Arc::new(OpenAIProvider::new()), gateway)
        .with_config(config.run_config());
    let sessions = SessionManager::new(registry.clone());
    let session_id = uuid::Uuid::new_v4().to_string();

    println!(
        "Talking to {}. /log, /export, /quit",
        registry.root()?.name
    );
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "/quit" => break,
            "/log" => {
                let session = sessions.get_or_create(&session_id)?;
                let session = session.lock().await;
                println!("{}", render_log(session.log()));
            }
            "/export" => {
                let session = sessions.get_or_create(&session_id)?;
                let session = session.lock().await;
                println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
            }
            _ => match sessions.append_user_turn(&session_id, &runner, input).await {
                Ok(outcome) => {
                    let session = sessions.get_or_create(&session_id)?;
                    let session = session.lock().await;
                    println!("{}", render_since(session.log(), outcome.first_new_event + 1));
                    println!("(talking to {})", outcome.active_agent);
                }
                Err(e) if e.is_configuration_error() => eprintln!("configuration error: {}", e),
                Err(e) => eprintln!("turn failed: {}", e),
            },
        }
        prompt();
    }

    sessions.end(&session_id);
    Ok(())
}

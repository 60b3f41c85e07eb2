//! # Tool gateway
//!
//! The runner never calls tools directly. It goes through a [`ToolGateway`],
//! an injected dependency that executes named tool calls and always answers
//! with data: a failed call is a [`ToolResult`] with an error, never an `Err`.
//!
//! [`ToolRouter`] is the in-process gateway. It routes invocations by name
//! through a Tower service stack, so gateway-wide policies compose as layers:
//!
//! - a concurrency limit shared by every tool (e.g. one database connection),
//!   enforced regardless of whether an agent dispatches calls in parallel;
//! - a per-call timeout, whose expiry is reported as an error payload.
//!
//! ```rust
//! use agent_relay::gateway::{ToolGateway, ToolRouter};
//! use agent_relay::tool::FunctionTool;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let router = ToolRouter::builder()
//!     .tool(Arc::new(FunctionTool::new(
//!         "health_check",
//!         "Is the database reachable?",
//!         serde_json::json!({"type": "object"}),
//!         |_| Ok(serde_json::json!(true)),
//!     )))
//!     .max_concurrency(1)
//!     .timeout(Duration::from_secs(5))
//!     .build();
//!
//! let result = router.invoke("health_check", &serde_json::json!({})).await;
//! assert_eq!(result.output, serde_json::json!(true));
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tower::limit::ConcurrencyLimitLayer;
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, ServiceBuilder, ServiceExt};
use tracing::{debug, warn};

use crate::tool::{Tool, ToolResult, ToolSpec};

/// Executes named tool calls on behalf of agents.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Tools this gateway can execute, in registration order.
    fn specs(&self) -> Vec<ToolSpec>;

    fn has_tool(&self, tool_name: &str) -> bool {
        self.specs().iter().any(|s| s.name == tool_name)
    }

    /// Runs one call. Safe to call repeatedly, and concurrently, within a
    /// turn. Failures are returned as data.
    async fn invoke(&self, tool_name: &str, arguments: &Value) -> ToolResult;
}

/// Uniform request routed through the gateway service stack.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

/// Boxed gateway service, shareable across tasks.
pub type ToolSvc = BoxCloneSyncService<ToolInvocation, Value, BoxError>;

/// In-process gateway routing by tool name.
#[derive(Clone)]
pub struct ToolRouter {
    specs: Vec<ToolSpec>,
    service: ToolSvc,
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("tools", &self.specs.iter().map(|s| &s.name).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRouter {
    pub fn builder() -> ToolRouterBuilder {
        ToolRouterBuilder::default()
    }
}

#[async_trait]
impl ToolGateway for ToolRouter {
    fn specs(&self) -> Vec<ToolSpec> {
        self.specs.clone()
    }

    async fn invoke(&self, tool_name: &str, arguments: &Value) -> ToolResult {
        debug!(tool = %tool_name, args = %arguments, "Invoking tool");
        let request = ToolInvocation {
            name: tool_name.to_string(),
            arguments: arguments.clone(),
        };
        match self.service.clone().oneshot(request).await {
            Ok(output) => ToolResult::success(output),
            Err(e) if e.is::<Elapsed>() => {
                warn!(tool = %tool_name, "Tool call timed out");
                ToolResult::error(format!("tool '{}' timed out", tool_name))
            }
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "Tool call failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}

/// Collects tools and gateway policies, then builds a [`ToolRouter`].
#[derive(Default)]
pub struct ToolRouterBuilder {
    tools: Vec<Arc<dyn Tool>>,
    max_concurrency: Option<usize>,
    timeout: Option<Duration>,
}

impl ToolRouterBuilder {
    /// Registers a tool. A later tool with the same name replaces the earlier one.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
        self
    }

    pub fn tools<I>(self, tools: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        tools.into_iter().fold(self, |b, t| b.tool(t))
    }

    /// Caps in-flight calls across all tools of this gateway.
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ToolRouter {
        let specs = self.tools.iter().map(|t| t.spec()).collect();
        let table: Arc<HashMap<String, Arc<dyn Tool>>> = Arc::new(
            self.tools
                .into_iter()
                .map(|t| (t.name().to_string(), t))
                .collect(),
        );

        let route = tower::service_fn(move |inv: ToolInvocation| {
            let table = table.clone();
            async move {
                let tool = table
                    .get(&inv.name)
                    .cloned()
                    .ok_or_else(|| BoxError::from(format!("unknown tool: {}", inv.name)))?;
                let result = tool.execute(inv.arguments).await?;
                match result.error {
                    Some(message) => Err(BoxError::from(message)),
                    None => Ok::<Value, BoxError>(result.output),
                }
            }
        });

        // Permit first, so time spent queueing does not count against the timeout.
        let service = ServiceBuilder::new()
            .option_layer(self.max_concurrency.map(ConcurrencyLimitLayer::new))
            .option_layer(self.timeout.map(TimeoutLayer::new))
            .service(route);

        ToolRouter {
            specs,
            service: BoxCloneSyncService::new(service),
        }
    }
}

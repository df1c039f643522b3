//! Server registry: connection state machines, health checks, and the
//! aggregated tool catalog.
//!
//! The registry owns every connection as a scoped resource: acquired at
//! register, guaranteed release on unregister, failure, or shutdown. Health
//! and reconnect timers run as independent per-server tasks and never block
//! request handling on other servers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use toolgate_core::{
    ConnectionState, EventSink, RegistryEvent, ServerDescriptor, ServerStatus, ToolCallResult,
    ToolDescriptor,
};

use crate::error::{RegistryError, TransportError};
use crate::protocol::{self, InitializeResult};
use crate::transport::{self, Connection, Transport};

/// Timing and thresholds for connection upkeep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Handshake deadline for one connect attempt, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Deadline for discovery and health calls, in milliseconds.
    pub call_timeout_ms: u64,
    /// Interval between health checks, in milliseconds.
    pub health_interval_ms: u64,
    /// Consecutive ping failures per demotion step (Ready→Degraded→Failed).
    pub failure_threshold: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            call_timeout_ms: 10_000,
            health_interval_ms: 30_000,
            failure_threshold: 3,
        }
    }
}

/// Connects descriptors to live transports.
///
/// A seam over [`transport::connect`] so registry behavior is testable with
/// scripted transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a connection for the descriptor.
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
        timeout: Duration,
    ) -> Result<Connection, TransportError>;
}

/// Production connector: stdio spawn + handshake, or stateless HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
        timeout: Duration,
    ) -> Result<Connection, TransportError> {
        transport::connect(descriptor, timeout).await
    }
}

/// One registered server and its live connection state.
struct ServerEntry {
    descriptor: ServerDescriptor,
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
    tools: Vec<ToolDescriptor>,
    ping_failures: u32,
    last_connected_at: Option<DateTime<Utc>>,
}

impl ServerEntry {
    fn new(descriptor: ServerDescriptor) -> Self {
        Self {
            descriptor,
            state: ConnectionState::Disconnected,
            transport: None,
            tools: Vec::new(),
            ping_failures: 0,
            last_connected_at: None,
        }
    }
}

type Shared = Arc<RwLock<HashMap<String, ServerEntry>>>;

/// Merged, de-duplicated tool list across Ready/Degraded servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Tools, each owned by exactly one server, sorted by name.
    pub tools: Vec<ToolDescriptor>,
    /// Name collisions resolved by priority — recorded, never silent.
    pub collisions: Vec<CatalogCollision>,
}

impl Catalog {
    /// Find a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// A tool-name collision between two servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCollision {
    /// The colliding tool name.
    pub tool: String,
    /// Server whose tool is in the catalog (higher priority).
    pub winner: String,
    /// Server whose tool was shadowed.
    pub loser: String,
}

/// Outcome of one `apply_config` reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDiff {
    /// Newly registered servers.
    pub added: Vec<String>,
    /// Unregistered servers.
    pub removed: Vec<String>,
    /// Servers whose descriptor changed (unregister + register).
    pub replaced: Vec<String>,
}

/// Registry of tool-providing servers.
pub struct ServerRegistry {
    inner: Shared,
    sink: Arc<dyn EventSink>,
    connector: Arc<dyn Connector>,
    config: RegistryConfig,
    health_tasks: tokio::sync::Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ServerRegistry {
    /// Create a registry with the production connector.
    pub fn new(sink: Arc<dyn EventSink>, config: RegistryConfig) -> Self {
        Self::with_connector(sink, config, Arc::new(DefaultConnector))
    }

    /// Create a registry with an injected connector.
    pub fn with_connector(
        sink: Arc<dyn EventSink>,
        config: RegistryConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            sink,
            connector,
            config,
            health_tasks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register a descriptor and, unless it is disabled, connect it.
    ///
    /// Connect attempts are bounded by the descriptor's retry policy with
    /// exponential backoff; exhaustion leaves the server `Failed` (the
    /// health task keeps trying) and reports the last error.
    pub async fn register(&self, descriptor: ServerDescriptor) -> Result<(), RegistryError> {
        descriptor.validate()?;
        let name = descriptor.name.clone();
        let enabled = descriptor.enabled;

        {
            let mut inner = self.inner.write().await;
            if inner.contains_key(&name) {
                return Err(RegistryError::AlreadyRegistered(name));
            }
            inner.insert(name.clone(), ServerEntry::new(descriptor));
        }
        self.sink
            .emit(RegistryEvent::ServerRegistered { name: name.clone() });

        if !enabled {
            tracing::info!(server_name = %name, "Registered disabled server, not connecting");
            return Ok(());
        }

        let result = connect_entry(
            &self.inner,
            &self.sink,
            &*self.connector,
            self.config,
            &name,
        )
        .await;

        // Health/reconnect task runs for every enabled server, whatever the
        // connect outcome.
        let handle = tokio::spawn(health_loop(
            Arc::clone(&self.inner),
            Arc::clone(&self.sink),
            Arc::clone(&self.connector),
            self.config,
            name.clone(),
        ));
        if let Some(old) = self.health_tasks.lock().await.insert(name, handle) {
            old.abort();
        }

        result
    }

    /// Unregister a server, closing its connection and pruning its tools.
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let entry = {
            let mut inner = self.inner.write().await;
            inner
                .remove(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?
        };

        if let Some(handle) = self.health_tasks.lock().await.remove(name) {
            handle.abort();
        }
        if let Some(transport) = entry.transport {
            transport.close().await;
        }

        self.sink.emit(RegistryEvent::ServerUnregistered {
            name: name.to_string(),
        });
        tracing::info!(server_name = %name, "Unregistered server");
        Ok(())
    }

    /// Reconcile the registry against a fresh descriptor list.
    ///
    /// Added descriptors are registered, missing ones unregistered, changed
    /// ones replaced. Individual connect failures are logged, not fatal.
    pub async fn apply_config(&self, descriptors: Vec<ServerDescriptor>) -> ConfigDiff {
        let mut diff = ConfigDiff::default();

        let current: HashMap<String, ServerDescriptor> = {
            let inner = self.inner.read().await;
            inner
                .iter()
                .map(|(name, entry)| (name.clone(), entry.descriptor.clone()))
                .collect()
        };

        let desired: HashMap<String, ServerDescriptor> = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        for name in current.keys() {
            if !desired.contains_key(name) {
                if let Err(e) = self.unregister(name).await {
                    tracing::warn!(server_name = %name, error = %e, "Failed to unregister");
                }
                diff.removed.push(name.clone());
            }
        }

        for (name, descriptor) in desired {
            match current.get(&name) {
                None => {
                    if let Err(e) = self.register(descriptor).await {
                        tracing::warn!(server_name = %name, error = %e, "Failed to register");
                    }
                    diff.added.push(name);
                }
                Some(existing) if *existing != descriptor => {
                    if let Err(e) = self.unregister(&name).await {
                        tracing::warn!(server_name = %name, error = %e, "Failed to unregister");
                    }
                    if let Err(e) = self.register(descriptor).await {
                        tracing::warn!(server_name = %name, error = %e, "Failed to re-register");
                    }
                    diff.replaced.push(name);
                }
                Some(_) => {}
            }
        }

        diff.added.sort();
        diff.removed.sort();
        diff.replaced.sort();
        diff
    }

    /// Merged, de-duplicated tool catalog across Ready/Degraded servers.
    ///
    /// On a name collision the higher-priority server wins; ties break on
    /// server name for determinism. Collisions are recorded in the result.
    pub async fn catalog(&self) -> Catalog {
        let inner = self.inner.read().await;

        let mut serving: Vec<&ServerEntry> = inner
            .values()
            .filter(|e| e.state.serves_tools())
            .collect();
        serving.sort_by(|a, b| {
            b.descriptor
                .priority
                .cmp(&a.descriptor.priority)
                .then_with(|| a.descriptor.name.cmp(&b.descriptor.name))
        });

        let mut tools: HashMap<String, ToolDescriptor> = HashMap::new();
        let mut collisions = Vec::new();

        for entry in serving {
            for tool in &entry.tools {
                if let Some(winner) = tools.get(&tool.name) {
                    collisions.push(CatalogCollision {
                        tool: tool.name.clone(),
                        winner: winner.server.clone(),
                        loser: entry.descriptor.name.clone(),
                    });
                    self.sink.emit(RegistryEvent::CatalogCollision {
                        tool: tool.name.clone(),
                        winner: winner.server.clone(),
                        loser: entry.descriptor.name.clone(),
                    });
                    tracing::debug!(
                        tool = %tool.name,
                        winner = %winner.server,
                        loser = %entry.descriptor.name,
                        "Tool name collision, higher priority wins"
                    );
                } else {
                    tools.insert(tool.name.clone(), tool.clone());
                }
            }
        }

        let mut tools: Vec<ToolDescriptor> = tools.into_values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Catalog { tools, collisions }
    }

    /// Call a tool on the server that owns it.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
        deadline: Duration,
    ) -> Result<ToolCallResult, RegistryError> {
        let transport = {
            let inner = self.inner.read().await;
            let entry = inner
                .get(server)
                .ok_or_else(|| RegistryError::NotFound(server.to_string()))?;
            if !entry.state.serves_tools() {
                return Err(RegistryError::Unavailable(server.to_string()));
            }
            entry
                .transport
                .clone()
                .ok_or_else(|| RegistryError::Unavailable(server.to_string()))?
        };

        let params = json!({ "name": tool, "arguments": arguments });
        match transport.call("tools/call", Some(params), deadline).await {
            Ok(result) => Ok(protocol::parse_tool_call(&result)),
            // A closed channel means the process died; don't keep reporting
            // the server Ready until the ping threshold catches up.
            Err(TransportError::Closed) => {
                tracing::warn!(server_name = %server, "Connection closed mid-call, failing server");
                mark_failed(&self.inner, &self.sink, server).await;
                Err(RegistryError::Transport(TransportError::Closed))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runtime status snapshot for every registered server, sorted by name.
    pub async fn server_status(&self) -> Vec<ServerStatus> {
        let inner = self.inner.read().await;
        let mut statuses: Vec<ServerStatus> = inner
            .values()
            .map(|entry| ServerStatus {
                name: entry.descriptor.name.clone(),
                state: entry.state,
                tool_count: entry.tools.len(),
                last_connected_at: entry.last_connected_at,
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Connection state of one server.
    pub async fn state_of(&self, name: &str) -> Option<ConnectionState> {
        self.inner.read().await.get(name).map(|e| e.state)
    }

    /// Test a descriptor without registering it: connect, list tools, tear
    /// down.
    pub async fn probe(
        &self,
        descriptor: &ServerDescriptor,
    ) -> Result<Vec<ToolDescriptor>, RegistryError> {
        descriptor.validate()?;

        let connection = self
            .connector
            .connect(
                descriptor,
                Duration::from_millis(self.config.connect_timeout_ms),
            )
            .await
            .map_err(|e| RegistryError::ConnectFailed {
                name: descriptor.name.clone(),
                reason: e.to_string(),
            })?;

        let tools = discover_tools(
            &*connection.transport,
            connection.info.as_ref(),
            &descriptor.name,
            Duration::from_millis(self.config.call_timeout_ms),
        )
        .await;
        connection.transport.close().await;
        tools.map_err(RegistryError::Transport)
    }

    /// Unregister every server and stop all health tasks.
    pub async fn shutdown(&self) {
        let names: Vec<String> = {
            let inner = self.inner.read().await;
            inner.keys().cloned().collect()
        };
        for name in names {
            if let Err(e) = self.unregister(&name).await {
                tracing::warn!(server_name = %name, error = %e, "Failed to unregister on shutdown");
            }
        }
    }
}

/// Update a server's state, emitting the change. Returns false if the entry
/// vanished (concurrent unregister).
async fn set_state(
    inner: &Shared,
    sink: &Arc<dyn EventSink>,
    name: &str,
    state: ConnectionState,
) -> bool {
    let mut guard = inner.write().await;
    let Some(entry) = guard.get_mut(name) else {
        return false;
    };
    if entry.state != state {
        entry.state = state;
        sink.emit(RegistryEvent::StateChanged {
            name: name.to_string(),
            state,
        });
    }
    true
}

/// Connect one registered server with bounded, backed-off attempts, then
/// discover its tools.
async fn connect_entry(
    inner: &Shared,
    sink: &Arc<dyn EventSink>,
    connector: &dyn Connector,
    config: RegistryConfig,
    name: &str,
) -> Result<(), RegistryError> {
    let (descriptor, retry) = {
        let guard = inner.read().await;
        let entry = guard
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        (entry.descriptor.clone(), entry.descriptor.retry)
    };

    if !set_state(inner, sink, name, ConnectionState::Connecting).await {
        return Err(RegistryError::NotFound(name.to_string()));
    }

    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    let call_timeout = Duration::from_millis(config.call_timeout_ms);
    let mut last_error = String::new();

    for attempt in 0..retry.max_attempts {
        match connector.connect(&descriptor, connect_timeout).await {
            Ok(connection) => {
                let tools = match discover_tools(
                    &*connection.transport,
                    connection.info.as_ref(),
                    name,
                    call_timeout,
                )
                .await
                {
                    Ok(tools) => tools,
                    Err(e) => {
                        connection.transport.close().await;
                        last_error = format!("Failed to list tools: {e}");
                        tracing::warn!(server_name = %name, attempt, error = %e, "Discovery failed");
                        continue;
                    }
                };

                let tool_count = tools.len();
                {
                    let mut guard = inner.write().await;
                    let Some(entry) = guard.get_mut(name) else {
                        // Unregistered while we were connecting.
                        connection.transport.close().await;
                        return Err(RegistryError::NotFound(name.to_string()));
                    };
                    entry.transport = Some(Arc::clone(&connection.transport));
                    entry.tools = tools;
                    entry.ping_failures = 0;
                    entry.last_connected_at = Some(Utc::now());
                }
                let _ = set_state(inner, sink, name, ConnectionState::Ready).await;
                sink.emit(RegistryEvent::ToolsDiscovered {
                    server: name.to_string(),
                    count: tool_count,
                });
                tracing::info!(server_name = %name, tool_count, "Server connected");
                return Ok(());
            }
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(server_name = %name, attempt, error = %e, "Connect attempt failed");
                if attempt + 1 < retry.max_attempts {
                    tokio::time::sleep(retry.backoff_delay(attempt)).await;
                }
            }
        }
    }

    let _ = set_state(inner, sink, name, ConnectionState::Failed).await;
    Err(RegistryError::ConnectFailed {
        name: name.to_string(),
        reason: last_error,
    })
}

/// Discover a server's tools via `tools/list`, gated on the advertised
/// capability when a handshake reported one.
async fn discover_tools(
    transport: &dyn Transport,
    info: Option<&InitializeResult>,
    server: &str,
    deadline: Duration,
) -> Result<Vec<ToolDescriptor>, TransportError> {
    if let Some(info) = info {
        if info.capabilities.tools.is_none() {
            return Ok(Vec::new());
        }
    }

    let result = transport.call("tools/list", None, deadline).await?;
    let raw = protocol::parse_tool_list(&result)?;

    Ok(raw
        .into_iter()
        .map(|t| {
            let mut tool = ToolDescriptor::new(t.name, server);
            tool.description = t.description;
            tool.input_schema = t.input_schema;
            tool
        })
        .collect())
}

/// Per-server health/reconnect loop.
///
/// Pings on an interval; `failure_threshold` consecutive failures demote one
/// step (Ready→Degraded, Degraded→Failed). A Failed server is reconnected
/// through the normal bounded-retry path; a healthy ping while Degraded
/// promotes back to Ready.
async fn health_loop(
    inner: Shared,
    sink: Arc<dyn EventSink>,
    connector: Arc<dyn Connector>,
    config: RegistryConfig,
    name: String,
) {
    let interval = Duration::from_millis(config.health_interval_ms);
    let ping_timeout = Duration::from_millis(config.call_timeout_ms);

    loop {
        tokio::time::sleep(interval).await;

        let (state, transport) = {
            let guard = inner.read().await;
            let Some(entry) = guard.get(&name) else {
                return; // Unregistered.
            };
            (entry.state, entry.transport.clone())
        };

        match state {
            ConnectionState::Failed => {
                tracing::info!(server_name = %name, "Attempting reconnect");
                if let Err(e) =
                    connect_entry(&inner, &sink, &*connector, config, &name).await
                {
                    tracing::warn!(server_name = %name, error = %e, "Reconnect failed");
                }
            }
            ConnectionState::Ready | ConnectionState::Degraded => {
                let Some(transport) = transport else {
                    continue;
                };
                match transport.call("ping", None, ping_timeout).await {
                    Ok(_) => {
                        let mut guard = inner.write().await;
                        if let Some(entry) = guard.get_mut(&name) {
                            entry.ping_failures = 0;
                        }
                        drop(guard);
                        if state == ConnectionState::Degraded {
                            tracing::info!(server_name = %name, "Health restored");
                            let _ = set_state(&inner, &sink, &name, ConnectionState::Ready).await;
                        }
                    }
                    // The channel is gone, not flaky; fail without counting.
                    Err(TransportError::Closed) => {
                        tracing::warn!(server_name = %name, "Connection closed, failing server");
                        mark_failed(&inner, &sink, &name).await;
                    }
                    Err(e) => {
                        let failures = {
                            let mut guard = inner.write().await;
                            let Some(entry) = guard.get_mut(&name) else {
                                return;
                            };
                            entry.ping_failures += 1;
                            entry.ping_failures
                        };
                        tracing::warn!(
                            server_name = %name,
                            failures,
                            error = %e,
                            "Health check failed"
                        );
                        if failures >= config.failure_threshold {
                            demote(&inner, &sink, &name, state).await;
                        }
                    }
                }
            }
            // Connecting in progress or deliberately disconnected.
            ConnectionState::Connecting | ConnectionState::Disconnected => {}
        }
    }
}

/// One demotion step after a failure-threshold breach.
async fn demote(inner: &Shared, sink: &Arc<dyn EventSink>, name: &str, from: ConnectionState) {
    match from {
        ConnectionState::Ready => {
            {
                let mut guard = inner.write().await;
                let Some(entry) = guard.get_mut(name) else {
                    return;
                };
                entry.ping_failures = 0;
            }
            let _ = set_state(inner, sink, name, ConnectionState::Degraded).await;
        }
        ConnectionState::Degraded => mark_failed(inner, sink, name).await,
        _ => {}
    }
}

/// Fail a server outright: prune its tools, drop and close its transport.
///
/// Used for the terminal demotion step and whenever a call finds the
/// connection already gone. The health task picks reconnection up from here.
async fn mark_failed(inner: &Shared, sink: &Arc<dyn EventSink>, name: &str) {
    let transport = {
        let mut guard = inner.write().await;
        let Some(entry) = guard.get_mut(name) else {
            return;
        };
        entry.ping_failures = 0;
        // Tools belong only to Ready/Degraded servers; prune now.
        entry.tools.clear();
        entry.transport.take()
    };

    let _ = set_state(inner, sink, name, ConnectionState::Failed).await;
    if let Some(transport) = transport {
        transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use toolgate_core::NoopSink;

    /// Transport whose ping/liveness behavior is flippable at runtime.
    struct ScriptedTransport {
        tools: Value,
        pings_fail: std::sync::atomic::AtomicBool,
        closed: std::sync::atomic::AtomicBool,
    }

    impl ScriptedTransport {
        fn new(tools: Value) -> Arc<Self> {
            Arc::new(Self {
                tools,
                pings_fail: std::sync::atomic::AtomicBool::new(false),
                closed: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn call(
            &self,
            method: &str,
            params: Option<Value>,
            _deadline: Duration,
        ) -> Result<Value, TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            match method {
                "tools/list" => Ok(json!({ "tools": self.tools })),
                "ping" => {
                    if self.pings_fail.load(Ordering::SeqCst) {
                        Err(TransportError::Timeout)
                    } else {
                        Ok(json!({}))
                    }
                }
                "tools/call" => {
                    let name = params
                        .as_ref()
                        .and_then(|p| p.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    Ok(json!({ "content": [{"type": "text", "text": name}] }))
                }
                other => Err(TransportError::Protocol(format!("unexpected {other}"))),
            }
        }

        async fn close(&self) {}
    }

    /// Connector with a per-server script of transports and failures.
    #[derive(Default)]
    struct ScriptedConnector {
        outcomes: StdMutex<Vec<Result<Arc<ScriptedTransport>, String>>>,
        attempts: AtomicU32,
    }

    impl ScriptedConnector {
        fn always(transport: Arc<ScriptedTransport>) -> Arc<Self> {
            let connector = Self::default();
            // A long script so reconnects keep succeeding.
            let mut outcomes = Vec::new();
            for _ in 0..32 {
                outcomes.push(Ok(Arc::clone(&transport)));
            }
            *connector.outcomes.lock().unwrap() = outcomes;
            Arc::new(connector)
        }

        fn script(outcomes: Vec<Result<Arc<ScriptedTransport>, String>>) -> Arc<Self> {
            let connector = Self::default();
            *connector.outcomes.lock().unwrap() = outcomes;
            Arc::new(connector)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &self,
            _descriptor: &ServerDescriptor,
            _timeout: Duration,
        ) -> Result<Connection, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                return Err(TransportError::Spawn("script exhausted".to_string()));
            }
            match outcomes.remove(0) {
                Ok(transport) => Ok(Connection {
                    transport,
                    info: None,
                }),
                Err(reason) => Err(TransportError::Spawn(reason)),
            }
        }
    }

    fn fast_config() -> RegistryConfig {
        RegistryConfig {
            connect_timeout_ms: 1_000,
            call_timeout_ms: 1_000,
            health_interval_ms: 10,
            failure_threshold: 3,
        }
    }

    fn descriptor(name: &str, priority: i32) -> ServerDescriptor {
        ServerDescriptor::stdio(name, "mock-server", vec![]).with_priority(priority)
    }

    fn two_tools() -> Value {
        json!([
            {"name": "solve_n_queens", "description": "Solve N-Queens",
             "inputSchema": {"type": "object", "properties": {"n": {"type": "number"}}, "required": ["n"]}},
            {"name": "list_moves", "description": "List legal moves"}
        ])
    }

    async fn wait_for_state(
        registry: &ServerRegistry,
        name: &str,
        state: ConnectionState,
    ) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if registry.state_of(name).await == Some(state) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "server '{name}' never reached {state:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_register_discovers_every_tool_exactly_once() {
        let connector = ScriptedConnector::always(ScriptedTransport::new(two_tools()));
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        registry.register(descriptor("puzzles", 0)).await.unwrap();
        assert_eq!(
            registry.state_of("puzzles").await,
            Some(ConnectionState::Ready)
        );

        let catalog = registry.catalog().await;
        let names: Vec<&str> = catalog.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["list_moves", "solve_n_queens"]);
        assert!(catalog.collisions.is_empty());
        assert!(catalog.tools.iter().all(|t| t.server == "puzzles"));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_collision_prefers_higher_priority_and_is_recorded() {
        let tools = json!([{"name": "search", "description": "Search"}]);
        let connector = ScriptedConnector::script(vec![
            Ok(ScriptedTransport::new(tools.clone())),
            Ok(ScriptedTransport::new(tools)),
        ]);
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        registry.register(descriptor("low", 1)).await.unwrap();
        registry.register(descriptor("high", 9)).await.unwrap();

        let catalog = registry.catalog().await;
        assert_eq!(catalog.tools.len(), 1);
        assert_eq!(catalog.tools[0].server, "high");
        assert_eq!(catalog.collisions.len(), 1);
        assert_eq!(catalog.collisions[0].winner, "high");
        assert_eq!(catalog.collisions[0].loser, "low");

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_unregister_prunes_tools() {
        let connector = ScriptedConnector::always(ScriptedTransport::new(two_tools()));
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        registry.register(descriptor("puzzles", 0)).await.unwrap();
        assert_eq!(registry.catalog().await.tools.len(), 2);

        registry.unregister("puzzles").await.unwrap();
        assert!(registry.catalog().await.tools.is_empty());
        assert!(registry.server_status().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_descriptor_stays_disconnected() {
        let connector = ScriptedConnector::script(vec![]);
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector.clone());

        registry
            .register(descriptor("dormant", 0).with_enabled(false))
            .await
            .unwrap();

        assert_eq!(
            registry.state_of("dormant").await,
            Some(ConnectionState::Disconnected)
        );
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
        assert!(registry.catalog().await.tools.is_empty());
    }

    #[tokio::test]
    async fn test_connect_exhaustion_marks_failed_with_bounded_attempts() {
        let connector = ScriptedConnector::script(vec![
            Err("spawn failed".to_string()),
            Err("spawn failed".to_string()),
            Err("spawn failed".to_string()),
        ]);
        let registry = ServerRegistry::with_connector(
            Arc::new(NoopSink::new()),
            RegistryConfig {
                health_interval_ms: 60_000, // Keep the health loop out of this test
                ..fast_config()
            },
            connector.clone(),
        );

        let mut desc = descriptor("broken", 0);
        desc.retry.max_attempts = 3;
        desc.retry.initial_backoff_ms = 1;

        let result = registry.register(desc).await;
        assert!(matches!(result, Err(RegistryError::ConnectFailed { .. })));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            registry.state_of("broken").await,
            Some(ConnectionState::Failed)
        );

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_demotes_ready_degraded_failed_then_reconnects() {
        let transport = ScriptedTransport::new(two_tools());
        let connector = ScriptedConnector::always(Arc::clone(&transport));
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        let mut desc = descriptor("flaky", 0);
        desc.retry.initial_backoff_ms = 1;
        registry.register(desc).await.unwrap();
        wait_for_state(&registry, "flaky", ConnectionState::Ready).await;

        transport.pings_fail.store(true, Ordering::SeqCst);
        wait_for_state(&registry, "flaky", ConnectionState::Degraded).await;
        wait_for_state(&registry, "flaky", ConnectionState::Failed).await;

        // Reconnect succeeds (scripted connector keeps handing transports
        // out) and healthy pings hold the server Ready again.
        transport.pings_fail.store(false, Ordering::SeqCst);
        wait_for_state(&registry, "flaky", ConnectionState::Ready).await;

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_degraded_server_recovers_on_healthy_ping() {
        let transport = ScriptedTransport::new(two_tools());
        let connector = ScriptedConnector::always(Arc::clone(&transport));
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        registry.register(descriptor("wobbly", 0)).await.unwrap();
        wait_for_state(&registry, "wobbly", ConnectionState::Ready).await;

        transport.pings_fail.store(true, Ordering::SeqCst);
        wait_for_state(&registry, "wobbly", ConnectionState::Degraded).await;

        // Degraded servers still serve their tools.
        assert_eq!(registry.catalog().await.tools.len(), 2);

        transport.pings_fail.store(false, Ordering::SeqCst);
        wait_for_state(&registry, "wobbly", ConnectionState::Ready).await;

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_connection_fails_server_on_call() {
        let transport = ScriptedTransport::new(two_tools());
        let connector = ScriptedConnector::always(Arc::clone(&transport));
        let registry = ServerRegistry::with_connector(
            Arc::new(NoopSink::new()),
            RegistryConfig {
                health_interval_ms: 60_000,
                ..fast_config()
            },
            connector,
        );

        registry.register(descriptor("crashy", 0)).await.unwrap();
        assert_eq!(registry.catalog().await.tools.len(), 2);

        // The child dies; the very next call must fail the server rather
        // than leave it Ready until pings notice.
        transport.closed.store(true, Ordering::SeqCst);
        let result = registry
            .call_tool("crashy", "solve_n_queens", Map::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::Transport(TransportError::Closed))
        ));
        assert_eq!(
            registry.state_of("crashy").await,
            Some(ConnectionState::Failed)
        );
        assert!(registry.catalog().await.tools.is_empty());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_closed_connection_fails_server_on_first_ping() {
        let transport = ScriptedTransport::new(two_tools());
        // One connect only, so the failure is observable without the health
        // task bouncing the server back up.
        let connector = ScriptedConnector::script(vec![Ok(Arc::clone(&transport))]);
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        registry.register(descriptor("crashy", 0)).await.unwrap();
        wait_for_state(&registry, "crashy", ConnectionState::Ready).await;

        // No Degraded stop-over: one Closed ping is terminal.
        transport.closed.store(true, Ordering::SeqCst);
        wait_for_state(&registry, "crashy", ConnectionState::Failed).await;

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_tool_on_unavailable_server() {
        let connector = ScriptedConnector::script(vec![]);
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        registry
            .register(descriptor("dormant", 0).with_enabled(false))
            .await
            .unwrap();

        let result = registry
            .call_tool("dormant", "search", Map::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));

        let result = registry
            .call_tool("ghost", "search", Map::new(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_apply_config_diffs_against_live_registry() {
        let connector = ScriptedConnector::always(ScriptedTransport::new(two_tools()));
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        registry.register(descriptor("keep", 0)).await.unwrap();
        registry.register(descriptor("drop", 0)).await.unwrap();
        registry.register(descriptor("change", 0)).await.unwrap();

        let diff = registry
            .apply_config(vec![
                descriptor("keep", 0),
                descriptor("change", 7), // Priority changed
                descriptor("fresh", 0),
            ])
            .await;

        assert_eq!(diff.added, vec!["fresh"]);
        assert_eq!(diff.removed, vec!["drop"]);
        assert_eq!(diff.replaced, vec!["change"]);
        assert!(registry.state_of("drop").await.is_none());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_probe_does_not_register() {
        let connector = ScriptedConnector::always(ScriptedTransport::new(two_tools()));
        let registry =
            ServerRegistry::with_connector(Arc::new(NoopSink::new()), fast_config(), connector);

        let tools = registry.probe(&descriptor("candidate", 0)).await.unwrap();
        assert_eq!(tools.len(), 2);
        assert!(registry.server_status().await.is_empty());
    }
}

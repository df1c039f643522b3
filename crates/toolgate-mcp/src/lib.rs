//! MCP JSON-RPC transports and server registry.
//!
//! Implements the MCP protocol (JSON-RPC 2.0) over two transports — a stdio
//! child process and a stateless HTTP endpoint — and the registry that owns
//! server connection state machines, health checks, reconnects, and the
//! aggregated tool catalog.
//!
//! Reference: <https://spec.modelcontextprotocol.io/>

pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use error::{RegistryError, TransportError};
pub use protocol::{InitializeResult, ServerCapabilities, ServerInfo};
pub use registry::{
    Catalog, CatalogCollision, ConfigDiff, Connector, DefaultConnector, RegistryConfig,
    ServerRegistry,
};
pub use transport::{Transport, connect};

//! Domain types shared across the transport, registry, and routing layers.

pub mod execution;
pub mod routing;
pub mod server;
pub mod tool;

pub use execution::{ErrorKind, ExecuteOptions, ExecutionError, ExecutionResult};
pub use routing::{RankedTool, RoutePath, RouterConfig, RoutingDecision, ScoringWeights};
pub use server::{ConnectionState, RetryPolicy, ServerDescriptor, ServerStatus, TransportKind};
pub use tool::{ToolCallResult, ToolDescriptor};

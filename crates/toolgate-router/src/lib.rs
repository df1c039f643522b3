//! Smart routing on top of the MCP registry.
//!
//! A keyword + embedding tool index with learned success rates, a three-way
//! intent router (direct / hybrid / llm-only), and an executor that validates
//! inputs against tool schemas, retries transient transport failures, and
//! enriches errors with actionable hints. [`Toolgate`] ties the pieces
//! together behind one facade.

pub mod error;
pub mod executor;
pub mod index;
pub mod intent;
pub mod router;
pub mod service;

pub use error::RouterError;
pub use executor::Executor;
pub use index::ToolIndex;
pub use router::IntentRouter;
pub use service::{ServiceReply, Toolgate};

//! Host-neutral tool model for Tether.
//!
//! MCP servers describe their tools with JSON Schema fragments. This crate
//! converts those fragments into an explicit recursive parameter tree that
//! the orchestration layer can inspect, and re-emits the tree as
//! provider-specific tool schemas.

pub mod parameter;
pub mod schema;

pub use parameter::{Parameter, ParameterKind, ToolDescriptor};
pub use schema::{anthropic_properties, openai_schema};

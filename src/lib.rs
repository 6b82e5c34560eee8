//! grasshopper-mcp: MCP server bridging AI assistants to Rhino Grasshopper
//!
//! The server exposes Grasshopper operations as MCP tools. Each tool call is
//! forwarded to the Grasshopper MCP component, a plugin that listens on a TCP
//! port inside Rhino, as one line of JSON.
//!
//! # Architecture
//!
//! The bridge is thin. Grasshopper owns the canvas; this crate handles:
//!
//! - **Framing**: one JSON object per line, legacy or JSON-RPC 2.0 envelope
//! - **Request shaping**: component name synonyms, input port selection
//! - **Enrichment**: catalog details from a bundled knowledge base
//!
//! # Modules
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Configuration error types
//! - [`grasshopper`] - Transport, envelope codec and command dispatcher
//! - [`mcp`] - MCP protocol implementation

pub mod config;
pub mod error;
pub mod grasshopper;
pub mod mcp;

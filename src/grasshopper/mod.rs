//! Bridge to the Grasshopper MCP component.
//!
//! The component runs inside Rhino/Grasshopper and listens on a TCP port. Every
//! request is one JSON line, every response is one JSON line.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ CommandDispatcher │──▶│    Client    │──▶│   Envelope   │──▶│ TcpTransport │──▶ Grasshopper
//! │ (tools/resources) │   │ (never fails)│   │ legacy/RPC   │   │ (1 conn/call)│
//! └───────────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!          │
//!          ▼
//!  heuristics + knowledge base
//! ```
//!
//! # Wire shapes
//!
//! - Legacy: `{"type": <command>, "parameters": {...}}` answered by `{"success": bool, ...}`
//! - JSON-RPC 2.0: `{"jsonrpc": "2.0", "id", "method", "params"}` answered by `result` or `error`
//!
//! Responses of either shape are normalised into [`HostResult`] at the codec boundary.

pub mod client;
pub mod commands;
pub mod envelope;
pub mod error;
pub mod heuristics;
pub mod knowledge;
pub mod transport;

pub use client::GrasshopperClient;
pub use commands::{CommandDispatcher, ConnectRequest};
pub use envelope::{EnvelopeCodec, HostCommand, HostRequest, HostResult, Parameters, WireProtocol};
pub use error::{CommandError, HostError, KnowledgeError};
pub use heuristics::PortRef;
pub use knowledge::{KnowledgeBase, KnowledgeBaseAccessor, KnowledgeSource};
pub use transport::TcpTransport;

//! In-process stand-in for the Grasshopper component.
//!
//! Listens on an ephemeral port, decodes each request line with the crate's own
//! codec, records it, and answers with whatever the scripted responder returns.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use grasshopper_mcp::grasshopper::{
    CommandDispatcher, EnvelopeCodec, GrasshopperClient, HostCommand, HostRequest,
    KnowledgeBaseAccessor, TcpTransport, WireProtocol,
};

type Responder = dyn Fn(&HostRequest) -> Value + Send + Sync;

/// A scripted fake Grasshopper host.
pub struct FakeHost {
    port: u16,
    requests: Arc<Mutex<Vec<HostRequest>>>,
    task: JoinHandle<()>,
}

impl FakeHost {
    /// Starts a host that answers every request with `responder(request)`.
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&HostRequest) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let mut reader = BufReader::new(socket);
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    continue;
                }

                let request = EnvelopeCodec::decode_request(line.as_bytes()).unwrap();
                let mut reply = responder(&request).to_string();
                reply.push('\n');
                recorded.lock().unwrap().push(request);

                let _ = reader.get_mut().write_all(reply.as_bytes()).await;
            }
        });

        Self {
            port,
            requests,
            task,
        }
    }

    /// Port the host listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<HostRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Commands received so far, in arrival order.
    pub fn commands(&self) -> Vec<HostCommand> {
        self.requests().into_iter().map(|r| r.command).collect()
    }

    /// The last request carrying `command`.
    pub fn last(&self, command: HostCommand) -> HostRequest {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.command == command)
            .unwrap_or_else(|| panic!("no {command} request received"))
    }

    /// A client pointed at this host.
    pub fn client(&self, protocol: WireProtocol) -> GrasshopperClient {
        let transport = TcpTransport::new("127.0.0.1", self.port, Duration::from_secs(2));
        GrasshopperClient::new(transport, protocol)
    }

    /// A dispatcher pointed at this host, using the built-in knowledge base.
    pub fn dispatcher(&self) -> CommandDispatcher {
        self.dispatcher_with(WireProtocol::Legacy)
    }

    /// A dispatcher pointed at this host speaking `protocol`.
    pub fn dispatcher_with(&self, protocol: WireProtocol) -> CommandDispatcher {
        CommandDispatcher::new(
            self.client(protocol),
            Arc::new(KnowledgeBaseAccessor::default()),
        )
    }
}

impl Drop for FakeHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Legacy success reply with `result` as payload.
pub fn ok(result: Value) -> Value {
    json!({ "success": true, "result": result })
}

/// Legacy failure reply.
pub fn fail(error: &str) -> Value {
    json!({ "success": false, "error": error })
}

/// A dispatcher pointed at a port nobody listens on.
pub async fn unreachable_dispatcher() -> CommandDispatcher {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = TcpTransport::new("127.0.0.1", port, Duration::from_millis(500));
    CommandDispatcher::new(
        GrasshopperClient::new(transport, WireProtocol::Legacy),
        Arc::new(KnowledgeBaseAccessor::default()),
    )
}

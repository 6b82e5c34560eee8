//! Request/response client for the Grasshopper component.

use serde_json::Value;

use crate::grasshopper::envelope::{
    EnvelopeCodec, HostCommand, HostRequest, HostResult, Parameters, ResponseEnvelope, WireProtocol,
};
use crate::grasshopper::error::HostError;
use crate::grasshopper::transport::TcpTransport;

/// Sends commands to Grasshopper and normalises every outcome into a [`HostResult`].
#[derive(Debug, Clone)]
pub struct GrasshopperClient {
    transport: TcpTransport,
    codec: EnvelopeCodec,
}

impl GrasshopperClient {
    /// Creates a client over `transport` speaking `protocol`.
    #[must_use]
    pub const fn new(transport: TcpTransport, protocol: WireProtocol) -> Self {
        Self {
            transport,
            codec: EnvelopeCodec::new(protocol),
        }
    }

    /// Returns the outbound envelope shape.
    #[must_use]
    pub const fn protocol(&self) -> WireProtocol {
        self.codec.protocol()
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &TcpTransport {
        &self.transport
    }

    /// Sends one command and waits for its response.
    ///
    /// Never fails: transport and protocol errors come back as
    /// `{"success": false, "error": <message>}`.
    pub async fn send(&self, command: HostCommand, params: Parameters) -> HostResult {
        let request = self.codec.request(command, params);
        tracing::debug!(
            command = %command,
            params = %serde_json::to_string(&request.params).unwrap_or_default(),
            address = self.transport.address(),
            "Sending command to Grasshopper"
        );

        match self.exchange(&request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "Grasshopper request failed");
                HostResult::failure(e.to_string())
            }
        }
    }

    /// Sends a command that takes no parameters.
    pub async fn send_empty(&self, command: HostCommand) -> HostResult {
        self.send(command, Parameters::new()).await
    }

    async fn exchange(&self, request: &HostRequest) -> Result<HostResult, HostError> {
        let payload = self.codec.encode(request)?;
        let raw = self.transport.exchange(&payload).await?;
        tracing::debug!(
            command = %request.command,
            response = %String::from_utf8_lossy(&raw).trim_end(),
            "Response received"
        );

        let envelope = ResponseEnvelope::parse(&raw)?;
        if let (Some(sent), Some(received)) = (request.id.as_deref(), envelope.correlation_id()) {
            if received.as_str() != Some(sent) {
                tracing::warn!(
                    expected = sent,
                    received = %received,
                    "Response id does not match request id"
                );
            }
        }
        Ok(envelope.into_result())
    }
}

/// Extracts a list payload (e.g. from `get_connections`), or an empty list.
#[must_use]
pub fn payload_list(result: &HostResult) -> Vec<Value> {
    if !result.is_success() {
        return Vec::new();
    }
    result.payload().as_array().cloned().unwrap_or_default()
}

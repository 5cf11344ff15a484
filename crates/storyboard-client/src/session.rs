use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClientError;
use crate::transport::{ReqwestTransport, Transport};

/// Connection to one generation service for the length of a run.
///
/// Holds the transport and the client id every submission is tagged with.
/// Components take a `&Session` instead of reaching for global state, so
/// several sessions can coexist in one process.
#[derive(Clone)]
pub struct Session {
  transport: Arc<dyn Transport>,
  client_id: String,
}

impl Session {
  /// Create a session over an existing transport with a fresh client id.
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self {
      transport,
      client_id: uuid::Uuid::new_v4().to_string(),
    }
  }

  /// Create a session that talks HTTP to `server_address`.
  pub fn connect(server_address: &str, request_timeout: Duration) -> Result<Self, ClientError> {
    let transport = ReqwestTransport::new(server_address, request_timeout)?;
    Ok(Self::new(Arc::new(transport)))
  }

  /// Replace the generated client id.
  pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
    self.client_id = client_id.into();
    self
  }

  pub fn client_id(&self) -> &str {
    &self.client_id
  }

  pub fn transport(&self) -> &dyn Transport {
    self.transport.as_ref()
  }
}

impl fmt::Debug for Session {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Session")
      .field("client_id", &self.client_id)
      .finish_non_exhaustive()
  }
}

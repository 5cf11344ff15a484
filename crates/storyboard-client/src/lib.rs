//! Storyboard Client
//!
//! Talks to a running generation service over its HTTP API:
//!
//! - [`JobSubmitter`] queues a workflow (`POST /prompt`) and returns a [`JobHandle`].
//! - [`CompletionPoller`] polls `/history/{id}` and `/queue` at a fixed
//!   cadence until the job completes, fails, or times out.
//! - [`HistoryFetcher`] projects a finished job's history into [`ArtifactRef`]s.
//!
//! All network access goes through a [`Session`], which owns the
//! [`Transport`] and the client id shared by every request of one run. The
//! poller sleeps through a [`Clock`], so tests can run it on virtual time.

mod clock;
mod error;
mod history;
mod job;
mod poll;
mod session;
mod submit;
mod transport;

pub use clock::{Clock, ManualClock, TokioClock};
pub use error::ClientError;
pub use history::{ArtifactRef, HistoryFetcher, HistoryRecord};
pub use job::{ExecutionStatus, JobHandle};
pub use poll::{CompletionPoller, PollConfig};
pub use session::Session;
pub use submit::JobSubmitter;
pub use transport::{HttpResponse, MockTransport, ReqwestTransport, Transport, TransportError};

//! Per-connection request handling

use std::sync::Arc;

use tracing::{debug, info};

use super::protocol::{action_of, text_of, CameraInfo, FrameDescription, Reply, Request, ACK};
use crate::action::ActionHandler;
use crate::capture::Frame;
use crate::error::SessionError;
use crate::pipeline::{Advance, Rendezvous};
use crate::SessionConfig;

/// Server-side state of one connection.
///
/// `metadata` and `frame` both answer from the session's own snapshot, which
/// only moves forward after a `frame` has been sent.
pub struct Session {
    rendezvous: Rendezvous,
    actions: Arc<dyn ActionHandler>,
    config: SessionConfig,
    snapshot: Option<Frame>,
    /// The snapshot was delivered and the advance after it timed out
    stale: bool,
    /// `metadata` has reported the current snapshot
    described: bool,
    requests: u64,
}

impl Session {
    pub fn new(
        rendezvous: Rendezvous,
        actions: Arc<dyn ActionHandler>,
        config: SessionConfig,
    ) -> Self {
        let snapshot = rendezvous.frames().current_frame();
        Self {
            rendezvous,
            actions,
            config,
            snapshot,
            stale: false,
            described: false,
            requests: 0,
        }
    }

    pub fn report_errors(&self) -> bool {
        self.config.report_errors
    }

    /// Sequence number for the next request's tracing span.
    pub fn next_request(&mut self) -> u64 {
        self.requests += 1;
        self.requests
    }

    /// Decode, answer and finish one text message.
    pub async fn handle(&mut self, text: &str) -> Result<Reply, SessionError> {
        let request = Request::decode(text)?;
        let reply = self.respond(&request).await;
        self.finish(&request).await;
        reply
    }

    /// Build the reply for `request`. Call [`finish`](Self::finish) once the
    /// reply has been sent.
    pub async fn respond(&mut self, request: &Request) -> Result<Reply, SessionError> {
        match request {
            Request::Metadata => {
                let frame = self.refresh().await?;
                let description = FrameDescription::of(&frame);
                self.described = true;
                Ok(Reply::Text(to_json(&description)))
            }
            Request::Frame => {
                let frame = self.refresh().await?;
                let payload = frame.encoded.clone().unwrap_or_else(|| frame.data.clone());
                debug!(sequence = frame.sequence(), "Sending {} bytes of image data", payload.len());
                metrics::histogram!("frame_payload_bytes").record(payload.len() as f64);
                metrics::histogram!("frame_age_seconds").record(frame.age().as_secs_f64());
                Ok(Reply::Binary(payload))
            }
            Request::CameraInfo => Ok(Reply::Text(to_json(&CameraInfo {
                id: &self.config.camera_id,
                name: &self.config.camera_name,
            }))),
            Request::Execute(body) => {
                let action = action_of(body);
                debug!("Execute {}", action);
                self.actions.execute(&action);
                Ok(Reply::Text(ACK.into()))
            }
            Request::Result(body) => {
                self.rendezvous.results().push_result(text_of(body));
                Ok(Reply::Text(ACK.into()))
            }
            Request::Unknown(name) => Err(SessionError::BadRequest(format!(
                "unknown request {name:?}"
            ))),
        }
    }

    /// Post-reply step: a delivered frame moves the session to the next one.
    pub async fn finish(&mut self, request: &Request) {
        if *request == Request::Frame && self.snapshot.is_some() {
            self.described = false;
            self.advance().await;
        }
    }

    pub fn snapshot(&self) -> Option<&Frame> {
        self.snapshot.as_ref()
    }

    async fn refresh(&mut self) -> Result<Frame, SessionError> {
        if self.snapshot.is_none() {
            self.snapshot = self.rendezvous.frames().current_frame();
        }
        if self.snapshot.is_none() || (self.stale && !self.described) {
            self.advance().await;
        }
        self.snapshot.clone().ok_or(SessionError::NoFrame)
    }

    async fn advance(&mut self) -> bool {
        match self.rendezvous.next_frame().await {
            Advance::Ready(frame) => {
                debug!(sequence = frame.sequence(), "Advanced to next frame");
                self.snapshot = Some(frame);
                self.stale = false;
                self.described = false;
                true
            }
            Advance::TimedOut => {
                self.stale = true;
                false
            }
            Advance::Cancelled => {
                info!("Frame wait cancelled");
                false
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    // Plain structs of strings and integers always serialize.
    serde_json::to_string(value).unwrap_or_else(|_| ACK.into())
}

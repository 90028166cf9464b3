//! A scripted transport for testing request pipelines without a network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use parking_lot::Mutex;

use super::{Transport, TransportError, TransportRequest};

/// One scripted outcome for a [`MockTransport`] call.
#[derive(Debug)]
pub enum MockReply {
    /// Respond with this response.
    Response(http::Response<Bytes>),
    /// Fail with this error.
    Error(TransportError),
    /// Wait, then apply the inner reply.
    Delay(Duration, Box<MockReply>),
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<MockReply>,
    requests: Vec<TransportRequest>,
}

/// A transport which replays scripted replies and records what it was sent.
///
/// Replies are used in the order they were scripted. Once the script runs
/// out, the transport echoes each request back as a `200 OK` response with the
/// request's body and content type.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    /// A transport with an empty script, which echoes every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a reply.
    pub fn push(&self, reply: MockReply) -> &Self {
        self.state.lock().script.push_back(reply);
        self
    }

    /// Script a response with `status` and `body`.
    pub fn respond(&self, status: StatusCode, body: impl Into<Bytes>) -> &Self {
        let mut response = http::Response::new(body.into());
        *response.status_mut() = status;
        self.push(MockReply::Response(response))
    }

    /// Script a failure.
    pub fn fail(&self, error: TransportError) -> &Self {
        self.push(MockReply::Error(error))
    }

    /// Script a reply which arrives after `delay`.
    pub fn delay(&self, delay: Duration, reply: MockReply) -> &Self {
        self.push(MockReply::Delay(delay, Box::new(reply)))
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.state.lock().requests.len()
    }
}

fn echo(request: &TransportRequest) -> http::Response<Bytes> {
    let mut response = http::Response::new(request.request().body().clone());
    if let Some(content_type) = request.request().headers().get(CONTENT_TYPE) {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, content_type.clone());
    }
    response
}

async fn play(reply: MockReply) -> Result<http::Response<Bytes>, TransportError> {
    let mut reply = reply;
    loop {
        match reply {
            MockReply::Response(response) => return Ok(response),
            MockReply::Error(error) => return Err(error),
            MockReply::Delay(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

impl Transport for MockTransport {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<http::Response<Bytes>, TransportError>> {
        let reply = {
            let mut state = self.state.lock();
            let reply = state
                .script
                .pop_front()
                .unwrap_or_else(|| MockReply::Response(echo(&request)));
            state.requests.push(request);
            reply
        };
        tracing::trace!(calls = self.calls(), "mock transport called");
        Box::pin(play(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &'static str) -> TransportRequest {
        let request = http::Request::builder()
            .uri("http://example.com/")
            .header(CONTENT_TYPE, "text/plain")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap();
        TransportRequest::new(request, None)
    }

    #[tokio::test]
    async fn replays_script_then_echoes() {
        let transport = MockTransport::new();
        transport
            .fail(TransportError::Timeout)
            .respond(StatusCode::ACCEPTED, "scripted");

        let error = transport.execute(request("a")).await.unwrap_err();
        assert!(matches!(error, TransportError::Timeout));

        let response = transport.execute(request("b")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body(), "scripted");

        let response = transport.execute(request("c")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "c");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");

        assert_eq!(transport.calls(), 3);
        let bodies: Vec<_> = transport
            .requests()
            .iter()
            .map(|request| request.request().body().clone())
            .collect();
        assert_eq!(bodies, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn delayed_reply() {
        let transport = MockTransport::new();
        transport.delay(
            Duration::from_millis(20),
            MockReply::Error(TransportError::Cancelled),
        );

        let start = std::time::Instant::now();
        let error = transport.execute(request("a")).await.unwrap_err();
        assert!(matches!(error, TransportError::Cancelled));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}

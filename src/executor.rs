use tokio_util::sync::CancellationToken;

use crate::{
    AttemptOutcome, RawResponse, ReqwestTransport, RequestDescriptor, RequestError, Response,
    Result, RetryPolicy, Sleeper, TokioSleeper, Transport, TransportError,
};

/// Issues one logical request with a per-attempt deadline and a bounded,
/// fixed-delay retry policy.
///
/// Attempts run strictly one after another. The executor keeps no state
/// between calls, so independent requests may share it concurrently.
#[derive(Clone, Debug)]
pub struct RetryingRequestExecutor<T = ReqwestTransport, S = TokioSleeper> {
    transport: T,
    sleeper: S,
}

impl RetryingRequestExecutor {
    /// Production pairing: `reqwest` transport and tokio timer.
    pub fn reqwest() -> Self {
        Self::new(ReqwestTransport::new(), TokioSleeper)
    }
}

impl Default for RetryingRequestExecutor {
    fn default() -> Self {
        Self::reqwest()
    }
}

impl<T: Transport, S: Sleeper> RetryingRequestExecutor<T, S> {
    pub fn new(transport: T, sleeper: S) -> Self {
        Self { transport, sleeper }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Executes `request` under `policy` without an external cancellation
    /// signal.
    pub async fn execute(
        &self,
        request: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> Result<Response> {
        self.execute_with_cancel(request, policy, &CancellationToken::new())
            .await
    }

    /// Executes `request` under `policy`.
    ///
    /// Cancelling `cancel` ends the call with [`RequestError::Cancelled`]
    /// whether the executor is waiting for a response or between attempts,
    /// and aborts the in-flight transport operation.
    ///
    /// When every attempt fails with a retryable error, the error of the last
    /// attempt is returned.
    pub async fn execute_with_cancel(
        &self,
        request: &RequestDescriptor,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        policy.validate()?;

        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(RequestError::Cancelled);
            }

            match self.attempt(request, policy, cancel).await {
                AttemptOutcome::Success(response) => return Ok(response),
                AttemptOutcome::TerminalFailure(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        method = %request.method(),
                        url = request.url(),
                        attempt,
                        error = %err,
                        "request failed with terminal error"
                    );
                    return Err(err);
                }
                AttemptOutcome::RetryableFailure(err) => {
                    if attempt >= policy.max_attempts {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            method = %request.method(),
                            url = request.url(),
                            attempts = attempt,
                            error = %err,
                            "retry budget exhausted"
                        );
                        return Err(err);
                    }

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        method = %request.method(),
                        url = request.url(),
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = policy.delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                        _ = self.sleeper.sleep(policy.delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &RequestDescriptor,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let abort = cancel.child_token();
        let send = self.transport.send(request, abort.clone());
        let deadline = self.sleeper.sleep(policy.timeout);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abort.cancel();
                AttemptOutcome::TerminalFailure(RequestError::Cancelled)
            }
            result = send => classify(result),
            _ = deadline => {
                abort.cancel();
                AttemptOutcome::RetryableFailure(RequestError::Timeout {
                    timeout: policy.timeout,
                })
            }
        }
    }
}

/// Classifies the result of one transport call.
///
/// Only connection failures and 5xx responses are retryable here; timeouts
/// and cancellation are classified by the executor itself. A transport error
/// caused by the request itself (bad URL, bad header) is terminal.
pub fn classify(result: std::result::Result<RawResponse, TransportError>) -> AttemptOutcome {
    let raw = match result {
        Ok(raw) => raw,
        Err(err) if err.is_retryable() => {
            return AttemptOutcome::RetryableFailure(RequestError::Network(err))
        }
        Err(err) => return AttemptOutcome::TerminalFailure(RequestError::Network(err)),
    };

    if raw.is_success() {
        return match decode_payload(&raw.body) {
            Ok(body) => AttemptOutcome::Success(Response {
                status: raw.status,
                body,
            }),
            Err(err) => AttemptOutcome::TerminalFailure(err),
        };
    }

    if raw.is_server_error() {
        AttemptOutcome::RetryableFailure(RequestError::ServerError {
            status: raw.status,
            body: raw.body_text(),
        })
    } else {
        AttemptOutcome::TerminalFailure(RequestError::ClientError {
            status: raw.status,
            body: raw.body_text(),
        })
    }
}

fn decode_payload(body: &[u8]) -> Result<serde_json::Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|err| {
        RequestError::Decode(format!(
            "invalid response JSON: {err}; body: {}",
            String::from_utf8_lossy(body)
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::{classify, RetryingRequestExecutor};
    use crate::{
        AttemptOutcome, RawResponse, ReqwestTransport, RequestDescriptor, RequestError,
        RetryPolicy, TokioSleeper, TrackingSleeper, Transport, TransportError, TransportFuture,
    };

    const DELAY: Duration = Duration::from_millis(7);
    const TIMEOUT: Duration = Duration::from_millis(500);

    #[derive(Clone)]
    enum Step {
        Respond(u16, &'static str),
        Refuse,
        Reject,
        Hang,
    }

    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        fallback: Step,
        calls: AtomicUsize,
        aborts: Mutex<Vec<CancellationToken>>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Self::with_fallback(steps, Step::Respond(500, "script exhausted"))
        }

        fn repeating(step: Step) -> Arc<Self> {
            Self::with_fallback(Vec::new(), step)
        }

        fn with_fallback(steps: Vec<Step>, fallback: Step) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                fallback,
                calls: AtomicUsize::new(0),
                aborts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn abort_tokens(&self) -> Vec<CancellationToken> {
            self.aborts.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send<'a>(
            &'a self,
            _request: &'a RequestDescriptor,
            abort: CancellationToken,
        ) -> TransportFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.aborts.lock().unwrap().push(abort.clone());
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());

            Box::pin(async move {
                match step {
                    Step::Respond(status, body) => Ok(RawResponse::new(status, body)),
                    Step::Refuse => Err(TransportError::new("connection refused")),
                    Step::Reject => Err(TransportError::invalid_request(
                        "relative URL without a base",
                    )),
                    Step::Hang => {
                        abort.cancelled().await;
                        Err(TransportError::aborted())
                    }
                }
            })
        }
    }

    /// Dispatches each request to the script registered for its URL.
    struct RoutedTransport {
        routes: HashMap<&'static str, Arc<ScriptedTransport>>,
    }

    impl Transport for RoutedTransport {
        fn send<'a>(
            &'a self,
            request: &'a RequestDescriptor,
            abort: CancellationToken,
        ) -> TransportFuture<'a> {
            match self.routes.get(request.url()) {
                Some(script) => script.send(request, abort),
                None => Box::pin(async { Err(TransportError::new("no route")) }),
            }
        }
    }

    fn request() -> RequestDescriptor {
        RequestDescriptor::get("http://localhost/items")
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, DELAY, TIMEOUT)
    }

    #[tokio::test]
    async fn persistent_503_consumes_full_budget() {
        for n in 1..=5 {
            let transport = ScriptedTransport::repeating(Step::Respond(503, "unavailable"));
            let sleeper = TrackingSleeper::new();
            let executor = RetryingRequestExecutor::new(transport.clone(), sleeper.clone());

            let err = executor
                .execute(&request(), &policy(n))
                .await
                .expect_err("503 must never succeed");

            assert!(matches!(err, RequestError::ServerError { status: 503, .. }));
            assert_eq!(transport.calls(), n as usize);
            assert_eq!(sleeper.count(DELAY), n as usize - 1);
        }
    }

    #[tokio::test]
    async fn connection_errors_then_success_on_last_attempt() {
        for n in 2..=5 {
            let mut steps = vec![Step::Refuse; n as usize - 1];
            steps.push(Step::Respond(200, r#"{"ok": true}"#));
            let transport = ScriptedTransport::new(steps);
            let executor = RetryingRequestExecutor::new(transport.clone(), TrackingSleeper::new());

            let response = executor
                .execute(&request(), &policy(n))
                .await
                .expect("last attempt must succeed");

            assert_eq!(response.status, 200);
            assert_eq!(response.body, json!({"ok": true}));
            assert_eq!(transport.calls(), n as usize);
        }
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Step::Respond(404, "missing")]);
        let sleeper = TrackingSleeper::new();
        let executor = RetryingRequestExecutor::new(transport.clone(), sleeper.clone());

        let err = executor
            .execute(&request(), &policy(4))
            .await
            .expect_err("404 is terminal");

        match err {
            RequestError::ClientError { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "missing");
            }
            other => panic!("expected client error, got {other:?}"),
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(sleeper.count(DELAY), 0);
    }

    #[tokio::test]
    async fn invalid_request_is_not_retried() {
        let transport = ScriptedTransport::repeating(Step::Reject);
        let sleeper = TrackingSleeper::new();
        let executor = RetryingRequestExecutor::new(transport.clone(), sleeper.clone());

        let err = executor
            .execute(&request(), &policy(3))
            .await
            .expect_err("malformed request is terminal");

        assert!(matches!(&err, RequestError::Network(inner) if !inner.is_retryable()));
        assert!(!err.is_retryable());
        assert_eq!(transport.calls(), 1);
        assert_eq!(sleeper.count(DELAY), 0);
    }

    #[tokio::test]
    async fn relative_url_fails_once_with_reqwest() {
        let sleeper = TrackingSleeper::new();
        let executor = RetryingRequestExecutor::new(ReqwestTransport::new(), sleeper.clone());

        let err = executor
            .execute(&RequestDescriptor::get("/users"), &policy(3))
            .await
            .expect_err("relative URL cannot be sent");

        assert!(matches!(&err, RequestError::Network(inner) if !inner.is_retryable()));
        assert_eq!(sleeper.count(DELAY), 0);
        assert_eq!(sleeper.count(TIMEOUT), 1);
    }

    #[tokio::test]
    async fn invalid_header_name_fails_once_with_reqwest() {
        let sleeper = TrackingSleeper::new();
        let executor = RetryingRequestExecutor::new(ReqwestTransport::new(), sleeper.clone());
        let request = RequestDescriptor::get("http://127.0.0.1:9/items").header("bad header", "v");

        let err = executor
            .execute(&request, &policy(3))
            .await
            .expect_err("invalid header cannot be sent");

        assert!(!err.is_retryable());
        assert_eq!(sleeper.count(DELAY), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_are_independent() {
        let flaky = ScriptedTransport::new(vec![
            Step::Respond(503, "busy"),
            Step::Respond(200, r#"{"id": 1}"#),
        ]);
        let missing = ScriptedTransport::repeating(Step::Respond(404, "missing"));
        let transport = RoutedTransport {
            routes: HashMap::from([
                ("http://localhost/flaky", flaky.clone()),
                ("http://localhost/missing", missing.clone()),
            ]),
        };
        let executor = RetryingRequestExecutor::new(transport, TrackingSleeper::new());
        let flaky_request = RequestDescriptor::get("http://localhost/flaky");
        let missing_request = RequestDescriptor::get("http://localhost/missing");

        let flaky_policy = policy(3);
        let missing_policy = policy(3);
        let (flaky_result, missing_result) = tokio::join!(
            executor.execute(&flaky_request, &flaky_policy),
            executor.execute(&missing_request, &missing_policy),
        );

        let response = flaky_result.expect("second attempt must succeed");
        assert_eq!(response.body, json!({"id": 1}));
        assert_eq!(flaky.calls(), 2);

        assert!(matches!(
            missing_result,
            Err(RequestError::ClientError { status: 404, .. })
        ));
        assert_eq!(missing.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_success_body_is_terminal() {
        let transport = ScriptedTransport::new(vec![
            Step::Respond(200, "<html>oops</html>"),
            Step::Respond(200, "{}"),
        ]);
        let executor = RetryingRequestExecutor::new(transport.clone(), TrackingSleeper::new());

        let err = executor
            .execute(&request(), &policy(3))
            .await
            .expect_err("decode failure is terminal");

        assert!(matches!(err, RequestError::Decode(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn empty_success_body_decodes_to_null() {
        let transport = ScriptedTransport::new(vec![Step::Respond(204, "")]);
        let executor = RetryingRequestExecutor::new(transport, TrackingSleeper::new());

        let response = executor
            .execute(&request(), &policy(1))
            .await
            .expect("204 must succeed");

        assert_eq!(response.status, 204);
        assert_eq!(response.body, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn zero_attempts_fails_without_network_call() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, "{}")]);
        let executor = RetryingRequestExecutor::new(transport.clone(), TrackingSleeper::new());

        let err = executor
            .execute(&request(), &policy(0))
            .await
            .expect_err("zero attempts is invalid");

        assert!(matches!(err, RequestError::InvalidPolicy(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn already_cancelled_token_makes_no_call() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, "{}")]);
        let executor = RetryingRequestExecutor::new(transport.clone(), TrackingSleeper::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .execute_with_cancel(&request(), &policy(3), &cancel)
            .await
            .expect_err("cancelled before start");

        assert!(matches!(err, RequestError::Cancelled));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_transport_times_out_every_attempt() {
        let transport = ScriptedTransport::repeating(Step::Hang);
        let executor = RetryingRequestExecutor::new(transport.clone(), TokioSleeper);
        let started = tokio::time::Instant::now();

        let err = executor
            .execute(&request(), &policy(3))
            .await
            .expect_err("hanging transport must time out");

        assert!(matches!(err, RequestError::Timeout { timeout } if timeout == TIMEOUT));
        assert_eq!(transport.calls(), 3);
        assert!(transport
            .abort_tokens()
            .iter()
            .all(CancellationToken::is_cancelled));
        assert!(started.elapsed() >= TIMEOUT * 3 + DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_then_success_retries() {
        let transport = ScriptedTransport::new(vec![Step::Hang, Step::Respond(200, "[1,2]")]);
        let executor = RetryingRequestExecutor::new(transport.clone(), TokioSleeper);

        let response = executor
            .execute(&request(), &policy(2))
            .await
            .expect("second attempt must succeed");

        assert_eq!(response.body, json!([1, 2]));
        assert_eq!(transport.calls(), 2);
        let aborts = transport.abort_tokens();
        assert!(aborts[0].is_cancelled());
        assert!(!aborts[1].is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_flight_aborts_transport() {
        let transport = ScriptedTransport::repeating(Step::Hang);
        let executor = RetryingRequestExecutor::new(transport.clone(), TokioSleeper);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(5, DELAY, Duration::from_secs(60));

        let task = {
            let executor = executor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                executor
                    .execute_with_cancel(&request(), &policy, &cancel)
                    .await
            })
        };

        while transport.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let cancelled_at = tokio::time::Instant::now();
        cancel.cancel();

        let err = task
            .await
            .expect("task must not panic")
            .expect_err("cancelled call must fail");

        assert!(matches!(err, RequestError::Cancelled));
        assert!(cancelled_at.elapsed() < Duration::from_millis(1));
        assert_eq!(transport.calls(), 1);
        assert!(transport.abort_tokens()[0].is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_stops_retries() {
        let transport = ScriptedTransport::repeating(Step::Refuse);
        let executor = RetryingRequestExecutor::new(transport.clone(), TokioSleeper);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(1));

        let task = {
            let executor = executor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                executor
                    .execute_with_cancel(&request(), &policy, &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.calls(), 1);
        cancel.cancel();

        let err = task
            .await
            .expect("task must not panic")
            .expect_err("cancelled call must fail");

        assert!(matches!(err, RequestError::Cancelled));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn classify_boundaries() {
        assert!(classify(Ok(RawResponse::new(200, "{}"))).is_success());
        assert!(matches!(
            classify(Ok(RawResponse::new(599, ""))),
            AttemptOutcome::RetryableFailure(RequestError::ServerError { status: 599, .. })
        ));
        assert!(matches!(
            classify(Ok(RawResponse::new(600, ""))),
            AttemptOutcome::TerminalFailure(RequestError::ClientError { status: 600, .. })
        ));
        assert!(matches!(
            classify(Ok(RawResponse::new(302, ""))),
            AttemptOutcome::TerminalFailure(RequestError::ClientError { status: 302, .. })
        ));
        assert!(matches!(
            classify(Ok(RawResponse::new(429, ""))),
            AttemptOutcome::TerminalFailure(RequestError::ClientError { status: 429, .. })
        ));
        assert!(matches!(
            classify(Err(TransportError::new("reset"))),
            AttemptOutcome::RetryableFailure(RequestError::Network(_))
        ));
        assert!(matches!(
            classify(Err(TransportError::invalid_request("bad url"))),
            AttemptOutcome::TerminalFailure(RequestError::Network(_))
        ));
    }
}

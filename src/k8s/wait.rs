//! Polling helpers for readiness checks

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// How long and how often to poll
#[derive(Clone, Debug)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub interval: Duration,
    /// Read errors tolerated before giving up early
    pub tolerate_failures: u32,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            interval: Duration::from_secs(2),
            tolerate_failures: 5,
        }
    }
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn tolerate_failures(mut self, failures: u32) -> Self {
        self.tolerate_failures = failures;
        self
    }
}

/// Poll `fetch` until `ready` accepts its output
///
/// Returns the first accepted value. Read errors are retried until more than
/// `tolerate_failures` have been seen. On deadline the error carries the last
/// thing `describe` reported.
pub async fn poll_until<T, F, Fut, P, D>(
    what: &str,
    options: &WaitOptions,
    mut fetch: F,
    mut ready: P,
    describe: D,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&T) -> bool,
    D: Fn(&T) -> String,
{
    let start = Instant::now();
    let mut failures = 0u32;
    let mut last_observed: String;

    debug!(
        "Waiting for {} (timeout: {}s)",
        what,
        options.timeout.as_secs()
    );

    loop {
        match fetch().await {
            Ok(value) => {
                if ready(&value) {
                    info!("{} is ready after {}ms", what, start.elapsed().as_millis());
                    return Ok(value);
                }
                last_observed = describe(&value);
                debug!("{} not ready yet: {}", what, last_observed);
            }
            Err(e) => {
                failures += 1;
                if failures > options.tolerate_failures {
                    warn!("Giving up on {} after {} failed reads", what, failures);
                    return Err(e);
                }
                debug!("Error while waiting for {}: {}", what, e);
                last_observed = format!("read error: {e}");
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= options.timeout {
            warn!("Timeout waiting for {}: {}", what, last_observed);
            return Err(Error::not_ready(what, elapsed, last_observed));
        }

        sleep(options.interval.min(options.timeout - elapsed)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn quick() -> WaitOptions {
        WaitOptions::new()
            .timeout(Duration::from_millis(200))
            .interval(Duration::from_millis(5))
    }

    fn scripted(
        values: Vec<Result<&'static str>>,
    ) -> impl FnMut() -> std::future::Ready<Result<&'static str>> {
        let mut queue: VecDeque<_> = values.into();
        move || {
            let next = queue.pop_front().unwrap_or(Ok("False"));
            std::future::ready(next)
        }
    }

    #[tokio::test]
    async fn test_returns_once_ready() {
        let fetch = scripted(vec![Ok("Unknown"), Ok("False"), Ok("True")]);
        let value = poll_until("policy", &quick(), fetch, |s| *s == "True", |s| s.to_string())
            .await
            .unwrap();
        assert_eq!(value, "True");
    }

    #[tokio::test]
    async fn test_wrong_value_times_out() {
        let fetch = scripted(Vec::new());
        let err = poll_until("policy", &quick(), fetch, |s| *s == "True", |s| s.to_string())
            .await
            .unwrap_err();

        match err {
            Error::NotReady { last_observed, .. } => assert_eq!(last_observed, "False"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_tolerates_read_errors() {
        let fetch = scripted(vec![
            Err(Error::Config("transient".to_string())),
            Err(Error::Config("transient".to_string())),
            Ok("True"),
        ]);
        let value = poll_until("policy", &quick(), fetch, |s| *s == "True", |s| s.to_string())
            .await
            .unwrap();
        assert_eq!(value, "True");
    }

    #[tokio::test]
    async fn test_gives_up_after_too_many_errors() {
        let fetch = scripted(vec![
            Err(Error::Config("first".to_string())),
            Err(Error::Config("second".to_string())),
            Ok("True"),
        ]);
        let options = quick().tolerate_failures(1);
        let err = poll_until("policy", &options, fetch, |s| *s == "True", |s| s.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg == "second"));
    }

    #[tokio::test]
    async fn test_timeout_reports_tolerated_read_error() {
        let fetch = scripted(vec![Err(Error::Config("flaky".to_string()))]);
        let options = quick().timeout(Duration::ZERO).tolerate_failures(3);
        let err = poll_until("policy", &options, fetch, |s| *s == "True", |s| s.to_string())
            .await
            .unwrap_err();

        match err {
            Error::NotReady { last_observed, .. } => {
                assert!(last_observed.starts_with("read error:"));
                assert!(last_observed.contains("flaky"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

use std::cell::{Cell, RefCell};
use std::thread;

use serde_json::Value;
use tracing::{debug, warn};

use funnel_spec::FormEndpoint;

use crate::analytics::AnalyticsEvent;
use crate::error::TransportError;
use crate::submission::Submission;

/// Receives analytics events. Implementations must not block navigation.
pub trait AnalyticsSink {
    fn send(&self, event: &AnalyticsEvent) -> Result<(), TransportError>;
}

/// Delivers the final submission payload.
pub trait SubmissionTransport {
    fn submit(&self, submission: &Submission) -> Result<(), TransportError>;
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl AnalyticsSink for NullTransport {
    fn send(&self, _event: &AnalyticsEvent) -> Result<(), TransportError> {
        Ok(())
    }
}

impl SubmissionTransport for NullTransport {
    fn submit(&self, _submission: &Submission) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Keeps delivered payloads in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    events: RefCell<Vec<AnalyticsEvent>>,
    submissions: RefCell<Vec<Submission>>,
    failing_events: Cell<bool>,
    failing_submissions: Cell<bool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent event deliveries fail.
    pub fn fail_events(&self, failing: bool) {
        self.failing_events.set(failing);
    }

    /// Makes subsequent submissions fail.
    pub fn fail_submissions(&self, failing: bool) {
        self.failing_submissions.set(failing);
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.borrow().clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.borrow().clone()
    }
}

impl AnalyticsSink for MemoryTransport {
    fn send(&self, event: &AnalyticsEvent) -> Result<(), TransportError> {
        if self.failing_events.get() {
            return Err(TransportError::Unavailable("analytics sink offline".into()));
        }
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

impl SubmissionTransport for MemoryTransport {
    fn submit(&self, submission: &Submission) -> Result<(), TransportError> {
        if self.failing_submissions.get() {
            return Err(TransportError::Unavailable("submission endpoint offline".into()));
        }
        self.submissions.borrow_mut().push(submission.clone());
        Ok(())
    }
}

/// Posts events and submissions to the host REST API.
///
/// Events go to `{rest_url}analytics` on a detached thread; the submission is
/// posted synchronously to `{rest_url}submit` unless a submit URL is given.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    rest_url: String,
    submit_url: Option<String>,
    nonce: Option<String>,
}

impl HttpTransport {
    pub fn new(rest_url: impl Into<String>) -> Self {
        let mut rest_url = rest_url.into();
        if !rest_url.ends_with('/') {
            rest_url.push('/');
        }
        Self {
            rest_url,
            submit_url: None,
            nonce: None,
        }
    }

    /// Derives the REST base from the form's submit URL.
    pub fn from_form(form: &FormEndpoint) -> Self {
        let base = form
            .submit_url
            .trim_end_matches('/')
            .trim_end_matches("submit");
        let mut transport = Self::new(base);
        transport.submit_url = Some(form.submit_url.clone());
        transport.nonce = form.nonce.clone();
        transport
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn analytics_url(&self) -> String {
        format!("{}analytics", self.rest_url)
    }

    pub fn submit_url(&self) -> String {
        self.submit_url
            .clone()
            .unwrap_or_else(|| format!("{}submit", self.rest_url))
    }
}

fn post_json(url: &str, nonce: Option<&str>, body: &Value) -> Result<(), TransportError> {
    let mut request = ureq::post(url);
    if let Some(nonce) = nonce {
        request = request.header("X-WP-Nonce", nonce);
    }
    request
        .send_json(body)
        .map(|_| ())
        .map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })
}

impl AnalyticsSink for HttpTransport {
    fn send(&self, event: &AnalyticsEvent) -> Result<(), TransportError> {
        let body = serde_json::to_value(event)?;
        let url = self.analytics_url();
        let nonce = self.nonce.clone();
        let kind = event.kind.as_str();
        thread::Builder::new()
            .name("funnel-analytics".into())
            .spawn(move || {
                if let Err(err) = post_json(&url, nonce.as_deref(), &body) {
                    warn!(event = kind, error = %err, "analytics post failed");
                }
            })
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        Ok(())
    }
}

impl SubmissionTransport for HttpTransport {
    fn submit(&self, submission: &Submission) -> Result<(), TransportError> {
        let body = serde_json::to_value(submission)?;
        let url = self.submit_url();
        debug!(url = %url, session = %submission.session_id, "posting submission");
        post_json(&url, self.nonce.as_deref(), &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_urls_are_derived_from_submit_url() {
        let transport = HttpTransport::from_form(&FormEndpoint {
            submit_url: "https://example.test/wp-json/ze-funnel/v1/submit".into(),
            nonce: Some("n1".into()),
        });
        assert_eq!(
            transport.analytics_url(),
            "https://example.test/wp-json/ze-funnel/v1/analytics"
        );
        assert_eq!(
            transport.submit_url(),
            "https://example.test/wp-json/ze-funnel/v1/submit"
        );
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:8080/api").with_nonce("n");
        assert_eq!(transport.analytics_url(), "http://localhost:8080/api/analytics");
        assert_eq!(transport.submit_url(), "http://localhost:8080/api/submit");
    }
}

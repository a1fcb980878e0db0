use super::{PipelineAck, PipelineError, PipelineRequest, PipelineTrigger};
use crate::credentials::Authorization;
use crate::shared::http::{classify_error, encode_query, http_agent, join_url, HttpFailure};
use crate::shared::logging::EventLog;
use std::time::Duration;

pub const DEFAULT_MAX_AUTHORIZATION_AGE: Duration = Duration::from_secs(60);

/// Triggers `<base_url>/<target>/buildWithParameters` with basic auth, the
/// crumb header, and the crumb's session cookie.
#[derive(Debug, Clone)]
pub struct JenkinsPipeline {
    base_url: String,
    timeout: Duration,
    max_authorization_age: Duration,
    log: EventLog,
}

impl JenkinsPipeline {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            max_authorization_age: DEFAULT_MAX_AUTHORIZATION_AGE,
            log: EventLog::disabled(),
        }
    }

    pub fn with_max_authorization_age(mut self, age: Duration) -> Self {
        self.max_authorization_age = age;
        self
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    fn build_url(&self, request: &PipelineRequest) -> String {
        let endpoint = if request.parameters.is_empty() {
            "build"
        } else {
            "buildWithParameters"
        };
        let url = join_url(
            &join_url(&self.base_url, request.target.trim_matches('/')),
            endpoint,
        );
        if request.parameters.is_empty() {
            return url;
        }
        let pairs: Vec<(&str, &str)> = request
            .parameters
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        format!("{url}?{}", encode_query(&pairs))
    }
}

impl PipelineTrigger for JenkinsPipeline {
    fn trigger(
        &self,
        request: &PipelineRequest,
        authorization: Authorization,
    ) -> Result<PipelineAck, PipelineError> {
        let age = authorization.age();
        if age > self.max_authorization_age {
            return Err(PipelineError::StaleAuthorization {
                age_ms: u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let url = self.build_url(request);
        let token = authorization.anti_forgery();
        let mut call = http_agent(self.timeout)
            .post(&url)
            .set("Authorization", &authorization.session_header())
            .set(&token.field, &token.value);
        if let Some(cookie) = &token.session_cookie {
            call = call.set("Cookie", cookie);
        }
        self.log.info(
            "pipeline.trigger",
            format!(
                "target={} params={} username={}",
                request.target,
                request.parameters.len(),
                authorization.username()
            ),
        );

        match call.call() {
            Ok(response) => {
                let ack = PipelineAck {
                    status_code: response.status(),
                    queue_url: response.header("Location").map(str::to_string),
                };
                self.log.info(
                    "pipeline.accepted",
                    format!(
                        "target={} status={} queue_url={}",
                        request.target,
                        ack.status_code,
                        ack.queue_url.as_deref().unwrap_or("-")
                    ),
                );
                Ok(ack)
            }
            Err(err) => {
                let err = match classify_error(err) {
                    HttpFailure::Status { status, body } if status == 401 || status == 403 => {
                        PipelineError::Authentication { status, body }
                    }
                    HttpFailure::Status { status, body } => PipelineError::Rejected { status, body },
                    HttpFailure::Transport(reason) => PipelineError::Transport(reason),
                };
                self.log.error(
                    "pipeline.failed",
                    format!("target={} error={err}", request.target),
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameterized_requests_use_build_with_parameters() {
        let pipeline = JenkinsPipeline::new("https://ci.example.com/jenkins/", Duration::from_secs(5));
        let request = PipelineRequest::new("/job/Devops/job/ProvideAccess/")
            .param("Option", "AWS,GitHub")
            .param("userEmail", "jane.doe@example.com");
        assert_eq!(
            pipeline.build_url(&request),
            "https://ci.example.com/jenkins/job/Devops/job/ProvideAccess/buildWithParameters?Option=AWS%2CGitHub&userEmail=jane.doe%40example.com"
        );
    }

    #[test]
    fn bare_requests_use_build() {
        let pipeline = JenkinsPipeline::new("https://ci.example.com", Duration::from_secs(5));
        assert_eq!(
            pipeline.build_url(&PipelineRequest::new("job/nightly")),
            "https://ci.example.com/job/nightly/build"
        );
    }
}

//! swagfuzz-runner: trial execution engine
//!
//! Loads a Swagger document, compiles it into a trial strategy, and drives
//! a property-test runner over it: each trial synthesizes one HTTP request,
//! sends it, and judges the response against the document. Failing trials
//! are shrunk before being reported.

pub mod checks;
pub mod loader;
pub mod synth;

use std::time::Duration;

use proptest::test_runner::{Config, TestCaseError, TestError, TestRunner};

use swagfuzz_core::Settings;

pub use checks::{CheckInput, ContractViolation, run_checks};
pub use loader::{load_spec, parse_document};
pub use synth::{
    Body, PreparedRequest, RequestContext, SynthesisError, TrialDraw, prepare, trials,
};

/// Drives the whole pipeline for one configured target.
pub struct Fuzzer {
    settings: Settings,
}

/// Result of a completed run. `failure`, when present, holds the shrunk
/// minimal trial.
#[derive(Debug)]
pub struct FuzzOutcome {
    pub cases: u32,
    pub failure: Option<FoundFailure>,
}

impl FuzzOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
pub struct FoundFailure {
    /// Violation report, one line per broken check.
    pub message: String,
    /// The minimal draw reproducing the failure.
    pub trial: TrialDraw,
}

struct HttpResponse {
    status: u16,
    content_type: Option<String>,
}

impl Fuzzer {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Override the number of trials.
    #[must_use]
    pub fn with_cases(mut self, cases: u32) -> Self {
        self.settings.cases = cases;
        self
    }

    /// Run the configured number of trials against the target.
    ///
    /// A contract violation is reported through the outcome, not as an
    /// error; errors mean the run itself could not proceed.
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be loaded, no operation
    /// compiles, the HTTP client cannot be built, or the harness aborts.
    pub fn run(&self) -> Result<FuzzOutcome, FuzzError> {
        let spec = loader::load_spec(&self.settings.spec)?;
        let strategy = synth::trials(&spec)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs_f64(self.settings.timeout_secs))
            .build()
            .map_err(|e| FuzzError::Http(e.to_string()))?;

        let paths = spec.paths().map_or(0, serde_json::Map::len);
        eprintln!(
            "Fuzzing {} path(s) at {} over {} trials",
            paths, self.settings.spec_host, self.settings.cases
        );

        // No failure persistence: trials target a live server, so replaying
        // a stored seed against changed state would only mislead.
        let mut runner = TestRunner::new(Config {
            cases: self.settings.cases,
            failure_persistence: None,
            ..Config::default()
        });

        let settings = &self.settings;
        let result = runner.run(&strategy, |draw| {
            let (request, context) = match synth::prepare(&draw, &spec, settings) {
                Ok(pair) => pair,
                Err(
                    SynthesisError::UnencodablePath { .. }
                    | SynthesisError::UnencodableHeader { .. },
                ) => {
                    return Err(TestCaseError::reject("drawn value not encodable"));
                }
                Err(other) => return Err(TestCaseError::fail(other.to_string())),
            };

            let response = send(&client, &request).map_err(|e| {
                TestCaseError::fail(format!("transport error on {}: {e}", request.url))
            })?;

            let violations = checks::run_checks(&CheckInput {
                spec: &spec,
                settings,
                request: &request,
                context: &context,
                status: response.status,
                content_type: response.content_type.as_deref(),
            });
            if violations.is_empty() {
                Ok(())
            } else {
                let report = violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                Err(TestCaseError::fail(report))
            }
        });

        match result {
            Ok(()) => Ok(FuzzOutcome {
                cases: self.settings.cases,
                failure: None,
            }),
            Err(TestError::Fail(reason, trial)) => {
                eprintln!(
                    "Minimal failing trial: {} {}",
                    trial.method.to_ascii_uppercase(),
                    trial.endpoint_path
                );
                Ok(FuzzOutcome {
                    cases: self.settings.cases,
                    failure: Some(FoundFailure {
                        message: reason.message().to_string(),
                        trial,
                    }),
                })
            }
            Err(TestError::Abort(reason)) => Err(FuzzError::Aborted(reason.message().to_string())),
        }
    }
}

fn send(
    client: &reqwest::blocking::Client,
    request: &PreparedRequest,
) -> Result<HttpResponse, String> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|_| format!("invalid HTTP method {:?}", request.method))?;

    let mut builder = client.request(method, request.url.clone());
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    builder = match &request.body {
        Body::None => builder,
        Body::Json(json) => builder.body(json.clone()),
        Body::Form(fields) => {
            let pairs: Vec<(String, String)> = fields
                .iter()
                .map(|(name, value)| (name.clone(), value.render()))
                .collect();
            builder.form(&pairs)
        }
    };

    let response = builder.send().map_err(|e| e.to_string())?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    Ok(HttpResponse {
        status: response.status().as_u16(),
        content_type,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum FuzzError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("fuzzing aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_spec_file_is_an_io_error() {
        let settings = Settings {
            spec: PathBuf::from("/nonexistent/swagger.json"),
            ..Settings::default()
        };
        let err = Fuzzer::new(settings).run().unwrap_err();
        assert!(matches!(err, FuzzError::Io(_)));
    }

    #[test]
    fn document_without_operations_fails_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{"swagger": "2.0", "paths": {}}"#).unwrap();

        let settings = Settings {
            spec: path,
            ..Settings::default()
        };
        let err = Fuzzer::new(settings).run().unwrap_err();
        assert!(matches!(
            err,
            FuzzError::Synthesis(SynthesisError::NoOperations)
        ));
    }

    #[test]
    fn with_cases_overrides_settings() {
        let fuzzer = Fuzzer::new(Settings::default()).with_cases(7);
        assert_eq!(fuzzer.settings.cases, 7);
    }
}

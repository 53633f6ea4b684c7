//! Response validation pipeline
//!
//! Every check runs on every response, in a fixed order, and each reports
//! independently. A response can therefore accumulate several violations
//! from one exchange.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use swagfuzz_core::{Settings, SwaggerSpec};

use crate::synth::{PreparedRequest, RequestContext, string_list};

/// Everything a check may judge: the request as sent, its synthesis
/// context, and the observed response line.
pub struct CheckInput<'a> {
    pub spec: &'a SwaggerSpec,
    pub settings: &'a Settings,
    pub request: &'a PreparedRequest,
    pub context: &'a RequestContext,
    pub status: u16,
    pub content_type: Option<&'a str>,
}

/// One broken expectation, tagged with the check that found it.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractViolation {
    pub check: &'static str,
    pub message: String,
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.check, self.message)
    }
}

/// Run the full pipeline and collect every violation.
#[must_use]
pub fn run_checks(input: &CheckInput<'_>) -> Vec<ContractViolation> {
    let mut violations = Vec::new();
    no_server_error(input, &mut violations);
    body_format_declaration(input, &mut violations);
    status_code(input, &mut violations);
    output_mime(input, &mut violations);
    violations
}

/// A 500 is a crash surfaced as HTTP, regardless of what the document
/// declares.
fn no_server_error(input: &CheckInput<'_>, violations: &mut Vec<ContractViolation>) {
    if input.status == 500 {
        violations.push(ContractViolation {
            check: "no-server-error",
            message: format!(
                "Request on {} returned an internal server error",
                input.request.url
            ),
        });
    }
}

/// Body values were drawn but no media type could be resolved for them.
fn body_format_declaration(input: &CheckInput<'_>, violations: &mut Vec<ContractViolation>) {
    if !input.context.body_args.is_empty() && input.context.request_body_format.is_none() {
        violations.push(ContractViolation {
            check: "body-format-declaration",
            message: format!(
                "Operation {} {} takes body parameters {:?} but declares no body format",
                input.context.method,
                input.context.endpoint_path,
                input.context.body_args.keys().collect::<Vec<_>>()
            ),
        });
    }
}

/// Observed status must be declared on the operation or allowed by
/// configuration. A declared `default` response accepts everything.
fn status_code(input: &CheckInput<'_>, violations: &mut Vec<ContractViolation>) {
    let declared = input
        .context
        .endpoint
        .get("responses")
        .and_then(Value::as_object);

    if declared.is_some_and(|responses| responses.contains_key("default")) {
        return;
    }

    let mut allowed: BTreeSet<u16> = input.settings.http_code.iter().copied().collect();
    allowed.extend(
        declared
            .into_iter()
            .flat_map(|responses| responses.keys())
            .filter_map(|code| code.parse::<u16>().ok()),
    );

    if !allowed.contains(&input.status) {
        violations.push(ContractViolation {
            check: "status-code",
            message: format!(
                "Request on {} returned status {}, not among the allowed {:?}",
                input.request.url, input.status, allowed
            ),
        });
    }
}

/// Response media type must be among the operation's `produces`, falling
/// back to the document-global list. Media-type parameters (`; charset=…`)
/// are ignored for the comparison.
fn output_mime(input: &CheckInput<'_>, violations: &mut Vec<ContractViolation>) {
    let local = string_list(input.context.endpoint.get("produces"));
    let valid = if local.is_empty() {
        input.spec.produces()
    } else {
        local
    };

    match input.content_type {
        Some(header) => {
            let media = header.split(';').next().unwrap_or("").trim();
            if !valid.iter().any(|v| v == media) {
                violations.push(ContractViolation {
                    check: "output-mime",
                    message: format!(
                        "Response on {} has Content-Type {:?}, not among the declared {:?}",
                        input.request.url, media, valid
                    ),
                });
            }
        }
        None => violations.push(ContractViolation {
            check: "output-mime",
            message: format!(
                "Response on {} carries no Content-Type header; declared {:?}",
                input.request.url, valid
            ),
        }),
    }
}

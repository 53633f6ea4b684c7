//! Operation enumeration and request synthesis
//!
//! [`trials`] compiles every fuzzable operation in the document into one
//! strategy over [`TrialDraw`]s; [`prepare`] turns a draw into a concrete
//! HTTP request plus the context the validation pipeline judges it by.

use std::collections::{BTreeMap, HashMap};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use proptest::prelude::*;
use proptest::sample::select;
use proptest::strategy::{BoxedStrategy, Union};
use serde_json::Value;
use url::Url;

use swagfuzz_core::{Drawn, Settings, StrategyBuilder, StrategyError, SwaggerSpec, fixed_dictionary};

/// HTTP verbs a Swagger v2 path item may declare. Everything else under a
/// path item (`parameters`, vendor extensions) is not an operation.
const METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

/// Percent-encoding set for substituted path values: everything except
/// unreserved characters, so separators drawn inside a value cannot change
/// the path structure.
const PATH_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One generated trial: an operation plus values for each parameter
/// location. Shrinking operates on this, so a reported failure is the
/// minimal draw, not the first one.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialDraw {
    pub endpoint_path: String,
    /// Lowercase, as the document spells it.
    pub method: String,
    pub path_args: BTreeMap<String, Drawn>,
    pub query_args: BTreeMap<String, Drawn>,
    pub header_args: BTreeMap<String, Drawn>,
    pub body_args: BTreeMap<String, Drawn>,
    /// Media type the body will be encoded as; `None` when the operation
    /// has no body parameters.
    pub media_type: Option<String>,
}

/// Concrete request, ready for the transport.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    /// Uppercase verb.
    pub method: String,
    pub url: Url,
    pub headers: HashMap<String, String>,
    pub body: Body,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    None,
    /// Pre-encoded JSON document.
    Json(String),
    /// Form fields, rendered to strings by the transport.
    Form(BTreeMap<String, Drawn>),
}

/// What the validation pipeline knows about a request: where it went, what
/// was drawn for the body, and the operation node it was derived from.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub endpoint_path: String,
    /// Lowercase verb.
    pub method: String,
    pub body_args: BTreeMap<String, Drawn>,
    pub request_body_format: Option<String>,
    /// The operation node, for `responses`/`produces` lookups.
    pub endpoint: Value,
}

/// Compile every operation in the document into a single trial strategy.
/// Endpoints and methods are weighted uniformly by the union.
///
/// # Errors
///
/// Fails when the document declares no operations, or when any declared
/// parameter cannot be compiled into a strategy.
pub fn trials(spec: &SwaggerSpec) -> Result<BoxedStrategy<TrialDraw>, SynthesisError> {
    let builder = StrategyBuilder::new(spec);
    let paths = spec.paths().ok_or(SynthesisError::NoOperations)?;

    let mut operations = Vec::new();
    for (endpoint_path, item) in paths {
        let item = item
            .as_object()
            .ok_or_else(|| SynthesisError::MalformedPathItem(endpoint_path.clone()))?;
        let common: Vec<Value> = item
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for (method, op) in item {
            if !METHODS.contains(&method.as_str()) {
                continue;
            }
            operations.push(operation_trials(
                spec,
                &builder,
                endpoint_path,
                method,
                op,
                &common,
            )?);
        }
    }

    if operations.is_empty() {
        return Err(SynthesisError::NoOperations);
    }
    Ok(Union::new(operations).boxed())
}

fn operation_trials(
    spec: &SwaggerSpec,
    builder: &StrategyBuilder<'_>,
    endpoint_path: &str,
    method: &str,
    op: &Value,
    common: &[Value],
) -> Result<BoxedStrategy<TrialDraw>, SynthesisError> {
    let merged = merged_parameters(op, common)?;

    let path_args = location_strategy(builder, &merged, "path")?;
    let query_args = location_strategy(builder, &merged, "query")?;
    let header_args = location_strategy(builder, &merged, "header")?;

    let body = in_location(&merged, "body");
    let media_type: BoxedStrategy<Option<String>> = if body.is_empty() {
        Just(None).boxed()
    } else {
        select(acceptable_body_formats(spec, op))
            .prop_map(Some)
            .boxed()
    };
    let body_args = fixed_dictionary(named_strategies(builder, &body)?);

    let endpoint_path = endpoint_path.to_string();
    let method = method.to_string();
    Ok((path_args, query_args, header_args, body_args, media_type)
        .prop_map(move |(path, query, header, body, media)| TrialDraw {
            endpoint_path: endpoint_path.clone(),
            method: method.clone(),
            path_args: path,
            query_args: query,
            header_args: header,
            body_args: body,
            media_type: media,
        })
        .boxed())
}

/// Merge path-level common parameters with operation-level ones, deduped by
/// name. The operation's declaration wins a name collision.
fn merged_parameters(
    op: &Value,
    common: &[Value],
) -> Result<BTreeMap<String, Value>, SynthesisError> {
    let op_params = op
        .get("parameters")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut merged = BTreeMap::new();
    for param in common.iter().chain(op_params.iter()) {
        let name = param
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| SynthesisError::InvalidParameter(param.to_string()))?;
        merged.insert(name.to_string(), param.clone());
    }
    Ok(merged)
}

fn in_location(merged: &BTreeMap<String, Value>, location: &str) -> BTreeMap<String, Value> {
    merged
        .iter()
        .filter(|(_, p)| p.get("in").and_then(Value::as_str) == Some(location))
        .map(|(name, p)| (name.clone(), p.clone()))
        .collect()
}

fn named_strategies(
    builder: &StrategyBuilder<'_>,
    params: &BTreeMap<String, Value>,
) -> Result<Vec<(String, BoxedStrategy<Drawn>)>, SynthesisError> {
    params
        .iter()
        .map(|(name, param)| Ok((name.clone(), builder.compile(param)?)))
        .collect()
}

fn location_strategy(
    builder: &StrategyBuilder<'_>,
    merged: &BTreeMap<String, Value>,
    location: &str,
) -> Result<BoxedStrategy<BTreeMap<String, Drawn>>, SynthesisError> {
    Ok(fixed_dictionary(named_strategies(
        builder,
        &in_location(merged, location),
    )?))
}

/// Media types a request body may be encoded as: the operation's `consumes`
/// if declared, else the document-global one, else JSON.
fn acceptable_body_formats(spec: &SwaggerSpec, op: &Value) -> Vec<String> {
    let local = string_list(op.get("consumes"));
    if !local.is_empty() {
        return local;
    }
    let global = spec.consumes();
    if !global.is_empty() {
        return global;
    }
    vec!["application/json".to_string()]
}

/// Bytes a header value may carry: visible ASCII, space, tab and opaque
/// high bytes. A control character would fail the client builder before
/// anything reaches the wire, so such draws are discarded instead.
fn legal_in_header(byte: u8) -> bool {
    byte == b'\t' || (byte >= 32 && byte != 127)
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Turn a draw into a concrete request and its validation context.
///
/// # Errors
///
/// `UnencodablePath` when a drawn path value carries a NUL byte and
/// `UnencodableHeader` when a drawn header value carries a control
/// character (the trial is discarded, not failed); other variants are
/// genuine synthesis failures.
pub fn prepare(
    draw: &TrialDraw,
    spec: &SwaggerSpec,
    settings: &Settings,
) -> Result<(PreparedRequest, RequestContext), SynthesisError> {
    let mut path = draw.endpoint_path.clone();
    for (name, value) in &draw.path_args {
        let raw = value.render();
        if raw.contains('\0') {
            return Err(SynthesisError::UnencodablePath {
                endpoint: draw.endpoint_path.clone(),
            });
        }
        let encoded = utf8_percent_encode(&raw, PATH_VALUE).to_string();
        path = path.replace(&format!("{{{name}}}"), &encoded);
    }
    if path.contains('\0') {
        return Err(SynthesisError::UnencodablePath {
            endpoint: draw.endpoint_path.clone(),
        });
    }

    let joined = format!(
        "{}/{}",
        settings.spec_host.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).map_err(|e| SynthesisError::BadUrl {
        host: settings.spec_host.clone(),
        path: path.clone(),
        message: e.to_string(),
    })?;
    if !draw.query_args.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &draw.query_args {
            pairs.append_pair(name, &value.render());
        }
    }

    let mut headers = settings.headers.clone();
    for (name, value) in &draw.header_args {
        let rendered = value.render();
        if !rendered.bytes().all(legal_in_header) {
            return Err(SynthesisError::UnencodableHeader { name: name.clone() });
        }
        headers.insert(name.clone(), rendered);
    }

    let mut request_body_format = None;
    let body = if draw.body_args.is_empty() {
        Body::None
    } else {
        match draw.media_type.as_deref() {
            Some(media @ "application/json") => {
                headers.insert("Content-Type".to_string(), media.to_string());
                request_body_format = Some(media.to_string());
                let encoded = serde_json::to_string(&draw.body_args)
                    .map_err(|e| SynthesisError::BodyEncoding(e.to_string()))?;
                Body::Json(encoded)
            }
            Some(media @ "application/x-www-form-urlencoded") => {
                headers.insert("Content-Type".to_string(), media.to_string());
                request_body_format = Some(media.to_string());
                Body::Form(draw.body_args.clone())
            }
            Some(other) => {
                return Err(SynthesisError::UnsupportedMediaType(other.to_string()));
            }
            // No resolvable media type: send without a body and let the
            // body-format check flag the declaration gap.
            None => Body::None,
        }
    };

    let endpoint = spec
        .paths()
        .and_then(|paths| paths.get(&draw.endpoint_path))
        .and_then(|item| item.get(&draw.method))
        .cloned()
        .ok_or_else(|| SynthesisError::MissingOperation {
            endpoint: draw.endpoint_path.clone(),
            method: draw.method.clone(),
        })?;

    let request = PreparedRequest {
        method: draw.method.to_ascii_uppercase(),
        url,
        headers,
        body,
    };
    let context = RequestContext {
        endpoint_path: draw.endpoint_path.clone(),
        method: draw.method.clone(),
        body_args: draw.body_args.clone(),
        request_body_format,
        endpoint,
    };
    Ok((request, context))
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("document declares no fuzzable operations")]
    NoOperations,
    #[error("path item {0:?} is not an object")]
    MalformedPathItem(String),
    #[error("no operation {method:?} under {endpoint:?}")]
    MissingOperation { endpoint: String, method: String },
    #[error("parameter without a name: {0}")]
    InvalidParameter(String),
    #[error("cannot build URL from host {host:?} and path {path:?}: {message}")]
    BadUrl {
        host: String,
        path: String,
        message: String,
    },
    #[error("path for {endpoint:?} contains a NUL byte")]
    UnencodablePath { endpoint: String },
    #[error("header {name:?} value contains characters not legal in a header")]
    UnencodableHeader { name: String },
    #[error("request body media type {0:?} is not supported")]
    UnsupportedMediaType(String),
    #[error("cannot encode JSON body: {0}")]
    BodyEncoding(String),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

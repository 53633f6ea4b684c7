//! Swagger schema → value strategy compiler
//!
//! Compiles a parameter/schema node into a composable proptest strategy
//! over [`Drawn`] values. Classification happens once per node and every
//! shape is handled by exactly one compile arm; anything outside the
//! recognized shapes is a loud error, never a silent default.

use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::sample::select;
use proptest::strategy::BoxedStrategy;
use serde_json::Value;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::spec::{SpecError, SwaggerSpec};
use crate::value::Drawn;

/// Generated list length bound, mirroring the harness's default collection
/// sizing.
const MAX_LIST_LEN: usize = 8;

/// Known primitive type/format set.
///
/// The name table is the single source of truth for which declared
/// `type`/`format` strings map to a canonical generator; absence from the
/// table means the node falls through to the structural rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    Int64,
    Integer,
    Int32,
    Number,
    DateTime,
    Date,
    Time,
    Boolean,
}

impl Primitive {
    pub const NAMES: [(&'static str, Self); 8] = [
        ("int64", Self::Int64),
        ("integer", Self::Integer),
        ("int32", Self::Int32),
        ("number", Self::Number),
        ("date-time", Self::DateTime),
        ("date", Self::Date),
        ("time", Self::Time),
        ("boolean", Self::Boolean),
    ];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| *p)
    }

    /// Canonical generator for this primitive. `Number` union-draws either
    /// an integer or a float.
    #[must_use]
    pub fn strategy(self) -> BoxedStrategy<Drawn> {
        match self {
            Self::Int64 | Self::Integer => any::<i64>().prop_map(Drawn::Int).boxed(),
            Self::Int32 => any::<i32>().prop_map(|v| Drawn::Int(i64::from(v))).boxed(),
            Self::Number => prop_oneof![
                any::<i64>().prop_map(Drawn::Int),
                proptest::num::f64::NORMAL.prop_map(Drawn::Float),
            ]
            .boxed(),
            Self::Boolean => any::<bool>().prop_map(Drawn::Bool).boxed(),
            Self::Date => dates().prop_map(Drawn::Date).boxed(),
            Self::Time => times().prop_map(Drawn::Time).boxed(),
            Self::DateTime => (dates(), times())
                .prop_map(|(d, t)| Drawn::DateTime(NaiveDateTime::new(d, t)))
                .boxed(),
        }
    }
}

fn dates() -> impl Strategy<Value = NaiveDate> {
    (1i32..=9999, 1u32..=12, 1u32..=31)
        .prop_filter_map("day out of range for month", |(y, m, d)| {
            NaiveDate::from_ymd_opt(y, m, d)
        })
}

fn times() -> impl Strategy<Value = NaiveTime> {
    (0u32..24, 0u32..60, 0u32..60)
        .prop_filter_map("invalid time", |(h, m, s)| NaiveTime::from_hms_opt(h, m, s))
}

/// Shape of a schema node, decided once before compilation.
///
/// The variants follow the classification priority: `enum` wins over a
/// co-present `type`, a known primitive `format`/`type` wins over `$ref`,
/// and the parameter-level `schema` wrapper is considered last.
#[derive(Clone, Debug)]
pub enum Shape {
    Enum(Vec<Value>),
    Primitive(Primitive),
    Reference(String),
    Pattern(String),
    FreeText,
    Array(Value),
    Object(serde_json::Map<String, Value>),
    SchemaWrapped(Value),
    Unsupported,
}

/// Classify a schema node. Pure; resolution and recursion happen in
/// [`StrategyBuilder::compile`].
#[must_use]
pub fn classify(node: &serde_json::Map<String, Value>) -> Shape {
    if let Some(values) = node.get("enum").and_then(Value::as_array) {
        return Shape::Enum(values.clone());
    }

    // `format` takes precedence over `type` when naming a primitive:
    // {"type": "string", "format": "date"} is a date, not free text.
    let declared = node
        .get("format")
        .and_then(Value::as_str)
        .or_else(|| node.get("type").and_then(Value::as_str));
    if let Some(primitive) = declared.and_then(Primitive::from_name) {
        return Shape::Primitive(primitive);
    }

    if let Some(pointer) = node.get("$ref").and_then(Value::as_str) {
        return Shape::Reference(pointer.to_string());
    }

    match node.get("type").and_then(Value::as_str) {
        Some("string") => {
            return match node.get("pattern").and_then(Value::as_str) {
                Some(pattern) => Shape::Pattern(pattern.to_string()),
                None => Shape::FreeText,
            };
        }
        Some("array") => {
            return match node.get("items") {
                Some(items) => Shape::Array(items.clone()),
                None => Shape::Unsupported,
            };
        }
        Some("object") => {
            let properties = node
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            return Shape::Object(properties);
        }
        _ => {}
    }

    if let Some(schema) = node.get("schema") {
        return Shape::SchemaWrapped(schema.clone());
    }

    Shape::Unsupported
}

/// Compiles schema nodes into strategies, following `$ref` pointers through
/// the spec document.
pub struct StrategyBuilder<'s> {
    spec: &'s SwaggerSpec,
}

impl<'s> StrategyBuilder<'s> {
    #[must_use]
    pub fn new(spec: &'s SwaggerSpec) -> Self {
        Self { spec }
    }

    /// Compile one node into a strategy.
    ///
    /// # Errors
    ///
    /// Any shape outside the supported subset, an unresolvable `$ref`, or a
    /// reference cycle is fatal for the current trial.
    pub fn compile(&self, node: &Value) -> Result<BoxedStrategy<Drawn>, StrategyError> {
        self.compile_inner(node, &mut Vec::new())
    }

    /// Compile a name → node mapping, preserving keys.
    ///
    /// # Errors
    ///
    /// Fails on the first node that does not compile.
    pub fn compile_map(
        &self,
        nodes: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, BoxedStrategy<Drawn>>, StrategyError> {
        nodes
            .iter()
            .map(|(name, node)| Ok((name.clone(), self.compile(node)?)))
            .collect()
    }

    fn compile_inner(
        &self,
        node: &Value,
        visited: &mut Vec<String>,
    ) -> Result<BoxedStrategy<Drawn>, StrategyError> {
        let obj = node
            .as_object()
            .ok_or_else(|| StrategyError::UnsupportedParameter(node.to_string()))?;

        match classify(obj) {
            Shape::Enum(values) => Ok(select(literals(&values)?).boxed()),
            Shape::Primitive(primitive) => Ok(primitive.strategy()),
            Shape::Reference(pointer) => self.reference(&pointer, visited),
            Shape::Pattern(pattern) => {
                let strategy = proptest::string::string_regex(&pattern).map_err(|e| {
                    StrategyError::BadPattern {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    }
                })?;
                Ok(strategy.prop_map(Drawn::Text).boxed())
            }
            Shape::FreeText => Ok(any::<String>().prop_map(Drawn::Text).boxed()),
            Shape::Array(items) => self.array_items(&items, visited),
            Shape::Object(properties) => {
                let mut entries = Vec::with_capacity(properties.len());
                for (name, prop) in &properties {
                    entries.push((name.clone(), self.compile_inner(prop, visited)?));
                }
                Ok(fixed_dictionary(entries).prop_map(Drawn::Map).boxed())
            }
            Shape::SchemaWrapped(schema) => self.schema_wrapper(&schema, visited),
            Shape::Unsupported => Err(StrategyError::UnsupportedParameter(node.to_string())),
        }
    }

    fn array_items(
        &self,
        items: &Value,
        visited: &mut Vec<String>,
    ) -> Result<BoxedStrategy<Drawn>, StrategyError> {
        let obj = items
            .as_object()
            .ok_or_else(|| StrategyError::UnsupportedItems(items.to_string()))?;

        if let Some(values) = obj.get("enum").and_then(Value::as_array) {
            return Ok(list_of(select(literals(values)?).boxed()));
        }

        if let Some(ty) = obj.get("type").and_then(Value::as_str) {
            if ty == "object" {
                // Undescribed object items degrade to empty objects; items
                // with declared properties compile like any object node.
                if obj.get("properties").is_none() {
                    return Ok(list_of(Just(Drawn::Map(BTreeMap::new())).boxed()));
                }
                return Ok(list_of(self.compile_inner(items, visited)?));
            }
            if let Some(primitive) = Primitive::from_name(ty) {
                return Ok(list_of(primitive.strategy()));
            }
            return Err(StrategyError::UnsupportedItems(items.to_string()));
        }

        if let Some(pointer) = obj.get("$ref").and_then(Value::as_str) {
            return Ok(list_of(self.reference(pointer, visited)?));
        }

        Err(StrategyError::UnsupportedItems(items.to_string()))
    }

    fn schema_wrapper(
        &self,
        schema: &Value,
        visited: &mut Vec<String>,
    ) -> Result<BoxedStrategy<Drawn>, StrategyError> {
        if schema.get("type").and_then(Value::as_str) == Some("array") {
            let pointer = schema
                .get("items")
                .and_then(|items| items.get("$ref"))
                .and_then(Value::as_str)
                .ok_or_else(|| StrategyError::UnsupportedParameter(schema.to_string()))?;
            return Ok(list_of(self.reference(pointer, visited)?));
        }

        let pointer = schema
            .get("$ref")
            .and_then(Value::as_str)
            .ok_or_else(|| StrategyError::UnsupportedParameter(schema.to_string()))?;
        self.reference(pointer, visited)
    }

    /// Dereference one pointer and compile its target. The visited stack is
    /// the cycle guard: re-entering a pointer already on the stack means the
    /// reference chain loops and can never simplify.
    fn reference(
        &self,
        pointer: &str,
        visited: &mut Vec<String>,
    ) -> Result<BoxedStrategy<Drawn>, StrategyError> {
        if visited.iter().any(|seen| seen == pointer) {
            return Err(StrategyError::CyclicReference(pointer.to_string()));
        }
        visited.push(pointer.to_string());
        let target = self.spec.resolve(pointer)?.clone();
        let compiled = self.compile_inner(&target, visited);
        visited.pop();
        compiled
    }
}

fn literals(values: &[Value]) -> Result<Vec<Drawn>, StrategyError> {
    if values.is_empty() {
        return Err(StrategyError::EmptyEnum);
    }
    Ok(values.iter().map(Drawn::from_json).collect())
}

fn list_of(element: BoxedStrategy<Drawn>) -> BoxedStrategy<Drawn> {
    proptest::collection::vec(element, 0..=MAX_LIST_LEN)
        .prop_map(Drawn::List)
        .boxed()
}

/// Combine named strategies into one strategy over a name → value map,
/// drawing every entry. The structural analogue of compiling a mapping of
/// named sub-definitions.
#[must_use]
pub fn fixed_dictionary(
    entries: Vec<(String, BoxedStrategy<Drawn>)>,
) -> BoxedStrategy<BTreeMap<String, Drawn>> {
    let mut strategy: BoxedStrategy<BTreeMap<String, Drawn>> = Just(BTreeMap::new()).boxed();
    for (name, values) in entries {
        strategy = strategy
            .prop_flat_map(move |drawn| {
                let name = name.clone();
                values.clone().prop_map(move |value| {
                    let mut next = drawn.clone();
                    next.insert(name.clone(), value);
                    next
                })
            })
            .boxed();
    }
    strategy
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("enum declares no values")]
    EmptyEnum,
    #[error("pattern {pattern:?} is not a supported regex: {message}")]
    BadPattern { pattern: String, message: String },
    #[error("cyclic schema reference through {0:?}")]
    CyclicReference(String),
    #[error("unsupported items definition: {0}")]
    UnsupportedItems(String),
    #[error("unsupported parameter definition: {0}")]
    UnsupportedParameter(String),
    #[error(transparent)]
    Resolve(#[from] SpecError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;
    use serde_json::json;

    fn spec(doc: Value) -> SwaggerSpec {
        SwaggerSpec::new(doc)
    }

    fn empty_spec() -> SwaggerSpec {
        spec(json!({}))
    }

    fn draws(strategy: &BoxedStrategy<Drawn>, count: usize) -> Vec<Drawn> {
        let mut runner = TestRunner::deterministic();
        (0..count)
            .map(|_| strategy.new_tree(&mut runner).unwrap().current())
            .collect()
    }

    #[test]
    fn primitive_table_covers_supported_formats() {
        let expected = [
            "int64", "integer", "int32", "number", "date-time", "date", "time", "boolean",
        ];
        for name in expected {
            assert!(
                Primitive::from_name(name).is_some(),
                "{name} missing from primitive table"
            );
        }
        assert_eq!(Primitive::NAMES.len(), expected.len());
        assert!(Primitive::from_name("string").is_none());
        assert!(Primitive::from_name("uuid").is_none());
    }

    #[test]
    fn enum_draws_stay_in_declared_set() {
        let s = empty_spec();
        let node = json!({"type": "string", "enum": ["red", "green", "blue"]});
        let strategy = StrategyBuilder::new(&s).compile(&node).unwrap();
        for value in draws(&strategy, 200) {
            match value {
                Drawn::Text(t) => assert!(["red", "green", "blue"].contains(&t.as_str())),
                other => panic!("enum drew non-member {other:?}"),
            }
        }
    }

    #[test]
    fn enum_ignores_co_present_type() {
        let s = empty_spec();
        let node = json!({"type": "integer", "enum": [1, 2, 3]});
        let strategy = StrategyBuilder::new(&s).compile(&node).unwrap();
        for value in draws(&strategy, 50) {
            assert!(matches!(value, Drawn::Int(1..=3)));
        }
    }

    #[test]
    fn empty_enum_is_an_error() {
        let s = empty_spec();
        let err = StrategyBuilder::new(&s)
            .compile(&json!({"enum": []}))
            .unwrap_err();
        assert!(matches!(err, StrategyError::EmptyEnum));
    }

    #[test]
    fn integer_draws_are_whole() {
        let s = empty_spec();
        for node in [
            json!({"type": "integer"}),
            json!({"type": "integer", "format": "int32"}),
            json!({"type": "integer", "format": "int64"}),
        ] {
            let strategy = StrategyBuilder::new(&s).compile(&node).unwrap();
            for value in draws(&strategy, 100) {
                assert!(matches!(value, Drawn::Int(_)), "drew {value:?} for {node}");
            }
        }
    }

    #[test]
    fn number_is_union_typed() {
        let s = empty_spec();
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"type": "number"}))
            .unwrap();
        let values = draws(&strategy, 200);
        assert!(values.iter().all(|v| matches!(v, Drawn::Int(_) | Drawn::Float(_))));
        assert!(values.iter().any(|v| matches!(v, Drawn::Int(_))));
        assert!(values.iter().any(|v| matches!(v, Drawn::Float(_))));
    }

    #[test]
    fn format_wins_over_string_type() {
        let s = empty_spec();
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"type": "string", "format": "date"}))
            .unwrap();
        for value in draws(&strategy, 20) {
            assert!(matches!(value, Drawn::Date(_)));
        }
    }

    #[test]
    fn pattern_draws_match_the_regex() {
        let s = empty_spec();
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"type": "string", "pattern": "[a-z]{3}-[0-9]{2}"}))
            .unwrap();
        let re = regex::Regex::new("[a-z]{3}-[0-9]{2}").unwrap();
        for value in draws(&strategy, 100) {
            match value {
                Drawn::Text(t) => assert!(re.is_match(&t), "{t:?} does not match"),
                other => panic!("pattern drew {other:?}"),
            }
        }
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let s = empty_spec();
        let err = StrategyBuilder::new(&s)
            .compile(&json!({"type": "string", "pattern": "(unclosed"}))
            .unwrap_err();
        assert!(matches!(err, StrategyError::BadPattern { .. }));
    }

    #[test]
    fn plain_string_is_free_text() {
        let s = empty_spec();
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"type": "string"}))
            .unwrap();
        for value in draws(&strategy, 20) {
            assert!(matches!(value, Drawn::Text(_)));
        }
    }

    #[test]
    fn reference_chain_unwinds_hop_by_hop() {
        let s = spec(json!({
            "definitions": {
                "Outer": {"$ref": "#/definitions/Inner"},
                "Inner": {"type": "integer"}
            }
        }));
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"$ref": "#/definitions/Outer"}))
            .unwrap();
        for value in draws(&strategy, 20) {
            assert!(matches!(value, Drawn::Int(_)));
        }
    }

    #[test]
    fn cyclic_reference_fails_instead_of_looping() {
        let s = spec(json!({
            "definitions": {
                "A": {"$ref": "#/definitions/B"},
                "B": {"$ref": "#/definitions/A"}
            }
        }));
        let err = StrategyBuilder::new(&s)
            .compile(&json!({"$ref": "#/definitions/A"}))
            .unwrap_err();
        assert!(matches!(err, StrategyError::CyclicReference(_)), "{err}");
    }

    #[test]
    fn self_referential_definition_fails() {
        let s = spec(json!({
            "definitions": {
                "Node": {
                    "type": "object",
                    "properties": {"next": {"$ref": "#/definitions/Node"}}
                }
            }
        }));
        let err = StrategyBuilder::new(&s)
            .compile(&json!({"$ref": "#/definitions/Node"}))
            .unwrap_err();
        assert!(matches!(err, StrategyError::CyclicReference(_)));
    }

    #[test]
    fn unresolvable_reference_is_fatal() {
        let s = empty_spec();
        let err = StrategyBuilder::new(&s)
            .compile(&json!({"$ref": "#/definitions/Ghost"}))
            .unwrap_err();
        assert!(matches!(err, StrategyError::Resolve(_)));
    }

    #[test]
    fn shapeless_parameter_is_rejected() {
        let s = empty_spec();
        let err = StrategyBuilder::new(&s)
            .compile(&json!({"name": "q", "in": "query"}))
            .unwrap_err();
        assert!(matches!(err, StrategyError::UnsupportedParameter(_)));
    }

    #[test]
    fn array_of_enum_items() {
        let s = empty_spec();
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"type": "array", "items": {"enum": ["on", "off"]}}))
            .unwrap();
        for value in draws(&strategy, 50) {
            match value {
                Drawn::List(items) => {
                    for item in items {
                        assert!(matches!(
                            item,
                            Drawn::Text(ref t) if t == "on" || t == "off"
                        ));
                    }
                }
                other => panic!("array drew {other:?}"),
            }
        }
    }

    #[test]
    fn array_of_primitive_items() {
        let s = empty_spec();
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"type": "array", "items": {"type": "boolean"}}))
            .unwrap();
        for value in draws(&strategy, 30) {
            match value {
                Drawn::List(items) => assert!(items.iter().all(|i| matches!(i, Drawn::Bool(_)))),
                other => panic!("array drew {other:?}"),
            }
        }
    }

    #[test]
    fn array_of_undescribed_objects_yields_empty_maps() {
        let s = empty_spec();
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"type": "array", "items": {"type": "object"}}))
            .unwrap();
        for value in draws(&strategy, 30) {
            match value {
                Drawn::List(items) => {
                    for item in items {
                        assert_eq!(item, Drawn::Map(BTreeMap::new()));
                    }
                }
                other => panic!("array drew {other:?}"),
            }
        }
    }

    #[test]
    fn array_of_unknown_items_is_rejected() {
        let s = empty_spec();
        let err = StrategyBuilder::new(&s)
            .compile(&json!({"type": "array", "items": {"type": "string"}}))
            .unwrap_err();
        assert!(matches!(err, StrategyError::UnsupportedItems(_)));
    }

    #[test]
    fn array_of_referenced_items() {
        let s = spec(json!({
            "definitions": {"Flag": {"type": "boolean"}}
        }));
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({"type": "array", "items": {"$ref": "#/definitions/Flag"}}))
            .unwrap();
        for value in draws(&strategy, 30) {
            match value {
                Drawn::List(items) => assert!(items.iter().all(|i| matches!(i, Drawn::Bool(_)))),
                other => panic!("array drew {other:?}"),
            }
        }
    }

    #[test]
    fn object_generates_exactly_declared_properties() {
        let s = empty_spec();
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "active": {"type": "boolean"}
                }
            }))
            .unwrap();
        for value in draws(&strategy, 50) {
            match value {
                Drawn::Map(map) => {
                    assert_eq!(
                        map.keys().collect::<Vec<_>>(),
                        vec!["active", "id"],
                        "undeclared or missing keys"
                    );
                    assert!(matches!(map["id"], Drawn::Int(_)));
                    assert!(matches!(map["active"], Drawn::Bool(_)));
                }
                other => panic!("object drew {other:?}"),
            }
        }
    }

    #[test]
    fn schema_wrapper_resolves_ref() {
        let s = spec(json!({
            "definitions": {"Pet": {"type": "object", "properties": {"name": {"type": "string"}}}}
        }));
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({
                "name": "body", "in": "body",
                "schema": {"$ref": "#/definitions/Pet"}
            }))
            .unwrap();
        for value in draws(&strategy, 20) {
            assert!(matches!(value, Drawn::Map(_)));
        }
    }

    #[test]
    fn schema_wrapper_array_of_refs() {
        let s = spec(json!({
            "definitions": {"Id": {"type": "integer"}}
        }));
        let strategy = StrategyBuilder::new(&s)
            .compile(&json!({
                "name": "body", "in": "body",
                "schema": {"type": "array", "items": {"$ref": "#/definitions/Id"}}
            }))
            .unwrap();
        for value in draws(&strategy, 20) {
            match value {
                Drawn::List(items) => assert!(items.iter().all(|i| matches!(i, Drawn::Int(_)))),
                other => panic!("wrapper drew {other:?}"),
            }
        }
    }

    #[test]
    fn inline_schema_without_ref_is_rejected() {
        let s = empty_spec();
        let err = StrategyBuilder::new(&s)
            .compile(&json!({
                "name": "body", "in": "body",
                "schema": {"type": "object", "properties": {}}
            }))
            .unwrap_err();
        assert!(matches!(err, StrategyError::UnsupportedParameter(_)));
    }

    #[test]
    fn fixed_dictionary_draws_every_entry() {
        let entries = vec![
            ("a".to_string(), Just(Drawn::Int(1)).boxed()),
            ("b".to_string(), Just(Drawn::Bool(true)).boxed()),
        ];
        let strategy = fixed_dictionary(entries);
        let mut runner = TestRunner::deterministic();
        let map = strategy.new_tree(&mut runner).unwrap().current();
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], Drawn::Int(1));
        assert_eq!(map["b"], Drawn::Bool(true));
    }
}

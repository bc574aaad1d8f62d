//! Filter predicate parsing
//!
//! Turns untrusted, string-typed query parameters into a whitelisted, typed
//! [`FilterPredicate`]. This is the security boundary of the engine: operator
//! injection (`$`-prefixed keys), unknown fields, unknown operators, oversized
//! patterns, and unbounded condition counts are all rejected here with a
//! `BadRequest`, before anything reaches a store driver.
//!
//! Three input syntaxes normalize to the same predicate:
//!
//! 1. Simple equality: `status=active`
//! 2. Suffix operators: `age__gte=18&age__lt=30`
//! 3. Structured form: `filter={"age":{"__gte":18}}` or bracket keys
//!    `filter[age][__gte]=18`
//!
//! Empty or absent values are silently skipped (optional query parameters
//! from typical clients), while malformed input is always a hard rejection.

use crate::core::error::{CorralError, CorralResult};
use crate::core::schema::{FieldType, SchemaAdapter};
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde_json::Value;

/// The store's reserved operator-prefix character. Field names starting with
/// this never cross the boundary.
pub const RESERVED_PREFIX: char = '$';

/// Top-level query keys that are never treated as filter fields.
pub const RESERVED_KEYS: [&str; 5] = ["page", "limit", "sort", "fields", "filter"];

/// The fixed comparison operator vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Like,
    Exists,
}

impl FilterOp {
    /// Resolve a `__op` suffix. Anything not in the vocabulary is `None`,
    /// which the parser turns into a hard rejection.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "eq" => Some(FilterOp::Eq),
            "ne" => Some(FilterOp::Ne),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "in" => Some(FilterOp::In),
            "nin" => Some(FilterOp::Nin),
            "like" => Some(FilterOp::Like),
            "exists" => Some(FilterOp::Exists),
            _ => None,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
            FilterOp::Nin => "nin",
            FilterOp::Like => "like",
            FilterOp::Exists => "exists",
        }
    }
}

/// A coerced, type-appropriate filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    /// Value array for set-membership operators.
    List(Vec<FilterValue>),
    /// Escaped, case-insensitive-ready regex source for `__like`.
    Pattern(String),
}

impl FilterValue {
    /// Render as JSON for comparison against stored documents.
    pub fn as_json(&self) -> Value {
        match self {
            FilterValue::String(s) => Value::String(s.clone()),
            FilterValue::Integer(i) => Value::from(*i),
            FilterValue::Float(f) => Value::from(*f),
            FilterValue::Boolean(b) => Value::Bool(*b),
            FilterValue::Date(d) => Value::String(d.to_rfc3339()),
            FilterValue::List(items) => Value::Array(items.iter().map(|v| v.as_json()).collect()),
            FilterValue::Pattern(p) => Value::String(p.clone()),
        }
    }
}

/// The parsed filter: field name → merged comparison map.
///
/// Bare equality is stored as an `Eq` entry, so `age__gt=18&age__lt=30`
/// merges naturally into one comparison map for `age` instead of two
/// competing entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPredicate {
    conditions: IndexMap<String, IndexMap<FilterOp, FilterValue>>,
}

impl FilterPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Total number of (field, operator) conditions.
    pub fn len(&self) -> usize {
        self.conditions.values().map(|ops| ops.len()).sum()
    }

    pub fn get(&self, field: &str) -> Option<&IndexMap<FilterOp, FilterValue>> {
        self.conditions.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexMap<FilterOp, FilterValue>)> {
        self.conditions.iter()
    }

    fn insert(&mut self, field: &str, op: FilterOp, value: FilterValue) {
        self.conditions
            .entry(field.to_string())
            .or_default()
            .insert(op, value);
    }
}

/// Limits applied during parsing.
#[derive(Debug, Clone, Copy)]
pub struct FilterLimits {
    /// Cap on distinct filter conditions across all syntaxes.
    pub max_conditions: usize,
    /// Cap on raw `__like` value length, checked before escaping.
    pub max_pattern_len: usize,
}

impl Default for FilterLimits {
    fn default() -> Self {
        Self {
            max_conditions: 20,
            max_pattern_len: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Value coercion
//
// Two sequential strategies: a typed table driven by the declared FieldType,
// then a pattern-based auto-detect fallback when the type is unknown.
// Coercion failures fall back to the original string rather than erroring.
// ---------------------------------------------------------------------------

/// Coerce a raw string according to the declared field type, falling back to
/// auto-detection for `Mixed`/unknown fields.
pub fn coerce_scalar(field_type: Option<FieldType>, raw: &str) -> FilterValue {
    match field_type {
        Some(FieldType::Number) => coerce_number(raw)
            .unwrap_or_else(|| FilterValue::String(raw.to_string())),
        Some(FieldType::Boolean) => match raw {
            "true" | "1" => FilterValue::Boolean(true),
            "false" | "0" => FilterValue::Boolean(false),
            _ => FilterValue::String(raw.to_string()),
        },
        Some(FieldType::Date) => {
            coerce_date(raw).unwrap_or_else(|| FilterValue::String(raw.to_string()))
        }
        Some(FieldType::String) => FilterValue::String(raw.to_string()),
        Some(FieldType::Mixed) | None => coerce_auto(raw),
    }
}

fn coerce_number(raw: &str) -> Option<FilterValue> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(FilterValue::Integer(i));
    }
    raw.parse::<f64>().ok().map(FilterValue::Float)
}

fn coerce_date(raw: &str) -> Option<FilterValue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(FilterValue::Date(dt.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| FilterValue::Date(ndt.and_utc()))
}

/// Pattern-based auto-detection for fields without a declared type.
fn coerce_auto(raw: &str) -> FilterValue {
    if looks_numeric(raw) {
        if let Some(v) = coerce_number(raw) {
            return v;
        }
    }
    match raw {
        "true" => return FilterValue::Boolean(true),
        "false" => return FilterValue::Boolean(false),
        _ => {}
    }
    if looks_date_like(raw) {
        if let Some(v) = coerce_date(raw) {
            return v;
        }
    }
    FilterValue::String(raw.to_string())
}

fn looks_numeric(raw: &str) -> bool {
    let s = raw.strip_prefix('-').unwrap_or(raw);
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
        && s.chars().filter(|c| *c == '.').count() <= 1
        && !s.starts_with('.')
        && !s.ends_with('.')
}

fn looks_date_like(raw: &str) -> bool {
    // YYYY-MM-DD prefix is enough to attempt a real parse.
    let bytes = raw.as_bytes();
    bytes.len() >= 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Filter parser bound to one collection's allowed-field configuration.
pub struct FilterParser<'a> {
    schema: Option<&'a dyn SchemaAdapter>,
    /// Explicit whitelist; falls back to the schema field set when absent.
    allowed_fields: Option<&'a [String]>,
    limits: FilterLimits,
}

impl<'a> FilterParser<'a> {
    pub fn new(
        schema: Option<&'a dyn SchemaAdapter>,
        allowed_fields: Option<&'a [String]>,
        limits: FilterLimits,
    ) -> Self {
        Self {
            schema,
            allowed_fields,
            limits,
        }
    }

    /// Parse raw query parameters into a predicate.
    ///
    /// `params` preserves insertion order so the resulting predicate is
    /// deterministic for identical requests.
    pub fn parse(&self, params: &IndexMap<String, String>) -> CorralResult<FilterPredicate> {
        let mut predicate = FilterPredicate::new();

        for (key, value) in params {
            if let Some((field, op)) = parse_bracket_key(key) {
                // filter[field] / filter[field][__op]
                if value.is_empty() {
                    continue;
                }
                let op = match op {
                    Some(suffix) => self.resolve_op(suffix)?,
                    None => FilterOp::Eq,
                };
                self.add_condition(&mut predicate, field, op, value)?;
                continue;
            }

            if RESERVED_KEYS.contains(&key.as_str()) {
                if key == "filter" && !value.is_empty() {
                    self.parse_structured(&mut predicate, value)?;
                }
                continue;
            }

            if value.is_empty() {
                // Absent/empty means "no filter", not an error.
                continue;
            }

            match key.rsplit_once("__") {
                Some((field, suffix)) if !field.is_empty() => {
                    let op = self.resolve_op(suffix)?;
                    self.add_condition(&mut predicate, field, op, value)?;
                }
                _ => {
                    self.add_condition(&mut predicate, key, FilterOp::Eq, value)?;
                }
            }
        }

        Ok(predicate)
    }

    /// Parse the structured `filter={...}` JSON object form.
    fn parse_structured(&self, predicate: &mut FilterPredicate, raw: &str) -> CorralResult<()> {
        let parsed: Value = serde_json::from_str(raw).map_err(|e| {
            CorralError::bad_request("INVALID_FILTER", format!("filter is not valid JSON: {}", e))
        })?;
        let Value::Object(entries) = parsed else {
            return Err(CorralError::bad_request(
                "INVALID_FILTER",
                "filter must be a JSON object",
            ));
        };

        for (field, spec) in entries {
            match spec {
                Value::Object(ops) => {
                    for (op_key, op_value) in ops {
                        let suffix = op_key.trim_start_matches("__");
                        let op = self.resolve_op(suffix)?;
                        self.add_json_condition(predicate, &field, op, op_value)?;
                    }
                }
                // Bare field → value inside the structured form is equality.
                other => self.add_json_condition(predicate, &field, FilterOp::Eq, other)?,
            }
        }
        Ok(())
    }

    fn resolve_op(&self, suffix: &str) -> CorralResult<FilterOp> {
        FilterOp::from_suffix(suffix).ok_or_else(|| {
            CorralError::bad_request(
                "UNSUPPORTED_OPERATOR",
                format!("unsupported filter operator '__{}'", suffix),
            )
        })
    }

    /// Validate the field name against the reserved prefix and whitelist.
    fn check_field(&self, field: &str) -> CorralResult<()> {
        if field.starts_with(RESERVED_PREFIX) {
            return Err(CorralError::bad_request(
                "RESERVED_FIELD_PREFIX",
                format!("field '{}' uses the reserved '$' prefix", field),
            ));
        }
        let allowed = match self.allowed_fields {
            Some(list) => list.iter().any(|f| f == field),
            None => match self.schema {
                Some(schema) => schema.fields().iter().any(|f| f == field),
                None => true,
            },
        };
        if !allowed {
            return Err(CorralError::bad_request(
                "UNKNOWN_FILTER_FIELD",
                format!("field '{}' is not filterable", field),
            ));
        }
        Ok(())
    }

    fn field_type(&self, field: &str) -> Option<FieldType> {
        self.schema.map(|s| s.field_type(field))
    }

    /// Coerce and insert one condition from a raw string value.
    fn add_condition(
        &self,
        predicate: &mut FilterPredicate,
        field: &str,
        op: FilterOp,
        raw: &str,
    ) -> CorralResult<()> {
        self.check_field(field)?;
        let value = match op {
            FilterOp::In | FilterOp::Nin => FilterValue::List(
                raw.split(',')
                    .map(|part| coerce_scalar(self.field_type(field), part.trim()))
                    .collect(),
            ),
            FilterOp::Exists => FilterValue::Boolean(matches!(raw, "true" | "1")),
            FilterOp::Like => self.compile_pattern(raw)?,
            _ => coerce_scalar(self.field_type(field), raw),
        };
        self.push(predicate, field, op, value)
    }

    /// Coerce and insert one condition from a structured-form JSON value.
    fn add_json_condition(
        &self,
        predicate: &mut FilterPredicate,
        field: &str,
        op: FilterOp,
        json: Value,
    ) -> CorralResult<()> {
        self.check_field(field)?;
        let value = match op {
            FilterOp::In | FilterOp::Nin => match json {
                Value::Array(items) => FilterValue::List(
                    items
                        .into_iter()
                        .map(|item| self.json_scalar(field, item))
                        .collect(),
                ),
                Value::String(s) => FilterValue::List(
                    s.split(',')
                        .map(|part| coerce_scalar(self.field_type(field), part.trim()))
                        .collect(),
                ),
                other => FilterValue::List(vec![self.json_scalar(field, other)]),
            },
            FilterOp::Exists => match json {
                Value::Bool(b) => FilterValue::Boolean(b),
                Value::String(s) => FilterValue::Boolean(matches!(s.as_str(), "true" | "1")),
                _ => FilterValue::Boolean(false),
            },
            FilterOp::Like => match json {
                Value::String(s) => self.compile_pattern(&s)?,
                other => {
                    return Err(CorralError::bad_request(
                        "INVALID_FILTER",
                        format!("__like value for '{}' must be a string, got {}", field, other),
                    ));
                }
            },
            _ => self.json_scalar(field, json),
        };
        self.push(predicate, field, op, value)
    }

    /// JSON values carry their own types; only strings go through coercion.
    fn json_scalar(&self, field: &str, json: Value) -> FilterValue {
        match json {
            Value::String(s) => coerce_scalar(self.field_type(field), &s),
            Value::Bool(b) => FilterValue::Boolean(b),
            Value::Number(n) => n
                .as_i64()
                .map(FilterValue::Integer)
                .or_else(|| n.as_f64().map(FilterValue::Float))
                .unwrap_or_else(|| FilterValue::String(n.to_string())),
            other => FilterValue::String(other.to_string()),
        }
    }

    /// Escape and length-check a `__like` value so callers cannot inject
    /// pattern semantics or compile pathological regexes.
    fn compile_pattern(&self, raw: &str) -> CorralResult<FilterValue> {
        if raw.len() > self.limits.max_pattern_len {
            return Err(CorralError::bad_request(
                "PATTERN_TOO_LONG",
                format!(
                    "__like value exceeds maximum length of {}",
                    self.limits.max_pattern_len
                ),
            ));
        }
        let escaped = regex::escape(raw);
        // Escaped input always compiles; this guards the invariant.
        regex::RegexBuilder::new(&escaped)
            .case_insensitive(true)
            .build()
            .map_err(|e| CorralError::internal(format!("pattern compilation failed: {}", e)))?;
        Ok(FilterValue::Pattern(escaped))
    }

    fn push(
        &self,
        predicate: &mut FilterPredicate,
        field: &str,
        op: FilterOp,
        value: FilterValue,
    ) -> CorralResult<()> {
        predicate.insert(field, op, value);
        if predicate.len() > self.limits.max_conditions {
            return Err(CorralError::bad_request(
                "TOO_MANY_CONDITIONS",
                format!(
                    "filter exceeds maximum of {} conditions",
                    self.limits.max_conditions
                ),
            ));
        }
        Ok(())
    }
}

/// Split a `filter[field]` or `filter[field][__op]` key. Returns the field
/// and the optional operator suffix (without the `__` prefix).
fn parse_bracket_key(key: &str) -> Option<(&str, Option<&str>)> {
    let rest = key.strip_prefix("filter[")?;
    let close = rest.find(']')?;
    let field = &rest[..close];
    let tail = &rest[close + 1..];
    if tail.is_empty() {
        return Some((field, None));
    }
    let op = tail.strip_prefix('[')?.strip_suffix(']')?;
    Some((field, Some(op.trim_start_matches("__"))))
}

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::parser::StreamParser;

pub const STRING_INNER: &str = r#"[^"\\]*(?:\\.[^"\\]*)*"#;
pub const STRING: &str = r#""[^"\\]*(?:\\.[^"\\]*)*""#;
pub const INTEGER: &str = r"(-)?(0|[1-9][0-9]*)";
pub const NUMBER: &str = r"(-)?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?";
pub const BOOLEAN: &str = "(true|false)";
pub const NULL: &str = "null";
pub const WHITESPACE: &str = r"\s*";
pub const UUID: &str = r#""[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}""#;
pub const DATE_TIME: &str = r#""(-?(?:[1-9][0-9]*)?[0-9]{4})-(1[0-2]|0[1-9])-(3[01]|0[1-9]|[12][0-9])T(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])(\.[0-9]{3})?(Z)?""#;
pub const DATE: &str = r#""(?:\d{4})-(?:0[1-9]|1[0-2])-(?:0[1-9]|[1-2][0-9]|3[0-1])""#;
pub const TIME: &str = r#""(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])(\.[0-9]+)?(Z)?""#;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported schema: {0}")]
    Unsupported(String),
    #[error("format {0} is not supported")]
    UnsupportedFormat(String),
    #[error("invalid schema: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("no match found")]
    NoMatch,
}

/// The supported JSON Schema subset. `$ref`, numeric bounds, schema-valued
/// `additionalProperties`, and pattern properties are out.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: Option<TypeSpec>,
    pub properties: Option<BTreeMap<String, Schema>>,
    #[serde(default)]
    pub required: Vec<String>,
    pub additional_properties: Option<JsonValue>,
    pub items: Option<Box<Schema>>,
    pub prefix_items: Option<Vec<Schema>>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub pattern: Option<String>,
    pub format: Option<String>,
    #[serde(rename = "enum")]
    pub enumeration: Option<Vec<JsonValue>>,
    #[serde(rename = "const")]
    pub constant: Option<JsonValue>,
    #[serde(default)]
    pub any_of: Vec<Schema>,
    #[serde(default)]
    pub one_of: Vec<Schema>,
    #[serde(default)]
    pub all_of: Vec<Schema>,
    #[serde(rename = "$ref")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    One(String),
    Many(Vec<String>),
}

impl TypeSpec {
    fn as_list(&self) -> Vec<&str> {
        match self {
            TypeSpec::One(t) => vec![t.as_str()],
            TypeSpec::Many(ts) => ts.iter().map(String::as_str).collect(),
        }
    }
}

impl Schema {
    pub fn parse(schema_json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(schema_json)?)
    }

    pub fn from_value(value: &JsonValue) -> Result<Self, SchemaError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Compiles the schema to a regex matching a canonical JSON encoding of any
/// valid instance, padded with whitespace on both ends.
pub fn build_regex(schema: &Schema) -> Result<String, SchemaError> {
    build_regex_with_whitespace(schema, WHITESPACE)
}

pub fn build_regex_from_str(schema_json: &str) -> Result<String, SchemaError> {
    build_regex(&Schema::parse(schema_json)?)
}

pub fn build_regex_with_whitespace(schema: &Schema, ws: &str) -> Result<String, SchemaError> {
    let ws = if ws.is_empty() { WHITESPACE } else { ws };
    let inner = to_regex(schema, ws)?;
    Ok(format!("{WHITESPACE}{inner}{WHITESPACE}"))
}

/// Finds the first substring matching the schema's regex.
pub fn extract(schema: &Schema, text: &str) -> Result<String, SchemaError> {
    let re = Regex::new(&build_regex(schema)?)?;
    match re.find(text) {
        Some(found) => Ok(found.as_str().trim().to_string()),
        None => Err(SchemaError::NoMatch),
    }
}

/// Alternative extraction path: salvage candidate JSON with the stream
/// parser, re-encode it with sorted keys, then validate against the regex.
pub fn extract_with_parser(schema: &Schema, text: &str) -> Result<String, SchemaError> {
    let re = Regex::new(&build_regex(schema)?)?;

    for token in StreamParser::parse_all(text) {
        if !matches!(
            token.kind,
            crate::parser::TokenKind::Object | crate::parser::TokenKind::Array
        ) {
            continue;
        }
        // Round-trip through a JSON value to alphabetize object keys the
        // same way the compiled regex expects them.
        let Ok(value) = serde_json::from_str::<JsonValue>(&token.to_json()) else {
            continue;
        };
        let candidate = value.to_string();
        if let Some(found) = re.find(&candidate) {
            return Ok(found.as_str().trim().to_string());
        }
    }

    Err(SchemaError::NoMatch)
}

/// Extracts and decodes into a typed value.
pub fn extract_hydrate<T: DeserializeOwned>(schema: &Schema, text: &str) -> Result<T, SchemaError> {
    let extracted = extract(schema, text)?;
    Ok(serde_json::from_str(&extracted)?)
}

fn to_regex(schema: &Schema, ws: &str) -> Result<String, SchemaError> {
    if let Some(properties) = &schema.properties {
        return object_regex(properties, schema, ws);
    }
    if !schema.all_of.is_empty() {
        return all_of_regex(&schema.all_of, ws);
    }
    if !schema.any_of.is_empty() {
        return any_of_regex(&schema.any_of, ws);
    }
    if !schema.one_of.is_empty() {
        return one_of_regex(&schema.one_of, ws);
    }
    if let Some(prefix_items) = &schema.prefix_items {
        return prefix_items_regex(prefix_items, schema, ws);
    }
    if let Some(enumeration) = &schema.enumeration {
        return enum_regex(enumeration);
    }
    if let Some(constant) = &schema.constant {
        return Ok(regex::escape(&literal_to_string(constant)?));
    }
    if schema.reference.is_some() {
        return Err(SchemaError::Unsupported("$ref is not supported".to_string()));
    }

    match &schema.kind {
        Some(spec) => {
            let types = spec.as_list();
            if types.len() > 1 {
                return multiple_types_regex(&types, ws);
            }
            single_type_regex(types[0], schema, ws)
        }
        None => any_type_regex(ws),
    }
}

fn object_regex(
    properties: &BTreeMap<String, Schema>,
    schema: &Schema,
    ws: &str,
) -> Result<String, SchemaError> {
    if properties.is_empty() {
        if wildcard_properties(schema)? {
            return Ok(format!("\\{{{ws}({ANY_PROPERTY}{ws},?{ws})*{ws}\\}}"));
        }
        return Ok(r"\{\s*\}".to_string());
    }

    let mut parts = Vec::with_capacity(properties.len());
    for (name, value) in properties {
        let value_regex = to_regex(value, ws)?;
        let part = format!("{ws}\"{}\"{ws}:{ws}{value_regex}", regex::escape(name));
        if schema.required.iter().any(|r| r == name) {
            parts.push(part);
        } else {
            parts.push(format!("({part})?"));
        }
    }

    let properties_regex = parts.join(&format!("{ws},?{ws}"));
    if wildcard_properties(schema)? {
        return Ok(format!(
            "\\{{{ws}({properties_regex}{ws},?{ws})*({ANY_PROPERTY})?{ws}\\}}"
        ));
    }

    Ok(format!("\\{{{ws}{properties_regex}{ws}\\}}"))
}

/// Matches one arbitrary `"key": value` pair when additional properties are
/// allowed.
const ANY_PROPERTY: &str = r#""[^"]+"\s*:\s*[^,}]+"#;

fn wildcard_properties(schema: &Schema) -> Result<bool, SchemaError> {
    match &schema.additional_properties {
        None => Ok(false),
        Some(JsonValue::Bool(allowed)) => Ok(*allowed),
        Some(_) => Err(SchemaError::Unsupported(
            "additionalProperties as a schema is not supported".to_string(),
        )),
    }
}

fn all_of_regex(all_of: &[Schema], ws: &str) -> Result<String, SchemaError> {
    let mut merged: BTreeMap<String, Schema> = BTreeMap::new();
    let mut required: Vec<String> = Vec::new();

    for schema in all_of {
        if let Some(properties) = &schema.properties {
            for (name, value) in properties {
                merged.insert(name.clone(), value.clone());
            }
        }
        required.extend(schema.required.iter().cloned());
    }

    let mut parts = Vec::with_capacity(merged.len());
    for (name, value) in &merged {
        let value_regex = to_regex(value, ws)?;
        let part = format!("{ws}\"{}\"{ws}:{ws}{value_regex}", regex::escape(name));
        if required.iter().any(|r| r == name) {
            parts.push(part);
        } else {
            parts.push(format!("({part})?"));
        }
    }

    Ok(format!("\\{{{}{ws}\\}}", parts.join(&format!("{ws},"))))
}

fn any_of_regex(any_of: &[Schema], ws: &str) -> Result<String, SchemaError> {
    let mut branches = Vec::with_capacity(any_of.len());
    for schema in any_of {
        branches.push(to_regex(schema, ws)?);
    }

    // Every non-empty, order-preserving combination of the branches.
    let mut combinations = Vec::new();
    for k in 1..=branches.len() {
        for combo in combinations_of(&branches, k) {
            combinations.push(combine_objects(&combo, ws));
        }
    }

    Ok(format!("({})", combinations.join("|")))
}

fn combinations_of<'a>(items: &'a [String], k: usize) -> Vec<Vec<&'a str>> {
    if k == 1 {
        return items.iter().map(|item| vec![item.as_str()]).collect();
    }

    let mut result = Vec::new();
    for i in 0..items.len().saturating_sub(k - 1) {
        for mut tail in combinations_of(&items[i + 1..], k - 1) {
            let mut combo = vec![items[i].as_str()];
            combo.append(&mut tail);
            result.push(combo);
        }
    }
    result
}

/// Merges object regexes by stripping their braces and rejoining the bodies
/// under one frame.
fn combine_objects(parts: &[&str], ws: &str) -> String {
    let bodies: Vec<&str> = parts
        .iter()
        .map(|part| {
            part.strip_suffix(r"\s*\}")
                .unwrap_or(part)
                .strip_prefix(r"\{\s*")
                .unwrap_or(part)
        })
        .collect();

    format!(
        "\\{{{ws}{}{ws}\\}}",
        bodies.join(&format!("{ws},?{ws}"))
    )
}

fn one_of_regex(one_of: &[Schema], ws: &str) -> Result<String, SchemaError> {
    let mut branches = Vec::with_capacity(one_of.len());
    for schema in one_of {
        branches.push(format!("(?:{})", to_regex(schema, ws)?));
    }
    Ok(format!("({})", branches.join("|")))
}

fn prefix_items_regex(
    prefix_items: &[Schema],
    schema: &Schema,
    ws: &str,
) -> Result<String, SchemaError> {
    let mut elements = Vec::with_capacity(prefix_items.len());
    for item in prefix_items {
        elements.push(to_regex(item, ws)?);
    }

    let comma = format!("{ws},{ws}");
    let mut regex = format!("\\[{ws}{}", elements.join(&comma));

    if let Some(items) = &schema.items {
        let additional = to_regex(items, ws)?;
        regex.push_str(&format!("({comma}{additional})*"));
    }

    regex.push_str(&format!("{ws}\\]"));
    Ok(regex)
}

fn enum_regex(enumeration: &[JsonValue]) -> Result<String, SchemaError> {
    let mut choices = Vec::with_capacity(enumeration.len());
    for value in enumeration {
        choices.push(regex::escape(&literal_to_string(value)?));
    }
    Ok(format!("({})", choices.join("|")))
}

/// JSON encoding of a scalar literal: strings keep their quotes, the rest
/// print raw.
fn literal_to_string(value: &JsonValue) -> Result<String, SchemaError> {
    match value {
        JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) | JsonValue::Null => {
            Ok(value.to_string())
        }
        other => Err(SchemaError::Unsupported(format!(
            "unsupported literal in enum/const: {other}"
        ))),
    }
}

fn single_type_regex(kind: &str, schema: &Schema, ws: &str) -> Result<String, SchemaError> {
    match kind {
        "string" => string_regex(schema),
        "integer" => Ok(INTEGER.to_string()),
        "number" => Ok(NUMBER.to_string()),
        "boolean" => Ok(BOOLEAN.to_string()),
        "null" => Ok(NULL.to_string()),
        "array" => array_regex(schema, ws),
        "object" => object_regex(&BTreeMap::new(), schema, ws),
        other => Err(SchemaError::Unsupported(format!("unknown type {other}"))),
    }
}

fn multiple_types_regex(types: &[&str], ws: &str) -> Result<String, SchemaError> {
    let mut branches = Vec::with_capacity(types.len());
    for kind in types {
        let schema = Schema {
            kind: Some(TypeSpec::One((*kind).to_string())),
            ..Schema::default()
        };
        branches.push(to_regex(&schema, ws)?);
    }
    Ok(format!("({})", branches.join("|")))
}

fn any_type_regex(ws: &str) -> Result<String, SchemaError> {
    let types = [
        "boolean", "null", "number", "integer", "string", "array", "object",
    ];
    let mut branches = Vec::with_capacity(types.len());
    for kind in types {
        let schema = Schema {
            kind: Some(TypeSpec::One(kind.to_string())),
            ..Schema::default()
        };
        branches.push(format!("({})", to_regex(&schema, ws)?));
    }
    Ok(branches.join("|"))
}

/// One string character: anything unescaped, or a backslash escape.
const STRING_CHAR: &str = r#"(?:[^"\\]|\\.)"#;

fn string_regex(schema: &Schema) -> Result<String, SchemaError> {
    if let Some(max) = schema.max_length.filter(|max| *max > 0) {
        let min = schema.min_length.unwrap_or(0);
        return Ok(format!("\"{STRING_CHAR}{{{min},{max}}}\""));
    }
    if let Some(min) = schema.min_length.filter(|min| *min > 0) {
        return Ok(format!("\"{STRING_CHAR}{{{min},}}\""));
    }
    if let Some(pattern) = &schema.pattern {
        let pattern = pattern
            .strip_prefix('^')
            .and_then(|p| p.strip_suffix('$'))
            .unwrap_or(pattern);
        return Ok(format!("(\"{pattern}\")"));
    }
    if let Some(format) = &schema.format {
        return match format.as_str() {
            "uuid" => Ok(UUID.to_string()),
            "date-time" => Ok(DATE_TIME.to_string()),
            "date" => Ok(DATE.to_string()),
            "time" => Ok(TIME.to_string()),
            other => Err(SchemaError::UnsupportedFormat(other.to_string())),
        };
    }

    Ok(STRING.to_string())
}

fn array_regex(schema: &Schema, ws: &str) -> Result<String, SchemaError> {
    let Some(items) = &schema.items else {
        return Ok(r"\[\s*([^,\]]*\s*,?\s*)*\s*\]".to_string());
    };

    let item_regex = to_regex(items, ws)?;
    let min = schema.min_items.unwrap_or(0);
    if let Some(max) = schema.max_items.filter(|max| *max > 0) {
        return Ok(format!(
            "\\[\\s*({item_regex}\\s*,?\\s*){{{min},{max}}}\\s*\\]"
        ));
    }

    Ok(format!("\\[\\s*({item_regex}\\s*,?\\s*){{{min},}}\\s*\\]"))
}

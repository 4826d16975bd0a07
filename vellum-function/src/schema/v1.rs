use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An untyped structured document, as carried by `google.protobuf.Struct`.
pub type Struct = Map<String, Value>;

/// A request to run a function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFunctionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,

    /// The state of the composite and composed resources as observed by the
    /// composition engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<State>,

    /// The desired state accumulated by previous functions in the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<State>,

    /// Optional function-specific input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Struct>,

    /// Context passed along the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Struct>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Opaque tag identifying the request, for caching on the caller side.
    #[serde(default)]
    pub tag: String,
}

/// A set of resources: the composite and the composed resources, by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<Resource>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, Resource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// The resource document itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Struct>,

    #[serde(default, skip_serializing_if = "Ready::is_unspecified")]
    pub ready: Ready,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ready {
    #[default]
    #[serde(rename = "READY_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "READY_TRUE")]
    True,
    #[serde(rename = "READY_FALSE")]
    False,
}

impl Ready {
    pub fn is_unspecified(&self) -> bool {
        *self == Ready::Unspecified
    }
}

/// The response of a function run.
///
/// When `results` contains an entry of severity [`Severity::Fatal`], the
/// caller must disregard `desired`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFunctionResponse {
    #[serde(default)]
    pub meta: ResponseMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<State>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<FunctionResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Struct>,
}

impl RunFunctionResponse {
    /// Whether the response carries a fatal result.
    pub fn is_fatal(&self) -> bool {
        self.results.iter().any(|r| r.severity == Severity::Fatal)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    /// Copied from the request.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,

    /// How long the caller may cache this response.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ttl")]
    pub ttl: Option<Duration>,
}

/// A human-readable outcome of a function run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResult {
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "SEVERITY_UNSPECIFIED")]
    Unspecified,
    /// The run failed; the desired state must be ignored.
    #[serde(rename = "SEVERITY_FATAL")]
    Fatal,
    #[serde(rename = "SEVERITY_WARNING")]
    Warning,
    #[serde(rename = "SEVERITY_NORMAL")]
    Normal,
}

/// (De)serialization of `Option<Duration>` in the protobuf JSON form, e.g. `"60s"`
/// or `"1.5s"`.
mod ttl {
    use std::time::Duration;

    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&format_duration(d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let s: Option<String> = Option::deserialize(d)?;
        s.map(|s| parse_duration(&s).map_err(D::Error::custom))
            .transpose()
    }

    pub(super) fn format_duration(d: &Duration) -> String {
        if d.subsec_nanos() == 0 {
            format!("{}s", d.as_secs())
        } else {
            let frac = format!("{:09}", d.subsec_nanos());
            format!("{}.{}s", d.as_secs(), frac.trim_end_matches('0'))
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let secs = s
            .strip_suffix('s')
            .ok_or_else(|| format!("duration must end in 's': {:?}", s))?;
        let secs: f64 = secs
            .parse()
            .map_err(|e| format!("invalid duration {:?}: {}", s, e))?;
        Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {:?}: {}", s, e))
    }
}

//! Resource documents.
//!
//! A document is an opaque tree; only `metadata.labels` is given typed access.
//! Everything else passes through untouched.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::DocumentError;
use crate::schema::v1::{Ready, Struct};

/// The name of a composed resource within a composition pipeline.
pub type Name = String;

/// An untyped resource document with typed access to its labels.
///
/// `metadata` and `metadata.labels` are split out on construction, so a
/// value of this type always holds a well-formed label set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unstructured {
    /// Every top-level field except `metadata`.
    fields: Struct,
    /// Every `metadata` field except `labels`.
    metadata: Option<Struct>,
    labels: Option<BTreeMap<String, String>>,
}

impl Unstructured {
    pub fn from_struct(mut fields: Struct) -> Result<Self, DocumentError> {
        let mut metadata = match fields.remove("metadata") {
            None | Some(Value::Null) => None,
            Some(Value::Object(m)) => Some(m),
            Some(_) => return Err(DocumentError::NotAnObject("metadata")),
        };
        let labels = match metadata.as_mut().and_then(|m| m.remove("labels")) {
            None | Some(Value::Null) => None,
            Some(Value::Object(l)) => Some(
                l.into_iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => Ok((k, s)),
                        _ => Err(DocumentError::LabelNotString(k)),
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()?,
            ),
            Some(_) => return Err(DocumentError::NotAnObject("metadata.labels")),
        };
        Ok(Unstructured {
            fields,
            metadata,
            labels,
        })
    }

    pub fn into_struct(self) -> Struct {
        let mut out = self.fields;
        if self.metadata.is_some() || self.labels.is_some() {
            let mut metadata = self.metadata.unwrap_or_default();
            if let Some(labels) = self.labels {
                let labels: Map<String, Value> = labels
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                metadata.insert("labels".to_string(), Value::Object(labels));
            }
            out.insert("metadata".to_string(), Value::Object(metadata));
        }
        out
    }

    pub fn api_version(&self) -> Option<&str> {
        self.fields.get("apiVersion").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.fields.get("kind").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
    }

    /// The label set; empty when the document has none.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.labels.clone().unwrap_or_default()
    }

    /// Replace the label set, creating `metadata` if needed.
    pub fn set_labels(&mut self, labels: BTreeMap<String, String>) {
        self.labels = Some(labels);
    }

    /// Check that the document can be merged back into the wire
    /// representation as a resource: it must name its API version and kind.
    ///
    /// Reading tolerates documents that are still being assembled; only what
    /// a function hands back must be addressable by the composition engine.
    pub fn check_installable(&self) -> Result<(), DocumentError> {
        match self.api_version() {
            Some(v) if !v.is_empty() => {}
            _ => return Err(DocumentError::MissingField("apiVersion")),
        }
        match self.kind() {
            Some(k) if !k.is_empty() => {}
            _ => return Err(DocumentError::MissingField("kind")),
        }
        Ok(())
    }
}

impl TryFrom<Value> for Unstructured {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(o) => Unstructured::from_struct(o),
            _ => Err(DocumentError::NotAnObject("resource")),
        }
    }
}

/// A composed resource as desired by the pipeline so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredComposed {
    pub resource: Unstructured,
    pub ready: Ready,
}

impl DesiredComposed {
    pub fn new(resource: Unstructured) -> Self {
        DesiredComposed {
            resource,
            ready: Ready::Unspecified,
        }
    }
}

/// A composed resource as it exists in the cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedComposed {
    pub resource: Unstructured,
}

/// The composite resource that owns the composed resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    pub resource: Unstructured,
}

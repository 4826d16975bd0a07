//! Accessors for the parts of a [`RunFunctionRequest`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;
use crate::resource::{Composite, DesiredComposed, Name, ObservedComposed, Unstructured};
use crate::schema::v1::{Resource, RunFunctionRequest};

/// Name used in errors about the composite resource.
const COMPOSITE: &str = "(composite)";

/// The composed resources desired by previous functions in the pipeline.
///
/// Fails when the request carries no desired state at all, or when any
/// resource document is missing or malformed. Either way nothing is returned.
pub fn get_desired_composed_resources(
    req: &RunFunctionRequest,
) -> Result<BTreeMap<Name, DesiredComposed>, Error> {
    let desired = req
        .desired
        .as_ref()
        .ok_or(Error::MissingState("desired"))?;
    desired
        .resources
        .iter()
        .map(|(name, r)| -> Result<_, Error> {
            let resource = to_unstructured(name, r)?;
            Ok((
                name.clone(),
                DesiredComposed {
                    resource,
                    ready: r.ready,
                },
            ))
        })
        .collect()
}

/// The composed resources that currently exist. Empty when nothing was observed.
pub fn get_observed_composed_resources(
    req: &RunFunctionRequest,
) -> Result<BTreeMap<Name, ObservedComposed>, Error> {
    let Some(observed) = req.observed.as_ref() else {
        return Ok(BTreeMap::new());
    };
    observed
        .resources
        .iter()
        .map(|(name, r)| -> Result<_, Error> {
            Ok((
                name.clone(),
                ObservedComposed {
                    resource: to_unstructured(name, r)?,
                },
            ))
        })
        .collect()
}

pub fn get_observed_composite_resource(
    req: &RunFunctionRequest,
) -> Result<Option<Composite>, Error> {
    composite_of(req.observed.as_ref().and_then(|s| s.composite.as_ref()))
}

pub fn get_desired_composite_resource(
    req: &RunFunctionRequest,
) -> Result<Option<Composite>, Error> {
    composite_of(req.desired.as_ref().and_then(|s| s.composite.as_ref()))
}

/// Deserialize the function-specific input, if any.
pub fn get_input<T: DeserializeOwned>(req: &RunFunctionRequest) -> Result<Option<T>, Error> {
    req.input
        .as_ref()
        .map(|i| serde_json::from_value(Value::Object(i.clone())).map_err(Error::Input))
        .transpose()
}

pub fn get_context_key<'a>(req: &'a RunFunctionRequest, key: &str) -> Option<&'a Value> {
    req.context.as_ref().and_then(|c| c.get(key))
}

fn composite_of(r: Option<&Resource>) -> Result<Option<Composite>, Error> {
    r.map(|r| -> Result<_, Error> {
        Ok(Composite {
            resource: to_unstructured(COMPOSITE, r)?,
        })
    })
    .transpose()
}

fn to_unstructured(name: &str, r: &Resource) -> Result<Unstructured, Error> {
    let doc = r.resource.clone().ok_or_else(|| Error::MissingDocument {
        name: name.to_string(),
    })?;
    Unstructured::from_struct(doc).map_err(|source| Error::Malformed {
        name: name.to_string(),
        source,
    })
}

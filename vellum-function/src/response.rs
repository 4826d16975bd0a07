//! Builders for a [`RunFunctionResponse`].

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use serde_json::Value;

use crate::error::Error;
use crate::resource::{Composite, DesiredComposed, Name};
use crate::schema::v1::{
    FunctionResult, Resource, ResponseMeta, RunFunctionRequest, RunFunctionResponse, Severity,
    State,
};

/// How long callers may cache a response unless the function says otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Start a response to `req`.
///
/// The desired state and the context of the request are carried over, so a
/// function that changes nothing passes them along unchanged.
pub fn to(req: &RunFunctionRequest, ttl: Duration) -> RunFunctionResponse {
    RunFunctionResponse {
        meta: ResponseMeta {
            tag: req.meta.as_ref().map(|m| m.tag.clone()).unwrap_or_default(),
            ttl: Some(ttl),
        },
        desired: req.desired.clone(),
        results: Vec::new(),
        context: req.context.clone(),
    }
}

/// Mark the run as failed. The caller will disregard the desired state.
///
/// Errors are rendered with their full cause chain.
pub fn fatal(rsp: &mut RunFunctionResponse, err: impl Display) {
    push_result(rsp, Severity::Fatal, format!("{:#}", err));
}

pub fn warning(rsp: &mut RunFunctionResponse, err: impl Display) {
    push_result(rsp, Severity::Warning, format!("{:#}", err));
}

pub fn normal(rsp: &mut RunFunctionResponse, message: impl Into<String>) {
    push_result(rsp, Severity::Normal, message.into());
}

fn push_result(rsp: &mut RunFunctionResponse, severity: Severity, message: String) {
    rsp.results.push(FunctionResult { severity, message });
}

/// Install `resources` into the desired state of `rsp`, replacing entries of
/// the same name.
///
/// Every document is checked before anything is written: on error the
/// response is left exactly as it was.
pub fn set_desired_composed_resources(
    rsp: &mut RunFunctionResponse,
    resources: BTreeMap<Name, DesiredComposed>,
) -> Result<(), Error> {
    let mut installed = BTreeMap::new();
    for (name, r) in resources {
        if let Err(source) = r.resource.check_installable() {
            return Err(Error::NotInstallable { name, source });
        }
        installed.insert(
            name,
            Resource {
                resource: Some(r.resource.into_struct()),
                ready: r.ready,
            },
        );
    }
    rsp.desired
        .get_or_insert_with(State::default)
        .resources
        .extend(installed);
    Ok(())
}

pub fn set_desired_composite_resource(
    rsp: &mut RunFunctionResponse,
    composite: Composite,
) -> Result<(), Error> {
    composite
        .resource
        .check_installable()
        .map_err(|source| Error::NotInstallable {
            name: "(composite)".to_string(),
            source,
        })?;
    let desired = rsp.desired.get_or_insert_with(State::default);
    let ready = desired.composite.as_ref().map(|c| c.ready).unwrap_or_default();
    desired.composite = Some(Resource {
        resource: Some(composite.resource.into_struct()),
        ready,
    });
    Ok(())
}

pub fn set_context_key(rsp: &mut RunFunctionResponse, key: impl Into<String>, value: Value) {
    rsp.context
        .get_or_insert_with(Default::default)
        .insert(key.into(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Unstructured;
    use crate::schema::v1::RequestMeta;
    use serde_json::json;

    fn desired(v: Value) -> DesiredComposed {
        DesiredComposed::new(Unstructured::try_from(v).unwrap())
    }

    #[test]
    fn to_copies_tag_desired_and_context() {
        let req: RunFunctionRequest = serde_json::from_value(json!({
            "meta": { "tag": "t1" },
            "desired": { "resources": { "a": { "resource": { "kind": "X" } } } },
            "context": { "k": 1 }
        }))
        .unwrap();
        let rsp = to(&req, DEFAULT_TTL);
        assert_eq!(rsp.meta.tag, "t1");
        assert_eq!(rsp.meta.ttl, Some(Duration::from_secs(60)));
        assert_eq!(rsp.desired, req.desired);
        assert_eq!(rsp.context, req.context);
        assert!(rsp.results.is_empty());
    }

    #[test]
    fn to_without_meta() {
        let req = RunFunctionRequest {
            meta: None,
            ..Default::default()
        };
        assert_eq!(to(&req, DEFAULT_TTL).meta.tag, "");
        let req = RunFunctionRequest {
            meta: Some(RequestMeta { tag: "x".into() }),
            ..Default::default()
        };
        assert_eq!(to(&req, DEFAULT_TTL).meta.tag, "x");
    }

    #[test]
    fn results() {
        let mut rsp = RunFunctionResponse::default();
        normal(&mut rsp, "ok");
        warning(&mut rsp, "hmm");
        fatal(
            &mut rsp,
            anyhow::anyhow!("inner").context("cannot do the thing"),
        );
        assert_eq!(
            rsp.results,
            vec![
                FunctionResult {
                    severity: Severity::Normal,
                    message: "ok".into()
                },
                FunctionResult {
                    severity: Severity::Warning,
                    message: "hmm".into()
                },
                FunctionResult {
                    severity: Severity::Fatal,
                    message: "cannot do the thing: inner".into()
                },
            ]
        );
        assert!(rsp.is_fatal());
    }

    #[test]
    fn set_desired_merges_by_name() {
        let mut rsp = RunFunctionResponse {
            desired: Some(serde_json::from_value(json!({
                "resources": {
                    "keep": { "resource": { "apiVersion": "v1", "kind": "A" } },
                    "replace": { "resource": { "apiVersion": "v1", "kind": "Old" } }
                }
            }))
            .unwrap()),
            ..Default::default()
        };
        let resources = BTreeMap::from([(
            "replace".to_string(),
            desired(json!({ "apiVersion": "v1", "kind": "New" })),
        )]);
        set_desired_composed_resources(&mut rsp, resources).unwrap();

        let state = rsp.desired.unwrap();
        assert_eq!(state.resources.len(), 2);
        assert_eq!(
            state.resources["replace"].resource.as_ref().unwrap()["kind"],
            json!("New")
        );
        assert_eq!(
            state.resources["keep"].resource.as_ref().unwrap()["kind"],
            json!("A")
        );
    }

    #[test]
    fn set_desired_is_all_or_nothing() {
        let mut rsp = RunFunctionResponse::default();
        let resources = BTreeMap::from([
            (
                "a-good".to_string(),
                desired(json!({ "apiVersion": "v1", "kind": "ConfigMap" })),
            ),
            ("b-bad".to_string(), desired(json!({ "kind": "ConfigMap" }))),
        ]);
        let err = set_desired_composed_resources(&mut rsp, resources).unwrap_err();
        assert!(matches!(err, Error::NotInstallable { ref name, .. } if name == "b-bad"));
        assert_eq!(rsp.desired, None);
    }

    #[test]
    fn composite_and_context() {
        let mut rsp = RunFunctionResponse::default();
        let xr = Composite {
            resource: Unstructured::try_from(json!({ "apiVersion": "example.org/v1", "kind": "XR" }))
                .unwrap(),
        };
        set_desired_composite_resource(&mut rsp, xr).unwrap();
        set_context_key(&mut rsp, "example.org/k", json!("v"));
        assert_eq!(
            serde_json::to_value(&rsp).unwrap(),
            json!({
                "meta": {},
                "desired": { "composite": { "resource": { "apiVersion": "example.org/v1", "kind": "XR" } } },
                "context": { "example.org/k": "v" }
            })
        );
    }
}

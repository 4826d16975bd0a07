use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use vellum_function::framework::CompositionFunction;
use vellum_function::request;
use vellum_function::resource::{DesiredComposed, Name};
use vellum_function::response::{self, DEFAULT_TTL};
use vellum_function::schema::v1::{RunFunctionRequest, RunFunctionResponse};

/// The label every desired composed resource ends up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LabelRule {
    pub key: String,
    pub value: String,
}

impl Default for LabelRule {
    fn default() -> Self {
        LabelRule {
            key: "vellum.io/managed-by".to_string(),
            value: "crossplane-go".to_string(),
        }
    }
}

impl LabelRule {
    fn apply(&self, resources: &mut BTreeMap<Name, DesiredComposed>) {
        for (name, r) in resources.iter_mut() {
            let mut labels = r.resource.labels();
            labels.insert(self.key.clone(), self.value.clone());
            r.resource.set_labels(labels);
            tracing::debug!(resource = %name, "labeled");
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct LabelFunction {
    pub rule: LabelRule,
}

#[async_trait]
impl CompositionFunction for LabelFunction {
    /// Never fails: problems with the request are reported as a fatal result.
    #[tracing::instrument(skip_all, fields(tag = tracing::field::Empty))]
    async fn run_function(&self, request: RunFunctionRequest) -> Result<RunFunctionResponse> {
        let tag = request.meta.as_ref().map(|m| m.tag.as_str()).unwrap_or("");
        tracing::Span::current().record("tag", tag);
        tracing::info!("Running function");

        let mut rsp = response::to(&request, DEFAULT_TTL);

        let mut desired = match request::get_desired_composed_resources(&request)
            .context("cannot get desired resources")
        {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("{:#}", e);
                response::fatal(&mut rsp, e);
                return Ok(rsp);
            }
        };

        self.rule.apply(&mut desired);

        if let Err(e) = response::set_desired_composed_resources(&mut rsp, desired)
            .context("cannot set desired resources")
        {
            tracing::warn!("{:#}", e);
            response::fatal(&mut rsp, e);
            return Ok(rsp);
        }

        Ok(rsp)
    }
}

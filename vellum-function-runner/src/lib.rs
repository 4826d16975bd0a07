use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use vellum_function::rpc::FunctionRpcClient;
use vellum_function::schema::v1::{
    RequestMeta, Resource, RunFunctionRequest, RunFunctionResponse, State,
};

mod rpc;

pub struct FunctionConfig {
    pub function_executable: String,
    pub function_args: Vec<String>,
}

/// Runs a function executable, one process per request.
pub struct FunctionClient {
    function_config: FunctionConfig,
}

impl FunctionClient {
    pub fn new(function_config: FunctionConfig) -> Self {
        FunctionClient { function_config }
    }

    pub async fn run(&self, request: &RunFunctionRequest) -> Result<RunFunctionResponse> {
        let exe = &self.function_config.function_executable;
        tracing::info!(function = %exe, "running function");

        let mut process = tokio::process::Command::new(exe)
            .args(&self.function_config.function_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Could not spawn function process {}", exe))?;

        let client = rpc::build_rpc_client_from_child(&mut process)?;
        let response = client
            .run(request.clone())
            .await
            .with_context(|| format!("Function call to {} failed", exe))?;

        // Closes stdin, which tells the function to exit
        drop(client);

        let status = process.wait().await?;
        if !status.success() {
            tracing::warn!(function = %exe, %status, "function exited unsuccessfully");
        }

        Ok(response)
    }
}

/// Load a whole request from a JSON file.
pub fn load_request(path: &Path) -> Result<RunFunctionRequest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Could not parse request in {}", path.display()))
}

/// Build a request from a JSON file holding an object of resource name to
/// resource document.
pub fn load_desired(path: &Path, tag: Option<String>) -> Result<RunFunctionRequest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let documents: BTreeMap<String, Value> = serde_json::from_str(&contents)
        .with_context(|| format!("Could not parse desired resources in {}", path.display()))?;

    let mut resources = BTreeMap::new();
    for (name, document) in documents {
        let Value::Object(document) = document else {
            bail!("desired resource {:?} is not an object", name);
        };
        resources.insert(
            name,
            Resource {
                resource: Some(document),
                ..Default::default()
            },
        );
    }

    Ok(RunFunctionRequest {
        meta: tag.map(|tag| RequestMeta { tag }),
        desired: Some(State {
            composite: None,
            resources,
        }),
        ..Default::default()
    })
}

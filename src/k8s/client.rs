// Client construction with custom user-agent support for kube 2.x
use crate::error::{Error, Result as KsResult};
use hyper::http::{HeaderName, HeaderValue, Uri};
use kube::{Client, Config};
use tracing::warn;

/// Resolve the api configuration: an explicit address when given, otherwise
/// whatever kubeconfig or the in-cluster environment provides.
///
/// # Errors
///
/// Will return `Err` if the address is not a valid uri or no configuration can be inferred
pub async fn build_config(kube_addr: Option<&str>) -> KsResult<Config> {
    match kube_addr {
        Some(addr) => {
            let uri: Uri = addr.parse()?;
            Ok(Config::new(uri))
        }
        None => Ok(Config::infer().await?),
    }
}

/// Add a user-agent header so exporter traffic is identifiable in audit logs.
/// Invalid header values are logged and skipped.
pub fn add_user_agent_header(config: &mut Config, custom_user_agent: Option<&str>) {
    if let Some(user_agent) = custom_user_agent {
        match HeaderValue::from_str(user_agent) {
            Ok(header_value) => config
                .headers
                .push((HeaderName::from_static("user-agent"), header_value)),
            Err(e) => warn!("Ignoring invalid user-agent {:?}: {}", user_agent, e),
        }
    }
}

/// Create a new k8s client to interact with k8s cluster api
///
/// # Errors
///
/// Will return `Err` if the configuration cannot be resolved or the client cannot be built
pub async fn new(kube_addr: Option<&str>, custom_user_agent: Option<&str>) -> KsResult<Client> {
    let mut config = build_config(kube_addr).await?;
    add_user_agent_header(&mut config, custom_user_agent);

    Client::try_from(config).map_err(|e| Error::Connect(e.to_string()))
}

//! Pulling Helm charts stored in OCI registries

use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;

use crate::error::{RepoError, Result};

/// Media types of Helm charts in OCI
pub mod media_types {
    /// Helm chart config
    pub const HELM_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    /// Helm chart content layer
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
}

/// Parse `registry/repository:tag`, with or without the `oci://` scheme
pub fn parse_reference(reference: &str) -> Result<Reference> {
    let clean = reference.trim_start_matches(crate::source::OCI_SCHEME);

    Reference::try_from(clean).map_err(|e| RepoError::InvalidOciReference {
        reference: format!("{}: {}", reference, e),
    })
}

/// Reference of chart `name` at `version` inside the OCI repository `repository`
pub fn chart_reference(repository: &str, name: &str, version: &str) -> String {
    let base = repository
        .trim_start_matches(crate::source::OCI_SCHEME)
        .trim_end_matches('/');
    format!("{}/{}:{}", base, name, version)
}

/// Pull the chart content layer (a `.tgz`) of `reference`
pub(crate) async fn pull_chart(reference: &str) -> Result<Vec<u8>> {
    let reference = parse_reference(reference)?;
    let client = Client::new(ClientConfig {
        protocol: ClientProtocol::Https,
        ..Default::default()
    });

    let image = client
        .pull(
            &reference,
            &RegistryAuth::Anonymous,
            vec![media_types::HELM_CONFIG, media_types::HELM_CONTENT],
        )
        .await
        .map_err(|e| RepoError::OciError {
            message: format!("Failed to pull {}: {}", reference, e),
        })?;

    let layer = image
        .layers
        .into_iter()
        .find(|l| l.media_type == media_types::HELM_CONTENT)
        .ok_or_else(|| RepoError::OciError {
            message: format!("No chart content layer found in {}", reference),
        })?;

    Ok(layer.data)
}

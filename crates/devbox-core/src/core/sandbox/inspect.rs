use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use devbox_domain::SandboxMeta;

use crate::core::runtime::effects::ImageIdentity;

/// Go template handed to `inspect --type=image`.
pub(crate) const IMAGE_IDENTITY_FORMAT: &str = "{{join .RepoDigests \",\"}}|{{.Id}}";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ContainerInspect {
    config: InspectConfig,
    host_config: InspectHostConfig,
    mounts: Vec<InspectMount>,
    network_settings: InspectNetwork,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectConfig {
    env: Option<Vec<String>>,
    working_dir: String,
    user: String,
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectHostConfig {
    restart_policy: RestartPolicy,
    cap_add: Option<Vec<String>>,
    nano_cpus: i64,
    memory: i64,
    network_mode: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RestartPolicy {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectMount {
    #[serde(rename = "Type")]
    kind: String,
    source: String,
    destination: String,
    #[serde(rename = "RW")]
    rw: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InspectNetwork {
    ports: Option<BTreeMap<String, Option<Vec<PortBinding>>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct PortBinding {
    host_ip: String,
    host_port: String,
}

/// Builds sandbox metadata from `<cli> inspect <sandbox>` output.
pub(crate) fn meta_from_inspect(raw: &str) -> Result<SandboxMeta> {
    let documents: Vec<ContainerInspect> =
        serde_json::from_str(raw).context("failed to parse container inspect output")?;
    let Some(inspect) = documents.into_iter().next() else {
        anyhow::bail!("container inspect returned no documents");
    };

    let environment = inspect
        .config
        .env
        .unwrap_or_default()
        .iter()
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    let mut resources = BTreeMap::new();
    if inspect.host_config.nano_cpus > 0 {
        resources.insert("cpus".to_string(), format_cpus(inspect.host_config.nano_cpus));
    }
    if inspect.host_config.memory > 0 {
        resources.insert("memory".to_string(), format_memory(inspect.host_config.memory));
    }

    let volumes = inspect
        .mounts
        .iter()
        .map(|mount| {
            format!(
                "{} {} -> {} (rw={})",
                mount.kind, mount.source, mount.destination, mount.rw
            )
        })
        .collect();

    let mut ports = Vec::new();
    for (container_port, bindings) in inspect.network_settings.ports.unwrap_or_default() {
        for binding in bindings.unwrap_or_default() {
            let host_ip = if binding.host_ip.is_empty() {
                "0.0.0.0"
            } else {
                binding.host_ip.as_str()
            };
            ports.push(format!("{container_port} -> {host_ip}:{}", binding.host_port));
        }
    }

    Ok(SandboxMeta {
        working_dir: inspect.config.working_dir,
        user: inspect.config.user,
        restart_policy: inspect.host_config.restart_policy.name,
        network: inspect.host_config.network_mode,
        ports,
        volumes,
        labels: inspect.config.labels.unwrap_or_default(),
        environment,
        capabilities: inspect.host_config.cap_add.unwrap_or_default(),
        resources,
    })
}

/// CPU quota in whole cores with up to three decimals, trailing zeros trimmed.
pub(crate) fn format_cpus(nano_cpus: i64) -> String {
    let millis = (nano_cpus + 500_000) / 1_000_000;
    let rendered = format!("{}.{:03}", millis / 1000, millis % 1000);
    rendered
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Memory limit rounded to whole mebibytes.
pub(crate) fn format_memory(bytes: i64) -> String {
    const MIB: i64 = 1024 * 1024;
    format!("{}MB", (bytes + MIB / 2) / MIB)
}

/// Parses `digests|id` output from [`IMAGE_IDENTITY_FORMAT`]. Only the first
/// repo digest is kept.
pub(crate) fn parse_image_identity(raw: &str) -> ImageIdentity {
    let trimmed = raw.trim();
    let (digests, id) = trimmed.split_once('|').unwrap_or((trimmed, ""));
    let digest = digests
        .split(',')
        .map(str::trim)
        .find(|digest| !digest.is_empty())
        .map(ToOwned::to_owned);
    let id = Some(id.trim())
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned);
    ImageIdentity { digest, id }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSPECT: &str = r#"[{
        "Id": "abc",
        "State": {"Status": "running"},
        "Config": {
            "Env": ["PATH=/usr/bin", "LANG=C.UTF-8", "EMPTY="],
            "WorkingDir": "/workspace",
            "User": "dev",
            "Labels": {"devbox.project": "web"}
        },
        "HostConfig": {
            "RestartPolicy": {"Name": "unless-stopped"},
            "CapAdd": ["SYS_PTRACE"],
            "NanoCpus": 1500000000,
            "Memory": 2147483648,
            "NetworkMode": "bridge"
        },
        "Mounts": [
            {"Type": "bind", "Source": "/home/me/web", "Destination": "/workspace", "RW": true}
        ],
        "NetworkSettings": {
            "Ports": {
                "3000/tcp": [{"HostIp": "0.0.0.0", "HostPort": "3000"}],
                "9229/tcp": null
            }
        }
    }]"#;

    #[test]
    fn meta_reads_inspect_document() -> Result<()> {
        let meta = meta_from_inspect(INSPECT)?;
        assert_eq!(meta.working_dir, "/workspace");
        assert_eq!(meta.user, "dev");
        assert_eq!(meta.restart_policy, "unless-stopped");
        assert_eq!(meta.network, "bridge");
        assert_eq!(meta.environment.get("LANG").map(String::as_str), Some("C.UTF-8"));
        assert_eq!(meta.environment.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(meta.labels.get("devbox.project").map(String::as_str), Some("web"));
        assert_eq!(meta.capabilities, vec!["SYS_PTRACE".to_string()]);
        assert_eq!(meta.resources.get("cpus").map(String::as_str), Some("1.5"));
        assert_eq!(meta.resources.get("memory").map(String::as_str), Some("2048MB"));
        assert_eq!(
            meta.volumes,
            vec!["bind /home/me/web -> /workspace (rw=true)".to_string()]
        );
        assert_eq!(meta.ports, vec!["3000/tcp -> 0.0.0.0:3000".to_string()]);
        Ok(())
    }

    #[test]
    fn meta_tolerates_null_collections() -> Result<()> {
        let meta = meta_from_inspect(r#"[{"Config": {"Env": null, "Labels": null}}]"#)?;
        assert!(meta.environment.is_empty());
        assert!(meta.labels.is_empty());
        assert!(meta.resources.is_empty());
        assert!(meta_from_inspect("[]").is_err());
        Ok(())
    }

    #[test]
    fn cpu_quota_trims_trailing_zeros() {
        assert_eq!(format_cpus(2_000_000_000), "2");
        assert_eq!(format_cpus(250_000_000), "0.25");
        assert_eq!(format_cpus(1_234_400_000), "1.234");
    }

    #[test]
    fn image_identity_keeps_first_digest() {
        let identity = parse_image_identity("ubuntu@sha256:aaa,ubuntu@sha256:bbb|sha256:ccc\n");
        assert_eq!(identity.digest.as_deref(), Some("ubuntu@sha256:aaa"));
        assert_eq!(identity.id.as_deref(), Some("sha256:ccc"));

        let local = parse_image_identity("|sha256:ddd");
        assert!(local.digest.is_none());
        assert_eq!(local.id.as_deref(), Some("sha256:ddd"));
        assert!(!parse_image_identity("").is_known());
    }
}

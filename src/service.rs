use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::command::CommandLine;
use crate::error::Error;
use crate::mount::VolumeMount;
use crate::probe::Probe;

/// One entry under the manifest's `services` key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Service {
    pub(crate) image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) command: Option<CommandLine>,
    #[serde(default, skip_serializing_if = "RestartPolicy::is_default")]
    pub(crate) restart: RestartPolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) ports: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) env_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) volumes: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) networks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) readiness: Option<Probe>,
}

impl Service {
    pub(crate) fn new(image: impl ToString) -> Self {
        Self {
            image: image.to_string(),
            command: None,
            restart: RestartPolicy::default(),
            ports: Vec::new(),
            env_file: None,
            volumes: Vec::new(),
            networks: Vec::new(),
            depends_on: Vec::new(),
            readiness: None,
        }
    }
}

/// What the runtime does when the container exits. The default is to leave it
/// down, matching the runtime's own default.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum RestartPolicy {
    #[default]
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    pub(crate) fn is_default(&self) -> bool {
        *self == RestartPolicy::No
    }

    /// The `--restart` argument, or `None` when the default needs no flag.
    pub(crate) fn as_flag(&self) -> Option<&'static str> {
        match self {
            RestartPolicy::No => None,
            RestartPolicy::Always => Some("always"),
            RestartPolicy::OnFailure => Some("on-failure"),
            RestartPolicy::UnlessStopped => Some("unless-stopped"),
        }
    }
}

/// A published `host:container` port pair.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct PortMapping {
    pub(crate) host: u16,
    pub(crate) container: u16,
}

impl TryFrom<String> for PortMapping {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        let bad = || Error::BadSpec(format!("port mapping '{}'", s));
        let (host, container) = s.split_once(':').ok_or_else(bad)?;
        Ok(Self {
            host: host.parse().map_err(|_| bad())?,
            container: container.parse().map_err(|_| bad())?,
        })
    }
}

impl From<PortMapping> for String {
    fn from(p: PortMapping) -> String {
        format!("{}:{}", p.host, p.container)
    }
}

impl std::fmt::Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_policy_defaults_to_no() {
        let svc: Service = serde_yaml::from_str("image: redis:6.2-alpine").unwrap();
        assert_eq!(svc.restart, RestartPolicy::No);
        assert_eq!(svc.restart.as_flag(), None);
    }

    #[test]
    fn restart_policy_parses_kebab_case() {
        assert_eq!(
            serde_yaml::from_str::<RestartPolicy>("always").unwrap(),
            RestartPolicy::Always
        );
        assert_eq!(
            serde_yaml::from_str::<RestartPolicy>("on-failure").unwrap(),
            RestartPolicy::OnFailure
        );
    }

    #[test]
    fn port_mapping_roundtrips() {
        let p = PortMapping::try_from("8002:8002".to_string()).unwrap();
        assert_eq!(p, PortMapping { host: 8002, container: 8002 });
        assert_eq!(String::from(p), "8002:8002");
    }

    #[test]
    fn port_mapping_rejects_garbage() {
        for bad in ["8002", "a:b", "8002:", ":8002", "70000:80"] {
            assert!(PortMapping::try_from(bad.to_string()).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn full_service_entry_parses() {
        let yaml = r#"
image: ddp_backend:latest
command: gunicorn -b 0.0.0.0:8002 ddpui.wsgi
restart: always
ports:
  - "8002:8002"
env_file: .env.docker
volumes:
  - "${CLIENTS_DBT_MOUNT}:/data/clients_dbt"
networks:
  - dalgo
depends_on:
  - redis_server
readiness:
  tcp: 8002
"#;
        let svc: Service = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(svc.restart, RestartPolicy::Always);
        assert_eq!(svc.ports, vec![PortMapping { host: 8002, container: 8002 }]);
        assert_eq!(svc.depends_on, vec!["redis_server"]);
        assert_eq!(svc.readiness, Some(Probe::Tcp(8002)));
    }
}

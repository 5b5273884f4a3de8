use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::CommandLine;
use crate::error::Error;
use crate::mount::VolumeMount;
use crate::probe::Probe;
use crate::service::{PortMapping, RestartPolicy, Service};

/// The whole topology document: schema version, an optional project
/// namespace, and the service/volume/network declarations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Stack {
    #[serde(default = "default_version")]
    pub(crate) version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) project: Option<String>,
    pub(crate) services: BTreeMap<String, Service>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) volumes: BTreeMap<String, Option<VolumeSpec>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) networks: BTreeMap<String, Option<NetworkSpec>>,
}

fn default_version() -> String {
    "3.8".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub(crate) struct VolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) driver: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct NetworkSpec {
    #[serde(default = "default_driver")]
    pub(crate) driver: String,
}

fn default_driver() -> String {
    "bridge".to_string()
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self { driver: default_driver() }
    }
}

impl Stack {
    pub(crate) fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub(crate) fn render(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The namespace used for container, volume and network names:
    /// CLI override, then the manifest's `project`, then the file stem.
    pub(crate) fn project_name(&self, cli_override: Option<&str>, file: &Path) -> String {
        cli_override
            .map(|p| p.to_string())
            .or_else(|| self.project.clone())
            .or_else(|| file.file_stem().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| "stack".to_string())
    }

    /// The four-service topology this tool grew out of: a redis cache, the
    /// ddpui backend, a celery beat dispatcher and a celery worker, all on
    /// one bridge network.
    pub(crate) fn builtin() -> Self {
        let shared_mounts = vec![
            VolumeMount::rw("${CLIENTS_DBT_MOUNT}", "/data/clients_dbt"),
            VolumeMount::rw("${DEV_SECRETS_MOUNT}", "/data/secrets"),
            VolumeMount::rw("${LOGS_MOUNT}", "/usr/src/backend/ddpui/logs"),
        ];

        let mut redis_server = Service::new("redis:6.2-alpine");
        redis_server.volumes = vec![VolumeMount::rw("redisdata", "/data")];
        redis_server.networks = vec!["dalgo".to_string()];
        redis_server.readiness = Some(Probe::Exec(CommandLine::autosplit("redis-cli ping")));

        let mut backend = Service::new("ddp_backend:latest");
        backend.command = Some(CommandLine::autosplit("gunicorn -b 0.0.0.0:8002 ddpui.wsgi"));
        backend.restart = RestartPolicy::Always;
        backend.ports = vec![PortMapping { host: 8002, container: 8002 }];
        backend.env_file = Some(".env.docker".into());
        backend.volumes = shared_mounts.clone();
        backend.networks = vec!["dalgo".to_string()];
        backend.depends_on = vec!["redis_server".to_string()];
        backend.readiness = Some(Probe::Tcp(8002));

        let mut celery_beat = Service::new("ddp_backend:latest");
        celery_beat.command =
            Some(CommandLine::autosplit("celery -A ddpui beat -s /data/beat/celerybeat-schedule"));
        celery_beat.env_file = Some(".env.docker".into());
        celery_beat.volumes = vec![VolumeMount::rw("beat_storage", "/data/beat")];
        celery_beat.networks = vec!["dalgo".to_string()];
        celery_beat.depends_on = vec!["backend".to_string(), "redis_server".to_string()];

        let mut celery_worker = Service::new("ddp_backend:latest");
        celery_worker.command = Some(CommandLine::autosplit("celery -A ddpui worker -n ddpui"));
        celery_worker.env_file = Some(".env.docker".into());
        celery_worker.volumes = shared_mounts;
        celery_worker.networks = vec!["dalgo".to_string()];
        celery_worker.depends_on = vec!["backend".to_string(), "redis_server".to_string()];

        let services = BTreeMap::from([
            ("redis_server".to_string(), redis_server),
            ("backend".to_string(), backend),
            ("celery_beat".to_string(), celery_beat),
            ("celery_worker".to_string(), celery_worker),
        ]);
        let volumes =
            BTreeMap::from([("redisdata".to_string(), None), ("beat_storage".to_string(), None)]);
        let networks = BTreeMap::from([("dalgo".to_string(), Some(NetworkSpec::default()))]);

        Stack {
            version: default_version(),
            project: Some("dalgo".to_string()),
            services,
            volumes,
            networks,
        }
    }
}

/// Canonical name of a project-scoped docker resource.
pub(crate) fn scoped(project: &str, name: &str) -> String {
    format!("{project}_{name}")
}

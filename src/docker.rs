use std::io::Read;
use std::path::PathBuf;
use std::process::Stdio;

use log::debug;
use serde::Deserialize;

use crate::error::Error;

/// The docker CLI invocations the launcher needs, built as data so the argv
/// can be logged and tested without spawning anything.
pub(crate) enum DockerSubcommand {
    Run {
        name: String,
        image: String,
        /// first network joined at creation, with the service-name DNS alias
        network: Option<(String, String)>,
        restart: Option<String>,
        ports: Vec<String>,
        volumes: Vec<String>,
        env_file: Option<PathBuf>,
        command: Vec<String>,
    },
    Exec {
        container: String,
        command: Vec<String>,
    },
    Stop {
        container: String,
    },
    Remove {
        container: String,
    },
    ContainerInspect {
        container: String,
    },
    ContextInspect {
        name: String,
    },
    NetworkCreate {
        name: String,
        driver: String,
    },
    NetworkConnect {
        network: String,
        alias: String,
        container: String,
    },
    NetworkInspect {
        name: String,
    },
    VolumeCreate {
        name: String,
        driver: Option<String>,
    },
    VolumeInspect {
        name: String,
    },
}

pub(crate) struct DockerCommand {
    pub(crate) subcommand: DockerSubcommand,
    pub(crate) context: Option<String>,
}

impl DockerCommand {
    pub(crate) fn new(subcommand: DockerSubcommand, context: Option<String>) -> Self {
        Self { subcommand, context }
    }

    pub(crate) fn into_command(self) -> std::process::Command {
        let mut command = std::process::Command::new("docker");
        if let Some(context) = self.context {
            command.arg("-c").arg(context);
        }

        match self.subcommand {
            DockerSubcommand::Run {
                name,
                image,
                network,
                restart,
                ports,
                volumes,
                env_file,
                command: argv,
            } => {
                command.args(["run", "-d", "--name"]).arg(name);
                if let Some((network, alias)) = network {
                    command.arg("--network").arg(network);
                    command.arg("--network-alias").arg(alias);
                }
                if let Some(restart) = restart {
                    command.arg("--restart").arg(restart);
                }
                for port in ports {
                    command.arg("-p").arg(port);
                }
                for volume in volumes {
                    command.arg("-v").arg(volume);
                }
                if let Some(env_file) = env_file {
                    command.arg("--env-file").arg(env_file);
                }
                command.arg(image);
                command.args(argv);
            }
            DockerSubcommand::Exec { container, command: argv } => {
                command.arg("exec").arg(container).args(argv);
            }
            DockerSubcommand::Stop { container } => {
                command.arg("stop").arg(container);
            }
            DockerSubcommand::Remove { container } => {
                command.arg("rm").arg(container);
            }
            DockerSubcommand::ContainerInspect { container } => {
                command.args(["container", "inspect", "--format", "json"]).arg(container);
            }
            DockerSubcommand::ContextInspect { name } => {
                command.args(["context", "inspect", "--format", "json"]).arg(name);
            }
            DockerSubcommand::NetworkCreate { name, driver } => {
                command.args(["network", "create", "--driver"]).arg(driver).arg(name);
            }
            DockerSubcommand::NetworkConnect { network, alias, container } => {
                command
                    .args(["network", "connect", "--alias"])
                    .arg(alias)
                    .arg(network)
                    .arg(container);
            }
            DockerSubcommand::NetworkInspect { name } => {
                command.args(["network", "inspect"]).arg(name);
            }
            DockerSubcommand::VolumeCreate { name, driver } => {
                command.args(["volume", "create"]);
                if let Some(driver) = driver {
                    command.arg("--driver").arg(driver);
                }
                command.arg(name);
            }
            DockerSubcommand::VolumeInspect { name } => {
                command.args(["volume", "inspect"]).arg(name);
            }
        }

        command
    }

    /// Runs to completion, discarding stdout; a non-zero exit becomes an
    /// error carrying whatever the daemon wrote to stderr.
    pub(crate) fn run(self, scope: &str) -> Result<(), Error> {
        let mut command = self.into_command();
        command.stdout(Stdio::null()).stderr(Stdio::piped());
        debug!("{}: docker {:?}", scope, command.get_args().collect::<Vec<_>>());
        let mut handle = command.spawn()?;
        let status = handle.wait()?;
        if status.success() {
            return Ok(());
        }
        let mut detail = String::new();
        if let Some(mut stderr) = handle.stderr.take() {
            stderr.read_to_string(&mut detail)?;
        }
        let detail = detail.trim();
        let detail = if detail.is_empty() { format!("exit status {}", status) } else { detail.to_string() };
        Err(Error::Docker { scope: scope.to_string(), detail })
    }

    /// Runs to completion and returns captured stdout.
    pub(crate) fn output(self, scope: &str) -> Result<Vec<u8>, Error> {
        let mut command = self.into_command();
        debug!("{}: docker {:?}", scope, command.get_args().collect::<Vec<_>>());
        let out = command.stdout(Stdio::piped()).stderr(Stdio::piped()).output()?;
        if !out.status.success() {
            let detail = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(Error::Docker { scope: scope.to_string(), detail });
        }
        Ok(out.stdout)
    }

    /// Existence-style check with all output suppressed, the way the daemon
    /// is queried for resources that may legitimately be absent.
    pub(crate) fn succeeds(self) -> bool {
        let mut command = self.into_command();
        command.stdout(Stdio::null()).stderr(Stdio::null());
        matches!(command.status(), Ok(status) if status.success())
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct ContainerState {
    #[serde(rename = "Status")]
    pub(crate) status: String,
    #[serde(rename = "ExitCode")]
    pub(crate) exit_code: i64,
}

#[derive(Deserialize, Debug)]
struct ContainerInspectEntry {
    #[serde(rename = "State")]
    state: ContainerState,
}

impl ContainerState {
    pub(crate) fn is_running(&self) -> bool {
        self.status == "running"
    }
}

#[derive(Deserialize, Debug)]
struct ContextInspectEntry {
    #[serde(rename = "Endpoints")]
    endpoints: std::collections::BTreeMap<String, ContextEndpoint>,
}

#[derive(Deserialize, Debug)]
struct ContextEndpoint {
    #[serde(rename = "Host")]
    host: String,
}

/// The host a context's containers publish their ports on, or `None` when
/// the daemon endpoint is local to this machine.
pub(crate) fn context_host(context: &str) -> Result<Option<String>, Error> {
    let out = DockerCommand::new(
        DockerSubcommand::ContextInspect { name: context.to_string() },
        None,
    )
    .output("context inspect")?;
    let entries: Vec<ContextInspectEntry> = serde_json::from_slice(&out)?;
    let endpoint = entries
        .into_iter()
        .next()
        .and_then(|e| e.endpoints.into_iter().find(|(k, _)| k == "docker").map(|(_, v)| v))
        .ok_or_else(|| Error::Docker {
            scope: "context inspect".to_string(),
            detail: format!("context {} has no docker endpoint", context),
        })?;
    Ok(endpoint_host(&endpoint.host))
}

/// Extracts the reachable host from a daemon endpoint URL. Local transports
/// (unix sockets, named pipes) yield `None`.
pub(crate) fn endpoint_host(endpoint: &str) -> Option<String> {
    let (scheme, rest) = endpoint.split_once("://")?;
    if matches!(scheme, "unix" | "npipe" | "fd") {
        return None;
    }
    let authority = rest.split('/').next().unwrap_or(rest);
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = match host.rsplit_once(':') {
        Some((h, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    };
    if host.is_empty() { None } else { Some(host.to_string()) }
}

/// Inspects a container by name; `None` means the daemon knows no such
/// container.
pub(crate) fn container_state(
    context: Option<&str>,
    container: &str,
) -> Result<Option<ContainerState>, Error> {
    let cmd = DockerCommand::new(
        DockerSubcommand::ContainerInspect { container: container.to_string() },
        context.map(|c| c.to_string()),
    );
    let out = cmd.into_command().stdout(Stdio::piped()).stderr(Stdio::null()).output()?;
    if !out.status.success() {
        return Ok(None);
    }
    let entries: Vec<ContainerInspectEntry> = serde_json::from_slice(&out.stdout)?;
    Ok(entries.into_iter().next().map(|e| e.state))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(cmd: DockerCommand) -> Vec<String> {
        cmd.into_command()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn run_argv_orders_flags_before_image() {
        let cmd = DockerCommand::new(
            DockerSubcommand::Run {
                name: "dalgo_backend".to_string(),
                image: "ddp_backend:latest".to_string(),
                network: Some(("dalgo_dalgo".to_string(), "backend".to_string())),
                restart: Some("always".to_string()),
                ports: vec!["8002:8002".to_string()],
                volumes: vec!["/a:/data/clients_dbt".to_string()],
                env_file: Some(PathBuf::from(".env.docker")),
                command: vec!["gunicorn".to_string(), "ddpui.wsgi".to_string()],
            },
            None,
        );
        assert_eq!(
            argv(cmd),
            [
                "run", "-d", "--name", "dalgo_backend",
                "--network", "dalgo_dalgo", "--network-alias", "backend",
                "--restart", "always",
                "-p", "8002:8002",
                "-v", "/a:/data/clients_dbt",
                "--env-file", ".env.docker",
                "ddp_backend:latest", "gunicorn", "ddpui.wsgi",
            ]
        );
    }

    #[test]
    fn context_precedes_the_subcommand() {
        let cmd = DockerCommand::new(
            DockerSubcommand::Stop { container: "dalgo_backend".to_string() },
            Some("remote".to_string()),
        );
        assert_eq!(argv(cmd), ["-c", "remote", "stop", "dalgo_backend"]);
    }

    #[test]
    fn endpoint_host_distinguishes_local_and_remote() {
        assert_eq!(endpoint_host("unix:///var/run/docker.sock"), None);
        assert_eq!(endpoint_host("npipe:////./pipe/docker_engine"), None);
        assert_eq!(endpoint_host("tcp://10.0.0.5:2376"), Some("10.0.0.5".to_string()));
        assert_eq!(endpoint_host("ssh://deploy@build-host"), Some("build-host".to_string()));
        assert_eq!(
            endpoint_host("ssh://deploy@build-host:2222"),
            Some("build-host".to_string())
        );
        assert_eq!(endpoint_host("no-scheme"), None);
    }

    #[test]
    fn context_inspect_argv() {
        let cmd = DockerCommand::new(
            DockerSubcommand::ContextInspect { name: "remote".to_string() },
            None,
        );
        assert_eq!(argv(cmd), ["context", "inspect", "--format", "json", "remote"]);
    }

    #[test]
    fn exec_appends_the_probe_words() {
        let cmd = DockerCommand::new(
            DockerSubcommand::Exec {
                container: "dalgo_redis_server".to_string(),
                command: vec!["redis-cli".to_string(), "ping".to_string()],
            },
            None,
        );
        assert_eq!(argv(cmd), ["exec", "dalgo_redis_server", "redis-cli", "ping"]);
    }
}

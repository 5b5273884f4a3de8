use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use indicatif::ProgressBar;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::command::CommandLine;
use crate::docker::{DockerCommand, DockerSubcommand, container_state, context_host};
use crate::error::Error;

/// How a service signals it can actually serve, beyond its container merely
/// being in the `running` state. Services that publish no host port get the
/// `exec` form, which probes from inside the container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Probe {
    /// connect to a published host port
    Tcp(u16),
    /// GET expecting a 2xx
    Http(String),
    /// run a command in the container, expecting exit 0
    Exec(CommandLine),
}

pub(crate) const MAX_ATTEMPTS: u32 = 8;
const INITIAL_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay before retrying after the given zero-based attempt: doubles from
/// half a second, capped at ten seconds.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    INITIAL_DELAY.saturating_mul(1u32 << attempt.min(16)).min(MAX_DELAY)
}

/// Backoff after the given attempt, or `None` once no retry is left. The
/// final failure is reported without a trailing sleep.
fn delay_after(attempt: u32) -> Option<Duration> {
    (attempt + 1 < MAX_ATTEMPTS).then(|| backoff_delay(attempt))
}

/// Blocks until the container is running and its probe (if any) passes,
/// retrying with bounded exponential backoff. Dependents must not be started
/// until this returns.
pub(crate) fn wait_ready(
    context: Option<&str>,
    service: &str,
    container: &str,
    probe: Option<&Probe>,
) -> Result<(), Error> {
    // published ports live on the daemon's machine, which a context may put
    // on another host entirely
    let daemon_host = match context {
        Some(ctx) => context_host(ctx)?,
        None => None,
    };
    let bar = ProgressBar::new_spinner();
    bar.set_message(format!("{}: waiting for readiness", service));
    for attempt in 0..MAX_ATTEMPTS {
        bar.tick();
        match container_state(context, container)? {
            Some(state) if state.is_running() => {
                let passed = match probe {
                    None => true,
                    Some(probe) => {
                        attempt_probe(context, container, probe, daemon_host.as_deref())
                    }
                };
                if passed {
                    bar.finish_and_clear();
                    debug!("{}: ready after {} attempt(s)", service, attempt + 1);
                    return Ok(());
                }
            }
            Some(state) => {
                warn!(
                    "{}: container is {} (exit code {})",
                    service, state.status, state.exit_code
                );
            }
            None => warn!("{}: container vanished while waiting", service),
        }
        if let Some(delay) = delay_after(attempt) {
            debug!("{}: attempt {} not ready, backing off {:?}", service, attempt + 1, delay);
            std::thread::sleep(delay);
        }
    }
    bar.finish_and_clear();
    Err(Error::NotReady { service: service.to_string(), attempts: MAX_ATTEMPTS })
}

/// Runs one probe attempt. `daemon_host` is where the daemon publishes
/// ports; when set, tcp probes dial it and http probe URLs have their host
/// rewritten to it, so readiness is never judged against the wrong machine.
fn attempt_probe(
    context: Option<&str>,
    container: &str,
    probe: &Probe,
    daemon_host: Option<&str>,
) -> bool {
    match probe {
        Probe::Tcp(port) => {
            let host = daemon_host.unwrap_or("127.0.0.1");
            let addrs = match (host, *port).to_socket_addrs() {
                Ok(addrs) => addrs,
                Err(e) => {
                    warn!("tcp probe: cannot resolve {}: {}", host, e);
                    return false;
                }
            };
            addrs
                .into_iter()
                .next()
                .is_some_and(|addr| TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok())
        }
        Probe::Http(url) => {
            let url = match http_probe_url(url, daemon_host) {
                Some(url) => url,
                None => {
                    warn!("http probe: bad url {}", url);
                    return false;
                }
            };
            let client = match reqwest::blocking::Client::builder().timeout(PROBE_TIMEOUT).build()
            {
                Ok(client) => client,
                Err(e) => {
                    warn!("http probe client: {}", e);
                    return false;
                }
            };
            match client.get(url).send() {
                Ok(res) => res.status().is_success(),
                Err(_) => false,
            }
        }
        Probe::Exec(command) => DockerCommand::new(
            DockerSubcommand::Exec {
                container: container.to_string(),
                command: command.words(),
            },
            context.map(|c| c.to_string()),
        )
        .succeeds(),
    }
}

fn http_probe_url(raw: &str, daemon_host: Option<&str>) -> Option<reqwest::Url> {
    let mut url = reqwest::Url::parse(raw).ok()?;
    if let Some(host) = daemon_host {
        url.set_host(Some(host)).ok()?;
    }
    Some(url)
}

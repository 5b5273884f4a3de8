use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};

mod command;
mod docker;
mod error;
mod mount;
mod plan;
mod probe;
mod service;
mod stack;
mod validate;

use docker::{DockerCommand, DockerSubcommand, container_state};
use error::Error;
use plan::start_order;
use service::Service;
use stack::{Stack, scoped};

#[derive(Parser, Debug)]
#[command(
    name = "flotilla",
    about = "Bring small container stacks up in dependency order, gating each wave on readiness"
)]
struct Cli {
    /// stack manifest to operate on
    #[arg(short, long, global = true, default_value = "stack.yaml")]
    file: PathBuf,
    /// namespace for containers, volumes and networks (defaults to the
    /// manifest's project, then the file stem)
    #[arg(short, long, global = true)]
    project: Option<String>,
    /// docker context to run against
    #[arg(short, long, global = true)]
    context: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the built-in dalgo topology as YAML
    Render {
        /// write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// structurally validate the manifest
    Check,
    /// show the computed start waves
    Plan,
    /// create networks and volumes, then start every service wave by wave
    Up,
    /// stop and remove the stack's containers, dependents first
    Down,
    /// show per-service container state
    Ps,
}

fn main() {
    pretty_env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn env_override(name: &str) -> Option<String> {
    match std::env::var(format!("FLOTILLA_{}", name)) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let Cli { file, project, context, command } = cli;
    let context = context.or_else(|| env_override("DOCKER_CONTEXT"));
    let context = context.as_deref();
    let project = project.as_deref();

    match command {
        Command::Render { output } => {
            let rendered = Stack::builtin().render()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    info!("wrote {}", path.display());
                }
                None => print!("{}", rendered),
            }
            Ok(())
        }
        Command::Check => {
            let stack = Stack::load(&file)?;
            validate::validate(&stack)?;
            start_order(&stack)?;
            info!(
                "{}: ok ({} services, {} volumes, {} networks)",
                file.display(),
                stack.services.len(),
                stack.volumes.len(),
                stack.networks.len()
            );
            Ok(())
        }
        Command::Plan => {
            let stack = Stack::load(&file)?;
            validate::validate(&stack)?;
            let plan = start_order(&stack)?;
            for (i, wave) in plan.waves.iter().enumerate() {
                println!("wave {}: {}", i + 1, wave.join(", "));
            }
            Ok(())
        }
        Command::Up => cmd_up(&file, project, context),
        Command::Down => cmd_down(&file, project, context),
        Command::Ps => cmd_ps(&file, project, context),
    }
}

fn cmd_up(file: &Path, project_override: Option<&str>, context: Option<&str>) -> Result<(), Error> {
    let stack = Stack::load(file)?;
    validate::validate(&stack)?;
    let plan = start_order(&stack)?;
    let project = stack.project_name(project_override, file);

    let bindings = resolve_bindings(&stack, &project)?;

    ensure_networks(&stack, &project, context)?;
    ensure_volumes(&stack, &project, context)?;

    info!("{}: start order:", project);
    for (i, wave) in plan.waves.iter().enumerate() {
        info!("  wave {}: {}", i + 1, wave.join(", "));
    }

    for wave in &plan.waves {
        for name in wave {
            let service = &stack.services[name.as_str()];
            start_service(&project, name, service, &bindings[name.as_str()], context)?;
        }
        // later waves must not start until this whole wave answers its probes
        for name in wave {
            let service = &stack.services[name.as_str()];
            let container = scoped(&project, name);
            probe::wait_ready(context, name, &container, service.readiness.as_ref())?;
            info!("{}: ready", name);
        }
    }

    info!("{}: all {} services up", project, stack.services.len());
    Ok(())
}

/// Resolves every service's mounts and env file before anything touches the
/// daemon: an unset env var, absent host path or absent env file aborts the
/// deploy with no container, volume or network created.
fn resolve_bindings<'a>(
    stack: &'a Stack,
    project: &str,
) -> Result<BTreeMap<&'a str, Vec<String>>, Error> {
    let mut bindings = BTreeMap::new();
    for (name, service) in &stack.services {
        let mut resolved = Vec::new();
        for mount in &service.volumes {
            if let Some(path) = mount.host_path()? {
                if !path.exists() {
                    return Err(Error::MissingHostPath { service: name.clone(), path });
                }
            }
            resolved.push(mount.binding_arg(project)?);
        }
        if let Some(env_file) = &service.env_file {
            if !env_file.exists() {
                return Err(Error::MissingEnvFile {
                    service: name.clone(),
                    path: env_file.clone(),
                });
            }
        }
        bindings.insert(name.as_str(), resolved);
    }
    Ok(bindings)
}

fn ensure_networks(stack: &Stack, project: &str, context: Option<&str>) -> Result<(), Error> {
    for (name, spec) in &stack.networks {
        let scoped_name = scoped(project, name);
        let probe = DockerCommand::new(
            DockerSubcommand::NetworkInspect { name: scoped_name.clone() },
            ctx(context),
        );
        if probe.succeeds() {
            debug!("network {} already exists", scoped_name);
            continue;
        }
        let driver = spec.clone().unwrap_or_default().driver;
        info!("creating network {} ({})", scoped_name, driver);
        DockerCommand::new(
            DockerSubcommand::NetworkCreate { name: scoped_name, driver },
            ctx(context),
        )
        .run("network create")?;
    }
    Ok(())
}

fn ensure_volumes(stack: &Stack, project: &str, context: Option<&str>) -> Result<(), Error> {
    for (name, spec) in &stack.volumes {
        let scoped_name = scoped(project, name);
        let probe = DockerCommand::new(
            DockerSubcommand::VolumeInspect { name: scoped_name.clone() },
            ctx(context),
        );
        if probe.succeeds() {
            debug!("volume {} already exists", scoped_name);
            continue;
        }
        let driver = spec.clone().unwrap_or_default().driver;
        info!("creating volume {}", scoped_name);
        DockerCommand::new(
            DockerSubcommand::VolumeCreate { name: scoped_name, driver },
            ctx(context),
        )
        .run("volume create")?;
    }
    Ok(())
}

fn start_service(
    project: &str,
    name: &str,
    service: &Service,
    bindings: &[String],
    context: Option<&str>,
) -> Result<(), Error> {
    let container = scoped(project, name);
    if let Some(state) = container_state(context, &container)? {
        if state.is_running() {
            info!("{}: already running", name);
            return Ok(());
        }
        warn!("{}: removing stale container ({})", name, state.status);
        DockerCommand::new(
            DockerSubcommand::Remove { container: container.clone() },
            ctx(context),
        )
        .run(name)?;
    }

    let mut networks = service.networks.iter();
    let first = networks.next().map(|net| (scoped(project, net), name.to_string()));
    info!("{}: starting {}", name, service.image);
    DockerCommand::new(
        DockerSubcommand::Run {
            name: container.clone(),
            image: service.image.clone(),
            network: first,
            restart: service.restart.as_flag().map(|f| f.to_string()),
            ports: service.ports.iter().map(|p| p.to_string()).collect(),
            volumes: bindings.to_vec(),
            env_file: service.env_file.clone(),
            command: service.command.as_ref().map(|c| c.words()).unwrap_or_default(),
        },
        ctx(context),
    )
    .run(name)?;

    for net in networks {
        debug!("{}: joining extra network {}", name, net);
        DockerCommand::new(
            DockerSubcommand::NetworkConnect {
                network: scoped(project, net),
                alias: name.to_string(),
                container: container.clone(),
            },
            ctx(context),
        )
        .run(name)?;
    }
    Ok(())
}

fn cmd_down(
    file: &Path,
    project_override: Option<&str>,
    context: Option<&str>,
) -> Result<(), Error> {
    let stack = Stack::load(file)?;
    let plan = start_order(&stack)?;
    let project = stack.project_name(project_override, file);

    for name in plan.shutdown_order() {
        let container = scoped(&project, name);
        match container_state(context, &container)? {
            None => debug!("{}: no container", name),
            Some(state) => {
                if state.is_running() {
                    info!("{}: stopping", name);
                    DockerCommand::new(
                        DockerSubcommand::Stop { container: container.clone() },
                        ctx(context),
                    )
                    .run(name)?;
                }
                DockerCommand::new(DockerSubcommand::Remove { container }, ctx(context))
                    .run(name)?;
                info!("{}: removed", name);
            }
        }
    }
    Ok(())
}

fn cmd_ps(file: &Path, project_override: Option<&str>, context: Option<&str>) -> Result<(), Error> {
    let stack = Stack::load(file)?;
    let project = stack.project_name(project_override, file);
    for name in stack.services.keys() {
        let container = scoped(&project, name);
        match container_state(context, &container)? {
            Some(state) if state.is_running() => println!("{:<20} {}", name, state.status),
            Some(state) => println!("{:<20} {} (exit code {})", name, state.status, state.exit_code),
            None => println!("{:<20} absent", name),
        }
    }
    Ok(())
}

fn ctx(context: Option<&str>) -> Option<String> {
    context.map(|c| c.to_string())
}

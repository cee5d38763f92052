//! The WireGuard REST API host deployment expressed as a plan.
//!
//! Provisions a Docker host, starts the API container with fixed
//! port/capability configuration, waits for the API to come up and
//! optionally provisions a first VPN client. The VPN and REST semantics
//! live entirely inside the external container image; every stage here
//! only drives `docker` and the service's HTTP surface.

use std::time::Duration;

use thiserror::Error;

use crate::actions::{
    AwaitReadyAction, CreateClientAction, EnsureDirAction, HttpProbe, ProcessAction, ProcessProbe,
    RemoveDirAction,
};
use crate::config::{ConfigError, DeployConfig};
use crate::plan::{Plan, PlanError};
use crate::poll::{CancelToken, PollSpec};
use crate::stage::Stage;

/// Fixed name the container runs under. Idempotency for the container
/// stages keys purely on this name, never on the image filter.
pub const CONTAINER_NAME: &str = "wg-rest-api";

/// Error building the deployment plan.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Compile a validated configuration into the deployment plan. The
/// configuration is rejected before any side effect occurs.
pub fn deployment_plan(config: &DeployConfig, cancel: &CancelToken) -> Result<Plan, DeployError> {
    config.validate()?;

    let state_dir = config.state_dir.display().to_string();
    let api_base = config.api_base();

    let install_docker = Stage::builder(
        "install-docker",
        ProcessAction::new("sh", &["-c", "curl -fsSL https://get.docker.com | sh"]),
    )
    .description("Install the Docker engine")
    .check(ProcessProbe::new("docker", &["--version"]))
    .timeout(Duration::from_secs(600))
    .build();

    // Nothing downstream can proceed without the engine, so exhaustion
    // here is fatal.
    let daemon_ready = Stage::builder(
        "docker-daemon-ready",
        AwaitReadyAction::new(
            ProcessProbe::new("docker", &["info"]),
            PollSpec::new(Duration::from_secs(2), 15).with_timeout(Duration::from_secs(60)),
            cancel.clone(),
        ),
    )
    .description("Wait for the Docker daemon to answer")
    .timeout(Duration::from_secs(90))
    .build();

    let state = Stage::builder("state-dir", EnsureDirAction::new(&config.state_dir))
        .description("Create the persistent configuration directory")
        .check(crate::actions::DirExistsProbe::new(&config.state_dir))
        .compensation(RemoveDirAction::new(&config.state_dir))
        .timeout(Duration::from_secs(10))
        .build();

    let pull_image = Stage::builder(
        "pull-image",
        ProcessAction::new("docker", &["pull", &config.image_reference]),
    )
    .description("Pull the WireGuard REST API image")
    .check(
        ProcessProbe::new("docker", &["images", "-q", &config.image_reference]).require_stdout(),
    )
    .timeout(Duration::from_secs(600))
    .build();

    let api_port = config.ports.api.to_string();
    let vpn_port = config.ports.vpn.to_string();
    let start_container = Stage::builder(
        "start-container",
        ProcessAction::new(
            "docker",
            &[
                "run",
                "-d",
                "--name",
                CONTAINER_NAME,
                "--restart",
                "unless-stopped",
                "--cap-add",
                "NET_ADMIN",
                "--cap-add",
                "SYS_MODULE",
                "--sysctl",
                "net.ipv4.conf.all.src_valid_mark=1",
                "--sysctl",
                "net.ipv4.ip_forward=1",
                "-v",
                &format!("{state_dir}:/app/config"),
                "-p",
                &format!("{api_port}:{api_port}/tcp"),
                "-p",
                &format!("{vpn_port}:{vpn_port}/udp"),
                "-e",
                &format!("WG_HOST={}", config.host),
                "-e",
                &format!("PASSWORD={}", config.auth_token),
                "-e",
                &format!("WG_DEFAULT_DNS={}", config.dns_server),
                &config.image_reference,
            ],
        ),
    )
    .description("Start the API container")
    .check(container_named_probe(false))
    .compensation(ProcessAction::new("docker", &["rm", "-f", CONTAINER_NAME]))
    .timeout(Duration::from_secs(120))
    .build();

    let container_running = Stage::builder(
        "container-running",
        AwaitReadyAction::new(
            container_named_probe(true),
            PollSpec::new(Duration::from_secs(2), 15).with_timeout(Duration::from_secs(60)),
            cancel.clone(),
        ),
    )
    .description("Wait for the container process to stay up")
    .timeout(Duration::from_secs(90))
    .build();

    // Documented behavior accepts a degraded "service may become ready
    // later" outcome, so API-poll exhaustion never aborts the run.
    let api_ready = Stage::builder(
        "api-ready",
        AwaitReadyAction::new(
            HttpProbe::new(&api_base, Some(&config.auth_token)),
            PollSpec::new(Duration::from_secs(3), 20).with_timeout(Duration::from_secs(120)),
            cancel.clone(),
        ),
    )
    .description("Wait for the REST API to answer")
    .best_effort()
    .timeout(Duration::from_secs(180))
    .build();

    let mut builder = Plan::builder("wireguard-host")
        .stage(install_docker)
        .stage(daemon_ready)
        .stage(state)
        .stage(pull_image)
        .stage(start_container)
        .stage(container_running)
        .stage(api_ready);

    if config.create_first_client {
        let first_client = Stage::builder(
            "first-client",
            CreateClientAction::new(
                &api_base,
                &config.auth_token,
                &config.client_name,
                &config.artifact_dir,
            ),
        )
        .description("Provision the first VPN client and fetch its artifacts")
        .best_effort()
        .timeout(Duration::from_secs(60))
        .build();
        builder = builder.stage(first_client);
    }

    Ok(builder.build()?)
}

fn container_named_probe(running_only: bool) -> ProcessProbe {
    let filter = format!("name=^{CONTAINER_NAME}$");
    if running_only {
        ProcessProbe::new("docker", &["ps", "-q", "--filter", &filter]).require_stdout()
    } else {
        ProcessProbe::new("docker", &["ps", "-aq", "--filter", &filter]).require_stdout()
    }
}

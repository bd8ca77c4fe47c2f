//! CLI command implementations
//!
//! Every command builds its raid group objects from the configuration,
//! runs to completion in-process and prints one JSON object. Nothing is
//! written to disk.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::change_config::{ControllerRole, RequestAdmission};
use crate::cluster::{link_pair, ClusterLink};
use crate::controller::{drive_pair, Controller, ControllerSetup};
use crate::geometry::MetadataPositionCalculator;
use crate::hooks::{HookAction, HookPoint, ScriptedHooks};
use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry, Severity};
use crate::raid_group::{DownstreamEdge, EdgeHealthEvaluator, LinkState};
use crate::verify::VerifyKind;

use super::args::{Cli, Command};
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Parse arguments, run the command and print its result.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let severity = Severity::from_name(&cli.log_level).ok_or_else(|| {
        CliError::invalid_argument(format!("Unknown log level: '{}'", cli.log_level))
    })?;
    Logger::set_min_severity(severity);
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let result = match cmd {
        Command::Layout { config, capacity } => layout(config.as_deref(), capacity),
        Command::Expand {
            config,
            capacity,
            fail_at,
            max_ticks,
        } => expand(config.as_deref(), capacity, fail_at.as_deref(), max_ticks),
        Command::Verify {
            config,
            kind,
            lba,
            blocks,
            max_ticks,
        } => verify(config.as_deref(), &kind, lba, blocks, max_ticks),
        Command::Health { config, links } => health(config.as_deref(), &links),
    };

    match result {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

fn load_config(path: Option<&Path>) -> CliResult<Config> {
    let config = Config::load_or_default(path)?;
    let source = path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string());
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("source", source.as_str()),
            ("group", config.group_id.as_str()),
            ("raid_type", config.raid_type.as_str()),
            ("width", config.width.to_string().as_str()),
        ],
    );
    Ok(config)
}

/// Metadata positions for `capacity`, or the configured capacity.
pub fn layout(config_path: Option<&Path>, capacity: Option<u64>) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let requested = capacity.unwrap_or(config.exported_capacity);
    let data_disks = config.raid_type.data_disks(config.width);

    let positions = MetadataPositionCalculator::compute(requested, config.raid_type, data_disks)
        .map_err(|e| CliError::invalid_argument(e.to_string()))?;

    Ok(json!({
        "group": config.group_id,
        "raid_type": config.raid_type,
        "data_disks": data_disks,
        "requested_capacity": requested,
        "positions": positions,
    }))
}

/// Run one capacity change on an active/passive pair.
pub fn expand(
    config_path: Option<&Path>,
    capacity: u64,
    fail_at: Option<&str>,
    max_ticks: usize,
) -> CliResult<Value> {
    let config = load_config(config_path)?;

    let hooks = Arc::new(ScriptedHooks::new());
    if let Some(name) = fail_at {
        let point = HookPoint::from_name(name)
            .ok_or_else(|| CliError::invalid_argument(format!("Unknown hook point: '{}'", name)))?;
        hooks.arm(point, HookAction::Fail);
    }
    let metrics = Arc::new(MetricsRegistry::new());
    let verify_settings = config.verify_settings()?;

    let (link_a, link_b) = link_pair();
    let setup = |sp: &str, role| {
        ControllerSetup::new(sp, role)
            .with_hooks(hooks.clone())
            .with_metrics(Arc::clone(&metrics))
            .with_verify_settings(verify_settings)
    };
    let mut active = Controller::simulated(
        setup("spa", ControllerRole::Active),
        Arc::new(config.build_group(&config.group_id)?),
        link_a,
    );
    let mut passive = Controller::simulated(
        setup("spb", ControllerRole::Passive),
        Arc::new(config.build_group(&config.group_id)?),
        link_b,
    );
    let original_capacity = active.group().exported_capacity();

    let admission = active
        .request_capacity_change(capacity)
        .map_err(|e| CliError::simulation_failed(e.to_string()))?;

    let (admission_name, completion, ticks) = match admission {
        RequestAdmission::Completed(completion) => ("completed", Some(completion), 0),
        RequestAdmission::Queued { .. } => {
            let ticks = drive_pair(&mut active, &mut passive, max_ticks)
                .map_err(|e| CliError::simulation_failed(e.to_string()))?;
            ("queued", active.take_completed().into_iter().next(), ticks)
        }
        RequestAdmission::AlreadyInProgress { .. } => ("already_in_progress", None, 0),
        RequestAdmission::Rejected { reason, .. } => {
            return Err(CliError::simulation_failed(format!(
                "request rejected: {}",
                reason
            )));
        }
    };

    let controller_json = |controller: &Controller| {
        json!({
            "sp": controller.sp(),
            "role": controller.coordinator().role().as_str(),
            "state": controller.coordinator().state_name(),
            "exported_capacity": controller.group().exported_capacity(),
            "relocation_ios": controller.transport().issued().len(),
        })
    };

    Ok(json!({
        "requested_capacity": capacity,
        "original_capacity": original_capacity,
        "admission": admission_name,
        "completion": completion,
        "ticks": ticks,
        "controllers": [controller_json(&active), controller_json(&passive)],
        "metrics": metrics.snapshot(),
    }))
}

/// Mark a range for `kind_name` and verify until the pass completes.
pub fn verify(
    config_path: Option<&Path>,
    kind_name: &str,
    lba: u64,
    blocks: u64,
    max_ticks: usize,
) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let kind = VerifyKind::from_name(kind_name)
        .ok_or_else(|| CliError::invalid_argument(format!("Unknown verify kind: '{}'", kind_name)))?;

    let setup = ControllerSetup::new("spa", ControllerRole::Active)
        .with_verify_settings(config.verify_settings()?);
    let mut controller = Controller::simulated(
        setup,
        Arc::new(config.build_group(&config.group_id)?),
        ClusterLink::standalone(),
    );

    controller
        .mark_for_verify(lba, blocks, kind)
        .map_err(|e| CliError::invalid_argument(e.to_string()))?;

    let mut ticks = 0;
    while !controller.is_settled() && ticks < max_ticks {
        controller
            .tick()
            .map_err(|e| CliError::simulation_failed(e.to_string()))?;
        ticks += 1;
    }

    let checkpoints: serde_json::Map<String, Value> = VerifyKind::PRIORITY
        .iter()
        .map(|k| {
            let checkpoint = controller.verify_engine().checkpoint(*k);
            let value = if checkpoint == crate::geometry::INVALID_LBA {
                Value::Null
            } else {
                json!(checkpoint)
            };
            (k.as_str().to_string(), value)
        })
        .collect();

    Ok(json!({
        "kind": kind.as_str(),
        "lba": lba,
        "blocks": blocks,
        "ticks": ticks,
        "settled": controller.is_settled(),
        "checkpoints": checkpoints,
        "reports": controller.upstream().reports().len(),
        "metrics": controller.metrics().snapshot(),
    }))
}

/// Classify health for one link state per disk.
pub fn health(config_path: Option<&Path>, links: &[String]) -> CliResult<Value> {
    let config = load_config(config_path)?;
    if links.len() != config.width as usize {
        return Err(CliError::invalid_argument(format!(
            "Expected {} link states, got {}",
            config.width,
            links.len()
        )));
    }

    let edges = links
        .iter()
        .map(|name| {
            LinkState::from_name(name.trim())
                .map(DownstreamEdge::new)
                .ok_or_else(|| CliError::invalid_argument(format!("Unknown link state: '{}'", name)))
        })
        .collect::<CliResult<Vec<_>>>()?;

    let parity_disks = config.raid_type.parity_disks(config.width);
    let counts = EdgeHealthEvaluator::count(&edges);
    let health = EdgeHealthEvaluator::evaluate(&edges, parity_disks);

    Ok(json!({
        "raid_type": config.raid_type,
        "width": config.width,
        "parity_disks": parity_disks,
        "enabled": counts.enabled,
        "disabled": counts.disabled,
        "broken": counts.broken,
        "invalid": counts.invalid,
        "health": health,
    }))
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use color_eyre::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};
use shpkg_core::{
    checksum, default_checksum_path, Config, ExecutionOutcome, ExtractionCache,
    MultiPackageProvisioner, PackageManifest, Provisioned,
};
use tracing::debug;

use crate::cli::{BindingFormat, ChecksumArgs, CommandCli, ProvisionArgs, TargetArgs};

const PACKAGE_SYNTAX_HINT: &str =
    "packages are written NAME=ARCHIVE:DEST[:CHECKSUM], e.g. base=/pkgs/base.tar:/env/base";

/// Environment configuration with the `--lock-timeout` override applied.
pub fn load_config(lock_timeout: Option<u64>) -> anyhow::Result<Config> {
    let config = Config::from_env().context("invalid shpkg environment configuration")?;
    Ok(match lock_timeout {
        Some(secs) => config.with_lock_timeout(Duration::from_secs(secs)),
        None => config,
    })
}

pub fn dispatch_command(config: &Config, command: &CommandCli) -> Result<ExecutionOutcome> {
    debug!(command = command.name(), ?config, "dispatching");
    match command {
        CommandCli::Provision(args) => provision(config, args),
        CommandCli::Ensure(args) => ensure(config, args),
        CommandCli::Status(args) => status(config, args),
        CommandCli::Checksum(args) => Ok(print_checksum(args)),
    }
}

fn provision(config: &Config, args: &ProvisionArgs) -> Result<ExecutionOutcome> {
    let manifests = match parse_manifests(args) {
        Ok(manifests) => manifests,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                format!("{err:#}"),
                json!({ "code": "SHP400", "hint": PACKAGE_SYNTAX_HINT }),
            ))
        }
    };
    if manifests.is_empty() {
        return Ok(ExecutionOutcome::user_error(
            "nothing to provision",
            json!({ "hint": "pass --base and/or one or more --package" }),
        ));
    }

    let provisioner = MultiPackageProvisioner::new(ExtractionCache::new(*config));
    match provisioner.provision(&manifests) {
        Ok(provisioned) => provisioned_outcome(&provisioned, args.format),
        Err(err) => Ok(ExecutionOutcome::from_error(&err)),
    }
}

fn parse_manifests(args: &ProvisionArgs) -> anyhow::Result<Vec<PackageManifest>> {
    args.base
        .iter()
        .map(|raw| {
            raw.parse::<PackageManifest>()
                .with_context(|| format!("invalid --base {raw:?}"))
        })
        .chain(args.packages.iter().map(|raw| {
            raw.parse::<PackageManifest>()
                .with_context(|| format!("invalid --package {raw:?}"))
        }))
        .collect()
}

#[derive(Serialize)]
struct PackageRow {
    name: String,
    env_var: String,
    dest: String,
    action: &'static str,
    digest: String,
    restored: usize,
}

fn provisioned_outcome(
    provisioned: &Provisioned,
    format: BindingFormat,
) -> Result<ExecutionOutcome> {
    let rows: Vec<PackageRow> = provisioned
        .iter()
        .map(|package| PackageRow {
            name: package.manifest.name.clone(),
            env_var: package.manifest.env_var(),
            dest: package.manifest.dest.display().to_string(),
            action: if package.outcome.extracted() {
                "extracted"
            } else {
                "valid"
            },
            digest: package.outcome.digest().to_string(),
            restored: package.outcome.restored(),
        })
        .collect();
    let extracted = rows.iter().filter(|row| row.action == "extracted").count();

    let (message, passthrough) = match format {
        BindingFormat::Env => (
            rows.iter()
                .map(|row| format!("export {}={}", row.env_var, shell_quote(&row.dest)))
                .collect::<Vec<_>>()
                .join("\n"),
            true,
        ),
        BindingFormat::Json => {
            let bindings: Map<String, Value> = rows
                .iter()
                .map(|row| (row.env_var.clone(), Value::String(row.dest.clone())))
                .collect();
            (serde_json::to_string_pretty(&bindings)?, true)
        }
        BindingFormat::Plain => (
            format!(
                "provisioned {} package(s), {extracted} extracted",
                rows.len()
            ),
            false,
        ),
    };

    Ok(ExecutionOutcome::success(
        message,
        json!({
            "packages": serde_json::to_value(&rows)?,
            "format": format,
            "passthrough": passthrough,
        }),
    ))
}

fn ensure(config: &Config, args: &TargetArgs) -> Result<ExecutionOutcome> {
    let checksum_file = checksum_path(args);
    let cache = ExtractionCache::new(*config);
    let outcome = match cache.ensure(&args.archive, &args.dest, &checksum_file) {
        Ok(outcome) => outcome,
        Err(err) => return Ok(ExecutionOutcome::from_error(&err)),
    };
    let message = if outcome.extracted() {
        format!(
            "extracted {} into {}",
            args.archive.display(),
            args.dest.display()
        )
    } else {
        format!("{} is up to date", args.dest.display())
    };
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "dest": args.dest.display().to_string(),
            "checksum_file": checksum_file.display().to_string(),
            "outcome": serde_json::to_value(&outcome)?,
        }),
    ))
}

fn status(config: &Config, args: &TargetArgs) -> Result<ExecutionOutcome> {
    let checksum_file = checksum_path(args);
    let cache = ExtractionCache::new(*config);
    match cache.status(&args.archive, &args.dest, &checksum_file) {
        Ok(state) => Ok(ExecutionOutcome::success(
            state.as_str(),
            json!({
                "state": serde_json::to_value(state)?,
                "dest": args.dest.display().to_string(),
                "passthrough": true,
            }),
        )),
        Err(err) => Ok(ExecutionOutcome::from_error(&err)),
    }
}

fn print_checksum(args: &ChecksumArgs) -> ExecutionOutcome {
    match checksum::compute(&args.archive) {
        Ok(digest) => ExecutionOutcome::success(
            digest.as_str(),
            json!({
                "archive": args.archive.display().to_string(),
                "digest": digest.as_str(),
                "passthrough": true,
            }),
        ),
        Err(err) => ExecutionOutcome::from_error(&err),
    }
}

fn checksum_path(args: &TargetArgs) -> PathBuf {
    args.checksum_file
        .clone()
        .unwrap_or_else(|| default_checksum_path(&args.dest))
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

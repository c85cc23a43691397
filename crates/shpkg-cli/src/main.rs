#![deny(clippy::all)]

use atty::Stream;
use clap::Parser;
use color_eyre::Result;
use serde_json::{json, Value};
use shpkg_core::{CommandStatus, ExecutionOutcome, GlobalOptions};

mod cli;
mod dispatch;
mod style;

use cli::ShpkgCli;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = ShpkgCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
    };

    let outcome = match dispatch::load_config(cli.lock_timeout) {
        Ok(config) => dispatch::dispatch_command(&config, &cli.command)?,
        Err(err) => ExecutionOutcome::user_error(format!("{err:#}"), json!({ "code": "config" })),
    };
    let code = emit_output(&global, cli.no_color, cli.command.name(), &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("shpkg={level},shpkg_core={level},shpkg_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

// Successful output goes to stdout so `--format env` can be eval'd; everything
// else goes to stderr.
fn emit_output(
    global: &GlobalOptions,
    no_color: bool,
    command: &str,
    outcome: &ExecutionOutcome,
) -> Result<i32> {
    let code = outcome.exit_code();

    if global.json {
        let payload = shpkg_core::to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if outcome.status != CommandStatus::Ok {
        let style = Style::new(no_color, atty::is(Stream::Stderr));
        let message = shpkg_core::format_status_message(command, &outcome.message);
        eprintln!("{}", style.status(outcome.status, &message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            eprintln!("{}", style.info(&format!("Hint: {hint}")));
        }
        return Ok(code);
    }

    // `-q` hides status lines only; passthrough output is eval'd or parsed.
    if is_passthrough(&outcome.details) {
        println!("{}", outcome.message);
        return Ok(code);
    }
    if global.quiet {
        return Ok(code);
    }
    let style = Style::new(no_color, atty::is(Stream::Stdout));
    let message = shpkg_core::format_status_message(command, &outcome.message);
    println!("{}", style.status(outcome.status, &message));
    if let Some(table) = render_package_table(&style, &outcome.details) {
        println!("{table}");
    }
    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

struct PackageRow<'a> {
    name: &'a str,
    action: &'a str,
    dest: &'a str,
}

fn render_package_table(style: &Style, details: &Value) -> Option<String> {
    let packages = details.get("packages")?.as_array()?;
    if packages.is_empty() {
        return None;
    }
    let mut rows = Vec::with_capacity(packages.len());
    for package in packages {
        rows.push(PackageRow {
            name: package.get("name")?.as_str()?,
            action: package.get("action")?.as_str()?,
            dest: package.get("dest")?.as_str()?,
        });
    }
    Some(format_package_table(style, &rows))
}

fn format_package_table(style: &Style, rows: &[PackageRow<'_>]) -> String {
    let headers = ["Package", "Action", "Destination"];
    let mut widths = [headers[0].len(), headers[1].len()];
    for row in rows {
        widths[0] = widths[0].max(row.name.len());
        widths[1] = widths[1].max(row.action.len());
    }

    let header = format!(
        "{:<w0$}  {:<w1$}  {}",
        headers[0],
        headers[1],
        headers[2],
        w0 = widths[0],
        w1 = widths[1],
    );
    let mut lines = vec![style.table_header(&header)];
    for row in rows {
        lines.push(format!(
            "{:<w0$}  {:<w1$}  {}",
            row.name,
            row.action,
            row.dest,
            w0 = widths[0],
            w1 = widths[1],
        ));
    }
    lines.join("\n")
}

use std::path::{Path, PathBuf};

use atty::Stream;
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use vx_core::{
    current_interpreter, exec_script, AutoRelaunch, BootstrapError, CommandStatus, Config,
    EnvStore, ExecutionOutcome, Invocation, RequirementSet,
};

mod style;

use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = VxCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let config = Config::from_env().map_err(|err| eyre!("{err:?}"))?;
    let store = EnvStore::new(&config);

    match &cli.command {
        CommandCli::Run(args) => run_script(&cli, &store, args),
        CommandCli::Setup(args) => finish(&cli, "setup", setup_environment(&store, args)),
        CommandCli::Env(command) => finish(&cli, "env", inspect_environment(&store, command)),
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("vx_cli={level},vx_core={level},vx_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run_script(cli: &VxCli, store: &EnvStore, args: &RunArgs) -> Result<()> {
    if !args.script.is_file() {
        return finish(cli, "run", Ok(missing_script_outcome(&args.script)));
    }

    let requirements = RequirementSet::new(args.with.clone());
    let invocation = Invocation::new(args.script.clone(), args.args.clone())
        .with_interpreter(current_interpreter());
    let mut controller = AutoRelaunch::new(store, &args.script, args.name.as_deref());

    let result = match controller.auto_switch(&invocation, &requirements) {
        // Already provisioned (trusted marker or running inside the target
        // environment): hand the process over to the script. exec_script
        // returns only when the launch itself failed.
        Ok(provisioned) => Err(exec_script(
            &provisioned.handle,
            &invocation.script,
            &invocation.args,
        )),
        Err(err) => Err(err),
    };
    finish(cli, "run", result)
}

fn setup_environment(
    store: &EnvStore,
    args: &SetupArgs,
) -> Result<ExecutionOutcome, BootstrapError> {
    if !args.script.is_file() {
        return Ok(missing_script_outcome(&args.script));
    }

    let requirements = RequirementSet::new(args.with.clone());
    let controller = AutoRelaunch::new(store, &args.script, args.name.as_deref());
    let handle = store.setup(controller.name(), &requirements)?;
    Ok(ExecutionOutcome::success(
        format!("environment `{}` ready", handle.name()),
        json!({
            "env": handle.name().as_str(),
            "dir": handle.dir().display().to_string(),
            "interpreter": handle.interpreter().display().to_string(),
            "requirements": requirements.as_slice(),
        }),
    ))
}

fn inspect_environment(
    store: &EnvStore,
    command: &EnvCommand,
) -> Result<ExecutionOutcome, BootstrapError> {
    match command {
        EnvCommand::Info(args) => {
            if !args.script.is_file() {
                return Ok(missing_script_outcome(&args.script));
            }
            let controller = AutoRelaunch::new(store, &args.script, args.name.as_deref());
            let handle = store.handle(controller.name());
            let exists = store.exists(controller.name());
            let state = if exists { "ready" } else { "not created" };
            Ok(ExecutionOutcome::success(
                format!("environment `{}` at {} ({state})", handle.name(), handle.dir().display()),
                json!({
                    "env": handle.name().as_str(),
                    "dir": handle.dir().display().to_string(),
                    "interpreter": handle.interpreter().display().to_string(),
                    "exists": exists,
                    "root": store.root().display().to_string(),
                }),
            ))
        }
        EnvCommand::Path(args) => passthrough_lookup(store, args, |handle| {
            handle.dir().display().to_string()
        }),
        EnvCommand::Python(args) => passthrough_lookup(store, args, |handle| {
            handle.interpreter().display().to_string()
        }),
        EnvCommand::List => {
            let names = store.list();
            if names.is_empty() {
                return Ok(ExecutionOutcome::success(
                    format!("no environments under {}", store.root().display()),
                    json!({ "environments": [], "root": store.root().display().to_string() }),
                ));
            }
            Ok(ExecutionOutcome::success(
                names.join("\n"),
                json!({
                    "passthrough": true,
                    "environments": names,
                    "root": store.root().display().to_string(),
                }),
            ))
        }
    }
}

fn passthrough_lookup(
    store: &EnvStore,
    args: &EnvScriptArgs,
    render: impl Fn(&vx_core::EnvHandle) -> String,
) -> Result<ExecutionOutcome, BootstrapError> {
    if !args.script.is_file() {
        return Ok(missing_script_outcome(&args.script));
    }
    let controller = AutoRelaunch::new(store, &args.script, args.name.as_deref());
    let handle = store.handle(controller.name());
    Ok(ExecutionOutcome::success(
        render(&handle),
        json!({ "passthrough": true, "env": handle.name().as_str() }),
    ))
}

fn missing_script_outcome(script: &Path) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        format!("script not found: {}", script.display()),
        json!({
            "reason": "missing_script",
            "hint": "Pass a path to an existing script file.",
        }),
    )
}

fn finish(
    cli: &VxCli,
    command: &str,
    result: Result<ExecutionOutcome, BootstrapError>,
) -> Result<()> {
    let (outcome, code) = match result {
        Ok(outcome) => {
            let code = outcome.status.exit_code();
            (outcome, code)
        }
        Err(err) => {
            let code = err.exit_code();
            let outcome = ExecutionOutcome::failure(
                err.to_string(),
                json!({
                    "env": err.env_name().as_str(),
                    "hint": "Inspect or remove the environment directory, then rerun; `vx env info` shows where it lives.",
                }),
            );
            (outcome, code)
        }
    };

    emit(cli, command, &outcome)?;
    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn emit(cli: &VxCli, command: &str, outcome: &ExecutionOutcome) -> Result<()> {
    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let details = match &outcome.details {
            Value::Object(_) => outcome.details.clone(),
            Value::Null => json!({}),
            other => json!({ "value": other }),
        };
        let payload = json!({
            "status": outcome.status.as_str(),
            "message": status_message(command, &outcome.message),
            "details": details,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if outcome.status == CommandStatus::Ok {
        if cli.quiet {
            return Ok(());
        }
        if is_passthrough(&outcome.details) {
            println!("{}", outcome.message);
        } else {
            println!(
                "{}",
                style.status(outcome.status, &status_message(command, &outcome.message))
            );
        }
    } else {
        eprintln!(
            "{}",
            style.status(outcome.status, &status_message(command, &outcome.message))
        );
        if let Some(hint) = hint_from_details(&outcome.details) {
            let hint_line = format!("Hint: {hint}");
            eprintln!("{}", style.info(&hint_line));
        }
    }
    Ok(())
}

fn status_message(command: &str, message: &str) -> String {
    let prefix = format!("vx {command}");
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
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

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Per-script virtualenv bootstrapping and relaunch",
    long_about = "Provisions one isolated environment per script and re-executes the \
                  script inside it, exactly once.",
    after_help = "Examples:\n  vx run tools/fetch.py --with requests==2.32.3 -- --limit 10\n  vx setup tools/fetch.py --with requests\n  vx env python tools/fetch.py\n"
)]
struct VxCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)"
    )]
    quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes")]
    json: bool,
    #[arg(long, help = "Disable colored human output")]
    no_color: bool,
    #[command(subcommand)]
    command: CommandCli,
}

#[derive(Subcommand, Debug)]
enum CommandCli {
    #[command(
        about = "Provision the script's environment, then run the script inside it.",
        override_usage = "vx run <SCRIPT> [--with SPEC]... [-- <ARG>...]",
        after_help = "Examples:\n  vx run fetch.py --with requests\n  vx run split.py --with yt-dlp -- clip.mp4\n"
    )]
    Run(RunArgs),
    #[command(
        about = "Provision the script's environment without running it.",
        override_usage = "vx setup <SCRIPT> [--with SPEC]...",
        after_help = "Examples:\n  vx setup fetch.py --with requests==2.32.3\n  vx setup fetch.py --name shared-env --with requests\n"
    )]
    Setup(SetupArgs),
    #[command(subcommand)]
    Env(EnvCommand),
}

#[derive(Subcommand, Debug)]
enum EnvCommand {
    #[command(
        about = "Show the script's environment identity, location, and state.",
        after_help = "Example:\n  vx env info tools/fetch.py\n"
    )]
    Info(EnvScriptArgs),
    #[command(
        about = "Print the script's environment directory.",
        after_help = "Example:\n  vx env path tools/fetch.py\n"
    )]
    Path(EnvScriptArgs),
    #[command(
        about = "Print the script's environment interpreter.",
        after_help = "Example:\n  vx env python tools/fetch.py\n"
    )]
    Python(EnvScriptArgs),
    #[command(
        about = "List provisioned environments.",
        after_help = "Example:\n  vx env list\n"
    )]
    List,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(value_name = "SCRIPT", help = "Script to provision and execute")]
    script: PathBuf,
    #[arg(
        long = "with",
        value_name = "SPEC",
        help = "Package requirement (repeatable, installed in order)"
    )]
    with: Vec<String>,
    #[arg(long, value_name = "NAME", help = "Override the derived environment name")]
    name: Option<String>,
    #[arg(
        value_name = "ARG",
        last = true,
        help = "Arguments forwarded to the script"
    )]
    args: Vec<String>,
}

#[derive(Args, Debug)]
struct SetupArgs {
    #[arg(value_name = "SCRIPT", help = "Script whose environment to provision")]
    script: PathBuf,
    #[arg(
        long = "with",
        value_name = "SPEC",
        help = "Package requirement (repeatable, installed in order)"
    )]
    with: Vec<String>,
    #[arg(long, value_name = "NAME", help = "Override the derived environment name")]
    name: Option<String>,
}

#[derive(Args, Debug)]
struct EnvScriptArgs {
    #[arg(value_name = "SCRIPT", help = "Script whose environment to inspect")]
    script: PathBuf,
    #[arg(long, value_name = "NAME", help = "Override the derived environment name")]
    name: Option<String>,
}

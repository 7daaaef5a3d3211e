use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use hdl_runner::{registry, Runner, RunnerError, TestParameters};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when the harness could not run the tool at all. Tool exit
/// codes that would collide with it are reported as 1.
const HARNESS_FAILURE_EXIT: u8 = 125;

#[derive(Parser)]
#[command(name = "hdlrun", version, about = "Run one HDL conformance test case")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        runner: String,
        #[arg(long)]
        work_dir: PathBuf,
        #[arg(long)]
        params: Option<PathBuf>,
        #[arg(long)]
        top_module: Option<String>,
        #[arg(long = "file")]
        files: Vec<String>,
        #[arg(long = "set")]
        set_values: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    CanRun {
        runner: String,
        #[arg(long)]
        json: bool,
    },
    List {
        #[arg(long)]
        json: bool,
    },
}

struct Outcome {
    payload: Option<Value>,
    exit: u8,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(outcome) => {
            if let Some(payload) = outcome.payload {
                emit_json(&payload);
            }
            ExitCode::from(outcome.exit)
        }
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), format!("{:#}", err), json!({})));
            } else {
                eprintln!("hdlrun: {:#}", err);
            }
            ExitCode::from(HARNESS_FAILURE_EXIT)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HDLRUN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(command: Commands) -> Result<Outcome> {
    match command {
        Commands::Run {
            runner,
            work_dir,
            params,
            top_module,
            files,
            set_values,
            json,
        } => {
            let adapter = registry::lookup(&runner)?;
            let params = build_parameters(params.as_deref(), top_module, files, &set_values)?;
            tracing::info!(runner = %runner, work_dir = %work_dir.display(), "running test case");
            let output = adapter.run(&work_dir, &params)?;
            let exit = tool_exit_code(output.exit_code);
            if json {
                return Ok(Outcome {
                    payload: Some(json!({
                        "ok": true,
                        "command": "run",
                        "runner": adapter.name(),
                        "exit_code": output.exit_code,
                        "passed": output.passed(),
                        "log": output.log,
                    })),
                    exit,
                });
            }
            print!("{}", output.log);
            Ok(Outcome {
                payload: None,
                exit,
            })
        }
        Commands::CanRun { runner, json } => {
            let adapter = registry::lookup(&runner)?;
            let available = adapter.can_run();
            let exit = if available { 0 } else { 1 };
            if json {
                return Ok(Outcome {
                    payload: Some(json!({
                        "ok": true,
                        "command": "can-run",
                        "runner": runner_to_json(adapter.as_ref(), available),
                    })),
                    exit,
                });
            }
            println!("{}: {}", adapter.name(), availability_label(available));
            Ok(Outcome {
                payload: None,
                exit,
            })
        }
        Commands::List { json } => {
            let runners = registry::all();
            if json {
                let entries: Vec<Value> = runners
                    .iter()
                    .map(|r| runner_to_json(r.as_ref(), r.can_run()))
                    .collect();
                return Ok(Outcome {
                    payload: Some(json!({
                        "ok": true,
                        "command": "list",
                        "runners": entries,
                    })),
                    exit: 0,
                });
            }
            for r in &runners {
                let identity = r.identity();
                println!(
                    "{}\t{}\t{}\t{}",
                    identity.name(),
                    identity.executable().unwrap_or("-"),
                    availability_label(r.can_run()),
                    identity.url()
                );
            }
            Ok(Outcome {
                payload: None,
                exit: 0,
            })
        }
    }
}

/// Parameter file first, then command-line flags on top of it.
fn build_parameters(
    params_path: Option<&Path>,
    top_module: Option<String>,
    files: Vec<String>,
    set_values: &[String],
) -> Result<TestParameters> {
    let mut params = match params_path {
        Some(path) => load_parameters(path)?,
        None => TestParameters::default(),
    };
    for (key, value) in parse_set_bindings(set_values)? {
        params.insert(&key, value);
    }
    if let Some(top) = top_module {
        params.insert("top_module", Value::String(top));
    }
    if !files.is_empty() {
        params.insert("files", json!(files));
    }
    if params.get("top_module").is_none() {
        params.insert("top_module", Value::String(String::new()));
    }
    Ok(params)
}

fn load_parameters(path: &Path) -> Result<TestParameters> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read parameters: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parameters must be a JSON object: {}", path.display()))
}

fn parse_set_bindings(values: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for raw in values {
        let (key, val_raw) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --set '{}': expected k=v", raw))?;
        if key.trim().is_empty() {
            return Err(anyhow!("invalid --set '{}': key cannot be empty", raw));
        }
        let parsed =
            serde_json::from_str::<Value>(val_raw).unwrap_or(Value::String(val_raw.to_string()));
        out.insert(key.to_string(), parsed);
    }
    Ok(out)
}

fn tool_exit_code(code: i32) -> u8 {
    match u8::try_from(code) {
        Ok(c) if c < HARNESS_FAILURE_EXIT => c,
        _ => 1,
    }
}

fn availability_label(available: bool) -> &'static str {
    if available {
        "available"
    } else {
        "missing"
    }
}

fn runner_to_json(runner: &dyn Runner, available: bool) -> Value {
    let identity = runner.identity();
    json!({
        "name": identity.name(),
        "executable": identity.executable(),
        "url": identity.url(),
        "available": available,
    })
}

fn error_code(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<RunnerError>()
        .map(RunnerError::code)
        .unwrap_or("command_failed")
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } | Commands::CanRun { json, .. } | Commands::List { json } => {
            *json
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_exit_codes_stay_clear_of_harness_code() {
        assert_eq!(tool_exit_code(0), 0);
        assert_eq!(tool_exit_code(7), 7);
        assert_eq!(tool_exit_code(124), 124);
        assert_eq!(tool_exit_code(125), 1);
        assert_eq!(tool_exit_code(-9), 1);
        assert_eq!(tool_exit_code(300), 1);
    }

    #[test]
    fn set_bindings_parse_json_or_fall_back_to_string() {
        let parsed = parse_set_bindings(&[
            "incdirs=[\"inc\"]".to_string(),
            "type=simulation".to_string(),
        ])
        .expect("bindings");
        assert_eq!(parsed["incdirs"], json!(["inc"]));
        assert_eq!(parsed["type"], json!("simulation"));
        assert!(parse_set_bindings(&["novalue".to_string()]).is_err());
        assert!(parse_set_bindings(&["=x".to_string()]).is_err());
    }

    #[test]
    fn flags_override_parameter_file() {
        let path = std::env::temp_dir()
            .join(format!("hdlrun_cli_params_{}.json", std::process::id()));
        fs::write(
            &path,
            r#"{":top_module:": "from_file", ":files:": ["file.sv"], "tags": "x"}"#,
        )
        .expect("write params");

        let top = Some("flag_top".to_string());
        let params = build_parameters(Some(path.as_path()), top, vec![], &[]).expect("params");
        assert_eq!(params.top_module().expect("top"), "flag_top");
        assert_eq!(params.files().expect("files"), vec!["file.sv"]);

        let files = vec!["b.sv".to_string(), "a.sv".to_string()];
        let params = build_parameters(Some(path.as_path()), None, files, &[]).expect("params");
        assert_eq!(params.top_module().expect("top"), "from_file");
        assert_eq!(params.files().expect("files"), vec!["b.sv", "a.sv"]);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_top_module_defaults_to_empty() {
        let params = build_parameters(None, None, vec!["a.sv".into()], &[]).expect("params");
        assert_eq!(params.top_module().expect("top"), "");
    }

    #[test]
    fn runner_errors_keep_their_code_through_anyhow() {
        let err: anyhow::Error = RunnerError::UnknownRunner("x".into()).into();
        assert_eq!(error_code(&err), "unknown_runner");
        assert_eq!(error_code(&anyhow!("other")), "command_failed");
    }
}

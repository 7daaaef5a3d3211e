use crate::exec::{self, CommandLine, resolve_executable};
use crate::runner::{RunOutput, Runner, RunnerError, RunnerIdentity, TestParameters};
use std::path::Path;
use tracing::debug;

pub const SIM_FILE: &str = "sim.vvp";

/// Icarus Verilog. Compiles with `iverilog` and, for simulation tests,
/// runs the result with `vvp`, so it drives two processes and replaces the
/// default single-command `run`.
pub struct Icarus {
    identity: RunnerIdentity,
    simulator: String,
}

impl Icarus {
    pub fn new() -> Self {
        Self::with_executables("iverilog", "vvp")
    }

    pub fn with_executables(compiler: &str, simulator: &str) -> Self {
        Self {
            identity: RunnerIdentity::new("icarus", Some(compiler))
                .with_url("http://iverilog.icarus.com/"),
            simulator: simulator.to_string(),
        }
    }

    fn compile_command(&self, params: &TestParameters) -> Result<CommandLine, RunnerError> {
        let mut cmd = CommandLine::new(self.identity.executable().unwrap_or("iverilog"));
        cmd.args(["-g2012", "-o", SIM_FILE]);
        let top = params.top_module()?;
        if !top.is_empty() {
            cmd.args(["-s", top]);
        }
        for dir in params.get_list("incdirs")? {
            cmd.arg(format!("-I{}", dir));
        }
        for define in params.get_list("defines")? {
            cmd.arg(format!("-D{}", define));
        }
        cmd.args(params.files()?);
        Ok(cmd)
    }
}

impl Default for Icarus {
    fn default() -> Self {
        Self::new()
    }
}

fn wants_simulation(params: &TestParameters) -> Result<bool, RunnerError> {
    Ok(params.get_list("type")?.iter().any(|t| t == "simulation"))
}

impl Runner for Icarus {
    fn identity(&self) -> &RunnerIdentity {
        &self.identity
    }

    fn run(&self, work_dir: &Path, params: &TestParameters) -> Result<RunOutput, RunnerError> {
        let env = self.identity.env();
        let limits = self.identity.limits();

        let compile = self.compile_command(params)?;
        let compiled = exec::execute(work_dir, &compile, env, limits)?;
        if compiled.exit_code != 0 || !wants_simulation(params)? {
            return Ok(compiled.into());
        }

        debug!(runner = self.name(), "compile ok, starting simulation");
        let simulate = CommandLine::from_tokens([self.simulator.as_str(), SIM_FILE]);
        let simulated = exec::execute(work_dir, &simulate, env, limits)?;
        Ok(RunOutput {
            log: compiled.output + &simulated.output,
            exit_code: simulated.exit_code,
        })
    }

    fn can_run(&self) -> bool {
        let compiler = self.identity.executable().unwrap_or("iverilog");
        resolve_executable(compiler).is_some() && resolve_executable(&self.simulator).is_some()
    }
}

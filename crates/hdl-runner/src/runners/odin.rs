use crate::exec::CommandLine;
use crate::runner::{Runner, RunnerError, RunnerIdentity, TestParameters};
use std::path::Path;

pub const OUTPUT_FILE: &str = "odin.blif";

/// Odin II synthesis front end.
pub struct Odin {
    identity: RunnerIdentity,
}

impl Odin {
    pub fn new() -> Self {
        Self::with_executable("odin_II")
    }

    pub fn with_executable(executable: &str) -> Self {
        Self {
            identity: RunnerIdentity::new("odin", Some(executable))
                .with_url("https://verilogtorouting.org/"),
        }
    }
}

impl Default for Odin {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for Odin {
    fn identity(&self) -> &RunnerIdentity {
        &self.identity
    }

    fn prepare(
        &self,
        _work_dir: &Path,
        params: &TestParameters,
    ) -> Result<CommandLine, RunnerError> {
        let executable = self.identity.executable().unwrap_or("odin_II");
        let mut cmd = CommandLine::new(executable);
        cmd.args(["--permissive", format!("-o {}", OUTPUT_FILE).as_str(), "-V"]);

        let top = params.top_module()?;
        if !top.is_empty() {
            cmd.arg(format!("--top_module {}", top));
        }

        // No include directory support, every source has to be listed.
        cmd.args(params.files()?);
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(params: &TestParameters) -> Vec<String> {
        Odin::new()
            .prepare(Path::new("/nonexistent"), params)
            .expect("prepare")
            .tokens()
            .to_vec()
    }

    #[test]
    fn command_line_starts_with_fixed_flags() {
        let tokens = prepare(&TestParameters::new("", &["a.sv"]));
        assert_eq!(tokens, vec!["odin_II", "--permissive", "-o odin.blif", "-V", "a.sv"]);
    }

    #[test]
    fn top_module_flag_only_when_named() {
        let without = prepare(&TestParameters::new("", &["a.sv"]));
        assert!(!without.iter().any(|t| t.starts_with("--top_module")));

        let with = prepare(&TestParameters::new("top", &["a.sv"]));
        let flags: Vec<_> = with.iter().filter(|t| t.starts_with("--top_module")).collect();
        assert_eq!(flags, vec!["--top_module top"]);
    }

    #[test]
    fn files_keep_their_order_at_the_end() {
        let tokens = prepare(&TestParameters::new("top", &["a.sv", "b.sv"]));
        assert_eq!(&tokens[tokens.len() - 2..], ["a.sv", "b.sv"]);
        let tokens = prepare(&TestParameters::new("top", &["b.sv", "a.sv"]));
        assert_eq!(&tokens[tokens.len() - 2..], ["b.sv", "a.sv"]);
    }

    #[test]
    fn prepare_is_deterministic() {
        let params = TestParameters::new("top", &["pkg.sv", "top.sv"]);
        assert_eq!(prepare(&params), prepare(&params));
    }

    #[test]
    fn missing_files_is_a_parameter_error() {
        let mut params = TestParameters::default();
        params.insert("top_module", serde_json::json!(""));
        let err = Odin::new()
            .prepare(Path::new("/nonexistent"), &params)
            .expect_err("files required");
        assert_eq!(err.code(), "invalid_parameter");
    }

    #[test]
    fn identity_points_at_odin() {
        let odin = Odin::new();
        assert_eq!(odin.name(), "odin");
        assert_eq!(odin.identity().executable(), Some("odin_II"));
        assert_eq!(odin.identity().url(), "https://verilogtorouting.org/");
    }
}

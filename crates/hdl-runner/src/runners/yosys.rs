use crate::exec::CommandLine;
use crate::runner::{Runner, RunnerError, RunnerIdentity, TestParameters};
use std::fs;
use std::path::Path;

pub const SCRIPT_FILE: &str = "scr.ys";

/// Yosys, driven through a generated script so include directories and
/// defines can be passed per source file.
pub struct Yosys {
    identity: RunnerIdentity,
}

impl Yosys {
    pub fn new() -> Self {
        Self {
            identity: RunnerIdentity::new("yosys", Some("yosys"))
                .with_url("https://yosyshq.net/yosys/"),
        }
    }
}

impl Default for Yosys {
    fn default() -> Self {
        Self::new()
    }
}

/// Script arguments are whitespace separated, so a path with blanks is
/// double-quoted. Characters that cannot be quoted are rejected.
fn script_word(key: &str, word: &str) -> Result<String, RunnerError> {
    if word.contains(['"', '\n', '\r']) {
        return Err(RunnerError::parameter(
            key,
            format!("`{}` cannot be written into a yosys script", word),
        ));
    }
    if word.contains(char::is_whitespace) {
        Ok(format!("\"{}\"", word))
    } else {
        Ok(word.to_string())
    }
}

fn render_script(params: &TestParameters) -> Result<String, RunnerError> {
    let mut flags = Vec::new();
    for dir in params.get_list("incdirs")? {
        flags.push(format!("-I{}", script_word("incdirs", &dir)?));
    }
    for define in params.get_list("defines")? {
        flags.push(format!("-D{}", script_word("defines", &define)?));
    }

    let mut lines = Vec::new();
    for file in params.files()? {
        let mut words = vec!["read_verilog".to_string(), "-sv".to_string()];
        words.extend(flags.iter().cloned());
        words.push(script_word("files", &file)?);
        lines.push(words.join(" "));
    }
    let top = params.top_module()?;
    if top.is_empty() {
        lines.push("hierarchy -check -auto-top".to_string());
    } else {
        lines.push(format!("hierarchy -check -top {}", script_word("top_module", top)?));
    }
    lines.push("proc".to_string());
    Ok(lines.join("\n") + "\n")
}

impl Runner for Yosys {
    fn identity(&self) -> &RunnerIdentity {
        &self.identity
    }

    fn prepare(
        &self,
        work_dir: &Path,
        params: &TestParameters,
    ) -> Result<CommandLine, RunnerError> {
        let script = render_script(params)?;
        let script_path = work_dir.join(SCRIPT_FILE);
        fs::write(&script_path, script).map_err(|e| RunnerError::io(&script_path, e))?;

        let mut cmd = CommandLine::new(self.identity.executable().unwrap_or("yosys"));
        cmd.args(["-Q", "-T", "-s", SCRIPT_FILE]);
        Ok(cmd)
    }
}

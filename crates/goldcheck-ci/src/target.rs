//! Build targets and build-tool invocations.

use goldcheck_core::BuildConfig;
use serde::{Deserialize, Serialize};

use crate::command::CommandSpec;

/// Platform executable suffix.
pub const EXE_SUFFIX: &str = if cfg!(windows) { ".exe" } else { "" };

/// Escape spaces and parentheses for the shell.
pub fn shell_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, ' ' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// The build target derived from one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildTarget {
    /// Model identifier the target was derived from.
    pub model_id: String,

    /// Unescaped target name, also the executable path.
    pub name: String,
}

impl BuildTarget {
    /// Derive the target for `model_id`: strip the source-root prefix,
    /// strip the model extension, append the executable suffix.
    pub fn from_model(model_id: &str, config: &BuildConfig) -> Self {
        let mut name = model_id;
        if let Some(prefix) = config.source_root_prefix.as_deref() {
            name = name.strip_prefix(prefix).unwrap_or(name);
        }
        name = name
            .strip_suffix(config.model_extension.as_str())
            .unwrap_or(name);

        Self {
            model_id: model_id.to_string(),
            name: format!("{}{}", name, EXE_SUFFIX),
        }
    }

    /// Target name escaped for the shell.
    pub fn escaped(&self) -> String {
        shell_escape(&self.name)
    }

    /// Shell word that invokes the built executable.
    pub fn invocation(&self) -> String {
        if self.name.contains('/') {
            self.escaped()
        } else {
            format!("./{}", self.escaped())
        }
    }
}

/// Build-tool command for one batch of targets.
pub fn build_command(program: &str, batch: &[BuildTarget], parallelism: Option<usize>) -> CommandSpec {
    let mut args = Vec::with_capacity(batch.len() + 1);
    if let Some(j) = parallelism {
        args.push(format!("-j{}", j));
    }
    args.extend(batch.iter().map(BuildTarget::escaped));
    CommandSpec::new(program, args)
}

/// Build-tool commands covering `targets`, at most `batch_size` per call.
pub fn batched_build_commands(
    config: &BuildConfig,
    targets: &[BuildTarget],
    parallelism: Option<usize>,
) -> Vec<CommandSpec> {
    targets
        .chunks(config.batch_size.max(1))
        .map(|batch| build_command(&config.program, batch, parallelism))
        .collect()
}

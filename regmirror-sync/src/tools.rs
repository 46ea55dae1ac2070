//! [`RegistryClient`] backed by external tools.
//!
//! | capability | command |
//! |---|---|
//! | digest | `regctl manifest head <ref>` |
//! | repositories | `regctl repo ls <host>` |
//! | tags | `regctl tag ls <host>/<repo>` |
//! | mirror | `skopeo sync --scoped --src docker --dest docker --all <ref> <host>` |
//!
//! With `run_inside_container` every command is prefixed by
//! `<engine> exec <container>`.

use std::process::Command;

use regmirror_core::{Settings, ToolSettings};

use crate::registry::{ManifestDigest, RegistryClient, RegistryError};

/// Resolved argv prefixes for each tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommands {
    regctl: Vec<String>,
    skopeo: Vec<String>,
}

impl ToolCommands {
    pub fn new(regctl: Vec<String>, skopeo: Vec<String>) -> Self {
        Self { regctl, skopeo }
    }

    pub fn from_settings(tools: &ToolSettings) -> Self {
        let wrap = |binary: &str| {
            if tools.run_inside_container {
                vec![
                    tools.container_engine.clone(),
                    "exec".to_string(),
                    tools.container_name.clone(),
                    binary.to_string(),
                ]
            } else {
                vec![binary.to_string()]
            }
        };
        // Inside a container the tools are on the container's PATH; local path
        // overrides only apply on the host.
        if tools.run_inside_container {
            Self::new(wrap("regctl"), wrap("skopeo"))
        } else {
            Self::new(wrap(&tools.regctl), wrap(&tools.skopeo))
        }
    }

    pub fn regctl(&self) -> &[String] {
        &self.regctl
    }

    pub fn skopeo(&self) -> &[String] {
        &self.skopeo
    }
}

/// Production registry client.
#[derive(Debug, Clone)]
pub struct ToolRegistryClient {
    commands: ToolCommands,
}

impl ToolRegistryClient {
    pub fn new(commands: ToolCommands) -> Self {
        Self { commands }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(ToolCommands::from_settings(&settings.tools))
    }

    pub fn commands(&self) -> &ToolCommands {
        &self.commands
    }
}

impl RegistryClient for ToolRegistryClient {
    fn manifest_digest(&self, reference: &str) -> Result<ManifestDigest, RegistryError> {
        let stdout = run_tool(&self.commands.regctl, &["manifest", "head", reference])?;
        ManifestDigest::from_output(&stdout).ok_or_else(|| RegistryError::MalformedDigest {
            reference: reference.to_string(),
            output: stdout.lines().next().unwrap_or_default().to_string(),
        })
    }

    fn list_repositories(&self, registry_host: &str) -> Result<Vec<String>, RegistryError> {
        let stdout = run_tool(&self.commands.regctl, &["repo", "ls", registry_host])?;
        Ok(non_empty_lines(&stdout))
    }

    fn list_tags(
        &self,
        registry_host: &str,
        repository: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let target = format!("{registry_host}/{repository}");
        let stdout = run_tool(&self.commands.regctl, &["tag", "ls", &target])?;
        Ok(non_empty_lines(&stdout))
    }

    fn mirror_all_platforms(
        &self,
        source_reference: &str,
        destination_host: &str,
    ) -> Result<(), RegistryError> {
        run_tool(
            &self.commands.skopeo,
            &[
                "sync",
                "--scoped",
                "--src",
                "docker",
                "--dest",
                "docker",
                "--all",
                source_reference,
                destination_host,
            ],
        )
        .map(|_| ())
    }
}

/// Run `prefix + args`, returning stdout on success and stderr as the
/// diagnostic on failure.
fn run_tool(prefix: &[String], args: &[&str]) -> Result<String, RegistryError> {
    let Some((program, leading)) = prefix.split_first() else {
        return Err(RegistryError::Unavailable {
            target: "tool".to_string(),
            message: "empty command".to_string(),
        });
    };

    tracing::trace!("exec: {} {} {}", program, leading.join(" "), args.join(" "));
    let output = Command::new(program)
        .args(leading)
        .args(args)
        .output()
        .map_err(|source| RegistryError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(RegistryError::CommandFailed {
            program: program.clone(),
            code: output.status.code(),
            diagnostic: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

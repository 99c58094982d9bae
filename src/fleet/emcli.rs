//! `emcli` subprocess collaborator.
//!
//! Each operation runs one `emcli` verb and waits for it. The management
//! server URL, trust mode and JSON output type are handed to emcli through its
//! client-property environment variables on every invocation, and an optional
//! login runs once before the first verb.

use std::cell::Cell;
use std::path::PathBuf;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use tracing::{debug, info};

use super::{CollaboratorError, FleetApi};
use crate::model::ResourceKind;

/// Connection settings for the emcli client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmcliSettings {
    /// Command line used to launch emcli, e.g. `emcli` or `java -jar emcliKit.jar`.
    pub command: Vec<String>,
    pub oms_url: Option<String>,
    pub trust_all: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for EmcliSettings {
    fn default() -> Self {
        Self {
            command: vec!["emcli".to_string()],
            oms_url: None,
            trust_all: false,
            username: None,
            password: None,
        }
    }
}

pub struct EmcliClient {
    settings: EmcliSettings,
    program: PathBuf,
    logged_in: Cell<bool>,
}

impl EmcliClient {
    /// Resolve the emcli program on `PATH` (or as given) and build a client.
    pub fn new(settings: EmcliSettings) -> Result<Self, CollaboratorError> {
        let first = settings
            .command
            .first()
            .cloned()
            .unwrap_or_else(|| "emcli".to_string());
        let program = which::which(&first).map_err(|e| CollaboratorError::Spawn {
            program: first.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
        })?;
        debug!(program = %program.display(), "resolved emcli");
        Ok(Self {
            settings,
            program,
            logged_in: Cell::new(false),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.settings.command.iter().skip(1));
        if let Some(url) = &self.settings.oms_url {
            cmd.env("EMCLI_OMS_URL", url);
        }
        cmd.env(
            "EMCLI_TRUSTALL",
            if self.settings.trust_all { "TRUE" } else { "FALSE" },
        );
        cmd.env("EMCLI_OUTPUT_TYPE", "JSON");
        cmd
    }

    fn run(&self, verb: &str, args: &[String]) -> Result<Output, CollaboratorError> {
        self.run_with_input(verb, args, None)
    }

    /// Run one verb, optionally feeding `input` to its stdin.
    fn run_with_input(
        &self,
        verb: &str,
        args: &[String],
        input: Option<&str>,
    ) -> Result<Output, CollaboratorError> {
        let mut cmd = self.command();
        cmd.arg(verb).args(args);
        debug!(verb, args = args.len(), "running emcli");
        let spawn_error = |source: std::io::Error| CollaboratorError::Spawn {
            program: self.program.display().to_string(),
            source,
        };
        let output = match input {
            None => cmd.output().map_err(spawn_error)?,
            Some(input) => {
                let mut child = cmd
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(spawn_error)?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(input.as_bytes()).map_err(spawn_error)?;
                }
                child.wait_with_output().map_err(spawn_error)?
            }
        };
        if !output.status.success() {
            return Err(CollaboratorError::CommandFailed {
                verb: verb.to_string(),
                status: output.status.to_string(),
                message: failure_message(&output),
            });
        }
        Ok(output)
    }

    fn ensure_session(&self) -> Result<(), CollaboratorError> {
        if self.logged_in.get() {
            return Ok(());
        }
        if let Some(username) = &self.settings.username {
            let password = self.settings.password.as_deref().ok_or_else(|| {
                CollaboratorError::Login(format!("no password configured for user {username}"))
            })?;
            // The password answers emcli's prompt on stdin; it is never an argument.
            let args = [format!("-username={username}")];
            let answer = format!("{password}\n");
            self.run_with_input("login", &args, Some(&answer))
                .map_err(|e| match e {
                    CollaboratorError::CommandFailed { message, .. } => {
                        CollaboratorError::Login(message)
                    }
                    other => other,
                })?;
            info!(username = %username, "emcli session established");
        }
        self.logged_in.set(true);
        Ok(())
    }
}

impl FleetApi for EmcliClient {
    fn list_resource(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        self.ensure_session()?;
        let output = self.run("list", &[format!("-resource={kind}")])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_list_output(&stdout)
    }

    fn set_target_property_value(
        &self,
        separator: &str,
        record: &str,
    ) -> Result<(), CollaboratorError> {
        self.ensure_session()?;
        let args = [
            format!("-subseparator=property_records={separator}"),
            format!("-property_records={record}"),
        ];
        self.run("set_target_property_value", &args)?;
        Ok(())
    }
}

/// Extract rows from `emcli list` JSON output: either `{"data": [...]}` or a bare array.
pub fn parse_list_output(stdout: &str) -> Result<Vec<serde_json::Value>, CollaboratorError> {
    let invalid = |message: String| CollaboratorError::InvalidOutput {
        verb: "list".to_string(),
        message,
    };
    let value: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(|e| invalid(e.to_string()))?;
    match value {
        serde_json::Value::Array(rows) => Ok(rows),
        serde_json::Value::Object(mut obj) => match obj.remove("data") {
            Some(serde_json::Value::Array(rows)) => Ok(rows),
            Some(other) => Err(invalid(format!("`data` is not an array: {other}"))),
            None => Err(invalid("missing `data` field".to_string())),
        },
        other => Err(invalid(format!("expected object or array, got {other}"))),
    }
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

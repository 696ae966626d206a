use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::error::SmokeError;

pub trait ContainerRuntime: Send + Sync {
    /// Force-removes a container. Removing a container that does not exist is not an error.
    fn remove(&self, name: &str) -> Result<(), SmokeError>;
    /// Runs `docker run` with the given arguments (everything after `run`).
    fn run(&self, args: &[String]) -> Result<(), SmokeError>;
    /// Runs a command inside a running container with `workdir` as working directory.
    fn exec(&self, name: &str, workdir: &str, command: &[String]) -> Result<(), SmokeError>;
}

#[derive(Clone, Debug)]
pub struct DockerCli {
    program: PathBuf,
}

impl DockerCli {
    pub fn new() -> Result<Self, SmokeError> {
        let program =
            find_in_path("docker").ok_or_else(|| SmokeError::MissingTool("docker".to_string()))?;
        Ok(Self { program })
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run_cmd(&self, args: &[String]) -> Result<(), SmokeError> {
        info!("executing command: {}", command_line("docker", args));
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|err| {
                SmokeError::CommandFailed(format!("{}: {err}", self.program.display()))
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        for line in stdout.lines() {
            info!("  {line}");
        }
        if output.status.success() {
            for line in stderr.lines() {
                debug!("  stderr: {line}");
            }
            return Ok(());
        }
        let message = if stderr.is_empty() {
            format!("{} exited with {}", command_line("docker", args), output.status)
        } else {
            stderr
        };
        Err(SmokeError::CommandFailed(message))
    }
}

impl ContainerRuntime for DockerCli {
    fn remove(&self, name: &str) -> Result<(), SmokeError> {
        match self.run_cmd(&["rm".to_string(), "-f".to_string(), name.to_string()]) {
            Ok(()) => Ok(()),
            Err(SmokeError::CommandFailed(message)) if is_no_such_container(&message) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn run(&self, args: &[String]) -> Result<(), SmokeError> {
        let mut full = vec!["run".to_string()];
        full.extend_from_slice(args);
        self.run_cmd(&full)
    }

    fn exec(&self, name: &str, workdir: &str, command: &[String]) -> Result<(), SmokeError> {
        self.run_cmd(&exec_args(name, workdir, command))
    }
}

pub fn exec_args(name: &str, workdir: &str, command: &[String]) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        "-w".to_string(),
        workdir.to_string(),
        name.to_string(),
    ];
    args.extend_from_slice(command);
    args
}

/// Shell-like rendering of a command for the log.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn is_no_such_container(stderr: &str) -> bool {
    stderr.to_lowercase().contains("no such container")
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let candidate = path.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

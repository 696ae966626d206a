use camino::Utf8PathBuf;

use crate::app::{Phase, ProgressEvent, ProgressSink};
use crate::docker::ContainerRuntime;
use crate::error::SmokeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
    pub data_dir: Utf8PathBuf,
    pub mount_point: String,
}

impl ServerSpec {
    /// Arguments for `docker run`; the container name doubles as its hostname.
    pub fn run_args(&self) -> Vec<String> {
        vec![
            "-d".to_string(),
            "-h".to_string(),
            self.name.clone(),
            "-p".to_string(),
            format!("{}:{}", self.host_port, self.container_port),
            "-v".to_string(),
            format!("{}:{}", self.data_dir, self.mount_point),
            "--name".to_string(),
            self.name.clone(),
            self.image.clone(),
        ]
    }
}

/// Owns the Hyrax container for the duration of a run.
///
/// Once `start` has been called the container is removed exactly once, either
/// by an explicit `stop` or when the guard is dropped, whatever path the run
/// takes out of its scope.
pub struct ServerGuard<'a, R: ContainerRuntime> {
    runtime: &'a R,
    spec: ServerSpec,
    sink: &'a dyn ProgressSink,
    started: bool,
    stopped: bool,
}

impl<'a, R: ContainerRuntime> ServerGuard<'a, R> {
    pub fn new(runtime: &'a R, spec: ServerSpec, sink: &'a dyn ProgressSink) -> Self {
        Self {
            runtime,
            spec,
            sink,
            started: false,
            stopped: false,
        }
    }

    pub fn start(&mut self) -> Result<(), SmokeError> {
        self.started = true;
        if let Err(err) = self.runtime.remove(&self.spec.name) {
            self.sink.event(ProgressEvent::info(
                Phase::Server,
                format!("ignoring failed removal of stale container: {err}"),
            ));
        }
        self.sink.event(ProgressEvent::info(
            Phase::Server,
            format!(
                "starting {} as '{}' on port {} with {} mounted at {}",
                self.spec.image,
                self.spec.name,
                self.spec.host_port,
                self.spec.data_dir,
                self.spec.mount_point
            ),
        ));
        self.runtime
            .run(&self.spec.run_args())
            .map_err(|err| SmokeError::ServerStart(err.to_string()))
    }

    /// Removes the container. Never fails; a failed removal is only reported.
    pub fn stop(&mut self) {
        if !self.started || self.stopped {
            return;
        }
        self.stopped = true;
        self.sink.event(ProgressEvent::info(
            Phase::Teardown,
            format!("removing container '{}'", self.spec.name),
        ));
        if let Err(err) = self.runtime.remove(&self.spec.name) {
            self.sink.event(ProgressEvent::failure(
                Phase::Teardown,
                format!("failed to remove container '{}': {err}", self.spec.name),
            ));
        }
    }
}

impl<R: ContainerRuntime> Drop for ServerGuard<'_, R> {
    fn drop(&mut self) {
        self.stop();
    }
}

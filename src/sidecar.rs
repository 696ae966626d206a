use crate::docker::ContainerRuntime;
use crate::error::SmokeError;

pub const SIDECAR_TOOL: &str = "gen_dmrpp_side_car";

/// Builds DMR++ sidecars by running `gen_dmrpp_side_car` inside the Hyrax container.
pub struct SidecarGenerator<'a, R: ContainerRuntime> {
    runtime: &'a R,
    container: &'a str,
    mount_point: &'a str,
}

impl<'a, R: ContainerRuntime> SidecarGenerator<'a, R> {
    pub fn new(runtime: &'a R, container: &'a str, mount_point: &'a str) -> Self {
        Self {
            runtime,
            container,
            mount_point,
        }
    }

    /// `filename` is relative to the mount point and must already exist there.
    pub fn generate(&self, filename: &str) -> Result<(), SmokeError> {
        self.runtime
            .exec(self.container, self.mount_point, &sidecar_command(filename))
    }
}

/// `-H` requests checksums and `-U` the direct I/O mode of the tool.
pub fn sidecar_command(filename: &str) -> Vec<String> {
    vec![
        SIDECAR_TOOL.to_string(),
        "-i".to_string(),
        filename.to_string(),
        "-H".to_string(),
        "-U".to_string(),
    ]
}

//! Containers as test fixtures.
//!
//! ## Modules
//!
//! - `runtime` - the `ContainerRuntime` trait and the plain data it exchanges
//! - `docker` - the Docker Engine implementation
//! - `fake` - an in-memory implementation for tests
//! - `fixture` - `Container` and the `ContainerFixture` trait

pub mod docker;
pub mod fake;
pub mod fixture;
pub mod runtime;

pub use docker::DockerRuntime;
pub use fake::FakeRuntime;
pub use fixture::{Container, ContainerFixture};
pub use runtime::{ContainerRuntime, ContainerSpec, ContainerState, ExecOutput, ImageSummary, PortBinding};

use crate::errors::HarnessResult;

/// The newest local image with a tag containing `base`, as its first matching tag.
pub fn last_built(runtime: &dyn ContainerRuntime, base: &str) -> HarnessResult<Option<String>> {
    let mut found: Option<(i64, String)> = None;
    for image in runtime.list_images()? {
        let Some(tag) = image.tags.iter().find(|tag| tag.contains(base)) else {
            continue;
        };
        if found.as_ref().is_none_or(|(created, _)| image.created > *created) {
            found = Some((image.created, tag.clone()));
        }
    }
    Ok(found.map(|(_, tag)| tag))
}

/// Whether a local image carries exactly this tag.
pub fn image_exists(runtime: &dyn ContainerRuntime, name: &str) -> HarnessResult<bool> {
    Ok(runtime
        .list_images()?
        .iter()
        .any(|image| image.tags.iter().any(|tag| tag == name)))
}

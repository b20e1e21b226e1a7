//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file, then:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = TestFixture::new()
//!     .with_manifest(manifests::SINGLE_APP)
//!     .with_file("docker-compose.yml", "services: {}\n");
//! let plan = fixture.assemble().unwrap();
//! ```

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;

use d0s::cancel::CancellationToken;
use d0s::error::Result;
use d0s::phases::{orchestrator, DeploymentPlan};
use d0s::repository::SourceFetcher;
use d0s::source::ManifestSource;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::manifests;
    pub use super::TestFixture;
}

/// Manifest snippets shared between tests.
#[allow(dead_code)]
pub mod manifests {
    /// One plain app on a host
    pub const SINGLE_APP: &str = r#"
host:
  name: example.com
  user: deploy
apps:
  web:
    env:
      DOMAIN: x
"#;

    /// Two apps extending each other
    pub const CYCLE: &str = r#"
host:
  name: example.com
apps:
  a:
    extends: "::B"
  b:
    extends: "::A"
"#;

    /// Raw names that collide after normalisation
    pub const DUPLICATE: &str = r#"
host:
  name: example.com
apps:
  my-app: {}
  MyApp: {}
"#;
}

/// A temporary directory holding a manifest tree and a private cache.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `d0s-manifest.yml` at the fixture root.
    pub fn with_manifest(self, content: &str) -> Self {
        self.with_file("d0s-manifest.yml", content)
    }

    /// Write a file, creating parent directories.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path().join("d0s-manifest.yml")
    }

    /// Cache root kept inside the fixture so tests never share checkouts.
    pub fn cache_root(&self) -> PathBuf {
        self.path().join(".cache")
    }

    pub fn fetcher(&self) -> SourceFetcher {
        SourceFetcher::new(self.cache_root())
    }

    /// Resolve the fixture's root manifest.
    pub fn assemble(&self) -> Result<DeploymentPlan> {
        let source = ManifestSource::local(self.path()).expect("Invalid fixture path");
        orchestrator::assemble_source(&source, &self.fetcher(), &CancellationToken::new())
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// A `d0s` command running in the fixture with its private cache.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("d0s");
        cmd.current_dir(self.path())
            .env("D0S_CACHE", self.cache_root())
            .env_remove("D0S_MANIFEST")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

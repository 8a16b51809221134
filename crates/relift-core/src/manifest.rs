//! package.json analysis: is this a Sails app, which packages need to be
//! installed for 1.0, and which grunt-era packages can go.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use semver::{Version, VersionReq};
use serde::Deserialize;
use tracing::debug;

use crate::loader::ProjectConfig;

/// Range every 1.0-ready sails dependency must satisfy.
const SAILS_V1_REQ: &str = "^1.0.0-0";

/// Hooks that became separate packages; installed when absent or outdated.
const REQUIRED_HOOKS: &[(&str, &str)] = &[
    ("sails-hook-orm", "^2.0.0-0"),
    ("sails-hook-grunt", "^1.0.0-0"),
    ("sails-hook-sockets", "^1.0.0-0"),
];

/// Adapters that get a version bump, but only when already present.
const ADAPTERS: &[&str] = &["sails-postgresql", "sails-mysql", "sails-mongo"];

/// Grunt-era packages now built in to Sails; removal is optional.
const REMOVABLE_PACKAGES: &[&str] = &[
    "grunt",
    "grunt-contrib-clean",
    "grunt-contrib-coffee",
    "grunt-contrib-concat",
    "grunt-contrib-copy",
    "grunt-contrib-cssmin",
    "grunt-contrib-jst",
    "grunt-contrib-less",
    "grunt-contrib-uglify",
    "grunt-contrib-watch",
    "grunt-sails-linker",
    "grunt-sync",
    "sails-disk",
];

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("could not find a package.json in {dir} (is this a Sails project?)")]
    Missing { dir: PathBuf },
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("this project does not include sails as a dependency (is this a Sails project?)")]
    NotASailsApp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    /// The declared sails version specifier; its absence makes the whole
    /// run refuse to proceed.
    pub fn sails_spec(&self) -> Result<&str, ManifestError> {
        self.dependencies
            .get("sails")
            .map(String::as_str)
            .ok_or(ManifestError::NotASailsApp)
    }
}

pub fn load_manifest(root: &Path) -> Result<PackageManifest, ManifestError> {
    let path = root.join("package.json");
    if !path.is_file() {
        return Err(ManifestError::Missing {
            dir: root.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    let manifest: PackageManifest =
        serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
            path: path.clone(),
            source,
        })?;
    manifest.sails_spec()?;
    Ok(manifest)
}

/// One package to install, with the version to request from npm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
}

impl PackageSpec {
    fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// Exact versions (no range specifier) are installed with
    /// `--save-exact`.
    pub fn is_exact(&self) -> bool {
        !self.version.starts_with('^')
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// What has to change in the dependency tree for Sails 1.0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyPlan {
    pub needs_sails_upgrade: bool,
    pub install: Vec<PackageSpec>,
    pub remove: Vec<String>,
}

/// Strip the leading range specifier (`^`, `~`, `>=`, ...) and parse what
/// remains. Unparseable specifiers (git URLs, tags) count as not
/// satisfying anything, so they get the upgrade treatment.
fn declared_version(spec: &str) -> Option<Version> {
    let cleaned = spec.trim_start_matches(|c: char| !c.is_ascii_digit());
    Version::parse(cleaned).ok()
}

fn satisfies(spec: &str, req: &str) -> bool {
    let Ok(req) = VersionReq::parse(req) else {
        return false;
    };
    declared_version(spec).is_some_and(|v| req.matches(&v))
}

/// Build the install/remove plan from the manifest and the globals config
/// (lodash/async shims are only needed while those globals stay enabled).
pub fn plan_dependencies(manifest: &PackageManifest, config: &ProjectConfig) -> DependencyPlan {
    let deps = &manifest.dependencies;
    let mut plan = DependencyPlan::default();

    if let Some(sails) = deps.get("sails") {
        plan.needs_sails_upgrade = !satisfies(sails, SAILS_V1_REQ);
    }

    for (hook, req) in REQUIRED_HOOKS {
        match deps.get(*hook) {
            Some(spec) if satisfies(spec, req) => {}
            _ => plan.install.push(PackageSpec::new(hook, req)),
        }
    }

    for adapter in ADAPTERS {
        if let Some(spec) = deps.get(*adapter) {
            if !satisfies(spec, SAILS_V1_REQ) {
                plan.install.push(PackageSpec::new(adapter, SAILS_V1_REQ));
            }
        }
    }

    if let Some(spec) = deps.get("socket.io-redis") {
        if !satisfies(spec, "^3.1.0") {
            plan.install.push(PackageSpec::new("socket.io-redis", "3.1.0"));
        }
    }

    // With the corresponding global still enabled, the app keeps reaching
    // for `_` / `async`, which Sails 1.0 no longer bundles.
    if !config.global_is_disabled("_") && !deps.contains_key("lodash") {
        plan.install.push(PackageSpec::new("lodash", "3.10.1"));
    }
    if !config.global_is_disabled("async") && !deps.contains_key("async") {
        plan.install.push(PackageSpec::new("async", "2.1.4"));
    }

    plan.remove = REMOVABLE_PACKAGES
        .iter()
        .filter(|name| deps.contains_key(**name))
        .map(|name| name.to_string())
        .collect();

    debug!(
        install = plan.install.len(),
        remove = plan.remove.len(),
        needs_sails_upgrade = plan.needs_sails_upgrade,
        "built dependency plan"
    );

    plan
}

//! Local environment checks for `kb-cli validate`

use incident_kb::config::{Config, StorageBackend};
use incident_kb::pocketbase::PocketBaseClient;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let mark = if check.passed { "[ok]  " } else { "[FAIL]" };
            writeln!(f, "{} {}: {}", mark, check.name, check.detail)?;
        }
        if self.passed() {
            write!(f, "\nAll {} checks passed", self.checks.len())
        } else {
            write!(f, "\n{} of {} checks failed", self.failures(), self.checks.len())
        }
    }
}

/// Run every check; `skip_network` leaves out the PocketBase round-trip
pub async fn run(config_path: &Path, skip_network: bool) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config_path.is_file() {
        report.checks.push(Check::pass(
            "config file",
            format!("found {}", config_path.display()),
        ));
    } else {
        report.checks.push(Check::fail(
            "config file",
            format!("{} does not exist", config_path.display()),
        ));
    }

    let config = match Config::load_from(&config_path.to_string_lossy()) {
        Ok(config) => {
            report.checks.push(Check::pass("config parse", "configuration is valid"));
            config
        }
        Err(e) => {
            report.checks.push(Check::fail("config parse", e.to_string()));
            match Config::embedded_default() {
                Ok(config) => config,
                Err(_) => return report,
            }
        }
    };

    match config.storage.backend {
        StorageBackend::Sled => match &config.storage.path {
            Some(path) => report
                .checks
                .push(check_writable_dir("sled data directory", path).await),
            None => report.checks.push(Check::fail(
                "sled data directory",
                "storage.path is required for the sled backend",
            )),
        },
        StorageBackend::Pocketbase => {
            if config.storage.admin_email.is_some() {
                let var = &config.storage.admin_password_env;
                report.checks.push(if std::env::var(var).is_ok() {
                    Check::pass("pocketbase credentials", format!("{} is set", var))
                } else {
                    Check::fail("pocketbase credentials", format!("{} is not set", var))
                });
            }
            if !skip_network {
                report.checks.push(check_pocketbase(&config).await);
            }
        }
        StorageBackend::Memory => report.checks.push(Check::pass(
            "storage",
            "in-memory backend, nothing persisted",
        )),
    }

    for (name, file) in [
        ("audit log directory", &config.agent.audit_path),
        ("feedback directory", &config.agent.feedback_path),
    ] {
        let dir = parent_dir(file);
        report.checks.push(check_writable_dir(name, &dir).await);
    }

    report
}

fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Create the directory if needed, then prove a file can be written in it
async fn check_writable_dir(name: &str, dir: &Path) -> Check {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        return Check::fail(name, format!("cannot create {}: {}", dir.display(), e));
    }
    let marker = dir.join(".kb-validate");
    match tokio::fs::write(&marker, b"ok").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&marker).await;
            Check::pass(name, format!("{} is writable", dir.display()))
        }
        Err(e) => Check::fail(name, format!("{} is not writable: {}", dir.display(), e)),
    }
}

async fn check_pocketbase(config: &Config) -> Check {
    let client = match PocketBaseClient::from_config(&config.storage) {
        Ok(client) => client,
        Err(e) => return Check::fail("pocketbase reachable", e.to_string()),
    };
    match client.health().await {
        Ok(status) => Check::pass(
            "pocketbase reachable",
            format!("{} answered: {}", client.base_url(), status.message),
        ),
        Err(e) => Check::fail(
            "pocketbase reachable",
            format!("{}: {}", client.base_url(), e),
        ),
    }
}

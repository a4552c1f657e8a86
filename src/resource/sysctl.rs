//! Sysctl resource - keep one kernel parameter at a desired value
//!
//! The parameter `net.ipv4.ip_forward` lives at
//! `/proc/sys/net/ipv4/ip_forward`. Reads compare the node's content with
//! the desired value, writes replace it, and the node itself is watched
//! for changes made behind our back.

use async_trait::async_trait;
use declarative::{
    BoxedResource, ChangeSource, Error, ExecutionContext, NotifySource, Resource, Result,
    watch_loop,
};
use regex::Regex;
use serde::Deserialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use crate::paths;

/// Kind name used in definitions
pub const KIND: &str = "sysctl";

/// Directory persistent settings belong in
pub const PERSIST_DIR: &str = "/etc/sysctl.d";

/// Dot-separated runs of name characters, no empty segments
static PARAMETER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$").expect("hardcoded regex pattern is valid")
});

/// A kernel parameter and the value it must hold
#[derive(Debug)]
pub struct SysctlRes {
    /// Identity, and the parameter when `parameter` is empty
    pub name: String,
    /// Dotted parameter name (e.g., "vm.swappiness")
    pub parameter: String,
    /// Desired value
    pub value: String,
    /// Whether the setting should survive a reboot
    pub persistent: bool,
    root: PathBuf,
    source: Arc<dyn ChangeSource>,
    ctx: Mutex<Option<ExecutionContext>>,
}

impl Default for SysctlRes {
    fn default() -> Self {
        Self {
            name: String::new(),
            parameter: String::new(),
            value: String::new(),
            persistent: true,
            root: PathBuf::from(paths::SYSCTL_DIR),
            source: Arc::new(NotifySource),
            ctx: Mutex::new(None),
        }
    }
}

/// Fields a definition may set on top of the defaults
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SysctlOverlay {
    pub parameter: Option<String>,
    pub value: Option<String>,
    pub persistent: Option<bool>,
}

impl SysctlRes {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Resolve parameter paths under `root` instead of `/proc/sys`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Watch through `source` instead of the filesystem notifier
    #[cfg(test)]
    pub fn with_source(mut self, source: Arc<dyn ChangeSource>) -> Self {
        self.source = source;
        self
    }

    /// Apply the explicitly set fields of a definition
    pub fn overlay(mut self, overlay: SysctlOverlay) -> Self {
        if let Some(parameter) = overlay.parameter {
            self.parameter = parameter;
        }
        if let Some(value) = overlay.value {
            self.value = value;
        }
        if let Some(persistent) = overlay.persistent {
            self.persistent = persistent;
        }
        self
    }

    /// The dotted parameter this resource manages
    pub fn parameter_name(&self) -> &str {
        if self.parameter.is_empty() {
            &self.name
        } else {
            &self.parameter
        }
    }

    /// Node backing the parameter
    pub fn get_path(&self) -> PathBuf {
        self.root.join(self.parameter_name().replace('.', "/"))
    }

    /// Where a persistent setting would be written
    pub fn persist_path(&self) -> PathBuf {
        Path::new(PERSIST_DIR).join(format!("10-{}.conf", self.name))
    }

    fn slot(&self) -> MutexGuard<'_, Option<ExecutionContext>> {
        self.ctx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context(&self) -> Result<ExecutionContext> {
        self.slot()
            .clone()
            .ok_or_else(|| Error::Init(format!("{} used before init", self.id())))
    }

    fn logf(&self, args: std::fmt::Arguments<'_>) {
        match self.slot().as_ref() {
            Some(ctx) => ctx.logf(args),
            None => log::info!("{}: {}", self.id(), args),
        }
    }
}

/// Live content matches the desired value, ignoring one trailing newline
fn matches_desired(live: &[u8], value: &str) -> bool {
    let live = live.strip_suffix(b"\n").unwrap_or(live);
    let value = value.strip_suffix('\n').unwrap_or(value);
    live == value.as_bytes()
}

fn write_value(path: &Path, value: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let mut file = options.open(path)?;
    file.write_all(value.as_bytes())
}

#[async_trait]
impl Resource for SysctlRes {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Set {} = {}", self.parameter_name(), self.value)
    }

    fn validate(&self) -> Result<()> {
        let parameter = self.parameter_name();
        if parameter.is_empty() {
            return Err(Error::invalid(KIND, &self.name, "parameter is empty"));
        }
        if self.value.is_empty() {
            return Err(Error::invalid(KIND, &self.name, "value is empty"));
        }
        if !PARAMETER_RE.is_match(parameter) {
            return Err(Error::invalid(
                KIND,
                &self.name,
                format!("invalid parameter name: {parameter}"),
            ));
        }

        let path = self.get_path();
        if fs::metadata(&path).is_err() {
            return Err(Error::invalid(
                KIND,
                &self.name,
                format!("kernel parameter does not exist: {}", path.display()),
            ));
        }
        Ok(())
    }

    fn init(&self, ctx: ExecutionContext) -> Result<()> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(Error::Init(format!("{} initialized twice", self.id())));
        }
        if self.persistent && ctx.debug() {
            ctx.logf(format_args!(
                "persistence to {} is not managed",
                self.persist_path().display()
            ));
        }
        *slot = Some(ctx);
        Ok(())
    }

    fn check_apply(&self, apply: bool) -> Result<bool> {
        let path = self.get_path();
        let live = fs::read(&path).map_err(|e| Error::io(&path, e))?;

        if matches_desired(&live, &self.value) {
            return Ok(true);
        }

        if !apply {
            return Ok(false);
        }

        write_value(&path, &self.value).map_err(|e| Error::io(&path, e))?;
        self.logf(format_args!(
            "{} set to {}",
            self.parameter_name(),
            self.value
        ));

        // Not re-read: a write is reported as a change
        Ok(false)
    }

    async fn watch(&self) -> Result<()> {
        let ctx = self.context()?;
        let sub = self.source.subscribe(&self.get_path(), false)?;
        watch_loop(&ctx, sub).await
    }

    fn cmp_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("parameter", self.get_path().display().to_string()),
            ("value", self.value.clone()),
        ]
    }

    fn close(&self) -> Result<()> {
        self.slot().take();
        Ok(())
    }
}

/// Build a sysctl resource from a definition table
pub fn decode(name: &str, fields: toml::Table) -> Result<BoxedResource> {
    let overlay: SysctlOverlay =
        toml::Value::Table(fields)
            .try_into()
            .map_err(|e: toml::de::Error| Error::Decode {
                kind: KIND.to_string(),
                name: name.to_string(),
                message: e.message().to_string(),
            })?;

    let res = SysctlRes::new(name)
        .with_root(paths::sysctl_root())
        .overlay(overlay);
    Ok(Box::new(res))
}

//! Service-description templates.
//!
//! A fixed table maps `(service_type, backend)` to a template file. Templates
//! are looked up in an optional on-disk directory first and otherwise come
//! from the copies compiled into the binary. Placeholders use `{{NAME}}`
//! syntax; a template that references a name outside [`Placeholder`] fails
//! to render instead of leaking the raw token into an artifact.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::detection::BackendKind;
use crate::service::{ServiceDescriptor, ServiceType};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template `{template}` references unknown placeholder `{name}`")]
    UnknownPlaceholder { template: String, name: String },

    #[error("template `{template}` uses placeholder `{name}` which has no value here")]
    MissingValue { template: String, name: String },

    #[error("template `{template}` has an unterminated placeholder at byte {offset}")]
    Unterminated { template: String, offset: usize },

    #[error("value of `{name}` cannot be written into `{template}`: it contains a line break")]
    UnsafeValue { template: String, name: String },
}

/// Known template files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    LaunchdWatcher,
    LaunchdWatchdog,
    SystemdWatcher,
    SystemdWatchdog,
    SystemdDaemon,
    SystemdDaemonTimer,
}

impl TemplateId {
    pub fn file_name(self) -> &'static str {
        match self {
            TemplateId::LaunchdWatcher => "launchd-watcher.plist.template",
            TemplateId::LaunchdWatchdog => "launchd-watchdog.plist.template",
            TemplateId::SystemdWatcher => "systemd-watcher.service.template",
            TemplateId::SystemdWatchdog => "systemd-watchdog.service.template",
            TemplateId::SystemdDaemon => "systemd-daemon.service.template",
            TemplateId::SystemdDaemonTimer => "systemd-daemon.timer.template",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            TemplateId::LaunchdWatcher => {
                include_str!("../templates/launchd-watcher.plist.template")
            }
            TemplateId::LaunchdWatchdog => {
                include_str!("../templates/launchd-watchdog.plist.template")
            }
            TemplateId::SystemdWatcher => {
                include_str!("../templates/systemd-watcher.service.template")
            }
            TemplateId::SystemdWatchdog => {
                include_str!("../templates/systemd-watchdog.service.template")
            }
            TemplateId::SystemdDaemon => {
                include_str!("../templates/systemd-daemon.service.template")
            }
            TemplateId::SystemdDaemonTimer => {
                include_str!("../templates/systemd-daemon.timer.template")
            }
        }
    }

    fn escaping(self) -> Escaping {
        match self {
            TemplateId::LaunchdWatcher | TemplateId::LaunchdWatchdog => Escaping::Xml,
            TemplateId::SystemdWatcher
            | TemplateId::SystemdWatchdog
            | TemplateId::SystemdDaemon
            | TemplateId::SystemdDaemonTimer => Escaping::Systemd,
        }
    }
}

/// How substituted values are made safe for the target file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escaping {
    /// Property lists: XML entities
    Xml,
    /// Unit files: `%` specifiers always, C-style escapes inside quotes,
    /// `$` expansion on `Exec*` lines
    Systemd,
}

/// The primary descriptor template for a service type on a backend.
///
/// `(daemon, launchd)` is deliberately unmapped: that plist is synthesized
/// programmatically. Cron needs no descriptor file at all.
pub fn template_id(service_type: ServiceType, backend: BackendKind) -> Option<TemplateId> {
    match (service_type, backend) {
        (ServiceType::Watcher, BackendKind::Launchd) => Some(TemplateId::LaunchdWatcher),
        (ServiceType::Watchdog, BackendKind::Launchd) => Some(TemplateId::LaunchdWatchdog),
        (ServiceType::Watcher, BackendKind::Systemd) => Some(TemplateId::SystemdWatcher),
        (ServiceType::Watchdog, BackendKind::Systemd) => Some(TemplateId::SystemdWatchdog),
        (ServiceType::Daemon, BackendKind::Systemd) => Some(TemplateId::SystemdDaemon),
        (ServiceType::Daemon, BackendKind::Launchd) | (_, BackendKind::Cron) => None,
    }
}

/// A resolved template ready to render
#[derive(Debug, Clone)]
pub struct Template {
    pub id: TemplateId,
    text: Cow<'static, str>,
}

impl Template {
    pub fn text(&self) -> &str {
        &self.text
    }

    #[cfg(test)]
    pub(crate) fn from_text(id: TemplateId, text: &str) -> Self {
        Self {
            id,
            text: Cow::Owned(text.to_string()),
        }
    }
}

/// Placeholders a template may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    ProjectName,
    ProjectDir,
    ScriptPath,
    Home,
    InstallDir,
    ServiceName,
    Label,
    Unit,
    Path,
    LogDir,
    IntervalSecs,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "PROJECT_NAME" => Placeholder::ProjectName,
            "PROJECT_DIR" => Placeholder::ProjectDir,
            "SCRIPT_PATH" => Placeholder::ScriptPath,
            "HOME" => Placeholder::Home,
            "INSTALL_DIR" => Placeholder::InstallDir,
            "SERVICE_NAME" => Placeholder::ServiceName,
            "LABEL" => Placeholder::Label,
            "UNIT" => Placeholder::Unit,
            "PATH" => Placeholder::Path,
            "LOG_DIR" => Placeholder::LogDir,
            "INTERVAL_SECS" => Placeholder::IntervalSecs,
            _ => return None,
        })
    }
}

/// Values substituted into a template
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub project_name: String,
    pub project_dir: String,
    pub script_path: String,
    pub home: String,
    pub install_dir: String,
    pub service_name: String,
    pub path: String,
    pub log_dir: String,
    pub interval_secs: u64,
    /// Launchd label, set by the launchd driver only
    pub label: Option<String>,
    /// Unit a timer activates, set by the systemd driver only
    pub unit: Option<String>,
}

impl TemplateVars {
    pub fn for_descriptor(
        desc: &ServiceDescriptor,
        home: &Path,
        path_env: &str,
        log_dir: &Path,
        interval_secs: u64,
    ) -> Self {
        Self {
            project_name: desc.project_name.clone(),
            project_dir: desc.project_dir.display().to_string(),
            script_path: desc.script_path.display().to_string(),
            home: home.display().to_string(),
            install_dir: install_dir_for(&desc.script_path).display().to_string(),
            service_name: desc.service_name.clone(),
            path: path_env.to_string(),
            log_dir: log_dir.display().to_string(),
            interval_secs,
            label: None,
            unit: None,
        }
    }

    fn value(&self, placeholder: Placeholder) -> Option<Cow<'_, str>> {
        match placeholder {
            Placeholder::ProjectName => Some(Cow::Borrowed(self.project_name.as_str())),
            Placeholder::ProjectDir => Some(Cow::Borrowed(self.project_dir.as_str())),
            Placeholder::ScriptPath => Some(Cow::Borrowed(self.script_path.as_str())),
            Placeholder::Home => Some(Cow::Borrowed(self.home.as_str())),
            Placeholder::InstallDir => Some(Cow::Borrowed(self.install_dir.as_str())),
            Placeholder::ServiceName => Some(Cow::Borrowed(self.service_name.as_str())),
            Placeholder::Path => Some(Cow::Borrowed(self.path.as_str())),
            Placeholder::LogDir => Some(Cow::Borrowed(self.log_dir.as_str())),
            Placeholder::IntervalSecs => Some(Cow::Owned(self.interval_secs.to_string())),
            Placeholder::Label => self.label.as_deref().map(Cow::Borrowed),
            Placeholder::Unit => self.unit.as_deref().map(Cow::Borrowed),
        }
    }
}

/// Installation root: two levels above the directory holding the script.
///
/// The script's directory is canonicalized when it exists so symlinked
/// installs resolve to their real location.
pub fn install_dir_for(script_path: &Path) -> PathBuf {
    let parent = script_path.parent().unwrap_or_else(|| Path::new("/"));
    let parent = fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
    let mut dir = parent.as_path();
    for _ in 0..2 {
        dir = dir.parent().unwrap_or(dir);
    }
    if dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        dir.to_path_buf()
    }
}

/// Substitute every `{{NAME}}` placeholder in `template`.
pub fn render(template: &Template, vars: &TemplateVars) -> Result<String, TemplateError> {
    let source = template.text();
    let template_name = template.id.file_name();
    let mut out = String::with_capacity(source.len() + 256);
    let mut rest = source;
    let mut consumed = 0;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(TemplateError::Unterminated {
                template: template_name.to_string(),
                offset: consumed + start,
            });
        };

        let name = after_open[..end].trim();
        let placeholder =
            Placeholder::parse(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
                template: template_name.to_string(),
                name: name.to_string(),
            })?;
        let value = vars
            .value(placeholder)
            .ok_or_else(|| TemplateError::MissingValue {
                template: template_name.to_string(),
                name: name.to_string(),
            })?;

        match template.id.escaping() {
            Escaping::Xml => out.push_str(&xml_escape(&value)),
            Escaping::Systemd => {
                if value.contains(['\n', '\r']) {
                    return Err(TemplateError::UnsafeValue {
                        template: template_name.to_string(),
                        name: name.to_string(),
                    });
                }
                let line = out.rsplit_once('\n').map_or(out.as_str(), |(_, line)| line);
                let context = UnitContext {
                    quoted: inside_quotes(line),
                    exec: line.trim_start().starts_with("Exec"),
                };
                let escaped = systemd_escape(&value, context);
                out.push_str(&escaped);
            }
        }

        let advance = start + OPEN.len() + end + CLOSE.len();
        consumed += advance;
        rest = &rest[advance..];
    }
    out.push_str(rest);
    Ok(out)
}

fn xml_escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 16);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Where in a unit-file line a value is being substituted
#[derive(Debug, Clone, Copy)]
struct UnitContext {
    /// Inside a `"..."` word
    quoted: bool,
    /// On an `ExecStart=`-style line, where `$` expands variables
    exec: bool,
}

/// True when `line` ends inside an open double-quoted word
fn inside_quotes(line: &str) -> bool {
    let mut inside = false;
    let mut escaped = false;
    for c in line.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if inside => escaped = true,
            '"' => inside = !inside,
            _ => {}
        }
    }
    inside
}

fn systemd_escape(value: &str, context: UnitContext) -> Cow<'_, str> {
    let needs_escape = value.chars().any(|c| match c {
        '%' => true,
        '\\' | '"' => context.quoted,
        '$' => context.exec,
        _ => false,
    });
    if !needs_escape {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '%' => escaped.push_str("%%"),
            '\\' | '"' if context.quoted => {
                escaped.push('\\');
                escaped.push(c);
            }
            '$' if context.exec => escaped.push_str("$$"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Where templates are loaded from
#[derive(Debug, Clone)]
enum Source {
    /// Compiled-in templates only
    Builtin,
    /// On-disk directory first, compiled-in copy second
    Overlay(PathBuf),
    /// On-disk directory only; a missing file means no template
    Strict(PathBuf),
}

/// Resolves template files for the drivers
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    source: Source,
}

impl TemplateEngine {
    pub fn builtin() -> Self {
        Self {
            source: Source::Builtin,
        }
    }

    pub fn with_override_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Overlay(dir.into()),
        }
    }

    pub fn strict_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Strict(dir.into()),
        }
    }

    /// Primary descriptor template for the pair, or `None` when unmapped or
    /// (in strict mode) absent from disk
    pub fn find_template(&self, service_type: ServiceType, backend: BackendKind) -> Option<Template> {
        template_id(service_type, backend).and_then(|id| self.load(id))
    }

    /// Timer template paired with a periodic systemd service
    pub fn find_timer_template(&self, service_type: ServiceType) -> Option<Template> {
        service_type
            .is_periodic()
            .then_some(TemplateId::SystemdDaemonTimer)
            .and_then(|id| self.load(id))
    }

    fn load(&self, id: TemplateId) -> Option<Template> {
        let builtin = || Template {
            id,
            text: Cow::Borrowed(id.builtin()),
        };
        match &self.source {
            Source::Builtin => Some(builtin()),
            Source::Overlay(dir) => Some(read_template(dir, id).unwrap_or_else(builtin)),
            Source::Strict(dir) => read_template(dir, id),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

fn read_template(dir: &Path, id: TemplateId) -> Option<Template> {
    let path = dir.join(id.file_name());
    match fs::read_to_string(&path) {
        Ok(text) => {
            debug!("using template {}", path.display());
            Some(Template {
                id,
                text: Cow::Owned(text),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to read template {}: {e}", path.display());
            None
        }
    }
}

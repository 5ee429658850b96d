//! launchd property list synthesis for services without a plist template.

use plist::{Dictionary, Value};

use crate::error::{Result, ServiceError};
use crate::template::TemplateVars;

/// Generate a periodic launch agent plist
pub(super) fn generate_periodic_plist(label: &str, vars: &TemplateVars) -> Result<String> {
    let mut plist = Dictionary::new();

    // Basic properties
    plist.insert("Label".to_string(), Value::String(label.to_string()));

    // Program and arguments
    plist.insert(
        "ProgramArguments".to_string(),
        Value::Array(vec![
            Value::String(vars.script_path.clone()),
            Value::String(vars.project_dir.clone()),
        ]),
    );
    plist.insert(
        "WorkingDirectory".to_string(),
        Value::String(vars.project_dir.clone()),
    );

    // Schedule: once at load, then every interval
    plist.insert(
        "StartInterval".to_string(),
        Value::Integer(vars.interval_secs.into()),
    );
    plist.insert("RunAtLoad".to_string(), Value::Boolean(true));

    // Logging
    plist.insert(
        "StandardOutPath".to_string(),
        Value::String(format!("{}/{}.log", vars.log_dir, vars.service_name)),
    );
    plist.insert(
        "StandardErrorPath".to_string(),
        Value::String(format!("{}/{}.err.log", vars.log_dir, vars.service_name)),
    );

    // Launch agents start with a minimal PATH, not the user's shell PATH
    let mut env = Dictionary::new();
    env.insert("PATH".to_string(), Value::String(vars.path.clone()));
    env.insert("HOME".to_string(), Value::String(vars.home.clone()));
    env.insert(
        "CHECKPOINT_PROJECT".to_string(),
        Value::String(vars.project_name.clone()),
    );
    env.insert(
        "CHECKPOINT_INSTALL_DIR".to_string(),
        Value::String(vars.install_dir.clone()),
    );
    plist.insert("EnvironmentVariables".to_string(), Value::Dictionary(env));

    // Generate XML
    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &Value::Dictionary(plist))
        .map_err(|e| ServiceError::InstallFailed(format!("Failed to generate plist: {e}")))?;

    String::from_utf8(buf)
        .map_err(|e| ServiceError::InstallFailed(format!("Plist contains invalid UTF-8: {e}")))
}

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ProvisionError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    /// Maps a provisioning error onto the status its exit code is derived from.
    #[must_use]
    pub fn from_error(err: &ProvisionError) -> Self {
        let root = err.root();
        let message = match err.package() {
            Some(name) => format!("package {name}: {root}"),
            None => root.to_string(),
        };
        let mut details = json!({
            "code": err.code(),
            "package": err.package(),
            "transient": err.is_transient(),
        });
        if let Some(hint) = hint_for(root) {
            details["hint"] = Value::String(hint.to_string());
        }
        if err.is_user_error() {
            Self::user_error(message, details)
        } else {
            Self::failure(message, details)
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserError => 1,
            Self::Failure => 2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::UserError => "user-error",
            Self::Failure => "error",
        }
    }
}

fn hint_for(err: &ProvisionError) -> Option<&'static str> {
    match err {
        ProvisionError::LockTimeout { .. } => Some(
            "resubmit the job once the other provisioning job finishes, \
             or raise SHPKG_LOCK_TIMEOUT",
        ),
        ProvisionError::ExtractionFailed { .. } => {
            Some("the next job will start the extraction over; check the archive and free space")
        }
        ProvisionError::InvalidManifest(_) => {
            Some("give every package its own name, destination and checksum file")
        }
        ProvisionError::Io { .. } | ProvisionError::Package { .. } => None,
    }
}

/// Prefixes `message` with the command that produced it.
#[must_use]
pub fn format_status_message(command: &str, message: &str) -> String {
    let prefix = format!("shpkg {command}");
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
}

/// The `{status, message, details}` envelope printed under `--json`.
#[must_use]
pub fn to_json_response(command: &str, outcome: &ExecutionOutcome) -> Value {
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": outcome.status.as_str(),
        "message": format_status_message(command, &outcome.message),
        "details": details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn lock_timeout_is_a_transient_failure() {
        let err = ProvisionError::LockTimeout {
            lock: PathBuf::from("/env/base.lock"),
            waited: Duration::from_secs(3),
        }
        .for_package("BASE");

        let outcome = ExecutionOutcome::from_error(&err);

        assert_eq!(outcome.status, CommandStatus::Failure);
        assert_eq!(outcome.exit_code(), 2);
        assert!(outcome.message.starts_with("package BASE: [SHP100]"));
        assert_eq!(outcome.details["code"], "SHP100");
        assert_eq!(outcome.details["package"], "BASE");
        assert_eq!(outcome.details["transient"], true);
        assert!(outcome.details["hint"].is_string());
    }

    #[test]
    fn invalid_manifest_is_a_user_error() {
        let err = ProvisionError::InvalidManifest("package BASE is listed more than once".into());
        let outcome = ExecutionOutcome::from_error(&err);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.details["package"], Value::Null);
    }

    #[test]
    fn io_errors_carry_no_hint() {
        let err = ProvisionError::io(
            "failed to open archive",
            PathBuf::from("/pkgs/base.tar").as_path(),
            io::Error::from(io::ErrorKind::NotFound),
        );
        let outcome = ExecutionOutcome::from_error(&err);
        assert_eq!(outcome.details["code"], "SHP300");
        assert!(outcome.details.get("hint").is_none());
    }

    #[test]
    fn json_envelope_wraps_scalar_details() {
        let outcome = ExecutionOutcome::success("valid", json!("valid"));
        let payload = to_json_response("status", &outcome);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "shpkg status: valid");
        assert_eq!(payload["details"]["value"], "valid");
    }

    #[test]
    fn status_message_is_not_prefixed_twice() {
        assert_eq!(format_status_message("ensure", ""), "shpkg ensure");
        assert_eq!(
            format_status_message("ensure", "shpkg ensure: done"),
            "shpkg ensure: done"
        );
    }
}

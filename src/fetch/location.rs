//! Source location validation and credential redaction
//!
//! Every location is checked here before a transfer is attempted. Anything
//! that is not a plain repository address on an allowed host is rejected.

use crate::error::ValidationError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

pub const MAX_LOCATION_CHARS: usize = 2000;
pub const MAX_PATH_SEGMENTS: usize = 10;

const SHELL_METACHARACTERS: &[&str] = &[";", "&", "|", "$(", "`", "<", ">"];
const DANGEROUS_SCHEMES: &[&str] = &["file:", "javascript:", "data:", "ftp:"];
const TRAVERSAL: &[&str] = &["../", "..\\", "%2e%2e", "..%2f", "..%5c", "%2e."];

fn re_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(https|ssh|git)://(?:([^@/]+)@)?([^/:@]+)(?::(\d{1,5}))?/(.+)$").unwrap())
}

fn re_scp() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^git@([A-Za-z0-9.-]+):(.+)$").unwrap())
}

fn re_userinfo() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(https?|ssh|git)://[^@/\s]+@").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferForm {
    Https,
    Ssh,
    Git,
    /// `git@host:path`
    Scp,
}

/// A validated repository address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub form: TransferForm,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// Repository path without leading `/`
    pub path: String,
    raw: String,
}

impl Location {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The URL handed to git. A token is only injected into `https` URLs.
    pub fn clone_url(&self, credential: Option<&str>) -> String {
        match (self.form, credential) {
            (TransferForm::Https, Some(token)) if !token.is_empty() => {
                let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
                format!("https://x-access-token:{token}@{}{port}/{}", self.host, self.path)
            }
            _ => self.raw.clone(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn host_allowed(host: &str, allowed: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    allowed.iter().any(|a| {
        let a = a.to_ascii_lowercase();
        host == a || host.ends_with(&format!(".{a}"))
    })
}

fn check_path(path: &str) -> Result<(), ValidationError> {
    let segments = path.split('/').filter(|s| !s.is_empty()).count();
    if segments == 0 {
        return Err(ValidationError::UnsupportedForm("missing repository path".to_string()));
    }
    if segments > MAX_PATH_SEGMENTS {
        return Err(ValidationError::PathTooDeep { max: MAX_PATH_SEGMENTS });
    }
    if !path.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-')) {
        return Err(ValidationError::ForbiddenPattern("path characters outside [A-Za-z0-9._/-]"));
    }
    if path.split('/').any(|s| s == "..") {
        return Err(ValidationError::ForbiddenPattern("path traversal"));
    }
    Ok(())
}

/// Validate a source location against the allowed host list.
pub fn validate_location(raw: &str, allowed_hosts: &[String]) -> Result<Location, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyLocation);
    }
    if raw.chars().count() > MAX_LOCATION_CHARS {
        return Err(ValidationError::LocationTooLong { max: MAX_LOCATION_CHARS });
    }
    if SHELL_METACHARACTERS.iter().any(|m| raw.contains(m)) {
        return Err(ValidationError::ForbiddenPattern("shell metacharacter"));
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::ForbiddenPattern("whitespace"));
    }

    let lower = raw.to_ascii_lowercase();
    if DANGEROUS_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return Err(ValidationError::ForbiddenPattern("dangerous scheme"));
    }
    if TRAVERSAL.iter().any(|t| lower.contains(t)) {
        return Err(ValidationError::ForbiddenPattern("path traversal"));
    }
    if raw.matches('@').count() > 1 {
        return Err(ValidationError::ForbiddenPattern("more than one '@'"));
    }

    let location = if let Some(caps) = re_url().captures(raw) {
        let form = match &caps[1] {
            "https" => TransferForm::Https,
            "ssh" => TransferForm::Ssh,
            _ => TransferForm::Git,
        };
        let user = caps.get(2).map(|m| m.as_str().to_string());
        if user.as_deref().is_some_and(|u| u.contains(':')) {
            return Err(ValidationError::EmbeddedPassword);
        }
        if user.is_some() && form == TransferForm::Git {
            return Err(ValidationError::UnsupportedForm("git:// does not take a user".to_string()));
        }
        let port = match caps.get(4) {
            Some(p) => Some(p.as_str().parse::<u16>().map_err(|_| ValidationError::InvalidField {
                field: "port",
                reason: p.as_str().to_string(),
            })?),
            None => None,
        };
        Location {
            form,
            user,
            host: caps[3].to_string(),
            port,
            path: caps[5].trim_end_matches('/').to_string(),
            raw: raw.to_string(),
        }
    } else if let Some(caps) = re_scp().captures(raw) {
        Location {
            form: TransferForm::Scp,
            user: Some("git".to_string()),
            host: caps[1].to_string(),
            port: None,
            path: caps[2].trim_start_matches('/').trim_end_matches('/').to_string(),
            raw: raw.to_string(),
        }
    } else if raw.contains("://") && raw.matches(':').count() > 1 && raw.contains('@') {
        return Err(ValidationError::EmbeddedPassword);
    } else {
        let scheme = raw.split_once("://").map(|(s, _)| s).unwrap_or("none");
        return Err(ValidationError::UnsupportedForm(format!("scheme '{scheme}'")));
    };

    if !host_allowed(&location.host, allowed_hosts) {
        return Err(ValidationError::HostNotAllowed(location.host));
    }
    check_path(&location.path)?;
    Ok(location)
}

/// Strip a secret and any URL user-info from text bound for logs or errors.
pub fn redact(text: &str, secret: Option<&str>) -> String {
    let text = match secret {
        Some(s) if !s.is_empty() => text.replace(s, "***"),
        _ => text.to_string(),
    };
    re_userinfo().replace_all(&text, "$1://***@").into_owned()
}

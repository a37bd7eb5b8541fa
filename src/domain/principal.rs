//! Principals, groups and privilege policy to be provisioned.

use serde::{Deserialize, Serialize};

/// An OS account to create or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Login name
    pub login: String,

    /// GECOS display name
    #[serde(default)]
    pub display_name: String,

    /// Contact address
    #[serde(default)]
    pub email: String,

    /// Public keys to authorize for SSH login (replaces the existing list)
    #[serde(default)]
    pub ssh_keys: Vec<String>,

    /// Managed groups this account belongs to
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Principal {
    /// GECOS comment field: display name and contact, comma separated
    pub fn comment(&self) -> String {
        match (self.display_name.is_empty(), self.email.is_empty()) {
            (false, false) => format!("{},,,{}", self.display_name, self.email),
            (false, true) => self.display_name.clone(),
            (true, false) => format!(",,,{}", self.email),
            (true, true) => String::new(),
        }
    }

    /// Rendered authorized_keys content (one key per line)
    pub fn authorized_keys(&self) -> String {
        let mut content = String::new();
        for key in &self.ssh_keys {
            let key = key.split_whitespace().collect::<Vec<_>>().join(" ");
            if key.is_empty() {
                continue;
            }
            content.push_str(&key);
            content.push('\n');
        }
        content
    }
}

/// A principal inside the configuration server (not an OS account).
///
/// Each one owns a generated password and an identity key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPrincipal {
    pub login: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A group whose membership is set to exactly `members`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// A group-scoped privilege escalation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SudoRule {
    /// File name under the sudoers drop-in directory
    pub name: String,

    /// Group the rule applies to
    pub group: String,

    /// `Defaults` entries scoped to the group
    #[serde(default)]
    pub defaults: Vec<String>,

    /// Allow escalation without a password
    #[serde(default)]
    pub nopasswd: bool,
}

impl SudoRule {
    /// Render the rule as a sudoers drop-in file
    pub fn render(&self) -> String {
        let mut out = String::from("# Managed by hostboot. Local edits will not be preserved.\n");
        for default in &self.defaults {
            out.push_str(&format!("Defaults:%{} {}\n", self.group, default));
        }
        let tag = if self.nopasswd { "NOPASSWD: " } else { "" };
        out.push_str(&format!("%{} ALL=(ALL) {}ALL\n", self.group, tag));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sudo_rule_rendering() {
        let rule = SudoRule {
            name: "ops-sudo".to_string(),
            group: "wheel".to_string(),
            defaults: vec![
                "env_reset".to_string(),
                "secure_path=\"/usr/sbin:/usr/bin:/sbin:/bin\"".to_string(),
            ],
            nopasswd: true,
        };

        let rendered = rule.render();
        assert!(rendered.contains("Defaults:%wheel env_reset\n"));
        assert!(rendered.contains("Defaults:%wheel secure_path=\"/usr/sbin:/usr/bin:/sbin:/bin\"\n"));
        assert!(rendered.ends_with("%wheel ALL=(ALL) NOPASSWD: ALL\n"));
    }

    #[test]
    fn test_sudo_rule_with_password() {
        let rule = SudoRule {
            name: "ops-sudo".to_string(),
            group: "admins".to_string(),
            defaults: Vec::new(),
            nopasswd: false,
        };
        assert!(rule.render().ends_with("%admins ALL=(ALL) ALL\n"));
        assert!(!rule.render().contains("Defaults"));
    }

    #[test]
    fn test_authorized_keys_normalizes_whitespace() {
        let principal = Principal {
            login: "ed".to_string(),
            display_name: "Ed".to_string(),
            email: "ed@example.com".to_string(),
            ssh_keys: vec![
                "ssh-rsa AAAAB3Nza\n ed@example.com".to_string(),
                "   ".to_string(),
                "ssh-ed25519 AAAAC3Nz ed@laptop".to_string(),
            ],
            groups: Vec::new(),
        };
        assert_eq!(
            principal.authorized_keys(),
            "ssh-rsa AAAAB3Nza ed@example.com\nssh-ed25519 AAAAC3Nz ed@laptop\n"
        );
    }

    #[test]
    fn test_comment() {
        let mut principal = Principal {
            login: "wlee".to_string(),
            display_name: "W Lee".to_string(),
            email: "wlee@example.com".to_string(),
            ssh_keys: Vec::new(),
            groups: Vec::new(),
        };
        assert_eq!(principal.comment(), "W Lee,,,wlee@example.com");
        principal.email.clear();
        assert_eq!(principal.comment(), "W Lee");
    }
}

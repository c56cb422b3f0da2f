//! Forbidden-token screening for submitted transformation code.
//!
//! The scan is a case-insensitive substring search over the raw text and runs
//! before the text is parsed. It cannot see tokens that are assembled at
//! runtime (string concatenation followed by a dynamic call); the
//! transformation language has no dynamic invocation, which is what closes
//! that gap in practice.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForbiddenCategory {
    SystemAccess,
    DynamicExecution,
    DangerousImport,
    BrowserDom,
    RemoteCall,
    ScriptInjection,
    Custom,
}

impl ForbiddenCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForbiddenCategory::SystemAccess => "system-access",
            ForbiddenCategory::DynamicExecution => "dynamic-execution",
            ForbiddenCategory::DangerousImport => "dangerous-import",
            ForbiddenCategory::BrowserDom => "browser-dom",
            ForbiddenCategory::RemoteCall => "remote-call",
            ForbiddenCategory::ScriptInjection => "script-injection",
            ForbiddenCategory::Custom => "custom",
        }
    }
}

impl fmt::Display for ForbiddenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenToken {
    pub token: String,
    pub category: ForbiddenCategory,
}

impl ForbiddenToken {
    pub fn new(token: impl Into<String>, category: ForbiddenCategory) -> Self {
        Self {
            token: token.into(),
            category,
        }
    }

    /// Builds a token from configuration, borrowing the category of a known default.
    pub fn from_config(token: &str) -> Self {
        let trimmed = token.trim();
        let category = DEFAULT_TOKENS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(trimmed))
            .map(|(_, category)| *category)
            .unwrap_or(ForbiddenCategory::Custom);
        Self::new(trimmed, category)
    }

    pub fn reason(&self) -> &'static str {
        match self.token.to_ascii_lowercase().as_str() {
            "os." => "Operating system access can compromise file system security",
            "sys." => "System module access can allow unsafe system operations",
            "subprocess." | "import subprocess" => "Subprocess execution can run arbitrary commands",
            "open(" => "Direct file access bypasses the loader's validation",
            "exec(" | "compile(" => "Dynamic code execution can run arbitrary code",
            "eval(" => "Dynamic evaluation can execute arbitrary expressions",
            "import os" | "from os" => "Direct OS module import bypasses security controls",
            "import sys" | "from sys" => "Direct system module import bypasses security controls",
            "__import__" => "Dynamic imports bypass security controls",
            "document." => "DOM access is not relevant for table analysis",
            "window." => "Browser window access is not relevant for table analysis",
            "xmlhttprequest" | "fetch(" => "Network requests are not relevant for table analysis",
            "function(" => "Dynamic function creation can execute arbitrary code",
            "<script" => "Script tags are not relevant for table analysis",
            "javascript:" => "JavaScript execution is not relevant for table analysis",
            _ => "This operation is forbidden for security reasons",
        }
    }
}

const DEFAULT_TOKENS: &[(&str, ForbiddenCategory)] = &[
    ("import os", ForbiddenCategory::DangerousImport),
    ("import sys", ForbiddenCategory::DangerousImport),
    ("import subprocess", ForbiddenCategory::DangerousImport),
    ("from os", ForbiddenCategory::DangerousImport),
    ("from sys", ForbiddenCategory::DangerousImport),
    ("__import__", ForbiddenCategory::DangerousImport),
    ("os.", ForbiddenCategory::SystemAccess),
    ("sys.", ForbiddenCategory::SystemAccess),
    ("subprocess.", ForbiddenCategory::SystemAccess),
    ("open(", ForbiddenCategory::SystemAccess),
    ("exec(", ForbiddenCategory::DynamicExecution),
    ("eval(", ForbiddenCategory::DynamicExecution),
    ("compile(", ForbiddenCategory::DynamicExecution),
    ("function(", ForbiddenCategory::DynamicExecution),
    ("document.", ForbiddenCategory::BrowserDom),
    ("window.", ForbiddenCategory::BrowserDom),
    ("xmlhttprequest", ForbiddenCategory::RemoteCall),
    ("fetch(", ForbiddenCategory::RemoteCall),
    ("<script", ForbiddenCategory::ScriptInjection),
    ("javascript:", ForbiddenCategory::ScriptInjection),
];

/// Ordered default blacklist; imports come first so `import os.path` cites the import.
pub fn default_blacklist() -> Vec<ForbiddenToken> {
    DEFAULT_TOKENS
        .iter()
        .map(|(token, category)| ForbiddenToken::new(*token, *category))
        .collect()
}

/// Outcome of screening one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityVerdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ForbiddenCategory>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
}

impl SecurityVerdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            token: None,
            category: None,
            locations: Vec::new(),
        }
    }
}

pub struct SecurityFilter<'a> {
    blacklist: &'a [ForbiddenToken],
}

impl<'a> SecurityFilter<'a> {
    pub fn new(blacklist: &'a [ForbiddenToken]) -> Self {
        Self { blacklist }
    }

    /// Returns the verdict for `source`; the first matching token in list order wins.
    pub fn scan(&self, source: &str) -> SecurityVerdict {
        let lowered = source.to_lowercase();
        for forbidden in self.blacklist {
            let needle = forbidden.token.to_lowercase();
            if needle.is_empty() || !lowered.contains(&needle) {
                continue;
            }
            let locations = source
                .lines()
                .enumerate()
                .filter(|(_, line)| line.to_lowercase().contains(&needle))
                .map(|(idx, line)| format!("Line {}: {}", idx + 1, line.trim()))
                .collect::<Vec<_>>();
            return SecurityVerdict {
                allowed: false,
                token: Some(forbidden.token.clone()),
                category: Some(forbidden.category),
                locations,
            };
        }
        SecurityVerdict::allow()
    }

    /// Like [`scan`](Self::scan) but converts a denial into [`ScoutError::SecurityViolation`].
    pub fn check(&self, source: &str) -> Result<SecurityVerdict> {
        let verdict = self.scan(source);
        if verdict.allowed {
            return Ok(verdict);
        }
        let token = verdict.token.clone().unwrap_or_default();
        let category = verdict.category.unwrap_or(ForbiddenCategory::Custom);
        warn!("Security violation: '{token}' ({category}) found in submitted code");
        for location in &verdict.locations {
            warn!("  {location}");
        }
        let reason = self
            .blacklist
            .iter()
            .find(|t| t.token == token)
            .map(|t| t.reason())
            .unwrap_or("This operation is forbidden for security reasons")
            .to_string();
        Err(ScoutError::SecurityViolation {
            token,
            category,
            reason,
            locations: verdict.locations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn import_os_is_denied_as_dangerous_import() {
        let blacklist = default_blacklist();
        let verdict = SecurityFilter::new(&blacklist).scan("import os\nresult = 1");
        assert!(!verdict.allowed);
        assert_eq!(verdict.token.as_deref(), Some("import os"));
        assert_eq!(verdict.category, Some(ForbiddenCategory::DangerousImport));
        assert_eq!(verdict.locations, vec!["Line 1: import os".to_string()]);
    }

    #[test]
    fn scan_is_case_insensitive() {
        let blacklist = default_blacklist();
        let verdict = SecurityFilter::new(&blacklist).scan("x = OS.listdir('.')");
        assert_eq!(verdict.token.as_deref(), Some("os."));
    }

    #[test]
    fn clean_code_is_allowed() {
        let blacklist = default_blacklist();
        let verdict =
            SecurityFilter::new(&blacklist).scan("result = table.groupby('Region')['Sales'].sum()");
        assert!(verdict.allowed);
        assert!(verdict.token.is_none());
    }

    #[test]
    fn description_column_is_not_mistaken_for_script_tag() {
        let blacklist = default_blacklist();
        let verdict = SecurityFilter::new(&blacklist).scan("result = table['Description'].nunique()");
        assert!(verdict.allowed);
    }

    #[test]
    fn custom_tokens_pick_up_known_categories() {
        assert_eq!(
            ForbiddenToken::from_config(" FETCH( ").category,
            ForbiddenCategory::RemoteCall
        );
        assert_eq!(
            ForbiddenToken::from_config("rm -rf").category,
            ForbiddenCategory::Custom
        );
    }

    #[test]
    fn check_produces_security_violation() {
        let blacklist = default_blacklist();
        let err = SecurityFilter::new(&blacklist)
            .check("result = 1\nx = exec('boom')")
            .unwrap_err();
        match err {
            ScoutError::SecurityViolation {
                token,
                category,
                locations,
                ..
            } => {
                assert_eq!(token, "exec(");
                assert_eq!(category, ForbiddenCategory::DynamicExecution);
                assert_eq!(locations, vec!["Line 2: x = exec('boom')".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn any_embedded_token_is_denied(
            prefix in "[a-zA-Z0-9 _=()'\\[\\]\n]{0,40}",
            suffix in "[a-zA-Z0-9 _=()'\\[\\]\n]{0,40}",
            idx in 0usize..DEFAULT_TOKENS.len(),
            upper in any::<bool>(),
        ) {
            let blacklist = default_blacklist();
            let token = DEFAULT_TOKENS[idx].0;
            let embedded = if upper { token.to_uppercase() } else { token.to_string() };
            let source = format!("{prefix}{embedded}{suffix}");
            let verdict = SecurityFilter::new(&blacklist).scan(&source);
            prop_assert!(!verdict.allowed);
            let cited = verdict.token.unwrap().to_lowercase();
            prop_assert!(source.to_lowercase().contains(&cited));
        }
    }
}

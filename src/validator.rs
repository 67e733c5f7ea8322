//! Per-address validation: syntax, block lists, MX reachability.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::blocklists::BlockLists;
use crate::emails::{check_syntax, split_email};
use crate::mx::MxResolver;

/// Outcome of validating one address. Checks short-circuit: when syntax
/// fails, `blocked` and `mx_ok` stay false; when blocked, no MX lookup runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub syntax_ok: bool,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub mx_ok: bool,
    pub mx_host: Option<String>,
    /// Lowercased email domain, when the address parsed
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_issue: Option<String>,
}

impl ValidationResult {
    fn syntax_failure(issue: String) -> Self {
        Self {
            syntax_issue: Some(issue),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct EmailValidator {
    blocklists: Arc<BlockLists>,
    mx: Arc<MxResolver>,
}

impl EmailValidator {
    pub fn new(blocklists: Arc<BlockLists>, mx: Arc<MxResolver>) -> Self {
        Self { blocklists, mx }
    }

    /// Syntax and block-list checks only; no network.
    pub fn check_offline(&self, email: &str) -> ValidationResult {
        if let Err(issue) = check_syntax(email) {
            return ValidationResult::syntax_failure(issue.to_string());
        }
        let Some((local, domain)) = split_email(email) else {
            return ValidationResult::syntax_failure("missing '@'".to_string());
        };
        let domain = domain.to_ascii_lowercase();

        let hit = self
            .blocklists
            .match_domain(&domain)
            .or_else(|| self.blocklists.match_local_part(local));

        ValidationResult {
            syntax_ok: true,
            blocked: hit.is_some(),
            block_reason: hit.map(|h| h.to_string()),
            domain: Some(domain),
            ..ValidationResult::default()
        }
    }

    /// Full validation. `job_domain` is carried for diagnostics; matching
    /// against it is the scorer's job.
    pub async fn validate(&self, email: &str, job_domain: &str) -> ValidationResult {
        let mut result = self.check_offline(email);
        if !result.syntax_ok || result.blocked {
            debug!(
                email,
                job_domain,
                syntax_ok = result.syntax_ok,
                reason = result.block_reason.as_deref().or(result.syntax_issue.as_deref()),
                "validation short-circuited"
            );
            return result;
        }

        if let Some(domain) = result.domain.as_deref() {
            let status = self.mx.check(domain).await;
            result.mx_ok = status.mx_ok;
            result.mx_host = status.mx_host;
        }
        debug!(email, job_domain, mx_ok = result.mx_ok, "validated");
        result
    }
}

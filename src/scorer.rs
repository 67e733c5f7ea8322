//! Declarative candidate scoring.
//!
//! Each [`ScoreRule`] looks at one signal and either stays silent or returns
//! `(points, reason)`. The scorer sums the fired rules, clamps to 0..=100 and
//! maps the total to a [`Tier`]. Invalid syntax and block-list hits are
//! vetoes: score 0, tier `REJECTED`, no other rule runs.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::blocklists::BlockLists;
use crate::crawler::{PageContext, RawEmailSighting};
use crate::domain_utils::{DomainInfo, company_words, core_company_name, normalize_company_name};
use crate::emails::split_email;
use crate::validator::ValidationResult;

/// Confidence bucket derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Rejected,
    LowQuality,
    Acceptable,
    HighlyRecommended,
}

impl Tier {
    pub fn from_score(score: u8) -> Tier {
        match score {
            70.. => Tier::HighlyRecommended,
            50..=69 => Tier::Acceptable,
            30..=49 => Tier::LowQuality,
            _ => Tier::Rejected,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::HighlyRecommended => "HIGHLY_RECOMMENDED",
            Tier::Acceptable => "ACCEPTABLE",
            Tier::LowQuality => "LOW_QUALITY",
            Tier::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// Final, ranked output unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    pub email: String,
    pub score: u8,
    pub tier: Tier,
    pub reasons: Vec<String>,
    pub page_context: PageContext,
    pub page_url: String,
}

impl ScoredCandidate {
    /// Meets the caller's minimum acceptable score.
    pub fn is_actionable(&self, min_score: u8) -> bool {
        self.tier != Tier::Rejected && self.score >= min_score
    }
}

/// How closely an email domain matches the hiring company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainMatch {
    Exact,
    SameOrganization,
    NameContained,
    SharedWord,
    None,
    FreeMail,
}

impl DomainMatch {
    pub fn points(self) -> i32 {
        match self {
            DomainMatch::Exact => 40,
            DomainMatch::SameOrganization => 30,
            DomainMatch::NameContained => 25,
            DomainMatch::SharedWord => 15,
            DomainMatch::None | DomainMatch::FreeMail => 0,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            DomainMatch::Exact => "domain matches company exactly",
            DomainMatch::SameOrganization => "domain shares the company's registrable domain",
            DomainMatch::NameContained => "domain contains the company name",
            DomainMatch::SharedWord => "domain shares a word with the company name",
            DomainMatch::None => "domain unrelated to company",
            DomainMatch::FreeMail => "free-mail domain never matches a company",
        }
    }
}

/// Classify `email_domain` against the job domain and company name.
pub fn domain_match(
    blocklists: &BlockLists,
    email_domain: &str,
    job_domain: &str,
    company_name: &str,
) -> DomainMatch {
    let email_domain = strip_www(&email_domain.trim().to_ascii_lowercase());
    let job_domain = strip_www(&job_domain.trim().trim_end_matches('.').to_ascii_lowercase());

    if blocklists.is_free_mail(&email_domain) {
        return DomainMatch::FreeMail;
    }
    let Ok(email_info) = DomainInfo::parse(&email_domain) else {
        return DomainMatch::None;
    };
    let label = email_info.organization_label().to_string();
    let label_norm = normalize_company_name(&label);
    let core = core_company_name(company_name);
    let full = normalize_company_name(company_name);

    if (!job_domain.is_empty() && email_domain == job_domain)
        || (!label_norm.is_empty() && (label_norm == core || label_norm == full))
    {
        return DomainMatch::Exact;
    }

    if !job_domain.is_empty()
        && DomainInfo::parse(&job_domain)
            .is_ok_and(|job| job.organization_domain() == email_info.organization_domain())
    {
        return DomainMatch::SameOrganization;
    }

    let long_enough = |s: &str| s.len() >= 3;
    if long_enough(&label_norm)
        && long_enough(&core)
        && (label_norm.contains(&core) || core.contains(&label_norm))
    {
        return DomainMatch::NameContained;
    }

    let words = company_words(company_name);
    if label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|part| words.iter().any(|w| w == part))
    {
        return DomainMatch::SharedWord;
    }

    DomainMatch::None
}

fn strip_www(domain: &str) -> String {
    domain.strip_prefix("www.").unwrap_or(domain).to_string()
}

/// Everything a rule may look at.
pub struct RuleInput<'a> {
    pub result: &'a ValidationResult,
    pub sighting: &'a RawEmailSighting,
    pub job_domain: &'a str,
    pub company_name: &'a str,
    pub blocklists: &'a BlockLists,
    local_part: &'a str,
    email_domain: &'a str,
}

/// A named, independently testable scoring signal.
pub struct ScoreRule {
    pub name: &'static str,
    pub evaluate: fn(&RuleInput<'_>) -> Option<(i32, String)>,
}

pub static RULES: &[ScoreRule] = &[
    ScoreRule {
        name: "syntax",
        evaluate: rule_syntax,
    },
    ScoreRule {
        name: "not_blocked",
        evaluate: rule_not_blocked,
    },
    ScoreRule {
        name: "mx",
        evaluate: rule_mx,
    },
    ScoreRule {
        name: "domain_match",
        evaluate: rule_domain_match,
    },
    ScoreRule {
        name: "free_mail",
        evaluate: rule_free_mail,
    },
    ScoreRule {
        name: "prefix",
        evaluate: rule_prefix,
    },
    ScoreRule {
        name: "page_context",
        evaluate: rule_page_context,
    },
];

fn rule_syntax(i: &RuleInput<'_>) -> Option<(i32, String)> {
    i.result.syntax_ok.then(|| (20, "valid syntax".to_string()))
}

fn rule_not_blocked(i: &RuleInput<'_>) -> Option<(i32, String)> {
    (!i.result.blocked).then(|| (20, "not block-listed".to_string()))
}

/// Always fires so the audit trail shows a missing MX explicitly.
fn rule_mx(i: &RuleInput<'_>) -> Option<(i32, String)> {
    Some(match i.result.mx_host.as_deref() {
        Some(host) if i.result.mx_ok => (20, format!("mail exchanger reachable ({host})")),
        _ if i.result.mx_ok => (20, "mail exchanger reachable".to_string()),
        _ => (0, "no reachable mail exchanger".to_string()),
    })
}

fn rule_domain_match(i: &RuleInput<'_>) -> Option<(i32, String)> {
    let level = domain_match(i.blocklists, i.email_domain, i.job_domain, i.company_name);
    Some((level.points(), level.describe().to_string()))
}

fn rule_free_mail(i: &RuleInput<'_>) -> Option<(i32, String)> {
    i.blocklists
        .is_free_mail(i.email_domain)
        .then(|| (-30, "generic free-mail provider".to_string()))
}

fn rule_prefix(i: &RuleInput<'_>) -> Option<(i32, String)> {
    i.blocklists
        .priority_prefix(i.local_part)
        .map(|p| (15, format!("priority prefix '{p}'")))
}

fn rule_page_context(i: &RuleInput<'_>) -> Option<(i32, String)> {
    match i.sighting.page_context {
        PageContext::Careers => Some((15, "found on careers page".to_string())),
        PageContext::Contact => Some((15, "found on contact page".to_string())),
        PageContext::About => Some((5, "found on about page".to_string())),
        PageContext::Generic => None,
    }
}

#[derive(Clone)]
pub struct Scorer {
    blocklists: Arc<BlockLists>,
}

impl Scorer {
    pub fn new(blocklists: Arc<BlockLists>) -> Self {
        Self { blocklists }
    }

    pub fn score(
        &self,
        result: &ValidationResult,
        sighting: &RawEmailSighting,
        job_domain: &str,
        company_name: &str,
    ) -> ScoredCandidate {
        let veto = if !result.syntax_ok {
            Some(format!(
                "invalid syntax: {}",
                result.syntax_issue.as_deref().unwrap_or("malformed address")
            ))
        } else if result.blocked {
            Some(format!(
                "blocked: {}",
                result.block_reason.as_deref().unwrap_or("block list")
            ))
        } else {
            None
        };
        if let Some(reason) = veto {
            return self.finish(sighting, 0, vec![reason]);
        }

        let (local_part, email_domain) = split_email(&sighting.email).unwrap_or_default();
        let email_domain = email_domain.to_ascii_lowercase();
        let input = RuleInput {
            result,
            sighting,
            job_domain,
            company_name,
            blocklists: &self.blocklists,
            local_part,
            email_domain: &email_domain,
        };

        let mut total = 0i32;
        let mut reasons = Vec::new();
        for rule in RULES {
            if let Some((points, reason)) = (rule.evaluate)(&input) {
                total += points;
                reasons.push(format!("{points:+} {reason}"));
            }
        }
        self.finish(sighting, total.clamp(0, 100) as u8, reasons)
    }

    fn finish(
        &self,
        sighting: &RawEmailSighting,
        score: u8,
        mut reasons: Vec<String>,
    ) -> ScoredCandidate {
        let tier = Tier::from_score(score);
        reasons.push(format!("tier {tier} (score {score})"));
        ScoredCandidate {
            email: sighting.email.clone(),
            score,
            tier,
            reasons,
            page_context: sighting.page_context,
            page_url: sighting.page_url.clone(),
        }
    }
}

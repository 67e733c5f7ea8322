//! Domain utilities with Public Suffix List integration.
//!
//! This module provides accurate domain extraction using the Public Suffix
//! List (PSL) so that complex hosts are reduced correctly:
//! - careers.example.co.uk -> example.co.uk
//! - www.example.com -> example.com
//! - acme.github.io -> acme.github.io (github.io is a public suffix)
//!
//! It also hosts the company-name normalization shared by the domain
//! resolver (pattern guesses) and the scorer (domain matching).

use anyhow::{Result, anyhow};
use psl::{domain_str, suffix_str};
use url::Url;

/// Domain information extracted using PSL or fallback parsing
#[derive(Debug, Clone, PartialEq)]
pub struct DomainInfo {
    /// The full domain as provided (lowercased, trailing dot removed)
    pub full_domain: String,
    /// The registrable domain (what you can actually register)
    pub registrable_domain: Option<String>,
    /// The public suffix (TLD or effective TLD)
    pub suffix: Option<String>,
}

impl DomainInfo {
    /// Parse a domain string into structured domain information
    pub fn parse(domain: &str) -> Result<Self> {
        let clean_domain = clean_domain_input(domain)?;
        Ok(Self::parse_with_psl(&clean_domain))
    }

    fn parse_with_psl(domain: &str) -> Self {
        let registrable_domain = domain_str(domain)
            .map(|s| s.to_string())
            .or_else(|| Some(fallback_registrable_domain(domain)));

        let mut suffix = suffix_str(domain).map(|s| s.to_string());
        if suffix.is_none() {
            suffix = domain.split('.').skip(1).last().map(|s| s.to_string());
        }
        if suffix.as_ref().map(|s| s.is_empty()).unwrap_or(false) {
            suffix = None;
        }

        DomainInfo {
            full_domain: domain.to_string(),
            registrable_domain,
            suffix,
        }
    }

    /// Registrable domain, falling back to the full domain.
    pub fn organization_domain(&self) -> &str {
        self.registrable_domain
            .as_deref()
            .unwrap_or(&self.full_domain)
    }

    /// The registrable label without its public suffix
    /// (`acme` for `careers.acme.co.uk`).
    pub fn organization_label(&self) -> &str {
        let reg = self.organization_domain();
        match self.suffix.as_deref() {
            Some(suffix) if reg.len() > suffix.len() + 1 && reg.ends_with(suffix) => {
                &reg[..reg.len() - suffix.len() - 1]
            }
            _ => reg.split('.').next().unwrap_or(reg),
        }
    }
}

/// Extract registrable domain from a hostname or domain string
pub fn extract_registrable_domain(domain: &str) -> Option<String> {
    DomainInfo::parse(domain).ok()?.registrable_domain
}

/// Extract the host from a URL (scheme optional), lowercased and without port.
pub fn extract_domain_from_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("No domain found in input: {}", input));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&with_scheme).map_err(|e| anyhow!("Invalid URL {input}: {e}"))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow!("No domain found in input: {}", input))?;
    Ok(host.trim_end_matches('.').to_ascii_lowercase())
}

/// Two hosts belong to the same registrable domain.
pub fn same_registrable_domain(a: &str, b: &str) -> bool {
    match (extract_registrable_domain(a), extract_registrable_domain(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Two hosts plausibly belong to the same organization: identical, under one
/// registrable domain, or sharing the registrable label across suffixes
/// (`acme.com` and `www.acme.io`).
pub fn same_organization(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) || same_registrable_domain(a, b) {
        return true;
    }
    match (DomainInfo::parse(a), DomainInfo::parse(b)) {
        (Ok(x), Ok(y)) => x.organization_label() == y.organization_label(),
        _ => false,
    }
}

/// Lowercase a company name and strip everything but ASCII letters/digits
/// (`"Acme, Inc."` -> `"acmeinc"`).
pub fn normalize_company_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Significant lowercase words of a company name, without legal suffixes.
pub fn company_words(name: &str) -> Vec<String> {
    const LEGAL_SUFFIXES: &[&str] = &[
        "inc", "llc", "ltd", "limited", "corp", "corporation", "co", "company", "gmbh", "plc",
        "pvt", "private", "the", "and", "group", "sa", "ag", "bv",
    ];
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .filter(|w| w.len() >= 3 && !LEGAL_SUFFIXES.contains(&w.as_str()))
        .collect()
}

/// Company name with legal suffixes removed, then normalized
/// (`"Acme Labs, Inc."` -> `"acmelabs"`).
pub fn core_company_name(name: &str) -> String {
    let words = company_words(name);
    if words.is_empty() {
        normalize_company_name(name)
    } else {
        words.concat()
    }
}

/// Clean domain input by removing common artifacts
fn clean_domain_input(domain: &str) -> Result<String> {
    let clean = domain
        .trim()
        .trim_end_matches('.') // Remove trailing dot
        .to_lowercase();

    if clean.is_empty() {
        return Err(anyhow!("Empty domain"));
    }

    if !clean.contains('.') && clean.len() < 2 {
        return Err(anyhow!("Invalid domain format: {}", clean));
    }

    Ok(clean)
}

fn fallback_registrable_domain(domain: &str) -> String {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return domain.to_string();
    }
    format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1])
}

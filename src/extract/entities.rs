//! Identifier extraction: e-mail, PGP, crypto wallets, phones, IBANs, cards.
//!
//! The upstream patterns are deliberately loose. Precision comes from the
//! per-category filters applied after de-duplication.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::ExtractedEntities;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static PGP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)-----BEGIN PGP PUBLIC KEY BLOCK-----.*?-----END PGP PUBLIC KEY BLOCK-----",
    )
    .unwrap()
});

static BTC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[13][a-km-zA-HJ-NP-Z1-9]{25,34}\b").unwrap());

static ETH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b0x[a-fA-F0-9]{40}\b").unwrap());

static XMR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b4[0-9A-Za-z]{90,110}\b").unwrap());

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?\d{1,4}?[-.\s]?\(?\d{1,3}?\)?[-.\s]?\d{1,4}[-.\s]?\d{1,4}[-.\s]?\d{1,9}")
        .unwrap()
});

static IBAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z]{2}\d{2}[A-Z0-9]{4}\d{7}[A-Z0-9]{0,16}\b").unwrap()
});

// Visa, Mastercard, American Express, Discover.
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13}|6(?:011|5[0-9]{2})[0-9]{12})\b",
    )
    .unwrap()
});

/// Domains that show up in templates and documentation, never real contacts.
const PLACEHOLDER_EMAIL_DOMAINS: &[&str] = &["example.com", "test.com", "localhost", "domain.com"];

/// Phones shorter than this (after trimming) are mostly dates and counters.
const MIN_PHONE_LEN: usize = 9;

/// Extract every identifier category from `text`.
pub fn extract_entities(text: &str) -> ExtractedEntities {
    if text.is_empty() {
        return ExtractedEntities::default();
    }

    let emails = unique(EMAIL_RE.find_iter(text).map(|m| m.as_str()))
        .into_iter()
        .filter(|e| is_plausible_email(e))
        .collect();

    let btc_addresses = unique(BTC_RE.find_iter(text).map(|m| m.as_str()))
        .into_iter()
        .filter(|a| (26..=35).contains(&a.len()))
        .collect();

    let eth_addresses = unique(ETH_RE.find_iter(text).map(|m| m.as_str()))
        .into_iter()
        .filter(|a| a.len() == 42 && a.starts_with("0x"))
        .collect();

    let phones = unique(PHONE_RE.find_iter(text).map(|m| m.as_str().trim()))
        .into_iter()
        .filter(|p| p.chars().count() >= MIN_PHONE_LEN)
        .collect();

    ExtractedEntities {
        emails,
        pgp_keys: unique(PGP_RE.find_iter(text).map(|m| m.as_str())),
        btc_addresses,
        eth_addresses,
        xmr_addresses: unique(XMR_RE.find_iter(text).map(|m| m.as_str())),
        phones,
        ibans: unique(IBAN_RE.find_iter(text).map(|m| m.as_str())),
        credit_cards: unique(CARD_RE.find_iter(text).map(|m| m.as_str())),
    }
}

fn is_plausible_email(email: &str) -> bool {
    let lower = email.to_lowercase();
    if PLACEHOLDER_EMAIL_DOMAINS.iter().any(|d| lower.contains(d)) {
        return false;
    }
    email
        .split_once('@')
        .map(|(_, domain)| domain.contains('.'))
        .unwrap_or(false)
}

/// De-duplicate while keeping first-seen order.
fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .map(str::to_string)
        .collect()
}

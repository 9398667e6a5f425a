use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::routing::RoutingNumber;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// E-13B transit symbols come back from the OCR model as `A`, on-us symbols as `C`.
re!(re_routing, r"A([0-9]{9})");
re!(re_routing_account, r"A([0-9]{9})A([0-9]+)");
re!(re_check_number, r"C([0-9]+)C");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Could not find a routing number in the encoding line")]
    RoutingNumberNotFound,
    #[error("Routing number {0} fails the ABA checksum")]
    RoutingNumberChecksumInvalid(String),
    #[error("Could not find an account number in the encoding line")]
    AccountNumberNotFound,
}

/// The validated fields of a check's encoding line.
///
/// Only [`parse`] builds one, so the field invariants always hold; the record
/// is written out, never read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingLineRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_number: Option<String>,
    pub routing_number: RoutingNumber,
    pub account_number: String,
    /// The encoding line carries no amount field; this is always `None` here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

/// Parse and validate the text of a candidate encoding line.
///
/// Fails on the first missing or invalid mandatory field; the check number is
/// optional.
pub fn parse(candidate_text: &str) -> Result<EncodingLineRecord, ParseError> {
    let routing_number = extract_routing_number(candidate_text)?;
    let account_number = extract_account_number(candidate_text)?;
    let check_number = extract_check_number(candidate_text);

    Ok(EncodingLineRecord {
        check_number,
        routing_number,
        account_number,
        amount: None,
    })
}

fn extract_routing_number(text: &str) -> Result<RoutingNumber, ParseError> {
    let digits = re_routing()
        .captures(text)
        .and_then(|c| c.get(1))
        .ok_or(ParseError::RoutingNumberNotFound)?;
    digits.as_str().parse()
}

fn extract_account_number(text: &str) -> Result<String, ParseError> {
    re_routing_account()
        .captures(text)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::AccountNumberNotFound)
}

fn extract_check_number(text: &str) -> Option<String> {
    let c = re_check_number().captures(text)?;
    Some(c.get(1)?.as_str().to_string())
}

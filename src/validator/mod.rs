//! Syntax checks for the two halves of a probed address: generated
//! local-parts and the target domain.

mod domain;
mod local;

use thiserror::Error;

use domain::label_problems;
use local::is_dot_atom;

/// Maximum length of a local-part (RFC 5321 §4.5.3.1.1).
pub const MAX_LOCAL_PART_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain is empty")]
    Empty,
    #[error("domain IDNA conversion failed")]
    IdnaConversion {
        #[source]
        source: idna::Errors,
    },
    #[error("invalid domain: {}", .reasons.join("; "))]
    Invalid { reasons: Vec<String> },
}

/// Returns `true` when `local` can be used unquoted in `RCPT TO:<local@domain>`.
pub fn is_valid_local_part(local: &str) -> bool {
    local.len() <= MAX_LOCAL_PART_LEN && is_dot_atom(local)
}

/// Normalises a user-supplied domain to its lower-case ASCII form.
///
/// Surrounding whitespace and a trailing root dot are stripped before the
/// IDNA conversion; the resulting labels must be valid host labels.
pub fn normalize_domain(domain: &str) -> Result<String, DomainError> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(DomainError::Empty);
    }
    let ascii = idna::domain_to_ascii(trimmed)
        .map_err(|source| DomainError::IdnaConversion { source })?;

    let reasons = label_problems(&ascii);
    if reasons.is_empty() {
        Ok(ascii)
    } else {
        Err(DomainError::Invalid { reasons })
    }
}

use tracing::{debug, warn};

use crate::validator::is_valid_local_part;

use super::session::Session;
use super::types::{AddressOrigin, AttemptStage, CandidateAddress};

/// Digits appended to a confirmed local-part to look for numbered aliases.
pub const ENRICHMENT_SUFFIXES: [char; 2] = ['1', '2'];

/// Digit-suffixed variants of the confirmed primaries, in confirmation
/// order. Variants are never derived from other variants.
pub fn enrichment_variants(confirmed: &[CandidateAddress]) -> Vec<CandidateAddress> {
    confirmed
        .iter()
        .filter(|candidate| candidate.origin() == AddressOrigin::Primary)
        .flat_map(|candidate| {
            ENRICHMENT_SUFFIXES.iter().filter_map(move |suffix| {
                let local = format!("{}{suffix}", candidate.local());
                is_valid_local_part(&local)
                    .then(|| CandidateAddress::enriched(local, candidate.domain()))
            })
        })
        .collect()
}

impl Session {
    /// Asks the live transaction about the variants of every address
    /// confirmed so far. Only variants the host accepts on their own are
    /// added. Skipped when the connection is already gone.
    pub(super) fn enrich(&mut self) {
        if self.stream.is_closed() {
            debug!(host = %self.host, "session closed, enrichment skipped");
            return;
        }
        let variants = enrichment_variants(&self.attempt.confirmed);
        let fresh = self.unrequested(variants);
        if fresh.is_empty() {
            return;
        }
        debug!(host = %self.host, variants = fresh.len(), "probing enrichment variants");
        if let Err(err) = self.request_recipients(&fresh, AttemptStage::Enrichment) {
            warn!(host = %self.host, error = %err, "enrichment interrupted");
            self.record_error(AttemptStage::Enrichment, err.to_string());
            self.stream.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_primary_gets_two_suffixes() {
        let confirmed = [
            CandidateAddress::primary("jdoe", "example.com"),
            CandidateAddress::primary("john.doe", "example.com"),
        ];
        let variants: Vec<String> = enrichment_variants(&confirmed)
            .iter()
            .map(CandidateAddress::address)
            .collect();
        assert_eq!(
            variants,
            [
                "jdoe1@example.com",
                "jdoe2@example.com",
                "john.doe1@example.com",
                "john.doe2@example.com",
            ]
        );
    }

    #[test]
    fn variants_are_tagged_and_not_recursive() {
        let confirmed = [
            CandidateAddress::primary("jdoe", "example.com"),
            CandidateAddress::enriched("jdoe1", "example.com"),
        ];
        let variants = enrichment_variants(&confirmed);
        assert_eq!(variants.len(), 2);
        assert!(variants.iter().all(|v| v.origin() == AddressOrigin::Enriched));
    }

    #[test]
    fn overlong_variants_are_dropped() {
        let local = "a".repeat(64);
        let confirmed = [CandidateAddress::primary(local, "example.com")];
        assert!(enrichment_variants(&confirmed).is_empty());
    }
}

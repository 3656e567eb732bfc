//! People whose addresses are being looked for, the local-parts guessed for
//! them, and the `first,last` record stream they are read from.

mod candidates;
mod input;

use std::fmt;

pub use candidates::generate_candidates;
pub use input::{IdentityError, IdentityReader, read_identities};

/// A person's name together with the ordered local-parts to probe for it.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub first: String,
    pub last: String,
    pub local_parts: Vec<String>,
}

impl Identity {
    /// Builds an identity whose local-parts come from [`generate_candidates`].
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        let first = first.into();
        let last = last.into();
        let local_parts = generate_candidates(&first, &last);
        Self {
            first,
            last,
            local_parts,
        }
    }

    /// Builds an identity with an externally produced candidate sequence.
    pub fn with_local_parts<I, S>(first: impl Into<String>, last: impl Into<String>, locals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            first: first.into(),
            last: last.into(),
            local_parts: locals.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first, self.last)
    }
}

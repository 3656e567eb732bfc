//! DNS collaborators of the prober: mail-exchange hostnames for a domain and
//! the addresses behind each of them.
//!
//! The [`MailResolver`] trait is the seam between the probing engine and
//! DNS; [`SystemResolver`] implements it with the system resolver
//! configuration.

mod domain;
mod error;
mod resolver;

pub use domain::{MailDomain, resolve_domain};
pub use error::DnsError;
pub use resolver::{MailResolver, SystemResolver};

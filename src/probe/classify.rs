use super::types::{SmtpReply, Verdict};

/// `RCPT TO` codes taken as acceptance: 250/251, plus soft failures that
/// mail systems commonly return for mailboxes that do exist (450 mailbox
/// busy, 452 too many recipients / storage, 441 no response yet).
pub const ACCEPTED_RCPT_CODES: [u16; 5] = [250, 251, 450, 452, 441];

/// Maps the reply to a recipient-acceptance request onto a [`Verdict`].
///
/// Only the status code is inspected; the reply text is carried into
/// `Temporary` and `ProtocolFatal` for diagnostics.
pub fn classify(reply: &SmtpReply) -> Verdict {
    let code = reply.code;
    if ACCEPTED_RCPT_CODES.contains(&code) {
        Verdict::Confirmed
    } else if reply.is_refusal() {
        Verdict::ProtocolFatal {
            code,
            text: reply.message.clone(),
        }
    } else if reply.is_deferral() {
        Verdict::Temporary {
            code,
            text: reply.message.clone(),
        }
    } else {
        Verdict::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn verdict(code: u16) -> Verdict {
        classify(&SmtpReply::new(code, "text"))
    }

    #[test]
    fn permissive_codes_confirm() {
        for code in ACCEPTED_RCPT_CODES {
            assert_eq!(verdict(code), Verdict::Confirmed, "code {code}");
        }
    }

    #[test]
    fn mailbox_unknown_is_fatal() {
        assert_eq!(
            verdict(550),
            Verdict::ProtocolFatal {
                code: 550,
                text: "text".to_string()
            }
        );
    }

    #[test]
    fn greylisting_is_temporary() {
        assert!(matches!(verdict(451), Verdict::Temporary { code: 451, .. }));
    }

    #[test]
    fn other_positive_codes_are_not_confirmation() {
        assert_eq!(verdict(252), Verdict::Rejected);
        assert_eq!(verdict(354), Verdict::Rejected);
    }

    proptest! {
        #[test]
        fn fatal_range(code in 500u16..1000) {
            let fatal = matches!(verdict(code), Verdict::ProtocolFatal { .. });
            prop_assert!(fatal, "code {} not fatal", code);
        }

        #[test]
        fn temporary_range(code in 400u16..500) {
            prop_assume!(!ACCEPTED_RCPT_CODES.contains(&code));
            let temporary = matches!(verdict(code), Verdict::Temporary { .. });
            prop_assert!(temporary, "code {} not temporary", code);
        }
    }
}

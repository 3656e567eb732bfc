use crate::validator::is_valid_local_part;

/// Guesses the local-parts a mail system may have assigned to a person.
///
/// Names are trimmed and lower-cased. The order is fixed: `first`, `flast`,
/// `filast`, `firstlas`, `firstlast`, `lastfirst`, `last.first`,
/// `first.last`. Patterns that need more letters than the name has are
/// left out, as are results that are not valid dot-atoms. Duplicates are
/// kept in place.
pub fn generate_candidates(first: &str, last: &str) -> Vec<String> {
    let first = first.trim().to_lowercase();
    let last = last.trim().to_lowercase();
    if first.is_empty() || last.is_empty() {
        return Vec::new();
    }

    let first_len = first.chars().count();
    let last_len = last.chars().count();

    let mut out = Vec::with_capacity(8);
    out.push(first.clone());
    out.push(format!("{}{last}", prefix(&first, 1)));
    if first_len >= 2 {
        out.push(format!("{}{last}", prefix(&first, 2)));
    }
    if last_len >= 3 {
        out.push(format!("{first}{}", prefix(&last, 3)));
    } else if last_len == 2 {
        out.push(format!("{first}{last}"));
    }
    out.push(format!("{first}{last}"));
    out.push(format!("{last}{first}"));
    out.push(format!("{last}.{first}"));
    out.push(format!("{first}.{last}"));

    out.retain(|local| is_valid_local_part(local));
    out
}

fn prefix(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn full_pattern_sequence() {
        assert_eq!(
            generate_candidates("John", "Doe"),
            vec![
                "john", "jdoe", "jodoe", "johndoe", "johndoe", "doejohn", "doe.john", "john.doe"
            ]
        );
    }

    #[test]
    fn short_first_name_skips_two_letter_prefix() {
        assert_eq!(
            generate_candidates("J", "Doe"),
            vec!["j", "jdoe", "jdoe", "jdoe", "doej", "doe.j", "j.doe"]
        );
    }

    #[test]
    fn one_letter_last_name_skips_truncated_last() {
        assert_eq!(
            generate_candidates("John", "D"),
            vec!["john", "jd", "jod", "johnd", "djohn", "d.john", "john.d"]
        );
    }

    #[test]
    fn two_letter_last_name_uses_whole_last() {
        let out = generate_candidates("Ann", "Li");
        assert_eq!(out[3], "annli");
    }

    #[test]
    fn trims_record_whitespace() {
        assert_eq!(generate_candidates(" John ", "Doe\n")[1], "jdoe");
    }

    #[test]
    fn drops_non_ascii_patterns() {
        let out = generate_candidates("José", "Ng");
        assert!(out.iter().all(|local| local.is_ascii()));
        assert!(out.contains(&"jng".to_string()));
    }

    #[test]
    fn empty_names_yield_nothing() {
        assert!(generate_candidates("", "Doe").is_empty());
        assert!(generate_candidates("John", "  ").is_empty());
    }

    proptest! {
        #[test]
        fn every_candidate_is_a_valid_local_part(first in "[A-Za-z]{1,12}", last in "[A-Za-z]{1,12}") {
            let out = generate_candidates(&first, &last);
            prop_assert!(!out.is_empty());
            prop_assert_eq!(&out[0], &first.to_lowercase());
            for local in &out {
                prop_assert!(is_valid_local_part(local), "{local}");
            }
        }
    }
}

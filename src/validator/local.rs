/// Characters allowed in an atom besides ASCII letters and digits
/// (RFC 5322 `atext`).
const ATEXT_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || ATEXT_SPECIALS.contains(c)
}

/// A non-empty sequence of atoms joined by single dots.
pub(crate) fn is_dot_atom(s: &str) -> bool {
    !s.is_empty()
        && s
            .split('.')
            .all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_shapes_are_atoms() {
        for local in ["jdoe", "john.doe", "doe.j", "jdoe1", "o'brien", "x-y_z"] {
            assert!(is_dot_atom(local), "{local}");
        }
    }

    #[test]
    fn misplaced_dots_are_rejected() {
        for local in [".jdoe", "jdoe.", "j..doe", "."] {
            assert!(!is_dot_atom(local), "{local}");
        }
    }

    #[test]
    fn quoting_material_is_rejected() {
        for local in ["", "jean paul", "rené", "a@b", "\"q\"", "a<b>"] {
            assert!(!is_dot_atom(local), "{local}");
        }
    }
}

/// Longest DNS label (RFC 1035 §2.3.4).
const MAX_LABEL_LEN: usize = 63;

/// Reasons the labels of an ASCII (punycode) domain make it unusable as a
/// mail domain. Empty when the domain is fine.
pub(crate) fn label_problems(ascii: &str) -> Vec<String> {
    if ascii.is_empty() {
        return vec!["domain empty after IDNA conversion".to_string()];
    }
    let mut problems = Vec::new();
    if !ascii.contains('.') {
        problems.push("domain needs at least two labels".to_string());
    }
    problems.extend(ascii.split('.').filter_map(label_problem));
    problems
}

fn label_problem(label: &str) -> Option<String> {
    if label.is_empty() {
        Some("empty domain label".to_string())
    } else if label.len() > MAX_LABEL_LEN {
        Some(format!("label '{label}' is longer than {MAX_LABEL_LEN} bytes"))
    } else if label.starts_with('-') || label.ends_with('-') {
        Some(format!("label '{label}' starts or ends with a hyphen"))
    } else if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        Some(format!("label '{label}' has characters outside LDH"))
    } else {
        None
    }
}

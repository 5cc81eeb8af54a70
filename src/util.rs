/// Statuses the data hub answers with when it is overloaded. Both are worth waiting out.
pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 429 | 503)
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

pub(crate) fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Shortens response bodies before they end up in log lines.
pub(crate) fn truncate_body(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_busy_statuses_are_retried() {
        assert!(retriable_status(429));
        assert!(retriable_status(503));
        for code in [200, 400, 401, 404, 500, 502, 504] {
            assert!(!retriable_status(code), "{code} must not be retried");
        }
    }

    #[test]
    fn urljoin_handles_slashes() {
        let base = "https://api.eloverblik.dk/CustomerApi/api/";
        assert_eq!(
            urljoin(base, "isalive"),
            "https://api.eloverblik.dk/CustomerApi/api/isalive"
        );
        assert_eq!(
            urljoin("https://host/api", "/token"),
            "https://host/api/token"
        );
        assert_eq!(urljoin(base, "https://other/x"), "https://other/x");
        assert_eq!(urljoin("https://host/dataset", ""), "https://host/dataset");
    }

    #[test]
    fn strip_quotes_both_styles() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes(" abc "), "abc");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_body("abc", 10), "abc");
        assert_eq!(truncate_body("æøå", 3), "æ");
    }
}

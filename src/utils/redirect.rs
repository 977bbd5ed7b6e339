//! Redirect target validation.

/// Whether a redirect target is a same-origin relative path.
///
/// Only paths starting with a single `/` are accepted. Protocol-relative
/// (`//host`), backslash tricks (`/\host`), absolute URLs and scheme-prefixed
/// strings (`javascript:`, `data:`) are rejected.
pub fn is_safe_redirect(target: &str) -> bool {
    if !target.starts_with('/') || target.starts_with("//") || target.starts_with("/\\") {
        return false;
    }
    !target.chars().any(|c| c.is_control())
}

/// Return `target` if it is safe, otherwise `fallback`.
pub fn safe_redirect_or<'a>(target: Option<&'a str>, fallback: &'a str) -> &'a str {
    match target {
        Some(t) if is_safe_redirect(t) => t,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_are_safe() {
        assert!(is_safe_redirect("/"));
        assert!(is_safe_redirect("/dashboard"));
        assert!(is_safe_redirect("/inspections/abc?pos=2"));
    }

    #[test]
    fn test_absolute_and_scheme_urls_are_rejected() {
        assert!(!is_safe_redirect("//evil.example.com"));
        assert!(!is_safe_redirect("/\\evil.example.com"));
        assert!(!is_safe_redirect("https://evil.example.com"));
        assert!(!is_safe_redirect("http:/evil"));
        assert!(!is_safe_redirect("javascript:alert(1)"));
        assert!(!is_safe_redirect("data:text/html,hi"));
        assert!(!is_safe_redirect(""));
        assert!(!is_safe_redirect("dashboard"));
        assert!(!is_safe_redirect("/foo\r\nSet-Cookie: x=y"));
    }

    #[test]
    fn test_safe_redirect_or_falls_back() {
        assert_eq!(safe_redirect_or(Some("/clients"), "/dashboard"), "/clients");
        assert_eq!(safe_redirect_or(Some("//x"), "/dashboard"), "/dashboard");
        assert_eq!(safe_redirect_or(None, "/dashboard"), "/dashboard");
    }
}

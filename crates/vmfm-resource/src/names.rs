//! Kubernetes name and label-value syntax

use once_cell::sync::Lazy;
use regex::Regex;

/// Object names (DNS-1123 subdomain) are at most this long
pub const MAX_SUBDOMAIN_LEN: usize = 253;

/// Namespaces (DNS-1123 label) and label values are at most this long
pub const MAX_LABEL_LEN: usize = 63;

static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS subdomain regex is valid")
});

static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label regex is valid"));

static LABEL_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?)?$").expect("label value regex is valid")
});

/// Valid object name, e.g. a Secret or ConfigMap
#[must_use]
pub fn is_dns_subdomain(name: &str) -> bool {
    name.len() <= MAX_SUBDOMAIN_LEN && DNS_SUBDOMAIN.is_match(name)
}

/// Valid namespace name
#[must_use]
pub fn is_dns_label(name: &str) -> bool {
    name.len() <= MAX_LABEL_LEN && DNS_LABEL.is_match(name)
}

/// Value the API server accepts under `metadata.labels`
#[must_use]
pub fn is_label_value(value: &str) -> bool {
    value.len() <= MAX_LABEL_LEN && LABEL_VALUE.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomains() {
        assert!(is_dns_subdomain("vbios-rom"));
        assert!(is_dns_subdomain("a.b-c.d"));
        assert!(!is_dns_subdomain(""));
        assert!(!is_dns_subdomain("Upper"));
        assert!(!is_dns_subdomain("../../tenant/secrets/x"));
        assert!(!is_dns_subdomain(&"a".repeat(MAX_SUBDOMAIN_LEN + 1)));
    }

    #[test]
    fn labels() {
        assert!(is_dns_label("tenant-a"));
        assert!(!is_dns_label("a.b"));
        assert!(!is_dns_label(".."));
        assert!(!is_dns_label(&"a".repeat(MAX_LABEL_LEN + 1)));
    }

    #[test]
    fn label_values() {
        assert!(is_label_value(""));
        assert!(is_label_value("true"));
        assert!(is_label_value("nvidia.com_gpu"));
        assert!(!is_label_value("nvidia.com/gpu"));
        assert!(!is_label_value(r#"["0000:00:02.0"]"#));
        assert!(!is_label_value(r#"{"devices":[]}"#));
        assert!(!is_label_value("-edge"));
    }
}

//! Blocked-domain list for PDF URLs (§4.3): 16 known paywalled publisher
//! domains, skipped before download.

const BLOCKED_DOMAINS: &[&str] = &[
    "sciencedirect.com",
    "springer.com",
    "link.springer.com",
    "wiley.com",
    "onlinelibrary.wiley.com",
    "ieeexplore.ieee.org",
    "dl.acm.org",
    "tandfonline.com",
    "journals.sagepub.com",
    "nature.com",
    "cell.com",
    "jstor.org",
    "oup.com",
    "academic.oup.com",
    "karger.com",
    "thieme-connect.com",
];

pub fn is_blocked(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    BLOCKED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_a_known_paywalled_domain() {
        assert!(is_blocked("https://www.sciencedirect.com/science/article/pii/123"));
    }

    #[test]
    fn flags_a_subdomain_of_a_blocked_domain() {
        assert!(is_blocked("https://link.springer.com/chapter/10.1007/x"));
    }

    #[test]
    fn allows_arxiv() {
        assert!(!is_blocked("https://arxiv.org/pdf/1706.03762"));
    }
}

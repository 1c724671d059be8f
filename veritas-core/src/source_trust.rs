//! Source tier classification by domain suffix, with an optional JSON
//! override table. Ported from the reference tier tables (§4.8).

use std::collections::HashMap;

use url::Url;

use crate::state::SourceTier;

const MAJOR_NEWS_DOMAINS: &[&str] = &[
    "yna.co.kr",
    "newsis.com",
    "kbs.co.kr",
    "mbc.co.kr",
    "sbs.co.kr",
    "ytn.co.kr",
    "chosun.com",
    "joongang.co.kr",
    "donga.com",
    "hani.co.kr",
    "khan.co.kr",
    "mk.co.kr",
    "hankyung.com",
    "moneytoday.co.kr",
    "seoul.co.kr",
    "ohmynews.com",
    "edaily.co.kr",
];

const SPECIALIZED_NEWS_DOMAINS: &[&str] = &["zdnet.co.kr", "itworld.co.kr", "bloter.net", "ddaily.co.kr"];

const PLATFORM_DOMAINS: &[&str] = &[
    "blog.naver.com",
    "tistory.com",
    "medium.com",
    "brunch.co.kr",
    "velog.io",
    "youtube.com",
    "youtu.be",
    "dcinside.com",
    "mlbpark.com",
];

const PUBLIC_ORG_DOMAINS: &[&str] = &["or.kr", "ac.kr", "re.kr"];

/// Lowercased host with a leading `www.` stripped; empty string if the
/// URL can't be parsed.
pub fn extract_domain(url: &str) -> String {
    let trimmed = url.trim();
    let parsed = Url::parse(trimmed).or_else(|_| Url::parse(&format!("https://{trimmed}")));
    let Ok(parsed) = parsed else {
        return String::new();
    };
    let host = parsed.host_str().unwrap_or("").to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

fn domain_matches(domain: &str, patterns: &[&str]) -> bool {
    if domain.is_empty() {
        return false;
    }
    patterns
        .iter()
        .any(|pattern| domain == *pattern || domain.ends_with(&format!(".{pattern}")))
}

fn lookup_override<'a>(domain: &str, overrides: &'a HashMap<String, SourceTier>) -> Option<&'a SourceTier> {
    if domain.is_empty() || overrides.is_empty() {
        return None;
    }
    if let Some(tier) = overrides.get(domain) {
        return Some(tier);
    }
    overrides
        .iter()
        .find(|(key, _)| domain.ends_with(&format!(".{key}")))
        .map(|(_, tier)| tier)
}

pub fn resolve_source_tier(
    url: &str,
    source_type: veritas_protocol::response::SourceType,
    overrides: &HashMap<String, SourceTier>,
) -> (String, SourceTier) {
    use veritas_protocol::response::SourceType;

    let domain = extract_domain(url);

    if let Some(tier) = lookup_override(&domain, overrides) {
        return (domain, *tier);
    }

    if matches!(source_type, SourceType::Wiki | SourceType::KbDoc) {
        return (domain, SourceTier::Encyclopedia);
    }
    if domain.ends_with(".go.kr") || domain == "korea.kr" {
        return (domain, SourceTier::Government);
    }
    if domain_matches(&domain, MAJOR_NEWS_DOMAINS) {
        return (domain, SourceTier::MajorNews);
    }
    if domain_matches(&domain, SPECIALIZED_NEWS_DOMAINS) {
        return (domain, SourceTier::SpecializedNews);
    }
    if domain_matches(&domain, PLATFORM_DOMAINS) {
        return (domain, SourceTier::Platform);
    }
    if domain_matches(&domain, PUBLIC_ORG_DOMAINS) {
        return (domain, SourceTier::PublicOrg);
    }

    match source_type {
        SourceType::News => (domain, SourceTier::SpecializedNews),
        SourceType::WebUrl => (domain, SourceTier::Unknown),
        _ => (domain, SourceTier::Unknown),
    }
}

pub struct SourceTrust {
    pub source_domain: String,
    pub source_tier: SourceTier,
    pub source_trust_score: f64,
}

pub fn build_source_trust(
    url: &str,
    source_type: veritas_protocol::response::SourceType,
    overrides: &HashMap<String, SourceTier>,
) -> SourceTrust {
    let (domain, tier) = resolve_source_tier(url, source_type, overrides);
    SourceTrust {
        source_domain: if domain.is_empty() { "unknown".to_string() } else { domain },
        source_tier: tier,
        source_trust_score: tier.base_score(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veritas_protocol::response::SourceType;

    #[test]
    fn government_domain_resolves_to_government_tier() {
        let (domain, tier) = resolve_source_tier("https://www.korea.go.kr/news/1", SourceType::WebUrl, &HashMap::new());
        assert_eq!(domain, "korea.go.kr");
        assert_eq!(tier, SourceTier::Government);
    }

    #[test]
    fn major_news_domain_is_recognized_by_suffix() {
        let (_, tier) = resolve_source_tier("https://news.yna.co.kr/view/1", SourceType::WebUrl, &HashMap::new());
        assert_eq!(tier, SourceTier::MajorNews);
    }

    #[test]
    fn wiki_source_type_is_always_encyclopedia() {
        let (_, tier) = resolve_source_tier("https://some-random-blog.example", SourceType::Wiki, &HashMap::new());
        assert_eq!(tier, SourceTier::Encyclopedia);
    }

    #[test]
    fn unknown_domain_for_web_url_falls_back_to_unknown() {
        let (_, tier) = resolve_source_tier("https://totally-unrecognized.example", SourceType::WebUrl, &HashMap::new());
        assert_eq!(tier, SourceTier::Unknown);
    }

    #[test]
    fn override_table_takes_precedence_over_heuristics() {
        let mut overrides = HashMap::new();
        overrides.insert("chosun.com".to_string(), SourceTier::Unknown);
        let (_, tier) = resolve_source_tier("https://chosun.com/article", SourceType::WebUrl, &overrides);
        assert_eq!(tier, SourceTier::Unknown);
    }

    #[test]
    fn base_scores_match_fixed_tier_table() {
        let trust = build_source_trust("https://www.korea.go.kr", SourceType::WebUrl, &HashMap::new());
        assert_eq!(trust.source_trust_score, 0.96);
    }
}

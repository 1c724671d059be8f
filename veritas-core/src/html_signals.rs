//! HTML credibility signal extraction (§4.7), used by the scoring
//! engine via the S3 merge step.

use std::time::Duration;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

const REF_LINK_PATTERNS: &[&str] = &[
    "go.kr",
    "korea.kr",
    "fss.or.kr",
    "kostat.go.kr",
    "index.go.kr",
    "law.go.kr",
    "scourt.go.kr",
    "moef.go.kr",
    "bok.or.kr",
    "dart.fss.or.kr",
];

const ANONYMOUS_TERMS: &[&str] = &["관계자", "익명", "지인", "커뮤니티", "카더라", "알려졌다", "전해졌다"];

const CLICKBAIT_TERMS: &[&str] = &["충격", "긴급", "단독", "경악", "대박", "실화", "역대급"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlSignalBreakdown {
    pub base: f64,
    pub byline_bonus: f64,
    pub date_bonus: f64,
    pub correction_bonus: f64,
    pub reference_bonus: f64,
    pub anonymous_penalty: f64,
    pub clickbait_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlSignals {
    pub fetch_ok: bool,
    pub byline_present: bool,
    pub date_present: bool,
    pub correction_notice_present: bool,
    pub reference_link_count: usize,
    pub reference_link_quality_score: f64,
    pub anonymous_source_ratio: f64,
    pub clickbait_pattern: bool,
    pub html_signal_score: f64,
    pub breakdown: HtmlSignalBreakdown,
}

impl HtmlSignals {
    fn neutral(fetch_ok: bool) -> Self {
        Self {
            fetch_ok,
            byline_present: false,
            date_present: false,
            correction_notice_present: false,
            reference_link_count: 0,
            reference_link_quality_score: 0.0,
            anonymous_source_ratio: 0.0,
            clickbait_pattern: false,
            html_signal_score: 0.5,
            breakdown: HtmlSignalBreakdown {
                base: 0.5,
                byline_bonus: 0.0,
                date_bonus: 0.0,
                correction_bonus: 0.0,
                reference_bonus: 0.0,
                anonymous_penalty: 0.0,
                clickbait_penalty: 0.0,
            },
        }
    }
}

fn strip_html(value: &str) -> String {
    let script = Regex::new(r"(?is)<script[\s\S]*?</script>").expect("valid regex");
    let style = Regex::new(r"(?is)<style[\s\S]*?</style>").expect("valid regex");
    let tags = Regex::new(r"<[^>]+>").expect("valid regex");
    let whitespace = Regex::new(r"\s+").expect("valid regex");

    let text = script.replace_all(value, " ");
    let text = style.replace_all(&text, " ");
    let text = tags.replace_all(&text, " ");
    whitespace.replace_all(&text, " ").trim().to_string()
}

fn safe_ratio(numer: f64, denom: f64) -> f64 {
    if denom <= 0.0 { 0.0 } else { (numer / denom).clamp(0.0, 1.0) }
}

fn extract_links(html: &str) -> Vec<String> {
    let re = Regex::new(r#"(?i)href=["']([^"']+)["']"#).expect("valid regex");
    re.captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    terms.iter().any(|term| lowered.contains(&term.to_lowercase()))
}

fn clip(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Fetches `url` and derives credibility signals from the raw HTML. On
/// any fetch failure this returns a neutral result (score 0.5,
/// `fetch_ok=false`) rather than propagating an error, since a failed
/// credibility fetch must never abort the pipeline.
pub async fn analyze_html_signals(
    client: &reqwest::Client,
    url: &str,
    title: &str,
    snippet: &str,
    timeout: Duration,
) -> HtmlSignals {
    if url.trim().is_empty() {
        return HtmlSignals::neutral(false);
    }

    let response = match client
        .get(url)
        .timeout(timeout.max(Duration::from_millis(500)))
        .header("User-Agent", "Mozilla/5.0 (VeritasBot/1.0; +https://local)")
        .send()
        .await
    {
        Ok(resp) if resp.status().as_u16() < 400 => resp,
        _ => return HtmlSignals::neutral(false),
    };

    let html = match response.text().await {
        Ok(text) if !text.is_empty() => text,
        _ => return HtmlSignals::neutral(false),
    };

    let plain = strip_html(&html);

    let byline_present = Regex::new(r#"(?i)<meta[^>]+name=["']author["']"#).expect("valid regex").is_match(&html)
        || Regex::new(r#"(?i)<meta[^>]+property=["']article:author["']"#)
            .expect("valid regex")
            .is_match(&html)
        || Regex::new(r#"(?i)author["']?\s*[:=]"#).expect("valid regex").is_match(&html)
        || plain.contains("기자")
        || Regex::new(r"(?i)\bbyline\b").expect("valid regex").is_match(&html);

    let date_present = Regex::new(r"(?i)published[_\- ]?time").expect("valid regex").is_match(&html)
        || Regex::new(r"(?i)modified[_\- ]?time").expect("valid regex").is_match(&html)
        || Regex::new(r"\b\d{4}[./-]\d{1,2}[./-]\d{1,2}\b").expect("valid regex").is_match(&plain)
        || Regex::new(r#"(?i)<time[^>]*datetime="#).expect("valid regex").is_match(&html);

    let correction_present = Regex::new(r"(?i)정정|바로잡|수정 공지|correction|corrected")
        .expect("valid regex")
        .is_match(&plain);

    let links = extract_links(&html);
    let reference_link_count = links.len();
    let high_quality_refs = links.iter().filter(|link| contains_any(link, REF_LINK_PATTERNS)).count();
    let reference_quality = clip(
        safe_ratio(high_quality_refs as f64, reference_link_count.max(1) as f64) * 0.7
            + safe_ratio(reference_link_count as f64, 8.0) * 0.3,
    );

    let anonymous_hits: usize = ANONYMOUS_TERMS.iter().map(|term| plain.matches(term).count()).sum();
    let quote_like_hits = Regex::new("(\u{201c}|\"|라고|밝혔|말했|전했)")
        .expect("valid regex")
        .find_iter(&plain)
        .count();
    let anonymous_ratio = clip(safe_ratio(anonymous_hits as f64, quote_like_hits.max(1) as f64));

    let title_clickbait = contains_any(title, CLICKBAIT_TERMS);
    let evidence_thin = reference_link_count == 0 && snippet.chars().count() < 160;
    let clickbait_pattern = title_clickbait && evidence_thin;

    let base = 0.5;
    let byline_bonus = if byline_present { 0.08 } else { 0.0 };
    let date_bonus = if date_present { 0.08 } else { 0.0 };
    let correction_bonus = if correction_present { 0.06 } else { 0.0 };
    let reference_bonus = 0.20 * reference_quality;
    let anonymous_penalty = 0.14 * anonymous_ratio;
    let clickbait_penalty = if clickbait_pattern { 0.12 } else { 0.0 };

    let score = clip(base + byline_bonus + date_bonus + correction_bonus + reference_bonus - anonymous_penalty - clickbait_penalty);

    HtmlSignals {
        fetch_ok: true,
        byline_present,
        date_present,
        correction_notice_present: correction_present,
        reference_link_count,
        reference_link_quality_score: reference_quality,
        anonymous_source_ratio: anonymous_ratio,
        clickbait_pattern,
        html_signal_score: score,
        breakdown: HtmlSignalBreakdown {
            base,
            byline_bonus,
            date_bonus,
            correction_bonus,
            reference_bonus,
            anonymous_penalty,
            clickbait_penalty,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_url_returns_neutral_result() {
        let client = reqwest::Client::new();
        let signals = analyze_html_signals(&client, "", "title", "snippet", Duration::from_secs(3)).await;
        assert!(!signals.fetch_ok);
        assert_eq!(signals.html_signal_score, 0.5);
    }

    #[tokio::test]
    async fn unreachable_host_returns_neutral_result() {
        let client = reqwest::Client::new();
        let signals = analyze_html_signals(
            &client,
            "http://127.0.0.1:1",
            "title",
            "snippet",
            Duration::from_millis(200),
        )
        .await;
        assert!(!signals.fetch_ok);
        assert_eq!(signals.html_signal_score, 0.5);
    }

    #[test]
    fn strip_html_removes_script_and_tags() {
        let html = "<html><script>evil()</script><body><p>hello world</p></body></html>";
        assert_eq!(strip_html(html), "hello world");
    }

    #[test]
    fn clickbait_requires_both_sensational_title_and_thin_evidence() {
        assert!(contains_any("충격 단독 속보", CLICKBAIT_TERMS));
        assert!(!contains_any("평범한 제목입니다", CLICKBAIT_TERMS));
    }
}

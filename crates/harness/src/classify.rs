//! Execution classifier: fuses collected signals into a single outcome.

use serde::{Deserialize, Serialize};

use xssbench_sanitizers::AdapterStatus;

use crate::signals::Signals;
use crate::template::BASE_URL;

/// Terminal classification of one case.
///
/// Variants are ordered by severity so aggregation can `max()` them:
/// `error > xss > external > skip > pass`. The `lossy` flag is orthogonal
/// and lives on the case result, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Skip,
    External,
    Xss,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Skip => "skip",
            Outcome::External => "external",
            Outcome::Xss => "xss",
            Outcome::Error => "error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const DANGEROUS_DATA_MIMES: &[&str] = &[
    "text/html",
    "image/svg+xml",
    "application/xhtml+xml",
    "text/xml",
    "application/xml",
];

/// Scheme normalization shared with the in-page P1 probe: strip NUL
/// anywhere, trim leading/trailing bytes <= 0x20, lowercase. Interior
/// whitespace is preserved on purpose ("jav   ascript:" is not a scheme).
pub fn normalize_scheme(value: &str) -> String {
    let without_nul: String = value.chars().filter(|c| *c != '\u{0000}').collect();
    without_nul
        .trim_matches(|c: char| (c as u32) <= 0x20)
        .to_lowercase()
}

/// Whether a URL value is execution-dangerous after normalization.
pub fn is_dangerous_url(value: &str) -> bool {
    let v = normalize_scheme(value);
    if v.starts_with("javascript:") {
        return true;
    }
    if let Some(rest) = v.strip_prefix("data:") {
        let mime = rest
            .split([';', ','])
            .next()
            .unwrap_or("")
            .trim();
        return DANGEROUS_DATA_MIMES.contains(&mime);
    }
    false
}

/// Drop navigations that are never execution evidence: blocked-navigation
/// error pages, transient blank documents, srcdoc loads, same-document hash
/// hops, and (for href cases) the clicked link's own resolved target.
pub fn filter_navigations(
    urls: &[String],
    expected_href_target: Option<&str>,
) -> Vec<String> {
    let hash_prefix = format!("{BASE_URL}#");
    urls.iter()
        .filter(|url| !url.is_empty())
        .filter(|url| !url.starts_with("chrome-error://"))
        .filter(|url| *url != "about:blank")
        .filter(|url| !url.starts_with("about:srcdoc"))
        .filter(|url| !url.starts_with(&hash_prefix))
        .filter(|url| expected_href_target != Some(url.as_str()))
        .cloned()
        .collect()
}

/// Fuse signals into the case outcome. Pure: identical signals always
/// produce the identical outcome.
///
/// A plain navigation is not XSS. Navigation counts toward `xss` only via
/// `dangerous_navigation_url` (dangerous scheme) and toward `external` only
/// via the guard's blocked-request records.
pub fn classify(signals: &Signals) -> Outcome {
    match signals.adapter_status {
        AdapterStatus::AdapterError => Outcome::Error,
        AdapterStatus::UnsupportedConfig => Outcome::Skip,
        AdapterStatus::Ok => {
            let xss = signals.dialog_fired
                || !signals.dangerous_url_hits.is_empty()
                || signals.external_script_attempted
                || signals.dangerous_navigation_url.is_some();
            if xss {
                Outcome::Xss
            } else if signals.non_script_external_attempt {
                Outcome::External
            } else {
                Outcome::Pass
            }
        }
    }
}

/// Human-readable explanation of the classification, naming the strongest
/// signal the way the outcome precedence saw it.
pub fn classification_details(signals: &Signals) -> String {
    match classify(signals) {
        Outcome::Error => "Sanitizer adapter error".to_string(),
        Outcome::Skip => "Skipped: sanitizer does not support the requested configuration".to_string(),
        Outcome::Xss => {
            if signals.dialog_fired {
                let detail = signals.dialog_details.as_deref().unwrap_or("dialog");
                format!("Executed: hook:{detail}")
            } else if let Some(hit) = signals.dangerous_url_hits.first() {
                format!(
                    "Executed: dangerous-url:{}[{}]={}",
                    hit.tag, hit.attr, hit.value
                )
            } else if signals.external_script_attempted {
                format!(
                    "Executed: external-script:{}",
                    signals.external_script_url.as_deref().unwrap_or("?")
                )
            } else {
                format!(
                    "Executed: navigation:{}",
                    signals.dangerous_navigation_url.as_deref().unwrap_or("?")
                )
            }
        }
        Outcome::External => format!(
            "External fetch: {}",
            signals.non_script_url.as_deref().unwrap_or("?")
        ),
        Outcome::Pass => "No execution detected".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::DangerousUrlHit;

    fn quiet() -> Signals {
        Signals::quiet(AdapterStatus::Ok)
    }

    #[test]
    fn outcome_ranking_matches_precedence() {
        assert!(Outcome::Error > Outcome::Xss);
        assert!(Outcome::Xss > Outcome::External);
        assert!(Outcome::External > Outcome::Skip);
        assert!(Outcome::Skip > Outcome::Pass);
    }

    #[test]
    fn adapter_error_dominates_everything() {
        let mut signals = Signals::quiet(AdapterStatus::AdapterError);
        signals.dialog_fired = true;
        assert_eq!(classify(&signals), Outcome::Error);
    }

    #[test]
    fn unsupported_config_is_skip() {
        assert_eq!(
            classify(&Signals::quiet(AdapterStatus::UnsupportedConfig)),
            Outcome::Skip
        );
    }

    #[test]
    fn dialog_marker_is_xss() {
        let mut signals = quiet();
        signals.dialog_fired = true;
        signals.dialog_details = Some("alert:1".into());
        assert_eq!(classify(&signals), Outcome::Xss);
        assert!(classification_details(&signals).contains("hook:alert:1"));
    }

    #[test]
    fn dangerous_url_hit_is_xss() {
        let mut signals = quiet();
        signals.dangerous_url_hits.push(DangerousUrlHit {
            tag: "a".into(),
            attr: "href".into(),
            value: "javascript:alert(1)".into(),
        });
        assert_eq!(classify(&signals), Outcome::Xss);
    }

    #[test]
    fn blocked_script_fetch_is_xss_even_with_other_external_traffic() {
        let mut signals = quiet();
        signals.external_script_attempted = true;
        signals.external_script_url = Some("https://evil/a.js".into());
        signals.non_script_external_attempt = true;
        signals.non_script_url = Some("image:https://evil/a.png".into());
        assert_eq!(classify(&signals), Outcome::Xss);
    }

    #[test]
    fn non_script_fetch_alone_is_external_not_xss() {
        let mut signals = quiet();
        signals.non_script_external_attempt = true;
        signals.non_script_url = Some("image:https://x/y.png".into());
        assert_eq!(classify(&signals), Outcome::External);
    }

    #[test]
    fn plain_navigation_is_not_execution() {
        let mut signals = quiet();
        signals.navigation_occurred = true;
        assert_eq!(classify(&signals), Outcome::Pass);
    }

    #[test]
    fn dangerous_navigation_is_xss() {
        let mut signals = quiet();
        signals.navigation_occurred = true;
        signals.dangerous_navigation_url = Some("javascript:alert(1)".into());
        assert_eq!(classify(&signals), Outcome::Xss);
    }

    #[test]
    fn quiet_signals_pass() {
        assert_eq!(classify(&quiet()), Outcome::Pass);
    }

    #[test]
    fn classify_is_pure() {
        let mut signals = quiet();
        signals.external_script_attempted = true;
        assert_eq!(classify(&signals), classify(&signals));
    }

    #[test]
    fn scheme_normalization_strips_nul_and_edges_only() {
        assert_eq!(normalize_scheme("  JaVaScRiPt:alert(1)  "), "javascript:alert(1)");
        assert_eq!(normalize_scheme("java\u{0000}script:alert(1)"), "javascript:alert(1)");
        assert_eq!(normalize_scheme("\u{0001}\u{000A}javascript:x"), "javascript:x");
        // Interior whitespace must survive normalization.
        assert_eq!(normalize_scheme("jav   ascript:alert(1)"), "jav   ascript:alert(1)");
    }

    #[test]
    fn dangerous_url_detection() {
        assert!(is_dangerous_url("javascript:alert(1)"));
        assert!(is_dangerous_url(" \tJAVASCRIPT:alert(1)"));
        assert!(is_dangerous_url("java\u{0000}script:alert(1)"));
        assert!(!is_dangerous_url("jav   ascript:alert(1)"));
        assert!(is_dangerous_url("data:text/html,<script>alert(1)</script>"));
        assert!(is_dangerous_url("data:image/svg+xml;base64,AAAA"));
        assert!(!is_dangerous_url("data:image/png;base64,AAAA"));
        assert!(!is_dangerous_url("https://example.com/"));
        assert!(!is_dangerous_url("mailto:a@b.c"));
    }

    #[test]
    fn navigation_filter_drops_ignorable_urls() {
        let urls = vec![
            String::new(),
            "chrome-error://chromewebdata/".to_string(),
            "about:blank".to_string(),
            "about:srcdoc".to_string(),
            format!("{BASE_URL}#xssbench"),
            "https://kept.example/".to_string(),
        ];
        assert_eq!(filter_navigations(&urls, None), vec!["https://kept.example/"]);
    }

    #[test]
    fn navigation_filter_drops_expected_href_target() {
        let urls = vec!["https://example.com/".to_string(), "https://other/".to_string()];
        let filtered = filter_navigations(&urls, Some("https://example.com/"));
        assert_eq!(filtered, vec!["https://other/"]);
    }
}

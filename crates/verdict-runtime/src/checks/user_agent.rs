//! User agent check
//!
//! Catalogue lookup by UA digest, pattern scans for bots, automation
//! frameworks, attack tools and language runtimes, browser-version aging and
//! structural anomalies.

use super::{soften, Check, CheckContext, Tally};
use crate::error::Result;
use crate::refdata::AgentType;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use verdict_core::{CheckKind, CheckOutcome, EvaluationInput, Window};

/// Generic crawler markers
const BOT_PATTERNS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "slurp",
    "curl",
    "wget",
    "facebookexternalhit",
];

/// Browser-automation frameworks
const AUTOMATION_PATTERNS: &[&str] = &[
    "selenium",
    "puppeteer",
    "playwright",
    "phantomjs",
    "headless",
    "webdriver",
    "cypress",
];

/// Attack tooling
const MALICIOUS_PATTERNS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "metasploit",
    "hydra",
    "dirbuster",
    "gobuster",
    "wpscan",
];

/// Language runtime HTTP clients
const LANGUAGE_PATTERNS: &[&str] = &[
    "python",
    "java/",
    "ruby",
    "perl",
    "php",
    "go-http-client",
    "node-fetch",
    "okhttp",
    "axios",
    "libwww",
];

/// Words no legitimate browser ships in its UA
const HOSTILE_WORDS: &[&str] = &["hack", "exploit", "inject", "bypass", "penetration"];

static MSIE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)msie (\d+)").expect("static regex"));
static CHROME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)chrome/(\d+)").expect("static regex"));
static FIREFOX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)firefox/(\d+)").expect("static regex"));
static EDGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)edge?/(\d+)").expect("static regex"));
static SAFARI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)version/(\d+).*safari").expect("static regex"));

/// Characters a plausible UA sticks to
static ALLOWED_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\s()\[\]/.,;:_\-+]+$").expect("static regex"));

pub struct UserAgentCheck;

/// Parsed browser family and major version
fn parse_browser(ua: &str) -> Option<(&'static str, u32)> {
    if let Some(caps) = MSIE_RE.captures(ua) {
        return Some(("msie", caps[1].parse().ok()?));
    }
    if let Some(caps) = EDGE_RE.captures(ua) {
        return Some(("edge", caps[1].parse().ok()?));
    }
    if let Some(caps) = FIREFOX_RE.captures(ua) {
        return Some(("firefox", caps[1].parse().ok()?));
    }
    if let Some(caps) = CHROME_RE.captures(ua) {
        return Some(("chrome", caps[1].parse().ok()?));
    }
    if let Some(caps) = SAFARI_RE.captures(ua) {
        return Some(("safari", caps[1].parse().ok()?));
    }
    None
}

/// Penalty for browsers past end of life
fn outdated_points(name: &str, major: u32) -> u32 {
    match (name, major) {
        ("msie", 0..=6) => 90,
        ("msie", 7) => 80,
        ("msie", 8) => 70,
        ("msie", 9) => 60,
        ("msie", _) => 50,
        ("chrome", v) if v < 60 => 40,
        ("firefox", v) if v < 52 => 40,
        _ => 0,
    }
}

fn has_repeated_run(ua: &str) -> bool {
    let mut run = 0usize;
    let mut last = None;
    for c in ua.chars() {
        if Some(c) == last {
            run += 1;
            if run >= 11 {
                return true;
            }
        } else {
            run = 1;
            last = Some(c);
        }
    }
    false
}

#[async_trait]
impl Check for UserAgentCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::UserAgent
    }

    fn applicable(&self, input: &EvaluationInput) -> bool {
        input.user_agent.is_some()
    }

    async fn perform(&self, input: &EvaluationInput, ctx: &CheckContext) -> Result<CheckOutcome> {
        let ua = input.user_agent.as_deref().unwrap_or_default();
        let mut tally = Tally::new();

        if ua.len() < 10 {
            tally.add(50);
            tally.hard_fail();
            tally.detail("too_short", true);
            return Ok(tally.into_outcome());
        }

        let ua_digest = hex::encode(Sha256::digest(ua.as_bytes()));
        if let Some(known) = ctx.refdata.known_user_agent(&ua_digest).await? {
            if known.is_active {
                tally.add(known.risk_weight.max(0) as u32);
                tally.detail(
                    "known",
                    serde_json::json!({
                        "type": known.agent_type.as_str(),
                        "name": known.name,
                    }),
                );
                if known.agent_type == AgentType::Malicious {
                    tally.detail("known_malicious", true);
                }
            }
        }

        let lowered = ua.to_lowercase();
        if BOT_PATTERNS.iter().any(|p| lowered.contains(p)) {
            tally.add(40);
            tally.detail("bot", true);
        }
        if AUTOMATION_PATTERNS.iter().any(|p| lowered.contains(p)) {
            tally.add(50);
            tally.detail("automation", true);
        }
        if MALICIOUS_PATTERNS.iter().any(|p| lowered.contains(p)) {
            tally.add(80);
            tally.detail("malicious_pattern", true);
        }
        if LANGUAGE_PATTERNS.iter().any(|p| lowered.contains(p)) {
            tally.add(30);
            tally.detail("language_client", true);
        }

        if let Some((name, major)) = parse_browser(ua) {
            tally.detail(
                "browser",
                serde_json::json!({ "name": name, "major": major }),
            );
            let penalty = outdated_points(name, major);
            if penalty > 0 {
                tally.add(penalty);
                tally.detail("outdated", true);
            }
        }

        if ua.len() < 20 {
            tally.add(30);
        } else if ua.len() > 500 {
            tally.add(20);
        }
        if !["mozilla", "webkit", "gecko"].iter().any(|t| lowered.contains(t)) {
            tally.add(25);
            tally.detail("missing_engine_token", true);
        }
        if HOSTILE_WORDS.iter().any(|w| lowered.contains(w)) {
            tally.add(60);
            tally.detail("hostile_words", true);
        }
        if has_repeated_run(ua) {
            tally.add(40);
            tally.detail("repeated_run", true);
        }
        if !ALLOWED_CHARS_RE.is_match(ua) {
            tally.add(50);
            tally.detail("unusual_characters", true);
        }

        if let Some(count) = soften(
            ctx.velocity.bump("ua", &ua_digest, Window::Day).await,
            "user-agent velocity",
        )? {
            let points = if count > 1000 {
                20
            } else if count > 100 {
                10
            } else {
                0
            };
            tally.add(points);
            tally.detail(
                "velocity",
                serde_json::json!({
                    "count": count,
                    "window": Window::Day.as_str(),
                    "risk_score": points,
                }),
            );
        }

        Ok(tally.into_outcome())
    }
}

//! Technology fingerprinting of a fetched page
//!
//! [`TechDetector`] is the seam the pipeline talks to. [`HttpTechDetector`]
//! fetches the page once with reqwest and matches headers, cookie names, the
//! generator meta tag and the HTML body against a built-in signature table.

use crate::{Config, ScanError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Technology names found for one URL.
pub type TechSet = BTreeSet<String>;

const MAX_BODY_BYTES: usize = 512 * 1024;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TechDetector: Send + Sync {
    async fn detect(&self, url: &str) -> Result<TechSet, ScanError>;
}

struct Signature {
    name: &'static str,
    /// Header name (lowercase) and pattern over its value
    headers: &'static [(&'static str, &'static str)],
    cookies: &'static [&'static str],
    html: &'static [&'static str],
    generator: Option<&'static str>,
    implies: &'static [&'static str],
}

const SIGNATURES: &[Signature] = &[
    Signature {
        name: "Nginx",
        headers: &[("server", r"(?i)nginx")],
        cookies: &[],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Apache HTTP Server",
        headers: &[("server", r"(?i)apache")],
        cookies: &[],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Microsoft IIS",
        headers: &[("server", r"(?i)microsoft-iis")],
        cookies: &[],
        html: &[],
        generator: None,
        implies: &["Microsoft ASP.NET"],
    },
    Signature {
        name: "LiteSpeed",
        headers: &[("server", r"(?i)litespeed")],
        cookies: &[],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Caddy",
        headers: &[("server", r"(?i)caddy")],
        cookies: &[],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Cloudflare",
        headers: &[("server", r"(?i)cloudflare"), ("cf-ray", r".")],
        cookies: &["__cf_bm", "__cfduid"],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Amazon CloudFront",
        headers: &[("via", r"(?i)cloudfront"), ("x-amz-cf-id", r".")],
        cookies: &[],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Varnish",
        headers: &[("via", r"(?i)varnish"), ("x-varnish", r".")],
        cookies: &[],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "PHP",
        headers: &[("x-powered-by", r"(?i)php")],
        cookies: &["PHPSESSID"],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Microsoft ASP.NET",
        headers: &[("x-powered-by", r"(?i)asp\.net"), ("x-aspnet-version", r".")],
        cookies: &["ASP.NET_SessionId"],
        html: &[r#"__VIEWSTATE"#],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Express",
        headers: &[("x-powered-by", r"(?i)express")],
        cookies: &[],
        html: &[],
        generator: None,
        implies: &["Node.js"],
    },
    Signature {
        name: "Java",
        headers: &[],
        cookies: &["JSESSIONID"],
        html: &[],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Laravel",
        headers: &[],
        cookies: &["laravel_session"],
        html: &[],
        generator: None,
        implies: &["PHP"],
    },
    Signature {
        name: "Django",
        headers: &[],
        cookies: &["csrftoken", "django_language"],
        html: &[r"csrfmiddlewaretoken"],
        generator: None,
        implies: &["Python"],
    },
    Signature {
        name: "WordPress",
        headers: &[("link", r"(?i)rel=.?https://api\.w\.org")],
        cookies: &[],
        html: &[r"/wp-content/", r"/wp-includes/"],
        generator: Some(r"(?i)wordpress"),
        implies: &["PHP", "MySQL"],
    },
    Signature {
        name: "Drupal",
        headers: &[("x-generator", r"(?i)drupal")],
        cookies: &[],
        html: &[r"/sites/default/files/", r"Drupal\.settings"],
        generator: Some(r"(?i)drupal"),
        implies: &["PHP"],
    },
    Signature {
        name: "Joomla",
        headers: &[],
        cookies: &[],
        html: &[r"/media/jui/", r"/components/com_"],
        generator: Some(r"(?i)joomla"),
        implies: &["PHP"],
    },
    Signature {
        name: "Shopify",
        headers: &[("x-shopid", r".")],
        cookies: &["_shopify_y"],
        html: &[r"cdn\.shopify\.com"],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Wix",
        headers: &[("x-wix-request-id", r".")],
        cookies: &[],
        html: &[r"static\.wixstatic\.com"],
        generator: Some(r"(?i)wix\.com"),
        implies: &[],
    },
    Signature {
        name: "Next.js",
        headers: &[("x-powered-by", r"(?i)next\.js")],
        cookies: &[],
        html: &[r#"id="__NEXT_DATA__""#, r"/_next/static/"],
        generator: None,
        implies: &["React", "Node.js"],
    },
    Signature {
        name: "Nuxt.js",
        headers: &[],
        cookies: &[],
        html: &[r"window\.__NUXT__", r"/_nuxt/"],
        generator: None,
        implies: &["Vue.js"],
    },
    Signature {
        name: "React",
        headers: &[],
        cookies: &[],
        html: &[r"data-reactroot", r"react(?:\.production)?(?:\.min)?\.js"],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Vue.js",
        headers: &[],
        cookies: &[],
        html: &[r"data-v-[0-9a-f]{8}", r"vue(?:\.runtime)?(?:\.min)?\.js"],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Angular",
        headers: &[],
        cookies: &[],
        html: &[r"ng-version=", r"ng-app="],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "jQuery",
        headers: &[],
        cookies: &[],
        html: &[r"jquery[.-](?:\d+\.)*(?:min\.)?js"],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Bootstrap",
        headers: &[],
        cookies: &[],
        html: &[r"bootstrap(?:\.bundle)?(?:\.min)?\.(?:css|js)"],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Google Analytics",
        headers: &[],
        cookies: &["_ga"],
        html: &[r"google-analytics\.com/(?:ga|analytics)\.js", r"googletagmanager\.com/gtag/js"],
        generator: None,
        implies: &[],
    },
    Signature {
        name: "Google Tag Manager",
        headers: &[],
        cookies: &[],
        html: &[r"googletagmanager\.com/gtm\.js"],
        generator: None,
        implies: &[],
    },
];

struct CompiledSignature {
    name: &'static str,
    headers: Vec<(&'static str, Regex)>,
    cookies: &'static [&'static str],
    html: Vec<Regex>,
    generator: Option<Regex>,
    implies: &'static [&'static str],
}

// Patterns are literals in this file; a bad one fails every test run.
static COMPILED: Lazy<Vec<CompiledSignature>> = Lazy::new(|| {
    SIGNATURES
        .iter()
        .map(|sig| CompiledSignature {
            name: sig.name,
            headers: sig
                .headers
                .iter()
                .map(|(header, pattern)| (*header, compile(pattern)))
                .collect(),
            cookies: sig.cookies,
            html: sig.html.iter().map(|p| compile(p)).collect(),
            generator: sig.generator.map(compile),
            implies: sig.implies,
        })
        .collect()
});

static META_GENERATOR: Lazy<Regex> = Lazy::new(|| {
    compile(r#"(?i)<meta[^>]+name=["']generator["'][^>]+content=["']([^"']+)["']"#)
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid signature pattern {pattern:?}: {e}"))
}

/// Response material the signatures are matched against.
#[derive(Debug, Default, Clone)]
pub struct PageEvidence {
    /// Lowercase header name and value
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<String>,
    pub html: String,
}

impl PageEvidence {
    pub fn from_response(headers: &HeaderMap, body: String) -> Self {
        let cookies = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split('=').next())
            .map(|name| name.trim().to_string())
            .collect();

        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        Self {
            headers,
            cookies,
            html: body,
        }
    }

    fn generator(&self) -> Option<&str> {
        META_GENERATOR
            .captures(&self.html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Match evidence against the signature table, then expand implied
/// technologies.
pub fn match_signatures(evidence: &PageEvidence) -> TechSet {
    let generator = evidence.generator();
    let mut found = TechSet::new();

    for sig in COMPILED.iter() {
        let header_hit = sig.headers.iter().any(|(name, pattern)| {
            evidence
                .headers
                .iter()
                .any(|(h, value)| h == name && pattern.is_match(value))
        });
        let cookie_hit = sig
            .cookies
            .iter()
            .any(|cookie| evidence.cookies.iter().any(|c| c == cookie));
        let html_hit = sig.html.iter().any(|p| p.is_match(&evidence.html));
        let generator_hit = match (&sig.generator, generator) {
            (Some(pattern), Some(value)) => pattern.is_match(value),
            _ => false,
        };

        if header_hit || cookie_hit || html_hit || generator_hit {
            found.insert(sig.name.to_string());
        }
    }

    apply_implies(&mut found);
    found
}

fn apply_implies(found: &mut TechSet) {
    // Implications only point at leaves or one level down, a second pass
    // reaches the fixpoint for this table
    for _ in 0..2 {
        let implied: Vec<&'static str> = COMPILED
            .iter()
            .filter(|sig| found.contains(sig.name))
            .flat_map(|sig| sig.implies.iter().copied())
            .collect();
        found.extend(implied.into_iter().map(str::to_string));
    }
}

pub struct HttpTechDetector {
    client: reqwest::Client,
}

impl HttpTechDetector {
    pub fn new(config: &Config) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.detection_timeout)
            .connect_timeout(config.detection_timeout)
            .danger_accept_invalid_certs(config.ignore_https_errors)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ScanError::Configuration(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl TechDetector for HttpTechDetector {
    async fn detect(&self, url: &str) -> Result<TechSet, ScanError> {
        let url = Url::parse(url)?;

        let mut response = self.client.get(url.clone()).send().await?;
        let headers = response.headers().clone();

        // Stop reading at the cap; the rest of the body is never buffered
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = MAX_BODY_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_BODY_BYTES {
                break;
            }
        }
        let body = String::from_utf8_lossy(&body).into_owned();

        let techs = match_signatures(&PageEvidence::from_response(&headers, body));
        debug!("Detected {} technologies on {}", techs.len(), url);

        Ok(techs)
    }
}

/// Run `detector` under `budget`, folding every failure into an empty set.
pub async fn detect_or_empty(
    detector: &dyn TechDetector,
    url: &str,
    budget: Duration,
) -> TechSet {
    match tokio::time::timeout(budget, detector.detect(url)).await {
        Ok(Ok(techs)) => techs,
        Ok(Err(e)) => {
            debug!("Detection failed for {}: {}", url, e);
            TechSet::new()
        }
        Err(_) => {
            debug!("Detection timed out for {} after {:?}", url, budget);
            TechSet::new()
        }
    }
}

//! Download target discovery.
//!
//! Primary strategy: scrape the publisher's listing page for anchors that
//! point at `<prefix><digit>.zip`. Fallback strategy, used when the page
//! cannot be fetched or yields no candidates: a fixed catalog of URL
//! guesses per source id built from known path conventions.
//!
//! Fallback only triggers on *zero* candidates. A page that lists some but
//! not all ten archives produces a run over just those sources.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use reqwest::Url;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::models::{DownloadTarget, SOURCE_COUNT};

use super::http::HttpSource;

fn href_regex() -> &'static Regex {
    static HREF: OnceLock<Regex> = OnceLock::new();
    HREF.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid href regex")
    })
}

fn entity_regex() -> &'static Regex {
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    ENTITY.get_or_init(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid entity regex")
    })
}

/// Decode numeric character references and the common named entities.
/// Unknown or invalid references are left as written.
fn decode_entities(raw: &str) -> String {
    entity_regex()
        .replace_all(raw, |cap: &Captures| {
            let body = &cap[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => cap[0].to_string(),
            }
        })
        .into_owned()
}

/// Standardized archive file name for a source id, e.g. `ruc7.zip`.
pub fn archive_file_name(prefix: &str, source_id: &str) -> String {
    format!("{}{}.zip", prefix, source_id)
}

/// Discover targets (scrape, else fallback) and deduplicate by source id.
pub async fn discover(http: &dyn HttpSource, config: &FetchConfig) -> Vec<DownloadTarget> {
    info!(url = %config.listing_url, "fetching download URLs from listing page");

    let candidates = match http.get_text(&config.listing_url).await {
        Ok(html) => {
            let found = scan_listing(&html, &config.base_origin, &config.file_prefix);
            info!(candidates = found.len(), "listing page scanned");
            if found.is_empty() {
                warn!("no download URLs found on listing page, using fallback patterns");
                fallback_targets(config)
            } else {
                found
            }
        }
        Err(e) => {
            warn!(error = %e, "listing page unavailable, using fallback patterns");
            fallback_targets(config)
        }
    };

    let targets = dedupe(candidates);
    info!(targets = targets.len(), "organized unique source archives");
    targets
}

/// Extract every `<prefix><digit>.zip` anchor from listing markup, in
/// document order. Relative links resolve against `base_origin`.
pub fn scan_listing(html: &str, base_origin: &str, prefix: &str) -> Vec<DownloadTarget> {
    let file_re = match Regex::new(&format!(r"(?i){}([0-9])\.zip", regex::escape(prefix))) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let base = Url::parse(base_origin).ok();

    let mut out = Vec::new();
    for cap in href_regex().captures_iter(html) {
        let raw = cap
            .get(1)
            .or_else(|| cap.get(2))
            .or_else(|| cap.get(3))
            .map_or("", |m| m.as_str());
        let href = decode_entities(raw.trim());
        let Some(m) = file_re.captures(&href) else {
            continue;
        };
        let source_id = m[1].to_string();

        let url = if href.starts_with("http://") || href.starts_with("https://") {
            href.clone()
        } else {
            match base.as_ref().and_then(|b| b.join(&href).ok()) {
                Some(u) => u.to_string(),
                None => continue,
            }
        };

        out.push(DownloadTarget {
            expected_file_name: archive_file_name(prefix, &source_id),
            source_id,
            url,
        });
    }
    out
}

/// Static URL guesses: four path conventions for each source id `0`..`9`.
pub fn fallback_targets(config: &FetchConfig) -> Vec<DownloadTarget> {
    let origin = config.base_origin.trim_end_matches('/');
    let listing = config.listing_url.as_str();
    let (listing_path, has_query) = match listing.split_once('?') {
        Some((path, _)) => (path, true),
        None => (listing, false),
    };
    let listing_path = listing_path.trim_end_matches('/');
    let query_sep = if has_query { '&' } else { '?' };

    let mut out = Vec::with_capacity(SOURCE_COUNT as usize * 4);
    for id in 0..SOURCE_COUNT {
        let source_id = id.to_string();
        let file = archive_file_name(&config.file_prefix, &source_id);
        let patterns = [
            format!("{}/docs/{}", origin, file),
            format!("{}/files/{}", listing_path, file),
            format!("{}{}file={}", listing, query_sep, file),
            format!("{}/download/{}", listing_path, file),
        ];
        for url in patterns {
            out.push(DownloadTarget {
                source_id: source_id.clone(),
                url,
                expected_file_name: file.clone(),
            });
        }
    }
    info!(candidates = out.len(), "generated fallback URL patterns");
    out
}

/// Keep the first candidate per source id; result is ordered by source id.
pub fn dedupe(candidates: Vec<DownloadTarget>) -> Vec<DownloadTarget> {
    let mut by_source: BTreeMap<String, DownloadTarget> = BTreeMap::new();
    for target in candidates {
        by_source.entry(target.source_id.clone()).or_insert(target);
    }
    by_source.into_values().collect()
}

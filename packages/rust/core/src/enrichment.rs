//! Enrichment adapter: target URL in, [`LeadRecord`] out.
//!
//! Only an unparseable target fails outward. Every classifier problem
//! (missing key, outage, timeout, empty answer) degrades to a baseline
//! record derived from the host name alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use leadpipe_classifier::{Classification, ContentClassifier, DEFAULT_PRACTICE_TYPE, RICH_CONTENT_CHARS, infer_practice_type};
use leadpipe_shared::text::title_case;
use leadpipe_shared::{LeadRecord, LeadpipeError, PracticeId, Result};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::scoring::{ScoreSignals, score};

/// Services assumed when nothing better is known.
pub const FALLBACK_SERVICES: &[&str] = &["Healthcare Services"];

/// Treatments assumed when nothing better is known.
pub const FALLBACK_TREATMENTS: &[&str] = &["Consultation"];

/// Suffix appended to host-derived company names.
const COMPANY_SUFFIX: &str = "Healthcare";

// ---------------------------------------------------------------------------
// Target parsing and baseline derivation
// ---------------------------------------------------------------------------

/// A parsed target identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: Url,
    /// Lowercase host without a trailing dot.
    pub host: String,
}

/// Parse a caller-supplied target, prefixing `https://` when no scheme is given.
pub fn parse_target(input: &str) -> Result<Target> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LeadpipeError::invalid_target(input, "empty target"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&candidate).map_err(|e| LeadpipeError::invalid_target(input, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(LeadpipeError::invalid_target(
            input,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    let host = url
        .host_str()
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| LeadpipeError::invalid_target(input, "URL has no host"))?;

    Ok(Target { url, host })
}

/// Values derived from the host alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub company: String,
    pub location: String,
    pub practice_type: String,
}

/// Derive a company name, location and practice type from the target host.
pub fn baseline(target: &Target) -> Baseline {
    let host = target.host.strip_prefix("www.").unwrap_or(&target.host);
    let first_label = host.split('.').next().unwrap_or_default();

    let words: Vec<String> = first_label
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();
    let company = if words.is_empty() {
        format!("Unknown {COMPANY_SUFFIX}")
    } else {
        format!("{} {COMPANY_SUFFIX}", words.join(" "))
    };

    let tld = host.rsplit('.').next().unwrap_or_default();

    Baseline {
        company,
        location: country_for_tld(tld).unwrap_or_default().to_string(),
        practice_type: infer_practice_type(host).to_string(),
    }
}

fn country_for_tld(tld: &str) -> Option<&'static str> {
    let country = match tld {
        "uk" => "United Kingdom",
        "ca" => "Canada",
        "au" => "Australia",
        "nz" => "New Zealand",
        "ie" => "Ireland",
        "de" => "Germany",
        "fr" => "France",
        "es" => "Spain",
        "it" => "Italy",
        "nl" => "Netherlands",
        "be" => "Belgium",
        "ch" => "Switzerland",
        "se" => "Sweden",
        "no" => "Norway",
        "dk" => "Denmark",
        "in" => "India",
        "sg" => "Singapore",
        "za" => "South Africa",
        "mx" => "Mexico",
        "br" => "Brazil",
        "jp" => "Japan",
        "ae" => "United Arab Emirates",
        _ => return None,
    };
    Some(country)
}

/// The record produced when the classifier gives us nothing.
pub fn fallback_lead(target: &Target) -> LeadRecord {
    let base = baseline(target);
    let mut lead = LeadRecord {
        practice_id: PracticeId::generate(&base.company),
        company: base.company,
        domain: target.host.clone(),
        source_url: target.url.to_string(),
        location: base.location,
        phone: None,
        email: None,
        services: FALLBACK_SERVICES.iter().map(|s| s.to_string()).collect(),
        treatments: FALLBACK_TREATMENTS.iter().map(|s| s.to_string()).collect(),
        specializations: Vec::new(),
        practice_type: base.practice_type,
        lead_score: 0,
        enrichment_succeeded: false,
        created_at: Utc::now(),
    };
    lead.lead_score = score(&ScoreSignals::from_record(&lead, false));
    lead
}

/// Classifier fields win over the baseline whenever they are non-empty.
fn merged_lead(target: &Target, base: Baseline, found: Classification, rich_content: bool) -> LeadRecord {
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

    let practice_type = if found.practice_type.is_empty() || found.practice_type == DEFAULT_PRACTICE_TYPE {
        base.practice_type
    } else {
        found.practice_type
    };

    let mut lead = LeadRecord {
        practice_id: PracticeId::generate(&base.company),
        company: base.company,
        domain: target.host.clone(),
        source_url: target.url.to_string(),
        location: non_empty(found.location).unwrap_or(base.location),
        phone: non_empty(found.phone),
        email: non_empty(found.email),
        services: found.services,
        treatments: found.treatments,
        specializations: found.specializations,
        practice_type,
        lead_score: 0,
        enrichment_succeeded: true,
        created_at: Utc::now(),
    };
    lead.lead_score = score(&ScoreSignals::from_record(&lead, rich_content));
    lead
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Output of the enrichment phase.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub record: LeadRecord,
    /// Why the baseline record was used, if it was.
    pub fallback_reason: Option<String>,
}

/// Enrichment adapter over a [`ContentClassifier`].
pub struct Enricher {
    classifier: Arc<dyn ContentClassifier>,
    timeout: Duration,
}

impl Enricher {
    pub fn new(classifier: Arc<dyn ContentClassifier>, timeout: Duration) -> Self {
        Self { classifier, timeout }
    }

    /// Parse `input` and enrich it. Fails only on an invalid target.
    pub async fn enrich(&self, input: &str) -> Result<Enrichment> {
        let target = parse_target(input)?;
        Ok(self.enrich_target(&target).await)
    }

    /// Enrich an already parsed target. Never fails.
    #[instrument(skip_all, fields(host = %target.host))]
    pub async fn enrich_target(&self, target: &Target) -> Enrichment {
        let base = baseline(target);
        let query = format!("{} {} services treatments contact", base.company, target.host);

        let searched = tokio::time::timeout(self.timeout, self.classifier.search(&query, &target.host)).await;
        let text = match searched {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => return self.degraded(target, "search returned no content".into()),
            Ok(Err(e)) => return self.degraded(target, e.to_string()),
            Err(_) => {
                return self.degraded(target, LeadpipeError::timeout("search", self.timeout).to_string());
            }
        };

        let found = self.classifier.classify(&text);
        if found.is_empty() {
            return self.degraded(target, "no usable content in search results".into());
        }

        let rich_content = text.chars().count() >= RICH_CONTENT_CHARS;
        debug!(chars = text.len(), rich_content, "classified search content");

        let record = merged_lead(target, base, found, rich_content);
        info!(
            practice_id = %record.practice_id,
            score = record.lead_score,
            services = record.services.len(),
            "lead enriched"
        );
        Enrichment {
            record,
            fallback_reason: None,
        }
    }

    fn degraded(&self, target: &Target, reason: String) -> Enrichment {
        warn!(host = %target.host, %reason, "enrichment degraded to baseline record");
        Enrichment {
            record: fallback_lead(target),
            fallback_reason: Some(reason),
        }
    }
}

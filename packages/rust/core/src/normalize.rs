//! Record validator/normalizer.
//!
//! A total function from a lead to the record the store receives: free text
//! is cleaned and truncated, lists are collapsed into one bounded string,
//! invalid contact details become empty strings and empty fields get
//! defaults. Applying it to its own output changes nothing.

use std::sync::LazyLock;

use leadpipe_classifier::DEFAULT_PRACTICE_TYPE;
use leadpipe_shared::text::truncate_chars;
use leadpipe_shared::{LeadRecord, NormalizedRecord};
use regex::Regex;

/// Maximum field lengths, in characters.
pub mod limits {
    pub const COMPANY: usize = 100;
    pub const DOMAIN: usize = 253;
    pub const SOURCE_URL: usize = 500;
    pub const LOCATION: usize = 150;
    pub const PHONE: usize = 30;
    pub const EMAIL: usize = 254;
    pub const PRACTICE_TYPE: usize = 50;
    /// Items kept per list field.
    pub const LIST_ITEMS: usize = 10;
    pub const LIST_ITEM: usize = 80;
    /// Joined list representation.
    pub const LIST_JOINED: usize = 500;
    pub const MAX_SCORE: u8 = 100;
}

pub const DEFAULT_COMPANY: &str = "Unknown Practice";
pub const DEFAULT_DOMAIN: &str = "unknown";

/// Separator used when collapsing list fields.
pub const LIST_SEPARATOR: &str = ", ";

const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("valid regex")
});

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("valid regex"));

/// Anything that can be turned into a [`NormalizedRecord`].
pub trait Normalize {
    fn normalize(&self) -> NormalizedRecord;
}

/// Normalize an enrichment result.
pub fn normalize(lead: &LeadRecord) -> NormalizedRecord {
    lead.normalize()
}

impl Normalize for LeadRecord {
    fn normalize(&self) -> NormalizedRecord {
        let domain = normalize_domain(&self.domain);
        NormalizedRecord {
            practice_id: self.practice_id.clone(),
            company: field_or(&self.company, limits::COMPANY, DEFAULT_COMPANY),
            source_url: normalize_url(&self.source_url, &domain),
            location: field(&self.location, limits::LOCATION),
            phone: self.phone.as_deref().map(normalize_phone).unwrap_or_default(),
            email: self.email.as_deref().map(normalize_email).unwrap_or_default(),
            services: collapse_list(&self.services),
            treatments: collapse_list(&self.treatments),
            specializations: collapse_list(&self.specializations),
            practice_type: field_or(&self.practice_type, limits::PRACTICE_TYPE, DEFAULT_PRACTICE_TYPE),
            lead_score: self.lead_score.min(limits::MAX_SCORE),
            enrichment_succeeded: self.enrichment_succeeded,
            created_at: self.created_at,
            domain,
        }
    }
}

impl Normalize for NormalizedRecord {
    fn normalize(&self) -> NormalizedRecord {
        let domain = normalize_domain(&self.domain);
        NormalizedRecord {
            practice_id: self.practice_id.clone(),
            company: field_or(&self.company, limits::COMPANY, DEFAULT_COMPANY),
            source_url: normalize_url(&self.source_url, &domain),
            location: field(&self.location, limits::LOCATION),
            phone: normalize_phone(&self.phone),
            email: normalize_email(&self.email),
            services: bound_joined(&self.services),
            treatments: bound_joined(&self.treatments),
            specializations: bound_joined(&self.specializations),
            practice_type: field_or(&self.practice_type, limits::PRACTICE_TYPE, DEFAULT_PRACTICE_TYPE),
            lead_score: self.lead_score.min(limits::MAX_SCORE),
            enrichment_succeeded: self.enrichment_succeeded,
            created_at: self.created_at,
            domain,
        }
    }
}

/// Smallest valid record for `lead`, with no list content and no contact details.
pub fn minimal_record(lead: &LeadRecord) -> NormalizedRecord {
    let domain = normalize_domain(&lead.domain);
    NormalizedRecord {
        practice_id: lead.practice_id.clone(),
        company: field_or(&lead.company, limits::COMPANY, DEFAULT_COMPANY),
        source_url: normalize_url(&lead.source_url, &domain),
        location: String::new(),
        phone: String::new(),
        email: String::new(),
        services: String::new(),
        treatments: String::new(),
        specializations: String::new(),
        practice_type: DEFAULT_PRACTICE_TYPE.to_string(),
        lead_score: lead.lead_score.min(limits::MAX_SCORE),
        enrichment_succeeded: lead.enrichment_succeeded,
        created_at: lead.created_at,
        domain,
    }
}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

/// Drop control and zero-width characters and collapse whitespace runs.
pub fn clean_text(input: &str) -> String {
    let visible: String = input
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control() && !is_invisible(*c))
        .collect();
    visible.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}')
}

/// Clean, then truncate without leaving a dangling separator.
fn field(input: &str, max: usize) -> String {
    let cleaned = clean_text(input);
    truncate_chars(&cleaned, max)
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string()
}

fn field_or(input: &str, max: usize, default: &str) -> String {
    let value = field(input, max);
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

fn normalize_domain(input: &str) -> String {
    let domain = field(&input.to_ascii_lowercase(), limits::DOMAIN);
    // Trailing separators are trimmed as one class so no pass exposes another.
    let domain = domain.trim_end_matches(|c: char| matches!(c, ',' | '.') || c.is_whitespace());
    if domain.is_empty() {
        DEFAULT_DOMAIN.to_string()
    } else {
        domain.to_string()
    }
}

/// Prefix a scheme instead of rejecting; fall back to the domain.
fn normalize_url(input: &str, domain: &str) -> String {
    let cleaned = clean_text(input).replace(' ', "%20");
    let with_scheme = if cleaned.is_empty() {
        format!("https://{domain}")
    } else if SCHEME_RE.is_match(&cleaned) {
        cleaned
    } else {
        format!("https://{cleaned}")
    };
    truncate_chars(&with_scheme, limits::SOURCE_URL).to_string()
}

fn normalize_phone(input: &str) -> String {
    let kept: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | '.' | ' '))
        .collect();
    let phone = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    let digits = phone.chars().filter(char::is_ascii_digit).count();

    if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) && phone.chars().count() <= limits::PHONE {
        phone
    } else {
        String::new()
    }
}

fn normalize_email(input: &str) -> String {
    let email = clean_text(input).to_ascii_lowercase();
    if email.chars().count() <= limits::EMAIL && EMAIL_RE.is_match(&email) {
        email
    } else {
        String::new()
    }
}

/// Clean, cap and join list items into one bounded string.
fn collapse_list(items: &[String]) -> String {
    let kept: Vec<String> = items
        .iter()
        .map(|item| field(item, limits::LIST_ITEM))
        .filter(|item| !item.is_empty())
        .take(limits::LIST_ITEMS)
        .collect();
    bound_joined(&kept.join(LIST_SEPARATOR))
}

fn bound_joined(joined: &str) -> String {
    field(joined, limits::LIST_JOINED)
}

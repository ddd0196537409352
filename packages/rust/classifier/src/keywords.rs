//! Keyword classifier: turns raw page/search text into lead signals.
//!
//! Each vocabulary entry is a canonical label plus a case-insensitive pattern.
//! Matches are reported in order of first appearance, deduplicated by label.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::Classification;

/// Raw text at least this long counts as "rich content" for scoring.
pub const RICH_CONTENT_CHARS: usize = 2_000;

/// Practice type used when no category keyword matches.
pub const DEFAULT_PRACTICE_TYPE: &str = "healthcare";

struct Term {
    label: &'static str,
    re: Regex,
}

fn vocabulary(entries: &[(&'static str, &str)]) -> Vec<Term> {
    entries
        .iter()
        .map(|&(label, pattern)| Term {
            label,
            re: Regex::new(&format!(r"(?i)\b(?:{pattern})\b")).expect("valid regex"),
        })
        .collect()
}

static SERVICES: LazyLock<Vec<Term>> = LazyLock::new(|| {
    vocabulary(&[
        ("General Dentistry", r"general dentistry|family dentistry"),
        ("Cosmetic Dentistry", r"cosmetic dentistry"),
        ("Orthodontics", r"orthodontics?|orthodontist"),
        ("Dental Implants", r"dental implants?|implant dentistry"),
        ("Teeth Whitening", r"teeth whitening|tooth whitening"),
        ("Periodontics", r"periodontics?|gum disease treatment"),
        ("Endodontics", r"endodontics?"),
        ("Oral Surgery", r"oral surgery|oral surgeon"),
        ("Emergency Care", r"emergency (?:care|dentistry|dental care|appointments?)"),
        ("Chiropractic Care", r"chiropractic (?:care|adjustments?)"),
        ("Physical Therapy", r"physical therapy|physiotherapy"),
        ("Massage Therapy", r"massage therapy|therapeutic massage"),
        ("Acupuncture", r"acupuncture"),
        ("Primary Care", r"primary care"),
        ("Telehealth", r"telehealth|telemedicine|virtual visits?"),
        ("Dermatology", r"medical dermatology|dermatology services"),
        ("Laser Treatments", r"laser (?:treatments?|hair removal|therapy)"),
        ("Vaccinations", r"vaccinations?|immunizations?"),
        ("Diagnostics", r"diagnostics?|x-rays?|lab testing"),
        ("Preventive Care", r"preventive care|preventative care|check-?ups?"),
    ])
});

static TREATMENTS: LazyLock<Vec<Term>> = LazyLock::new(|| {
    vocabulary(&[
        ("Consultation", r"consultations?"),
        ("Cleanings", r"cleanings?|hygiene visits?"),
        ("Fillings", r"fillings?"),
        ("Crowns", r"crowns?"),
        ("Veneers", r"veneers?"),
        ("Root Canal", r"root canals?"),
        ("Extractions", r"extractions?|wisdom teeth removal"),
        ("Invisalign", r"invisalign|clear aligners?"),
        ("Braces", r"braces"),
        ("Dentures", r"dentures?"),
        ("Spinal Adjustment", r"spinal (?:adjustments?|manipulation)"),
        ("Spinal Decompression", r"spinal decompression"),
        ("Botox", r"botox"),
        ("Dermal Fillers", r"dermal fillers?"),
        ("Chemical Peel", r"chemical peels?"),
        ("Microneedling", r"microneedling"),
        ("Rehabilitation", r"rehabilitation|rehab programs?"),
        ("Dry Needling", r"dry needling"),
    ])
});

static SPECIALIZATIONS: LazyLock<Vec<Term>> = LazyLock::new(|| {
    vocabulary(&[
        ("Pediatric", r"pediatric|paediatric|children'?s"),
        ("Family", r"family practice|families"),
        ("Geriatric", r"geriatric|senior care"),
        ("Sports Medicine", r"sports medicine|sports injur(?:y|ies)"),
        ("Cosmetic", r"cosmetic|aesthetic"),
        ("Orthopedic", r"orthopedic|orthopaedic"),
        ("Sleep Apnea", r"sleep apnea"),
        ("Sedation", r"sedation dentistry|sedation"),
        ("Holistic", r"holistic|integrative"),
        ("Women's Health", r"women'?s health|prenatal"),
    ])
});

/// Practice categories checked against host names and page text, in priority order.
static PRACTICE_TYPES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("dental", r"dent|orthodont|teeth|tooth|smile"),
        ("chiropractic", r"chiro|spine|spinal"),
        ("dermatology", r"derm|skin"),
        ("veterinary", r"veterinar|\bvet\b|animal hospital"),
        ("physical-therapy", r"physio|physical therap|rehab"),
        ("medical", r"medical|clinic|physician|doctor|family medicine"),
    ]
    .into_iter()
    .map(|(label, pattern)| {
        (
            label,
            Regex::new(&format!("(?i){pattern}")).expect("valid regex"),
        )
    })
    .collect()
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").expect("valid regex")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid regex")
});

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z]+(?: [A-Z][a-zA-Z]+){0,2}), ([A-Z]{2})\b").expect("valid regex")
});

const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC",
];

/// Extract every signal the pipeline scores from `text`.
pub fn classify_text(text: &str) -> Classification {
    Classification {
        services: find_terms(&SERVICES, text),
        treatments: find_terms(&TREATMENTS, text),
        specializations: find_terms(&SPECIALIZATIONS, text),
        phone: PHONE_RE.find(text).map(|m| m.as_str().trim().to_string()),
        email: EMAIL_RE.find(text).map(|m| m.as_str().to_string()),
        location: find_location(text),
        practice_type: infer_practice_type(text).to_string(),
    }
}

/// Best-matching practice category for `text` (a host name or page text).
///
/// The category with the most keyword hits wins; ties go to the earlier category.
pub fn infer_practice_type(text: &str) -> &'static str {
    let mut best = (DEFAULT_PRACTICE_TYPE, 0usize);
    for (label, re) in PRACTICE_TYPES.iter() {
        let hits = re.find_iter(text).count();
        if hits > best.1 {
            best = (*label, hits);
        }
    }
    best.0
}

fn find_terms(terms: &[Term], text: &str) -> Vec<String> {
    let mut found: Vec<(usize, &'static str)> = terms
        .iter()
        .filter_map(|term| term.re.find(text).map(|m| (m.start(), term.label)))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, label)| seen.insert(*label))
        .map(|(_, label)| label.to_string())
        .collect()
}

fn find_location(text: &str) -> Option<String> {
    LOCATION_RE
        .captures_iter(text)
        .find(|caps| US_STATES.contains(&&caps[2]))
        .map(|caps| format!("{}, {}", &caps[1], &caps[2]))
}

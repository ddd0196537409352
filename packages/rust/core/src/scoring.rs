//! Lead quality score: a pure, bounded function of enrichment signals.

use leadpipe_shared::LeadRecord;

/// Starting score before any signal is counted.
pub const BASE_SCORE: u32 = 50;

/// Points per service, capped at [`SERVICES_CAP`].
pub const POINTS_PER_SERVICE: u32 = 5;
pub const SERVICES_CAP: u32 = 25;

/// Points per treatment, capped at [`TREATMENTS_CAP`].
pub const POINTS_PER_TREATMENT: u32 = 4;
pub const TREATMENTS_CAP: u32 = 20;

/// Any specialization at all.
pub const SPECIALIZATIONS_BONUS: u32 = 5;
pub const PHONE_BONUS: u32 = 10;
pub const EMAIL_BONUS: u32 = 10;
pub const LOCATION_BONUS: u32 = 5;
pub const RICH_CONTENT_BONUS: u32 = 5;

pub const MAX_SCORE: u32 = 100;

/// Signals the score is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreSignals {
    pub services: usize,
    pub treatments: usize,
    pub specializations: usize,
    pub has_phone: bool,
    pub has_email: bool,
    pub has_location: bool,
    pub rich_content: bool,
}

impl ScoreSignals {
    /// Signals present on an existing record.
    pub fn from_record(lead: &LeadRecord, rich_content: bool) -> Self {
        Self {
            services: lead.services.len(),
            treatments: lead.treatments.len(),
            specializations: lead.specializations.len(),
            has_phone: lead.phone.as_deref().is_some_and(|p| !p.trim().is_empty()),
            has_email: lead.email.as_deref().is_some_and(|e| !e.trim().is_empty()),
            has_location: !lead.location.trim().is_empty(),
            rich_content,
        }
    }
}

fn capped(count: usize, points: u32, cap: u32) -> u32 {
    u32::try_from(count)
        .unwrap_or(u32::MAX)
        .saturating_mul(points)
        .min(cap)
}

fn flag(present: bool, points: u32) -> u32 {
    if present { points } else { 0 }
}

/// Score in `0..=100`, monotonic in every signal.
pub fn score(signals: &ScoreSignals) -> u8 {
    let total = BASE_SCORE
        + capped(signals.services, POINTS_PER_SERVICE, SERVICES_CAP)
        + capped(signals.treatments, POINTS_PER_TREATMENT, TREATMENTS_CAP)
        + flag(signals.specializations > 0, SPECIALIZATIONS_BONUS)
        + flag(signals.has_phone, PHONE_BONUS)
        + flag(signals.has_email, EMAIL_BONUS)
        + flag(signals.has_location, LOCATION_BONUS)
        + flag(signals.rich_content, RICH_CONTENT_BONUS);

    u8::try_from(total.min(MAX_SCORE)).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> ScoreSignals {
        ScoreSignals {
            services: 50,
            treatments: 50,
            specializations: 50,
            has_phone: true,
            has_email: true,
            has_location: true,
            rich_content: true,
        }
    }

    #[test]
    fn base_and_bounds() {
        assert_eq!(score(&ScoreSignals::default()), 50);
        assert_eq!(score(&full()), 100);

        let huge = ScoreSignals {
            services: usize::MAX,
            treatments: usize::MAX,
            ..Default::default()
        };
        assert!(score(&huge) <= 100);
    }

    #[test]
    fn fallback_record_scores_59() {
        let signals = ScoreSignals {
            services: 1,
            treatments: 1,
            ..Default::default()
        };
        assert_eq!(score(&signals), 59);
    }

    #[test]
    fn caps_apply_per_signal() {
        let five = ScoreSignals { services: 5, ..Default::default() };
        let nine = ScoreSignals { services: 9, ..Default::default() };
        assert_eq!(score(&five), 75);
        assert_eq!(score(&nine), 75);

        let treatments = ScoreSignals { treatments: 12, ..Default::default() };
        assert_eq!(score(&treatments), 70);
    }

    fn assert_step(base: ScoreSignals, n: usize, set: fn(&mut ScoreSignals, usize)) {
        let mut lo = base;
        let mut hi = base;
        set(&mut lo, n);
        set(&mut hi, n + 1);
        assert!(score(&lo) <= score(&hi), "{lo:?} vs {hi:?}");
    }

    #[test]
    fn monotonic_in_each_count() {
        let bases = [
            ScoreSignals::default(),
            full(),
            ScoreSignals { has_phone: true, ..Default::default() },
        ];
        for base in bases {
            for n in 0..30 {
                assert_step(base, n, |s, n| s.services = n);
                assert_step(base, n, |s, n| s.treatments = n);
                assert_step(base, n, |s, n| s.specializations = n);
            }
        }
    }

    #[test]
    fn monotonic_in_each_flag() {
        let off = ScoreSignals::default();
        let setters: [fn(&mut ScoreSignals); 4] = [
            |s| s.has_phone = true,
            |s| s.has_email = true,
            |s| s.has_location = true,
            |s| s.rich_content = true,
        ];
        for set in setters {
            let mut on = off;
            set(&mut on);
            assert!(score(&on) > score(&off));
        }
    }
}

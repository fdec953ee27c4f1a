//! Keyword-scored domain detection.
//!
//! Every profile counts how often its keyword stems occur in the lowercased
//! module text. The highest score wins; ties go to the profile registered
//! first. Nothing scoring above zero yields [`GENERAL`], whose empty
//! vocabulary makes downstream stages fall back to title terms.

use tracing::debug;

/// Static description of one professional field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProfile {
    pub name: &'static str,
    /// Lowercase stems counted during detection.
    pub keywords: &'static [&'static str],
    /// Example vocabulary used to shape search queries.
    pub vocabulary: &'static [&'static str],
    /// Video search categories.
    pub categories: &'static [&'static str],
}

impl FieldProfile {
    pub fn is_general(&self) -> bool {
        self.name == GENERAL.name
    }

    fn score(&self, haystack: &str) -> usize {
        self.keywords
            .iter()
            .map(|kw| haystack.matches(kw).count())
            .sum()
    }
}

/// Fallback when no profile matches.
pub static GENERAL: FieldProfile = FieldProfile {
    name: "általános",
    keywords: &[],
    vocabulary: &[],
    categories: &[],
};

/// Built-in profiles in tie-break order.
pub static BUILTIN_PROFILES: &[FieldProfile] = &[
    FieldProfile {
        name: "hegesztés",
        keywords: &[
            "hegeszt", "varrat", "elektród", "védőgáz", "forraszt", "lángvág", "ívheg",
        ],
        vocabulary: &[
            "ívhegesztés", "AWI", "MIG", "MAG", "védőgáz", "varrat", "elektróda",
            "hegesztési varrat",
        ],
        categories: &["hegesztés", "hegesztéstechnika", "fémmegmunkálás"],
    },
    FieldProfile {
        name: "robotika",
        keywords: &[
            "robot", "automatiz", "manipulátor", "plc", "szenzor", "aktuátor", "vezérl",
        ],
        vocabulary: &[
            "ipari robot", "robotkar", "PLC", "szenzor", "aktuátor", "pályatervezés",
        ],
        categories: &["robotika", "automatizálás", "ipari robotok"],
    },
    FieldProfile {
        name: "szakácsművészet",
        keywords: &[
            "főzés", "főző", "recept", "konyha", "sütés", "hozzávaló", "gasztronóm", "szakács",
        ],
        vocabulary: &[
            "recept", "hozzávalók", "konyhatechnológia", "HACCP", "sütés", "párolás",
        ],
        categories: &["főzés", "gasztronómia", "konyhatechnológia"],
    },
    FieldProfile {
        name: "villamosság",
        keywords: &[
            "villamos", "áramkör", "feszültség", "ellenállás", "vezeték", "transzformátor",
            "kismegszakító",
        ],
        vocabulary: &[
            "áramkör", "feszültség", "érintésvédelem", "kismegszakító", "földelés",
            "transzformátor",
        ],
        categories: &["villanyszerelés", "elektrotechnika", "villamos biztonság"],
    },
    FieldProfile {
        name: "informatika",
        keywords: &[
            "szoftver", "adatbázis", "hálózat", "számítógép", "algoritmus", "programoz",
        ],
        vocabulary: &["adatbázis", "algoritmus", "hálózat", "programozás", "operációs rendszer"],
        categories: &["informatika", "programozás", "szoftverfejlesztés"],
    },
    FieldProfile {
        name: "gépjárműtechnika",
        keywords: &[
            "autószerel", "gépjármű", "jármű", "fékrendszer", "futómű", "sebességváltó",
            "motordiagnosztik",
        ],
        vocabulary: &["fékrendszer", "futómű", "motordiagnosztika", "sebességváltó", "OBD"],
        categories: &["autószerelés", "gépjárműtechnika", "járműdiagnosztika"],
    },
];

/// Classifies module text into a [`FieldProfile`]. Read-only after construction.
#[derive(Debug, Clone)]
pub struct FieldDetector {
    profiles: Vec<FieldProfile>,
}

impl Default for FieldDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldDetector {
    pub fn new() -> Self {
        Self::with_profiles(BUILTIN_PROFILES.to_vec())
    }

    /// Use a custom profile list; order decides ties.
    pub fn with_profiles(profiles: Vec<FieldProfile>) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &[FieldProfile] {
        &self.profiles
    }

    /// Look up a profile by name, falling back to [`GENERAL`].
    pub fn profile(&self, name: &str) -> &FieldProfile {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .unwrap_or(&GENERAL)
    }

    pub fn detect(
        &self,
        title: &str,
        content: &str,
        subject: Option<&str>,
        profession: Option<&str>,
    ) -> &FieldProfile {
        let haystack = [Some(title), Some(content), subject, profession]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut best: Option<(&FieldProfile, usize)> = None;
        for profile in &self.profiles {
            let score = profile.score(&haystack);
            // Strictly greater: the earlier profile keeps a tie
            if score > 0 && best.is_none_or(|(_, top)| score > top) {
                best = Some((profile, score));
            }
        }

        match best {
            Some((profile, score)) => {
                debug!(field = profile.name, score, "field detected");
                profile
            }
            None => {
                debug!("no field keywords matched");
                &GENERAL
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_welding() {
        let detector = FieldDetector::new();
        let field = detector.detect(
            "AWI hegesztés alapjai",
            "A hegesztés során a varrat minősége a védőgáz tisztaságától függ.",
            None,
            Some("Hegesztő"),
        );
        assert_eq!(field.name, "hegesztés");
    }

    #[test]
    fn subject_and_profession_count() {
        let detector = FieldDetector::new();
        let field = detector.detect("Bevezetés", "Általános tudnivalók.", Some("Robotika"), None);
        assert_eq!(field.name, "robotika");
    }

    #[test]
    fn no_match_is_general() {
        let detector = FieldDetector::new();
        let field = detector.detect("Történelem", "A reformkor eseményei.", None, None);
        assert!(field.is_general());
        assert!(field.vocabulary.is_empty());
    }

    #[test]
    fn tie_goes_to_first_registered() {
        static A: &[&str] = &["alpha"];
        static B: &[&str] = &["beta"];
        let detector = FieldDetector::with_profiles(vec![
            FieldProfile {
                name: "a",
                keywords: A,
                vocabulary: &[],
                categories: &[],
            },
            FieldProfile {
                name: "b",
                keywords: B,
                vocabulary: &[],
                categories: &[],
            },
        ]);
        assert_eq!(detector.detect("beta alpha", "", None, None).name, "a");
        assert_eq!(detector.detect("beta alpha beta", "", None, None).name, "b");
    }

    #[test]
    fn higher_score_wins_over_order() {
        let detector = FieldDetector::new();
        let field = detector.detect(
            "Receptek",
            "A robot a konyhában: recept, recept, sütés és főzés.",
            None,
            None,
        );
        assert_eq!(field.name, "szakácsművészet");
    }

    #[test]
    fn profile_lookup() {
        let detector = FieldDetector::new();
        assert_eq!(detector.profile("robotika").categories.len(), 3);
        assert!(detector.profile("ismeretlen").is_general());
    }
}

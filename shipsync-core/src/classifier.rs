//! Classification of the carrier's free-text status vocabulary.
//!
//! Carrier statuses are French strings we do not control. They are kept as
//! opaque text and classified by token matching after normalization. The
//! token lists below are the only part expected to change when the carrier's
//! wording drifts.

/// Whole words for "Livré" / "Livrée" (and plurals). Matched as words so
/// "livreur" or "livrer" never count.
const DELIVERED_WORDS: &[&str] = &["livre", "livree", "livres", "livrees"];

/// A delivered word preceded by one of these within `NEGATION_WINDOW` words
/// is a non-delivery ("Non livré", "N'a pas été livré").
const NEGATIONS: &[&str] = &["non", "pas", "jamais"];
const NEGATION_WINDOW: usize = 3;

/// Return / failure tokens: in transit back, out of zone, cancelled,
/// refused by recipient, failed delivery.
const RETURN_TOKENS: &[&str] = &[
    "retour",
    "hors zone",
    "annul",
    "refus",
    "echec de livraison",
];

/// Stand-in left by decoders for bytes they could not map.
const WILDCARD: char = '\u{FFFD}';

/// UTF-8 sequences that were decoded as Latin-1 / Windows-1252.
const MOJIBAKE: &[(&str, &str)] = &[
    ("Ã©", "é"),
    ("Ã¨", "è"),
    ("Ãª", "ê"),
    ("Ã«", "ë"),
    ("Ã\u{a0}", "à"),
    ("Ã¢", "â"),
    ("Ã§", "ç"),
    ("Ã®", "î"),
    ("Ã¯", "ï"),
    ("Ã´", "ô"),
    ("Ã¹", "ù"),
    ("Ã»", "û"),
    ("Ã‰", "é"),
    ("Ã\u{89}", "é"),
    ("Ã€", "à"),
    ("Ã\u{80}", "à"),
];

/// A status reduced to lowercase ASCII words for token matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedStatus {
    chars: Vec<char>,
    /// Mojibake was found and repaired.
    pub repaired: bool,
}

impl NormalizedStatus {
    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    /// Replacement characters survived normalization.
    pub fn has_wildcards(&self) -> bool {
        self.chars.contains(&WILDCARD)
    }

    /// Whether the carrier string carried any encoding artifact.
    pub fn had_encoding_artifacts(&self) -> bool {
        self.repaired || self.has_wildcards()
    }

    /// Words split on anything that is not alphanumeric. Replacement
    /// characters stay inside words.
    pub fn words(&self) -> Vec<Vec<char>> {
        let mut words = Vec::new();
        let mut current = Vec::new();
        for &c in &self.chars {
            if c.is_alphanumeric() || c == WILDCARD {
                current.push(c);
            } else if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
        words
    }

    /// Substring match where a replacement character matches any single
    /// token character.
    pub fn contains(&self, token: &str) -> bool {
        let token: Vec<char> = token.chars().collect();
        if token.is_empty() {
            return true;
        }
        if token.len() > self.chars.len() {
            return false;
        }
        self.chars.windows(token.len()).any(|window| {
            window
                .iter()
                .zip(&token)
                .all(|(c, t)| c == t || *c == WILDCARD)
        })
    }
}

pub fn normalize(status: &str) -> NormalizedStatus {
    let mut text = status.to_string();
    let mut repaired = false;
    for (broken, fixed) in MOJIBAKE {
        if text.contains(broken) {
            text = text.replace(broken, fixed);
            repaired = true;
        }
    }

    let folded: String = text
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .collect();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    NormalizedStatus {
        chars: collapsed.chars().collect(),
        repaired,
    }
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        '\u{2019}' | '`' => '\'',
        _ => c,
    }
}

/// True when the parcel was handed to the recipient. The only status that
/// triggers settlement. Never true for a return status, so "Retour livré au
/// vendeur" is a return.
pub fn is_delivered(status: &str) -> bool {
    let normalized = normalize(status);
    says_delivered(&normalized) && !matches_return(&normalized)
}

fn word_is(word: &[char], token: &str) -> bool {
    word.len() == token.chars().count()
        && word.iter().zip(token.chars()).all(|(c, t)| *c == t || *c == WILDCARD)
}

fn says_delivered(normalized: &NormalizedStatus) -> bool {
    let words = normalized.words();
    words.iter().enumerate().any(|(i, word)| {
        DELIVERED_WORDS.iter().any(|token| word_is(word, token))
            && !words[i.saturating_sub(NEGATION_WINDOW)..i]
                .iter()
                .any(|before| NEGATIONS.iter().any(|neg| word_is(before, neg)))
    })
}

pub fn is_return_status(status: &str) -> bool {
    matches_return(&normalize(status))
}

fn matches_return(normalized: &NormalizedStatus) -> bool {
    RETURN_TOKENS.iter().any(|token| normalized.contains(token))
}

/// Coarse view of a status for logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Delivered,
    Return,
    InProgress,
}

impl StatusClass {
    pub fn of(status: &str) -> Self {
        let normalized = normalize(status);
        if matches_return(&normalized) {
            StatusClass::Return
        } else if says_delivered(&normalized) {
            StatusClass::Delivered
        } else {
            StatusClass::InProgress
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Delivered => "delivered",
            StatusClass::Return => "return",
            StatusClass::InProgress => "in_progress",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivered_variants() {
        assert!(is_delivered("Livré"));
        assert!(is_delivered("  LIVRÉ  "));
        assert!(is_delivered("Colis livré au client"));
        assert!(is_delivered("LivrÃ©"));
        assert!(is_delivered("Livr\u{FFFD}"));
    }

    #[test]
    fn test_courier_wording_is_not_delivery() {
        for status in [
            "Remis au livreur",
            "Prêt à livrer",
            "Affecté au livreur",
            "En attente de livreur",
            "Livraison prévue demain",
        ] {
            assert!(!is_delivered(status), "{status} should not be delivered");
            assert_eq!(StatusClass::of(status), StatusClass::InProgress);
        }
    }

    #[test]
    fn test_negated_delivery() {
        for status in ["Non livré", "Colis non livré", "N'a pas été livré", "Colis pas livre"] {
            assert!(!is_delivered(status), "{status} should not be delivered");
        }
        assert!(is_delivered("Livrée"));
        assert!(is_delivered("Colis livré, signé par le client"));
        assert!(is_delivered("Livré (non signé)"));
    }

    #[test]
    fn test_in_progress_is_neither() {
        for status in ["En cours de livraison", "Expédié", "Centre de tri", "En préparation", ""] {
            assert!(!is_delivered(status), "{status} should not be delivered");
            assert!(!is_return_status(status), "{status} should not be a return");
            assert_eq!(StatusClass::of(status), StatusClass::InProgress);
        }
    }

    #[test]
    fn test_return_tokens() {
        for status in [
            "Annuler",
            "Annulé par le transporteur",
            "AnnulÃ© par le transporteur",
            "En transit retour",
            "Retourné au vendeur",
            "Hors   zone",
            "Refusé par le destinataire",
            "Echec de livraison",
        ] {
            assert!(is_return_status(status), "{status} should be a return");
            assert!(!is_delivered(status), "{status} should not be delivered");
        }
    }

    #[test]
    fn test_delivered_and_return_are_exclusive() {
        let status = "Retour livré au vendeur";
        assert!(is_return_status(status));
        assert!(!is_delivered(status));
        assert_eq!(StatusClass::of(status), StatusClass::Return);
    }

    #[test]
    fn test_normalize_reports_artifacts() {
        let clean = normalize("Livré");
        assert_eq!(clean.as_string(), "livre");
        assert!(!clean.had_encoding_artifacts());

        let repaired = normalize("LivrÃ©");
        assert_eq!(repaired.as_string(), "livre");
        assert!(repaired.repaired);

        let broken = normalize("Livr\u{FFFD}");
        assert!(broken.has_wildcards());
        assert!(broken.had_encoding_artifacts());
    }
}

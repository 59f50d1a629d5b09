//! Free-text pricing labels to the four-value [`Pricing`] enum
//!
//! Import files and older clients describe pricing in many ways and many
//! languages. Anything unrecognized maps to `None` so the row can still be
//! imported without pricing.

use crate::model::Pricing;

const FULLY_FREE: &[&str] = &[
    "fully_free", "fully free", "free", "totally free", "completely free", "100% free", "gratis",
    "no cost", "open source", "opensource", "foss", "free forever",
    // bs/hr/sr
    "besplatno", "besplatan", "besplatna", "potpuno besplatno", "бесплатно",
    // de
    "kostenlos", "kostenfrei", "umsonst",
    // es / pt / it / fr
    "gratuito", "gratuita", "grátis", "libre", "gratuit", "gratuite",
    // pl / cs / sk / sl
    "darmowy", "darmowe", "za darmo", "zdarma", "brezplačno", "brezplacno", "bezplatne",
    // sv / fi / tr
    "kostnadsfri", "ilmainen", "ücretsiz", "ucretsiz",
];

const FREEMIUM: &[&str] = &[
    "freemium", "free plan", "free tier", "free + paid", "free/paid", "free and paid",
    "free with paid plans", "free with premium", "partially free", "free basic", "free + pro",
    "djelimično besplatno", "djelimicno besplatno", "delimično besplatno", "delimicno besplatno",
    "teilweise kostenlos", "basis kostenlos", "parcialmente gratuito", "partiellement gratuit",
    "częściowo darmowy", "частично бесплатно", "условно бесплатно",
];

const FREE_TRIAL: &[&str] = &[
    "free_trial", "free trial", "trial", "free trial available", "trial available", "demo",
    "probni period", "besplatna proba", "probno",
    "testversion", "kostenlose testversion", "probezeit", "prueba gratuita", "prueba",
    "essai gratuit", "essai", "prova gratuita", "teste grátis", "teste gratis",
    "okres próbny", "darmowy okres próbny", "пробный период", "пробная версия",
];

const PAID: &[&str] = &[
    "paid", "premium", "subscription", "commercial", "pro", "one-time purchase", "one time purchase",
    "license", "licence", "purchase", "buy", "$", "€",
    "plaćeno", "placeno", "plaćen", "placen", "naplata", "pretplata",
    "kostenpflichtig", "bezahlt", "abonnement", "de pago", "pago", "pagado", "payant",
    "a pagamento", "pagamento", "płatny", "platny", "placený", "платно", "платный", "подписка",
    "betald", "maksullinen", "ücretli", "ucretli",
];

fn canonical(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase().replace(['_', '-'], " ");
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn matches_any(value: &str, vocabulary: &[&str]) -> bool {
    vocabulary.iter().any(|word| canonical(word) == value)
}

/// Word prefixes that mark a trial inside a longer phrase
const TRIAL_STEMS: &[&str] = &["trial", "probn", "próbn", "testversion", "prueba", "essai", "пробн"];

/// Word prefixes that mark a free offering
const FREE_STEMS: &[&str] = &["besplat", "kostenlos", "бесплат"];

/// Whole words that mark a free offering
const FREE_WORDS: &[&str] = &[
    "free", "gratis", "grátis", "gratuit", "gratuite", "gratuito", "gratuita", "zdarma", "umsonst",
];

/// Whole words that, next to "free", describe a freemium model
const UPSELL_WORDS: &[&str] = &["paid", "premium", "pro", "upgrade"];

/// Word prefixes that mark a paid offering
const PAID_STEMS: &[&str] = &["subscri", "pretplat", "kostenpflicht", "abonnement", "подписк"];

/// Whole words that mark a paid offering
const PAID_WORDS: &[&str] = &["paid", "plaćeno", "placeno", "payant", "bezahlt", "mo"];

fn words(value: &str) -> Vec<&str> {
    value
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect()
}

/// A currency sign directly before a number, as in `$9` or `€ 12`
fn has_price_tag(value: &str) -> bool {
    value.char_indices().any(|(i, c)| {
        matches!(c, '$' | '€' | '£')
            && value[i + c.len_utf8()..]
                .trim_start()
                .starts_with(|d: char| d.is_ascii_digit())
    })
}

/// Maps a free-text pricing label to [`Pricing`]
///
/// Exact vocabulary matches are tried first, then keyword fallbacks that
/// look for trial/freemium/free/paid words inside longer phrases. Keywords
/// only match whole words or word prefixes, never the middle of a word.
pub fn normalize_pricing(raw: &str) -> Option<Pricing> {
    let value = canonical(raw);
    if value.is_empty() {
        return None;
    }

    if matches_any(&value, FREE_TRIAL) {
        return Some(Pricing::FreeTrial);
    }
    if matches_any(&value, FREEMIUM) {
        return Some(Pricing::Freemium);
    }
    if matches_any(&value, FULLY_FREE) {
        return Some(Pricing::FullyFree);
    }
    if matches_any(&value, PAID) {
        return Some(Pricing::Paid);
    }

    let words = words(&value);
    let has_word = |list: &[&str]| words.iter().any(|word| list.contains(word));
    let has_stem = |list: &[&str]| {
        words
            .iter()
            .any(|word| list.iter().any(|stem| word.starts_with(stem)))
    };
    let per_period = words
        .windows(2)
        .any(|pair| pair[0] == "per" && matches!(pair[1], "month" | "year" | "user" | "seat"));

    if has_stem(TRIAL_STEMS) {
        return Some(Pricing::FreeTrial);
    }
    if words.contains(&"freemium") || (words.contains(&"free") && has_word(UPSELL_WORDS)) {
        return Some(Pricing::Freemium);
    }
    if has_word(FREE_WORDS) || has_stem(FREE_STEMS) {
        return Some(Pricing::FullyFree);
    }
    if has_word(PAID_WORDS) || has_stem(PAID_STEMS) || per_period || has_price_tag(&value) {
        return Some(Pricing::Paid);
    }

    None
}

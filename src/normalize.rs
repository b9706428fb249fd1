// Review text normalization: case-fold, strip non-letters, tokenize,
// POS-aware lemmatization, then stopword and length filtering.
//
// The tagger is a suffix heuristic with a small closed lexicon. It only has to
// pick between the four lemmatization roots (adjective, verb, adverb, noun),
// so a full tagger is not needed to collapse "working"/"works" onto "work".

use regex::Regex;

use crate::config::StopwordSet;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfSpeech {
    Adjective,
    Verb,
    Adverb,
    Noun,
}

const IRREGULAR_VERBS: &[(&str, &str)] = &[
    ("paid", "pay"), ("sent", "send"), ("took", "take"), ("taken", "take"),
    ("made", "make"), ("gave", "give"), ("given", "give"), ("got", "get"),
    ("gotten", "get"), ("went", "go"), ("gone", "go"), ("did", "do"),
    ("done", "do"), ("said", "say"), ("lost", "lose"), ("bought", "buy"),
    ("kept", "keep"), ("left", "leave"), ("told", "tell"), ("came", "come"),
    ("felt", "feel"), ("found", "find"), ("thought", "think"), ("brought", "bring"),
    ("agreed", "agree"), ("changed", "change"), ("changing", "change"),
    ("charged", "charge"), ("charging", "charge"), ("withdrew", "withdraw"),
    ("withdrawn", "withdraw"), ("knew", "know"), ("known", "know"), ("saw", "see"),
    ("seen", "see"), ("began", "begin"), ("begun", "begin"), ("wrote", "write"),
    ("written", "write"), ("chose", "choose"), ("chosen", "choose"),
    ("using", "use"), ("going", "go"), ("doing", "do"), ("being", "be"),
    ("does", "do"), ("goes", "go"),
];

const IRREGULAR_ADJECTIVES: &[(&str, &str)] = &[
    ("better", "good"), ("best", "good"), ("worse", "bad"), ("worst", "bad"),
    ("easier", "easy"), ("easiest", "easy"), ("faster", "fast"), ("fastest", "fast"),
    ("slower", "slow"), ("slowest", "slow"), ("simpler", "simple"), ("harder", "hard"),
];

const IRREGULAR_NOUNS: &[(&str, &str)] = &[
    ("children", "child"), ("men", "man"), ("women", "woman"), ("feet", "foot"),
    ("teeth", "tooth"), ("mice", "mouse"),
];

/// Words ending in -ing or -ed that are nouns in review text.
const NOUN_LOOKALIKES: &[&str] = &[
    "morning", "evening", "nothing", "something", "anything", "everything",
    "string", "spring", "building", "setting", "rating", "meeting", "ceiling",
    "during", "wedding", "hundred",
];

const ADJECTIVE_SUFFIXES: &[&str] = &["ful", "less", "ous", "able", "ible", "ive", "ish"];

pub struct Normalizer<'a> {
    non_letters: Regex,
    stopwords: &'a StopwordSet,
}

impl<'a> Normalizer<'a> {
    pub fn new(stopwords: &'a StopwordSet) -> Result<Self> {
        Ok(Normalizer {
            non_letters: Regex::new(r"[^a-z\s]")?,
            stopwords,
        })
    }

    /// Missing text is a valid review with no tokens.
    pub fn normalize(&self, raw_text: Option<&str>) -> Vec<String> {
        let Some(text) = raw_text else {
            return Vec::new();
        };

        let lowered = text.to_lowercase();
        let letters_only = self.non_letters.replace_all(&lowered, " ");

        letters_only
            .split_whitespace()
            .filter(|token| !self.stopwords.contains(token))
            .map(|token| lemmatize(token, tag(token)))
            .filter(|lemma| self.keep(lemma))
            .collect()
    }

    fn keep(&self, lemma: &str) -> bool {
        lemma.len() > 2
            && lemma.chars().all(|c| c.is_ascii_alphabetic())
            && !self.stopwords.contains(lemma)
    }
}

pub fn tag(word: &str) -> PartOfSpeech {
    if lookup(IRREGULAR_VERBS, word).is_some() {
        return PartOfSpeech::Verb;
    }
    if lookup(IRREGULAR_ADJECTIVES, word).is_some() {
        return PartOfSpeech::Adjective;
    }
    if lookup(IRREGULAR_NOUNS, word).is_some() || NOUN_LOOKALIKES.contains(&word) {
        return PartOfSpeech::Noun;
    }
    if word.len() > 4 && word.ends_with("ly") {
        return PartOfSpeech::Adverb;
    }
    if (word.len() > 5 && word.ends_with("ing")) || (word.len() > 4 && word.ends_with("ed")) {
        return PartOfSpeech::Verb;
    }
    if ADJECTIVE_SUFFIXES.iter().any(|suffix| word.len() > suffix.len() + 2 && word.ends_with(suffix)) {
        return PartOfSpeech::Adjective;
    }
    PartOfSpeech::Noun
}

pub fn lemmatize(word: &str, pos: PartOfSpeech) -> String {
    match pos {
        PartOfSpeech::Verb => lemmatize_verb(word),
        PartOfSpeech::Noun => lemmatize_noun(word),
        PartOfSpeech::Adjective => lookup(IRREGULAR_ADJECTIVES, word).unwrap_or(word).to_string(),
        PartOfSpeech::Adverb => word.to_string(),
    }
}

fn lookup<'t>(table: &'t [(&'t str, &'t str)], word: &str) -> Option<&'t str> {
    table.iter().find(|(form, _)| *form == word).map(|(_, lemma)| *lemma)
}

fn lemmatize_verb(word: &str) -> String {
    if let Some(lemma) = lookup(IRREGULAR_VERBS, word) {
        return lemma.to_string();
    }

    if word.len() > 4 {
        if let Some(stem) = word.strip_suffix("ied") {
            return format!("{stem}y");
        }
    }
    if word.len() > 5 {
        if let Some(stem) = word.strip_suffix("ing") {
            return repair_stem(stem);
        }
    }
    if word.len() > 4 {
        if let Some(stem) = word.strip_suffix("ed") {
            // "speed", "thread", "instead": not a past tense
            if stem.ends_with(is_vowel) {
                return word.to_string();
            }
            return repair_stem(stem);
        }
    }

    lemmatize_noun(word)
}

fn lemmatize_noun(word: &str) -> String {
    if let Some(lemma) = lookup(IRREGULAR_NOUNS, word) {
        return lemma.to_string();
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") || word.len() <= 3 {
        return word.to_string();
    }

    for suffix in ["sses", "xes", "ches", "shes", "zzes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.len() > 4 {
        if let Some(stem) = word.strip_suffix("ies") {
            return format!("{stem}y");
        }
    }
    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}

/// Undo the spelling changes English makes before -ed and -ing.
fn repair_stem(stem: &str) -> String {
    if stem.len() <= 2 {
        return format!("{stem}e");
    }
    if stem.ends_with("at") || stem.ends_with("bl") || stem.ends_with("iz") {
        return format!("{stem}e");
    }
    if ends_with_double_consonant(stem) && !stem.ends_with(['l', 's', 'z']) {
        return stem[..stem.len() - 1].to_string();
    }
    if stem.ends_with(['v', 'c', 'u']) || (stem.ends_with('z') && !stem.ends_with("zz")) {
        return format!("{stem}e");
    }
    if measure(stem) == 1 && ends_with_cvc(stem) {
        return format!("{stem}e");
    }
    stem.to_string()
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Number of vowel-consonant sequences, roughly the syllable count.
fn measure(word: &str) -> usize {
    let mut count = 0;
    let mut prev_is_vowel = false;
    for c in word.chars() {
        let vowel = is_vowel(c);
        if !vowel && prev_is_vowel {
            count += 1;
        }
        prev_is_vowel = vowel;
    }
    count
}

fn ends_with_double_consonant(word: &str) -> bool {
    let bytes = word.as_bytes();
    if bytes.len() < 2 {
        return false;
    }
    let last = bytes[bytes.len() - 1];
    last == bytes[bytes.len() - 2] && !is_vowel(last as char)
}

/// Consonant-vowel-consonant ending where the last consonant is not w, x or y.
fn ends_with_cvc(word: &str) -> bool {
    let bytes = word.as_bytes();
    if bytes.len() < 3 {
        return false;
    }
    let (first, middle, last) = (
        bytes[bytes.len() - 3] as char,
        bytes[bytes.len() - 2] as char,
        bytes[bytes.len() - 1] as char,
    );
    !is_vowel(first) && is_vowel(middle) && !is_vowel(last) && !matches!(last, 'w' | 'x' | 'y')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicConfig;

    fn stopwords() -> StopwordSet {
        StopwordSet::new(["the", "and", "app", "bank", "this", "was", "very", "not"])
    }

    #[test]
    fn test_working_and_works_collapse() {
        let set = stopwords();
        let normalizer = Normalizer::new(&set).unwrap();
        assert_eq!(normalizer.normalize(Some("Working")), vec!["work"]);
        assert_eq!(normalizer.normalize(Some("works")), vec!["work"]);
        assert_eq!(normalizer.normalize(Some("worked")), vec!["work"]);
    }

    #[test]
    fn test_strips_digits_punctuation_and_emoji() {
        let set = stopwords();
        let normalizer = Normalizer::new(&set).unwrap();
        let tokens = normalizer.normalize(Some("Transfer failed 3 times!!! 😡 #CBE"));
        assert_eq!(tokens, vec!["transfer", "fail", "time", "cbe"]);
    }

    #[test]
    fn test_drops_short_tokens_and_stopwords() {
        let set = stopwords();
        let normalizer = Normalizer::new(&set).unwrap();
        let tokens = normalizer.normalize(Some("The app is ok and the bank is slow"));
        assert_eq!(tokens, vec!["slow"]);
    }

    #[test]
    fn test_negation_survives() {
        let set = stopwords();
        let normalizer = Normalizer::new(&set).unwrap();
        let tokens = normalizer.normalize(Some("login not working"));
        assert_eq!(tokens, vec!["login", "not", "work"]);
    }

    #[test]
    fn test_surface_stopwords_dropped_before_lemmatizing() {
        let set = StopwordSet::new(["it", "and", "does", "goes", "they", "did", "themselves"]);
        let normalizer = Normalizer::new(&set).unwrap();
        assert_eq!(normalizer.normalize(Some("It goes slow and does nothing")), vec!["slow", "nothing"]);
        assert!(normalizer.normalize(Some("They did it themselves")).is_empty());
        assert_eq!(lemmatize("does", tag("does")), "do");
        assert_eq!(lemmatize("goes", tag("goes")), "go");
    }

    #[test]
    fn test_default_stopwords_keep_review_vocabulary() {
        let set = TopicConfig::default().stopwords();
        let normalizer = Normalizer::new(&set).unwrap();
        assert_eq!(normalizer.normalize(Some("login not working")), vec!["login", "not", "work"]);
        assert_eq!(normalizer.normalize(Some("The app does not work")), vec!["not", "work"]);
        assert_eq!(
            normalizer.normalize(Some("Need help to fix this problem")),
            vec!["need", "help", "fix", "problem"]
        );
    }

    #[test]
    fn test_missing_text_is_empty() {
        let set = stopwords();
        let normalizer = Normalizer::new(&set).unwrap();
        assert!(normalizer.normalize(None).is_empty());
        assert!(normalizer.normalize(Some("")).is_empty());
        assert!(normalizer.normalize(Some("!!! 123 ??")).is_empty());
    }

    #[test]
    fn test_tagger_roots() {
        assert_eq!(tag("quickly"), PartOfSpeech::Adverb);
        assert_eq!(tag("crashing"), PartOfSpeech::Verb);
        assert_eq!(tag("useless"), PartOfSpeech::Adjective);
        assert_eq!(tag("better"), PartOfSpeech::Adjective);
        assert_eq!(tag("transfers"), PartOfSpeech::Noun);
        assert_eq!(tag("morning"), PartOfSpeech::Noun);
    }

    #[test]
    fn test_verb_forms() {
        let cases = [
            ("crashing", "crash"),
            ("stopped", "stop"),
            ("transferred", "transfer"),
            ("installed", "install"),
            ("updated", "update"),
            ("making", "make"),
            ("closed", "close"),
            ("received", "receive"),
            ("using", "use"),
            ("applied", "apply"),
            ("loading", "load"),
            ("opening", "open"),
            ("paid", "pay"),
            ("speed", "speed"),
        ];
        for (form, lemma) in cases {
            assert_eq!(lemmatize(form, tag(form)), lemma, "lemma of {form}");
        }
    }

    #[test]
    fn test_noun_forms() {
        let cases = [
            ("transactions", "transaction"),
            ("branches", "branch"),
            ("stories", "story"),
            ("addresses", "address"),
            ("access", "access"),
            ("status", "status"),
            ("children", "child"),
        ];
        for (form, lemma) in cases {
            assert_eq!(lemmatize(form, PartOfSpeech::Noun), lemma, "lemma of {form}");
        }
    }

    #[test]
    fn test_adjective_forms() {
        assert_eq!(lemmatize("better", PartOfSpeech::Adjective), "good");
        assert_eq!(lemmatize("slower", tag("slower")), "slow");
    }
}

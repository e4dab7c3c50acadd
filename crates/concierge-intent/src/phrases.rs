// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Case-insensitive phrase detection.
//!
//! One type serves three lists: handoff requests, return-to-bot phrases,
//! and the responder's escalation indicators.

/// A set of lowercase phrases tested by substring containment.
#[derive(Debug, Clone, Default)]
pub struct PhraseDetector {
    phrases: Vec<String>,
}

impl PhraseDetector {
    /// Normalize phrases to trimmed lowercase and drop empty ones.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Whether any phrase occurs in `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    /// The first phrase found in `text`, in configured order.
    pub fn find(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.phrases
            .iter()
            .find(|p| lower.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_config::model::RoutingConfig;

    #[test]
    fn handoff_phrases_match_case_insensitively() {
        let detector = PhraseDetector::new(&RoutingConfig::default().handoff_phrases);
        assert!(detector.matches("Quiero hablar con un REPRESENTANTE"));
        assert!(detector.matches("me pasas con una persona real?"));
        assert_eq!(detector.find("Operador por favor"), Some("operador"));
        assert!(!detector.matches("Que servicios ofrecen?"));
    }

    #[test]
    fn resume_phrases_detect_return_to_bot() {
        let detector = PhraseDetector::new(&RoutingConfig::default().resume_phrases);
        assert!(detector.matches("Volver al bot"));
        assert!(detector.matches("quiero continuar con el bot"));
        assert!(!detector.matches("gracias"));
    }

    #[test]
    fn escalation_indicators_match_responder_text() {
        let detector = PhraseDetector::new(&RoutingConfig::default().escalation_indicators);
        assert!(detector.matches("Lo siento, no tengo esa informacion disponible."));
        assert!(!detector.matches("Nuestro horario es de 8 a 5."));
    }

    #[test]
    fn empty_phrases_are_dropped() {
        let detector = PhraseDetector::new(["", "   ", "Hola"]);
        assert_eq!(detector.phrases(), &["hola".to_string()]);
        assert!(!detector.matches("adios"));
    }

    #[test]
    fn empty_detector_never_matches() {
        let detector = PhraseDetector::default();
        assert!(!detector.matches(""));
        assert!(!detector.matches("anything"));
    }
}

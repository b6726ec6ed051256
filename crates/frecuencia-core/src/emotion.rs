//! Emotion Detection
//!
//! Maps free text typed by the user to an [`EmotionCategory`] and the sound
//! profile that accompanies it.
//!
//! Detection is a declarative rule table evaluated top to bottom. The first
//! rule with a keyword contained in the (lower-cased, accent-folded) input
//! decides the category, so precedence is the order of [`DEFAULT_RULES`].

use serde::{Deserialize, Serialize};

/// Emotional category detected from user text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionCategory {
    Fear,
    Prosperity,
    Energy,
    Love,
    Grief,
    Security,
    Sleep,
    #[default]
    Neutral,
}

/// Language for guidance text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl Locale {
    /// Parse a language tag such as `en`, `en-US` or `es`. Defaults to Spanish.
    pub fn parse(tag: &str) -> Self {
        if tag.trim().to_lowercase().starts_with("en") {
            Self::En
        } else {
            Self::Es
        }
    }
}

/// Audio, binaural range, haptics and guidance for a category
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundProfile {
    pub audio: &'static str,
    /// Binaural beat range in Hz (low, high)
    pub binaural_hz: (u8, u8),
    /// Vibration pattern in milliseconds, alternating on/off
    pub vibration_pattern: &'static [u32],
    #[serde(skip)]
    guidance_es: &'static str,
    #[serde(skip)]
    guidance_en: &'static str,
}

impl SoundProfile {
    pub const fn guidance(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Es => self.guidance_es,
            Locale::En => self.guidance_en,
        }
    }
}

impl EmotionCategory {
    pub const ALL: [Self; 8] = [
        Self::Fear,
        Self::Prosperity,
        Self::Energy,
        Self::Love,
        Self::Grief,
        Self::Security,
        Self::Sleep,
        Self::Neutral,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fear => "fear",
            Self::Prosperity => "prosperity",
            Self::Energy => "energy",
            Self::Love => "love",
            Self::Grief => "grief",
            Self::Security => "security",
            Self::Sleep => "sleep",
            Self::Neutral => "neutral",
        }
    }

    pub const fn profile(&self) -> SoundProfile {
        match self {
            Self::Fear => SoundProfile {
                audio: "/audio/mar_suave_pad.mp3",
                binaural_hz: (4, 7),
                vibration_pattern: &[20, 220, 20],
                guidance_es: "Siento tu miedo. Vamos a acompañarlo con olas suaves y pad cálido.",
                guidance_en: "I sense your fear. We will accompany it with soft waves and warm pad.",
            },
            Self::Prosperity => SoundProfile {
                audio: "/audio/piano_arpegios_cuerdas.mp3",
                binaural_hz: (6, 10),
                vibration_pattern: &[70, 40, 70, 40, 200],
                guidance_es: "Entiendo tu necesidad de prosperar. Abrimos espacio y claridad con melodía motivadora.",
                guidance_en: "I understand your need to prosper. Let's open space and clarity with motivational melody.",
            },
            Self::Energy => SoundProfile {
                audio: "/audio/guitarras_acusticas_aves.mp3",
                binaural_hz: (10, 14),
                vibration_pattern: &[70, 40, 70, 40, 200],
                guidance_es: "Activamos música alegre y naturaleza viva para reactivar tu energía.",
                guidance_en: "Activating joyful music and lively nature sounds to reactivate your energy.",
            },
            Self::Love => SoundProfile {
                audio: "/audio/guitarra_jazz_lluvia.mp3",
                binaural_hz: (8, 12),
                vibration_pattern: &[120, 60, 120, 120],
                guidance_es: "Percibo tu deseo de conexión. Activamos sonidos cálidos y vibraciones suaves.",
                guidance_en: "I sense your desire for connection. Activating warm sounds and gentle vibrations.",
            },
            Self::Grief => SoundProfile {
                audio: "/audio/cello_piano_lluvia.mp3",
                binaural_hz: (3, 6),
                vibration_pattern: &[40, 150, 40],
                guidance_es: "Sé que atraviesas una pérdida. Prepararemos sonidos consoladores y guía emocional.",
                guidance_en: "I know you are experiencing loss. We will prepare consoling sounds and emotional guidance.",
            },
            Self::Security => SoundProfile {
                audio: "/audio/fuego_latido_cuerdas.mp3",
                binaural_hz: (5, 8),
                vibration_pattern: &[100, 80, 100],
                guidance_es: "Crearemos sensación de estabilidad con acordes graves y latidos regulares.",
                guidance_en: "We create stability sensation with deep chords and steady heartbeat.",
            },
            Self::Sleep => SoundProfile {
                audio: "/audio/olas_grillos_pad_lento.mp3",
                binaural_hz: (1, 4),
                vibration_pattern: &[20, 220, 20],
                guidance_es: "Te ayudamos a relajarte con pads largos y sonidos suaves para dormir.",
                guidance_en: "We help you relax with long pads and soft sounds for sleep.",
            },
            Self::Neutral => SoundProfile {
                audio: "/audio/mood_neutral.mp3",
                binaural_hz: (6, 10),
                vibration_pattern: &[30, 50, 30],
                guidance_es: "Vamos a equilibrar tus emociones con sonidos armoniosos y guía calmante.",
                guidance_en: "We will balance your emotions with harmonious sounds and calming guidance.",
            },
        }
    }
}

impl std::fmt::Display for EmotionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detection rule: any keyword contained in the input selects `category`
#[derive(Clone, Copy, Debug)]
pub struct EmotionRule {
    pub keywords: &'static [&'static str],
    pub category: EmotionCategory,
}

/// Rules in precedence order. Keywords are lower-case and accent-free.
pub const DEFAULT_RULES: &[EmotionRule] = &[
    EmotionRule {
        keywords: &["duelo", "perdi", "luto", "murio", "fallecio", "grief", "loss", "passed away", "mourning"],
        category: EmotionCategory::Grief,
    },
    EmotionRule {
        keywords: &["miedo", "temor", "ansiedad", "panico", "nervios", "fear", "afraid", "scared", "anxious", "anxiety", "panic"],
        category: EmotionCategory::Fear,
    },
    EmotionRule {
        keywords: &["insegur", "seguridad", "estabilidad", "proteg", "insecure", "unsafe", "stability", "safety"],
        category: EmotionCategory::Security,
    },
    EmotionRule {
        keywords: &["dormir", "sueno", "insomnio", "descansar", "sleep", "insomnia"],
        category: EmotionCategory::Sleep,
    },
    EmotionRule {
        keywords: &["dinero", "trabajo", "deuda", "prosper", "abundancia", "negocio", "money", "debt", "job", "business"],
        category: EmotionCategory::Prosperity,
    },
    EmotionRule {
        keywords: &["amor", "pareja", "soledad", "corazon", "love", "lonely", "partner", "heart"],
        category: EmotionCategory::Love,
    },
    EmotionRule {
        keywords: &["energia", "cansad", "agotad", "motivacion", "animo", "energy", "tired", "exhausted", "motivation"],
        category: EmotionCategory::Energy,
    },
];

/// Ordered keyword classifier
#[derive(Clone, Debug)]
pub struct EmotionClassifier {
    rules: &'static [EmotionRule],
}

impl Default for EmotionClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULES)
    }
}

impl EmotionClassifier {
    pub const fn new(rules: &'static [EmotionRule]) -> Self {
        Self { rules }
    }

    /// Classify free text. Falls back to `Neutral` when no rule matches.
    pub fn classify(&self, text: &str) -> EmotionCategory {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return EmotionCategory::Neutral;
        }

        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| normalized.contains(k)))
            .map_or(EmotionCategory::Neutral, |rule| rule.category)
    }
}

/// Lower-case and strip Spanish diacritics so `Energía` matches `energia`.
fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accented_input_matches() {
        let classifier = EmotionClassifier::default();
        assert_eq!(classifier.classify("Me falta ENERGÍA"), EmotionCategory::Energy);
        assert_eq!(classifier.classify("no concilio el sueño"), EmotionCategory::Sleep);
    }

    #[test]
    fn test_precedence_follows_table_order() {
        let classifier = EmotionClassifier::default();
        // Fear is declared before Prosperity
        assert_eq!(
            classifier.classify("tengo miedo de quedarme sin trabajo"),
            EmotionCategory::Fear
        );
        // Grief is declared before Fear
        assert_eq!(
            classifier.classify("perdí a mi padre y tengo miedo"),
            EmotionCategory::Grief
        );
    }

    #[test]
    fn test_no_match_is_neutral() {
        let classifier = EmotionClassifier::default();
        assert_eq!(classifier.classify("hola"), EmotionCategory::Neutral);
        assert_eq!(classifier.classify("   "), EmotionCategory::Neutral);
    }

    #[test]
    fn test_custom_rule_table() {
        static RULES: &[EmotionRule] = &[EmotionRule {
            keywords: &["mar"],
            category: EmotionCategory::Sleep,
        }];
        let classifier = EmotionClassifier::new(RULES);
        assert_eq!(classifier.classify("quiero oír el mar"), EmotionCategory::Sleep);
        assert_eq!(classifier.classify("tengo miedo"), EmotionCategory::Neutral);
    }

    #[test]
    fn test_profile_guidance_locale() {
        let profile = EmotionCategory::Fear.profile();
        assert_eq!(profile.binaural_hz, (4, 7));
        assert!(profile.guidance(Locale::En).starts_with("I sense your fear"));
        assert_eq!(Locale::parse("en-US"), Locale::En);
        assert_eq!(Locale::parse("fr"), Locale::Es);
    }
}

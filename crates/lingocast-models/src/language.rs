use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target languages the translation backend can narrate into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Mr,
    #[default]
    Hi,
    Ta,
    Te,
    Bn,
    Gu,
    Kn,
    Ml,
    Pa,
    Ur,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language code: {0:?}")]
pub struct ParseLanguageError(pub String);

impl Language {
    /// Every supported language, in menu order.
    pub const ALL: [Language; 10] = [
        Language::Mr,
        Language::Hi,
        Language::Ta,
        Language::Te,
        Language::Bn,
        Language::Gu,
        Language::Kn,
        Language::Ml,
        Language::Pa,
        Language::Ur,
    ];

    /// Short code sent to the backend in the `lang` field.
    pub fn code(self) -> &'static str {
        match self {
            Language::Mr => "mr",
            Language::Hi => "hi",
            Language::Ta => "ta",
            Language::Te => "te",
            Language::Bn => "bn",
            Language::Gu => "gu",
            Language::Kn => "kn",
            Language::Ml => "ml",
            Language::Pa => "pa",
            Language::Ur => "ur",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Language::Mr => "Marathi",
            Language::Hi => "Hindi",
            Language::Ta => "Tamil",
            Language::Te => "Telugu",
            Language::Bn => "Bengali",
            Language::Gu => "Gujarati",
            Language::Kn => "Kannada",
            Language::Ml => "Malayalam",
            Language::Pa => "Punjabi",
            Language::Ur => "Urdu",
        }
    }
}

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|lang| lang.code() == needle)
            .ok_or_else(|| ParseLanguageError(s.to_string()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::value::{impl_text_column, ParseEnumError};

/// E-book output formats an artifact can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Epub,
    Text,
    Pdf,
    Mobi,
    Docx,
    Rtf,
    Fb2,
    Azw3,
    Lit,
    Lrf,
    Oeb,
    Pdb,
    Rb,
    Snb,
    Tcr,
    Web,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 17] = [
        OutputFormat::Json,
        OutputFormat::Epub,
        OutputFormat::Text,
        OutputFormat::Pdf,
        OutputFormat::Mobi,
        OutputFormat::Docx,
        OutputFormat::Rtf,
        OutputFormat::Fb2,
        OutputFormat::Azw3,
        OutputFormat::Lit,
        OutputFormat::Lrf,
        OutputFormat::Oeb,
        OutputFormat::Pdb,
        OutputFormat::Rb,
        OutputFormat::Snb,
        OutputFormat::Tcr,
        OutputFormat::Web,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Epub => "epub",
            OutputFormat::Text => "text",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Mobi => "mobi",
            OutputFormat::Docx => "docx",
            OutputFormat::Rtf => "rtf",
            OutputFormat::Fb2 => "fb2",
            OutputFormat::Azw3 => "azw3",
            OutputFormat::Lit => "lit",
            OutputFormat::Lrf => "lrf",
            OutputFormat::Oeb => "oeb",
            OutputFormat::Pdb => "pdb",
            OutputFormat::Rb => "rb",
            OutputFormat::Snb => "snb",
            OutputFormat::Tcr => "tcr",
            OutputFormat::Web => "web",
        }
    }

    /// Formats produced directly from stored chapters. Every other format
    /// is converted from a previously bound EPUB.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            OutputFormat::Json | OutputFormat::Epub | OutputFormat::Text
        )
    }

    pub fn depends_on_epub(&self) -> bool {
        !self.is_native()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        OutputFormat::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == lowered)
            .ok_or_else(|| ParseEnumError::new("output format", s))
    }
}

impl_text_column!(OutputFormat);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_formats() {
        let native: Vec<_> = OutputFormat::ALL
            .iter()
            .filter(|f| f.is_native())
            .map(|f| f.as_str())
            .collect();
        assert_eq!(native, vec!["json", "epub", "text"]);
        assert!(OutputFormat::Pdf.depends_on_epub());
        assert!(!OutputFormat::Epub.depends_on_epub());
    }

    #[test]
    fn test_parse() {
        assert_eq!("EPUB".parse::<OutputFormat>().unwrap(), OutputFormat::Epub);
        assert_eq!(" azw3 ".parse::<OutputFormat>().unwrap(), OutputFormat::Azw3);
        assert!("docm".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&vec![OutputFormat::Fb2, OutputFormat::Web]).unwrap();
        assert_eq!(json, r#"["fb2","web"]"#);
    }
}

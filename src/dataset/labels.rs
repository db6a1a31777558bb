//! Label encoding for the seven HAM10000 diagnostic categories.
//!
//! This table is the only source of class order. Directory names, metadata
//! `dx` codes and model outputs are all mapped through it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::{DermError, Result};

/// Number of diagnostic categories
pub const NUM_CLASSES: usize = 7;

/// Bumped whenever the code to index mapping changes
pub const LABEL_ENCODING_VERSION: u32 = 1;

/// A diagnostic category, ordered by class index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LesionClass {
    /// Actinic keratoses and intraepithelial carcinoma
    Akiec,
    /// Basal cell carcinoma
    Bcc,
    /// Benign keratosis-like lesions
    Bkl,
    /// Dermatofibroma
    Df,
    /// Melanoma
    Mel,
    /// Melanocytic nevi
    Nv,
    /// Vascular lesions
    Vasc,
}

impl LesionClass {
    /// All classes in index order
    pub const ALL: [LesionClass; NUM_CLASSES] = [
        LesionClass::Akiec,
        LesionClass::Bcc,
        LesionClass::Bkl,
        LesionClass::Df,
        LesionClass::Mel,
        LesionClass::Nv,
        LesionClass::Vasc,
    ];

    /// Class index used for targets and logits
    pub fn index(self) -> usize {
        self as usize
    }

    /// Class for an index, `None` outside `0..NUM_CLASSES`
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Short diagnostic code as used in metadata and directory names
    pub fn code(self) -> &'static str {
        match self {
            LesionClass::Akiec => "akiec",
            LesionClass::Bcc => "bcc",
            LesionClass::Bkl => "bkl",
            LesionClass::Df => "df",
            LesionClass::Mel => "mel",
            LesionClass::Nv => "nv",
            LesionClass::Vasc => "vasc",
        }
    }

    /// Human readable diagnosis
    pub fn description(self) -> &'static str {
        match self {
            LesionClass::Akiec => "Actinic keratoses",
            LesionClass::Bcc => "Basal cell carcinoma",
            LesionClass::Bkl => "Benign keratosis-like lesions",
            LesionClass::Df => "Dermatofibroma",
            LesionClass::Mel => "Melanoma",
            LesionClass::Nv => "Melanocytic nevi",
            LesionClass::Vasc => "Vascular lesions",
        }
    }

    /// Look up a code, failing with `UnknownLabel` outside the table
    pub fn from_code(code: &str, context: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.code() == code)
            .ok_or_else(|| DermError::UnknownLabel {
                code: code.to_string(),
                context: context.to_string(),
            })
    }
}

impl fmt::Display for LesionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LesionClass {
    type Err = DermError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_code(s, "label lookup")
    }
}

/// Class codes in index order
pub fn class_names() -> Vec<String> {
    LesionClass::ALL.iter().map(|c| c.code().to_string()).collect()
}

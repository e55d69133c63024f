//! Compiler options (`[compiler]` table of a TOML file)

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading options
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Failed to read options file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid options: {0}")]
    Invalid(String),
}

/// Optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    /// Optimizer disabled
    None,
    /// All local rewrites, to a fixed point
    #[default]
    Basic,
}

/// Options driving one compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    pub opt_level: OptLevel,
    /// Re-expand the IR a macro produces
    pub recursive_expansion: bool,
    pub max_expansion_depth: usize,
    /// Namespace searched last for unqualified macro names
    pub macro_fallback_namespace: String,
    /// Prelude modules every module imports implicitly
    pub default_imports: Vec<String>,
    /// Mark calls with only literal arguments as constant call sites
    pub constant_call_sites: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Basic,
            recursive_expansion: true,
            max_expansion_depth: 128,
            macro_fallback_namespace: "kiln.macros".to_string(),
            default_imports: vec!["kiln.standard".to_string(), "kiln.lang".to_string()],
            constant_call_sites: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct OptionsFile {
    #[serde(default)]
    compiler: CompilerOptions,
}

impl CompilerOptions {
    /// Parse options from TOML text holding a `[compiler]` table
    pub fn from_toml_str(s: &str) -> Result<Self, OptionsError> {
        let file: OptionsFile = toml::from_str(s)?;
        file.compiler.validate()?;
        Ok(file.compiler)
    }

    /// Load options from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Render as a TOML document with a `[compiler]` table
    pub fn to_toml_string(&self) -> Result<String, OptionsError> {
        #[derive(Serialize)]
        struct Wrapper<'a> {
            compiler: &'a CompilerOptions,
        }
        toml::to_string(&Wrapper { compiler: self }).map_err(|e| OptionsError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_expansion_depth == 0 {
            return Err(OptionsError::Invalid(
                "max_expansion_depth must be at least 1".to_string(),
            ));
        }
        if self.macro_fallback_namespace.trim().is_empty() {
            return Err(OptionsError::Invalid(
                "macro_fallback_namespace cannot be empty".to_string(),
            ));
        }
        if let Some(bad) = self
            .default_imports
            .iter()
            .find(|i| i.is_empty() || i.split('.').any(str::is_empty))
        {
            return Err(OptionsError::Invalid(format!(
                "invalid default import '{}'",
                bad
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompilerOptions::default();
        assert_eq!(options.opt_level, OptLevel::Basic);
        assert_eq!(options.max_expansion_depth, 128);
        assert_eq!(options.default_imports, vec!["kiln.standard", "kiln.lang"]);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let options = CompilerOptions::from_toml_str(
            r#"
            [compiler]
            opt_level = "none"
            constant_call_sites = false
            "#,
        )
        .unwrap();
        assert_eq!(options.opt_level, OptLevel::None);
        assert!(!options.constant_call_sites);
        assert!(options.recursive_expansion);
        assert_eq!(options.macro_fallback_namespace, "kiln.macros");
    }

    #[test]
    fn test_empty_document_is_default() {
        let options = CompilerOptions::from_toml_str("").unwrap();
        assert_eq!(options, CompilerOptions::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = CompilerOptions::from_toml_str("[compiler]\nmax_expansion_depth = 0\n").unwrap_err();
        assert!(matches!(err, OptionsError::Invalid(_)));

        let err = CompilerOptions::from_toml_str("[compiler]\nopt_level = \"extreme\"\n").unwrap_err();
        assert!(matches!(err, OptionsError::Parse(_)));

        let err = CompilerOptions::from_toml_str("[compiler]\ndefault_imports = [\"kiln..lang\"]\n").unwrap_err();
        assert!(matches!(err, OptionsError::Invalid(_)));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut options = CompilerOptions::default();
        options.max_expansion_depth = 16;
        let text = options.to_toml_string().unwrap();
        assert_eq!(CompilerOptions::from_toml_str(&text).unwrap(), options);
    }
}

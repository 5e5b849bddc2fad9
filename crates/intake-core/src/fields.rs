//! Field table
//!
//! An ordered list of `label -> pattern` entries. Patterns are compiled
//! case-insensitively and must contain exactly one capture group, which holds
//! the field's value. The table is data, not code: deployments swap it through
//! a TOML file of `[[fields]]` entries.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, Result};

/// One configured field, as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub label: String,
    pub pattern: String,
}

impl FieldDefinition {
    pub fn new(label: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pattern: pattern.into(),
        }
    }
}

/// Built-in table for application forms
const BUILTIN_DEFINITIONS: &[(&str, &str)] = &[
    ("Applicant Name", r"Applicant Name\s*[:\-]\s*([^\n]+)"),
    (
        "Date of Birth",
        r"Date of Birth\s*[:\-]\s*([0-9]{1,2}[/.\-][0-9]{1,2}[/.\-][0-9]{2,4})",
    ),
    (
        "Email",
        r"Email(?: Address)?\s*[:\-]?\s*([A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,})",
    ),
    ("Phone", r"Phone(?: Number)?\s*[:\-]?\s*(\+?[0-9][0-9 ()\-]{5,}[0-9])"),
    // Line start only, so "Email Address:" is not taken for a postal address
    ("Address", r"(?m)^[ \t]*Address\s*[:\-]\s*([^\n]+)"),
];

lazy_static! {
    static ref BUILTIN_TABLE: FieldTable = FieldTable::new(
        BUILTIN_DEFINITIONS
            .iter()
            .map(|(label, pattern)| FieldDefinition::new(*label, *pattern))
    )
    .unwrap();
}

/// A compiled field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    label: String,
    pattern: String,
    regex: Regex,
}

impl FieldSpec {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Trimmed value of the capture group, if the text matches
    pub fn capture(&self, text: &str) -> Option<String> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}

/// Ordered, validated field table
#[derive(Debug, Clone)]
pub struct FieldTable {
    fields: Vec<FieldSpec>,
}

#[derive(Deserialize)]
struct FieldFile {
    #[serde(default)]
    fields: Vec<FieldDefinition>,
}

impl FieldTable {
    /// Compile and validate a table.
    ///
    /// # Errors
    /// - blank or duplicate labels
    /// - patterns that do not compile
    /// - patterns without exactly one capture group
    pub fn new(definitions: impl IntoIterator<Item = FieldDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();

        for def in definitions {
            let label = def.label.trim().to_string();
            if label.is_empty() {
                return Err(IntakeError::InvalidFieldTable(
                    "field labels must not be blank".to_string(),
                ));
            }
            if !seen.insert(label.clone()) {
                return Err(IntakeError::InvalidFieldTable(format!(
                    "duplicate label '{}'",
                    label
                )));
            }

            let regex = RegexBuilder::new(&def.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    IntakeError::InvalidFieldTable(format!("pattern for '{}': {}", label, e))
                })?;

            // captures_len counts the implicit whole-match group
            let groups = regex.captures_len() - 1;
            if groups != 1 {
                return Err(IntakeError::InvalidFieldTable(format!(
                    "pattern for '{}' must have exactly one capture group, found {}",
                    label, groups
                )));
            }

            fields.push(FieldSpec {
                label,
                pattern: def.pattern,
                regex,
            });
        }

        Ok(Self { fields })
    }

    /// The built-in application-form table
    pub fn builtin() -> Self {
        BUILTIN_TABLE.clone()
    }

    /// Parse a TOML document of `[[fields]]` entries
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: FieldFile = toml::from_str(s)
            .map_err(|e| IntakeError::InvalidFieldTable(format!("invalid TOML: {}", e)))?;
        Self::new(file.fields)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn get(&self, label: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.label == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.label.as_str()).collect()
    }

    /// Definitions in table order, e.g. for echoing configuration back
    pub fn definitions(&self) -> Vec<FieldDefinition> {
        self.fields
            .iter()
            .map(|f| FieldDefinition::new(f.label.clone(), f.pattern.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_table_labels() {
        let table = FieldTable::builtin();
        assert_eq!(
            table.labels(),
            vec!["Applicant Name", "Date of Birth", "Email", "Phone", "Address"]
        );
    }

    #[test]
    fn test_capture_is_case_insensitive_and_trimmed() {
        let table = FieldTable::builtin();
        let email = table.get("Email").unwrap();
        assert_eq!(
            email.capture("EMAIL:   Jane.Doe@Example.org  "),
            Some("Jane.Doe@Example.org".to_string())
        );
        let name = table.get("Applicant Name").unwrap();
        assert_eq!(
            name.capture("applicant name:  Jane Doe   \nnext line"),
            Some("Jane Doe".to_string())
        );
    }

    #[test]
    fn test_builtin_date_and_phone() {
        let table = FieldTable::builtin();
        assert_eq!(
            table.get("Date of Birth").unwrap().capture("Date of Birth: 04/07/1990"),
            Some("04/07/1990".to_string())
        );
        assert_eq!(
            table.get("Phone").unwrap().capture("Phone Number: +1 (555) 010-2030"),
            Some("+1 (555) 010-2030".to_string())
        );
    }

    #[test]
    fn test_address_needs_its_own_line() {
        let table = FieldTable::builtin();
        let address = table.get("Address").unwrap();
        assert_eq!(address.capture("Email Address: jane@x.org"), None);
        assert_eq!(
            address.capture("Email Address: jane@x.org\n  Address: 1 Main St\n"),
            Some("1 Main St".to_string())
        );
    }

    #[test]
    fn test_rejects_duplicate_labels() {
        let result = FieldTable::new(vec![
            FieldDefinition::new("Email", r"Email: (\S+)"),
            FieldDefinition::new("Email", r"E-mail: (\S+)"),
        ]);
        assert!(matches!(result, Err(IntakeError::InvalidFieldTable(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_rejects_wrong_group_count() {
        assert!(FieldTable::new(vec![FieldDefinition::new("None", r"Name: \S+")]).is_err());
        assert!(FieldTable::new(vec![FieldDefinition::new("Two", r"(\w+) (\w+)")]).is_err());
        // Non-capturing groups do not count
        assert!(FieldTable::new(vec![FieldDefinition::new("One", r"(?:Name|Nom): (\w+)")]).is_ok());
    }

    #[test]
    fn test_rejects_invalid_pattern() {
        let result = FieldTable::new(vec![FieldDefinition::new("Bad", r"Name: (\w+")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_toml() {
        let table = FieldTable::from_toml_str(
            r#"
            [[fields]]
            label = "Policy Number"
            pattern = 'Policy (?:No|Number)\.?\s*[:#]?\s*([A-Z0-9\-]+)'

            [[fields]]
            label = "Insured"
            pattern = 'Insured\s*:\s*([^\n]+)'
            "#,
        )
        .unwrap();

        assert_eq!(table.labels(), vec!["Policy Number", "Insured"]);
        assert_eq!(
            table.get("Policy Number").unwrap().capture("policy no. PX-2291"),
            Some("PX-2291".to_string())
        );
    }
}

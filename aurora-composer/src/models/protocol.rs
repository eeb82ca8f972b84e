//! Protocols, techniques and their parameters
//!
//! A protocol is a named ordered list of techniques. Each technique is one
//! of the closed set in [`TechniqueKind`] and carries a parameter map whose
//! keys and scalar types come from that kind's template.

use super::technique::TechniqueKind;
use crate::error::{ComposerError, ComposerResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

static PROTOCOL_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").ok());

/// Protocol names are letters, digits and underscores
pub fn is_valid_protocol_name(name: &str) -> bool {
    PROTOCOL_NAME.as_ref().is_some_and(|re| re.is_match(name))
}

/// Parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Parse a user-typed value against an expected type
    pub fn parse_as(text: &str, kind: ScalarType) -> ComposerResult<Self> {
        let text = text.trim();
        let bad = || ComposerError::Validation(format!("cannot read {:?} as {}", text, kind));
        match kind {
            ScalarType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Scalar::Bool(true)),
                "false" | "no" | "0" => Ok(Scalar::Bool(false)),
                _ => Err(bad()),
            },
            ScalarType::Int => text.parse().map(Scalar::Int).map_err(|_| bad()),
            ScalarType::Float => text.parse().map(Scalar::Float).map_err(|_| bad()),
            ScalarType::Str | ScalarType::Literal => Ok(Scalar::Str(text.to_string())),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Declared scalar type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int,
    Float,
    Bool,
    Str,
    /// String restricted to the parameter's `options`
    Literal,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Bool => "bool",
            ScalarType::Str => "str",
            ScalarType::Literal => "literal",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub value: Option<Scalar>,
    #[serde(default)]
    pub default_value: Option<Scalar>,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type")]
    pub kind: ScalarType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Parameter {
    /// Type-check and store a value; ints are widened where floats are expected
    pub fn set(&mut self, value: Scalar) -> ComposerResult<()> {
        let value = self.coerce(value)?;
        self.value = Some(value);
        Ok(())
    }

    /// Clear the value back to the default
    pub fn unset(&mut self) {
        self.value = None;
    }

    /// Restore the default value
    pub fn reset(&mut self) {
        self.value = self.default_value.clone();
    }

    /// Required and still without a value
    pub fn is_missing(&self) -> bool {
        self.required && self.value.is_none()
    }

    /// Check the stored value against the declared type
    pub fn check(&self) -> ComposerResult<()> {
        match &self.value {
            Some(v) => self.coerce(v.clone()).map(|_| ()),
            None => Ok(()),
        }
    }

    fn coerce(&self, value: Scalar) -> ComposerResult<Scalar> {
        let mismatch = |v: &Scalar| {
            ComposerError::Validation(format!(
                "{}: expected {}, got {:?}",
                self.label, self.kind, v
            ))
        };
        match (self.kind, value) {
            (ScalarType::Int, v @ Scalar::Int(_)) => Ok(v),
            (ScalarType::Float, v @ Scalar::Float(_)) => Ok(v),
            (ScalarType::Float, Scalar::Int(i)) => Ok(Scalar::Float(i as f64)),
            (ScalarType::Bool, v @ Scalar::Bool(_)) => Ok(v),
            (ScalarType::Str, v @ Scalar::Str(_)) => Ok(v),
            (ScalarType::Literal, Scalar::Str(s)) => {
                if self.options.iter().any(|o| o == &s) {
                    Ok(Scalar::Str(s))
                } else {
                    Err(ComposerError::Validation(format!(
                        "{}: {:?} is not one of {:?}",
                        self.label, s, self.options
                    )))
                }
            }
            (_, v) => Err(mismatch(&v)),
        }
    }
}

/// One step of a protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technique {
    pub technique: TechniqueKind,
    pub name: String,
    pub device: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
}

impl Technique {
    /// New step of `kind` with the kind's default device and parameters
    pub fn new(kind: TechniqueKind, name: impl Into<String>) -> Self {
        Self {
            technique: kind,
            name: name.into(),
            device: kind.device().to_string(),
            parameters: kind.template(),
        }
    }

    pub fn kind(&self) -> TechniqueKind {
        self.technique
    }

    /// Switch to another variant; parameters restart from the new defaults
    pub fn change_variant(&mut self, kind: TechniqueKind) {
        if kind == self.technique {
            return;
        }
        self.technique = kind;
        self.device = kind.device().to_string();
        self.parameters = kind.template();
    }

    /// Set one parameter by key
    pub fn set_parameter(&mut self, key: &str, value: Scalar) -> ComposerResult<()> {
        match self.parameters.get_mut(key) {
            Some(param) => param.set(value),
            None => Err(ComposerError::Validation(format!(
                "{} has no parameter {:?}",
                self.technique.short_name(),
                key
            ))),
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&Scalar> {
        self.parameters.get(key).and_then(|p| p.value.as_ref())
    }

    /// Keys of required parameters without a value
    pub fn missing_required(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|(_, p)| p.is_missing())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Structural check against the kind's template
    ///
    /// Rejects unknown keys and values of the wrong type. Missing required
    /// values are allowed here; see [`Technique::validate`].
    pub fn check_structure(&self) -> ComposerResult<()> {
        let template = self.technique.template();
        for (key, param) in &self.parameters {
            let expected = template.get(key).ok_or_else(|| {
                ComposerError::Validation(format!(
                    "{} {:?}: unknown parameter {:?}",
                    self.technique.short_name(),
                    self.name,
                    key
                ))
            })?;
            if param.kind != expected.kind {
                return Err(ComposerError::Validation(format!(
                    "{} {:?}: parameter {:?} declared {} but must be {}",
                    self.technique.short_name(),
                    self.name,
                    key,
                    param.kind,
                    expected.kind
                )));
            }
            param.check()?;
        }
        Ok(())
    }

    /// Full check, including completeness of required parameters
    pub fn validate(&self) -> ComposerResult<()> {
        self.check_structure()?;
        let missing = self.missing_required();
        if !missing.is_empty() {
            return Err(ComposerError::Validation(format!(
                "{} {:?}: missing required {}",
                self.technique.short_name(),
                self.name,
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// A named, ordered sequence of techniques
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    pub method: Vec<Technique>,
}

impl Protocol {
    pub fn new(name: impl Into<String>, method: Vec<Technique>) -> Self {
        Self {
            name: name.into(),
            method,
        }
    }

    /// Every step passes [`Technique::validate`]
    pub fn validate(&self) -> ComposerResult<()> {
        self.method.iter().try_for_each(Technique::validate)
    }

    /// Number of steps of `kind` already present
    pub fn count_of(&self, kind: TechniqueKind) -> usize {
        self.method.iter().filter(|t| t.technique == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_untagged_forms() {
        let v: Vec<Scalar> = serde_json::from_value(json!([true, 3, 2.5, "auto"])).unwrap();
        assert_eq!(
            v,
            vec![
                Scalar::Bool(true),
                Scalar::Int(3),
                Scalar::Float(2.5),
                Scalar::Str("auto".into())
            ]
        );
    }

    #[test]
    fn test_int_widened_for_float_parameter() {
        let mut t = Technique::new(TechniqueKind::ConstantCurrent, "CC_1");
        t.set_parameter("current", Scalar::Int(2)).unwrap();
        assert_eq!(t.parameter("current"), Some(&Scalar::Float(2.0)));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut t = Technique::new(TechniqueKind::Loop, "LOOP_1");
        let err = t.set_parameter("goto", Scalar::Float(1.5)).unwrap_err();
        assert!(matches!(err, ComposerError::Validation(_)));
        assert_eq!(t.parameter("goto"), Some(&Scalar::Int(1)), "value unchanged");
    }

    #[test]
    fn test_literal_outside_options_rejected() {
        let mut t = Technique::new(TechniqueKind::OpenCircuitVoltage, "OCV_1");
        assert!(t.set_parameter("E_range", Scalar::Str("auto".into())).is_ok());
        assert!(t.set_parameter("E_range", Scalar::Str("huge".into())).is_err());
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let mut t = Technique::new(TechniqueKind::OpenCircuitVoltage, "OCV_1");
        assert!(t.set_parameter("voltage", Scalar::Float(1.0)).is_err());

        let mut doc = serde_json::to_value(&t).unwrap();
        doc["parameters"]["bogus"] = doc["parameters"]["time"].clone();
        let parsed: Technique = serde_json::from_value(doc).unwrap();
        assert!(parsed.check_structure().is_err());
    }

    #[test]
    fn test_missing_required_reported_by_validate() {
        let mut t = Technique::new(TechniqueKind::OpenCircuitVoltage, "OCV_1");
        assert!(t.check_structure().is_ok());
        assert_eq!(t.missing_required(), vec!["time"]);
        assert!(t.validate().is_err());

        t.set_parameter("time", Scalar::Float(3600.0)).unwrap();
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_change_variant_resets_parameters() {
        let mut t = Technique::new(TechniqueKind::ConstantCurrent, "step");
        t.set_parameter("current", Scalar::Float(0.001)).unwrap();
        t.change_variant(TechniqueKind::ConstantVoltage);
        assert_eq!(t.kind(), TechniqueKind::ConstantVoltage);
        assert_eq!(t.parameters, TechniqueKind::ConstantVoltage.template());

        // Same variant keeps current values
        t.set_parameter("voltage", Scalar::Float(4.2)).unwrap();
        t.change_variant(TechniqueKind::ConstantVoltage);
        assert_eq!(t.parameter("voltage"), Some(&Scalar::Float(4.2)));
    }

    #[test]
    fn test_parameter_reset_restores_default() {
        let mut t = Technique::new(TechniqueKind::Loop, "LOOP_1");
        t.set_parameter("n_gotos", Scalar::Int(5)).unwrap();
        let p = t.parameters.get_mut("n_gotos").unwrap();
        p.reset();
        assert_eq!(p.value, Some(Scalar::Int(-1)));
        p.unset();
        assert!(p.is_missing());
    }

    #[test]
    fn test_protocol_name_pattern() {
        assert!(is_valid_protocol_name("OCV_then_CC"));
        assert!(is_valid_protocol_name("formation2"));
        assert!(!is_valid_protocol_name(""));
        assert!(!is_valid_protocol_name("has space"));
        assert!(!is_valid_protocol_name("dash-ed"));
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(Scalar::parse_as("3", ScalarType::Int).unwrap(), Scalar::Int(3));
        assert_eq!(Scalar::parse_as("3", ScalarType::Float).unwrap(), Scalar::Float(3.0));
        assert_eq!(Scalar::parse_as("yes", ScalarType::Bool).unwrap(), Scalar::Bool(true));
        assert!(Scalar::parse_as("x", ScalarType::Int).is_err());
    }
}

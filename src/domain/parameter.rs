use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single named tunable a job is submitted with, or that an optimizing
/// job's controller is free to vary between iterations (§3.5).
///
/// `name` is the stable key parameter sets are looked up and overlaid by;
/// `display_name` is the label shown to an operator. `bounds` is only ever
/// meaningful for an `Int` value — it is the "optional bounds" §3.5 allows
/// for numeric parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub display_name: String,
    pub value: ParameterValue,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bounds: Option<IntBounds>,
}

/// The closed parameter type set from §3.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ParameterValue {
    Int(i64),
    Bool(bool),
    String(String),
    MultiString(Vec<String>),
    FileUpload(Vec<u8>),
    Password(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntBounds {
    pub min: i64,
    pub max: i64,
}

impl Parameter {
    /// A parameter whose display name defaults to `name` and which is not
    /// required. Use the `with_*` builders to override either.
    pub fn fixed(name: impl Into<String>, value: ParameterValue) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            value,
            required: false,
            bounds: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_bounds(mut self, bounds: IntBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::admission("parameter name must not be empty"));
        }
        if let Some(bounds) = self.bounds {
            if bounds.min > bounds.max {
                return Err(Error::admission(format!(
                    "parameter {} has an empty bounds range [{}, {}]",
                    self.name, bounds.min, bounds.max
                )));
            }
            let ParameterValue::Int(v) = self.value else {
                return Err(Error::admission(format!(
                    "parameter {} has bounds but does not carry an int value",
                    self.name
                )));
            };
            if v < bounds.min || v > bounds.max {
                return Err(Error::admission(format!(
                    "parameter {} value {} outside bounds [{}, {}]",
                    self.name, v, bounds.min, bounds.max
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_parameter_is_valid() {
        let p = Parameter::fixed("rate", ParameterValue::Int(100));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        let p = Parameter::fixed("  ", ParameterValue::Int(1));
        assert!(p.validate().is_err());
    }

    #[test]
    fn display_name_defaults_to_name_but_is_overridable() {
        let p = Parameter::fixed("target_url", ParameterValue::String("http://x".into()))
            .with_display_name("Target URL")
            .with_required(true);
        assert_eq!(p.display_name, "Target URL");
        assert!(p.required);
    }

    #[test]
    fn password_and_multi_string_and_file_upload_round_trip_kinds() {
        let password = Parameter::fixed("auth", ParameterValue::Password("hunter2".into()));
        let multi = Parameter::fixed("hosts", ParameterValue::MultiString(vec!["a".into(), "b".into()]));
        let upload = Parameter::fixed("payload", ParameterValue::FileUpload(vec![1, 2, 3]));
        assert!(password.validate().is_ok());
        assert!(multi.validate().is_ok());
        assert!(upload.validate().is_ok());
    }

    #[test]
    fn int_value_out_of_bounds_rejected() {
        let mut p = Parameter::fixed("threads", ParameterValue::Int(5)).with_bounds(IntBounds { min: 1, max: 4 });
        p.value = ParameterValue::Int(20);
        assert!(p.validate().is_err());
    }

    #[test]
    fn bounds_on_non_int_value_rejected() {
        let p = Parameter::fixed("name", ParameterValue::String("x".into())).with_bounds(IntBounds { min: 0, max: 1 });
        assert!(p.validate().is_err());
    }
}

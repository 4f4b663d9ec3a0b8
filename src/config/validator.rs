use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::agents::config::ModelConfig;
use crate::agents::domain::{ActionSpec, EmitAction, Manifest};
use crate::config::Settings;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cross-reference error: {0}")]
    CrossReference(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_models(&settings.models) {
            errors.extend(e);
        }

        if let Err(e) = Self::validate_manifests(&settings.manifests) {
            errors.extend(e);
        }

        // Cross-reference validation
        if let Err(e) = Self::validate_cross_references(settings) {
            errors.extend(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_models(models: &[ModelConfig]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut seen_names = HashMap::new();

        for (idx, model) in models.iter().enumerate() {
            if model.name.is_empty() {
                errors.push(ValidationError::MissingField(format!("models[{}].name", idx)));
                continue;
            }

            if let Some(prev_idx) = seen_names.insert(&model.name, idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Model name '{}' appears at indices {} and {}",
                    model.name, prev_idx, idx
                )));
            }

            if model.engine_name.is_empty() {
                errors.push(ValidationError::MissingField(format!("models[{}].engine_name", idx)));
            }

            if model.engine_name == "hosted" && model.url.is_none() {
                errors.push(ValidationError::MissingField(format!("models[{}].url", idx)));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_manifests(manifests: &HashMap<String, Manifest>) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (agent, manifest) in manifests {
            if let Some(temperature) = manifest.temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    errors.push(ValidationError::InvalidValue {
                        field: format!("manifests.{}.temperature", agent),
                        reason: "Temperature must be between 0.0 and 2.0".to_string(),
                    });
                }
            }

            let declared: HashSet<&str> = manifest.function_names().into_iter().collect();
            for (function, action) in &manifest.actions {
                if !declared.contains(function.as_str()) {
                    errors.push(ValidationError::CrossReference(format!(
                        "Agent '{}' has an action for undeclared function '{}'",
                        agent, function
                    )));
                }

                if let ActionSpec::Emit { emit_method, .. } = action {
                    if !EmitAction::is_known_method(emit_method) {
                        errors.push(ValidationError::InvalidValue {
                            field: format!("manifests.{}.actions.{}.emit_method", agent, function),
                            reason: format!("Unknown emit method '{}'", emit_method),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_cross_references(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let model_names: HashSet<String> = if settings.models.is_empty() {
            std::iter::once(ModelConfig::builtin_default().name).collect()
        } else {
            settings.models.iter().map(|m| m.name.clone()).collect()
        };

        if let Some(default_model) = &settings.default_model {
            if !model_names.contains(default_model) {
                errors.push(ValidationError::CrossReference(format!(
                    "Default model '{}' is not defined",
                    default_model
                )));
            }
        }

        for (agent, manifest) in &settings.manifests {
            if let Some(model) = manifest.model() {
                if !model_names.contains(model) {
                    errors.push(ValidationError::CrossReference(format!(
                        "Agent '{}' references unknown model '{}'",
                        agent, model
                    )));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

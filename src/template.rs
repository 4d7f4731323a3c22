use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::models::notification::Channel;

const DEFAULT_SUBJECT: &str = "Notification";

/// Loads channel-specific template files and renders `{{variable}}`
/// placeholders. Template storage layout:
/// `<dir>/<channel>/<template-code>.<ext>` with EMAIL subjects in a sibling
/// `<template-code>-subject.txt`.
pub struct TemplateService {
    template_dir: PathBuf,
}

impl TemplateService {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
        }
    }

    pub fn render_template(
        &self,
        template_code: &str,
        channel: Channel,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Result<String, DispatchError> {
        let path = self.template_path(template_code, channel);

        debug!(template_code, channel = %channel, path = %path.display(), "Loading template");

        let template = std::fs::read_to_string(&path).map_err(|e| {
            DispatchError::Template(format!("cannot load template {}: {}", path.display(), e))
        })?;

        Self::render(&template, variables)
    }

    /// Subject templates are optional; a missing file falls back to a fixed
    /// default rather than failing the whole dispatch.
    pub fn render_email_subject(
        &self,
        template_code: &str,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Result<String, DispatchError> {
        let file_name = format!("{}-subject.txt", Self::file_stem(template_code));
        let path = self.template_dir.join("email").join(file_name);

        let template = match std::fs::read_to_string(&path) {
            Ok(content) => content.trim().to_string(),
            Err(_) => {
                warn!(path = %path.display(), "Subject template missing, using default");
                return Ok(DEFAULT_SUBJECT.to_string());
            }
        };

        Self::render(&template, variables)
    }

    /// Pure `{{variable}}` substitution. Every placeholder in the template
    /// must have a variable; the check runs against the template itself so
    /// brace sequences inside substituted values are never misread as
    /// placeholders.
    pub fn render(
        template: &str,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Result<String, DispatchError> {
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start..].find("}}") else {
                break;
            };
            let key = &rest[start + 2..start + len];
            if !variables.contains_key(key) {
                return Err(DispatchError::Template(format!(
                    "missing variable in template: {{{{{}}}}}",
                    key
                )));
            }
            rest = &rest[start + len + 2..];
        }

        let mut result = template.to_string();

        for (key, value) in variables {
            let placeholder = format!("{{{{{}}}}}", key);

            let replacement = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => String::new(),
                _ => {
                    return Err(DispatchError::Template(format!(
                        "unsupported variable type for key '{}'",
                        key
                    )));
                }
            };

            result = result.replace(&placeholder, &replacement);
        }

        Ok(result)
    }

    fn template_path(&self, template_code: &str, channel: Channel) -> PathBuf {
        let stem = Self::file_stem(template_code);
        let (sub_dir, ext) = match channel {
            Channel::Email => ("email", "html"),
            Channel::Sms => ("sms", "txt"),
            Channel::Mms => ("mms", "txt"),
            Channel::Chat => ("chat", "json"),
        };

        self.template_dir.join(sub_dir).join(format!("{stem}.{ext}"))
    }

    fn file_stem(template_code: &str) -> String {
        template_code.to_lowercase().replace('_', "-")
    }
}

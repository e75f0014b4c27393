// src/exec/template.rs

//! `{placeholder}` substitution for handler command and artifact templates.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::dag::StepId;

pub const PLACEHOLDERS: &[&str] = &["id", "channel", "namespace", "version", "short_name"];

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

/// Placeholder names used in `template` that are not in [`PLACEHOLDERS`].
pub fn unknown_placeholders(template: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .filter(|name| !PLACEHOLDERS.contains(&name.as_str()))
        .collect()
}

/// Substitute the step's fields into `template`. Unknown placeholders are
/// left as they are.
pub fn render(template: &str, step: &StepId) -> String {
    placeholder_re()
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "id" => step.to_string(),
            "channel" => step.channel().to_string(),
            "namespace" => step.namespace().to_string(),
            "version" => step.version().to_string(),
            "short_name" => step.short_name().to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

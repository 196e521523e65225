//! Prompt templating.
//!
//! Prompts are Handlebars templates rendered against a flat JSON context.
//! Rendering is strict: a placeholder without a value is an error rather than
//! an empty string, and nothing is HTML-escaped.

use crate::error::JuryError;
use handlebars::Handlebars;
use serde::Serialize;

/// Render `template` against `context`.
pub fn render_prompt<T: Serialize>(template: &str, context: &T) -> Result<String, JuryError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .render_template(template, context)
        .map_err(|e| JuryError::Template(format!("Prompt render error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_values() {
        let out = render_prompt(
            "Model {{model_name}} answered: {{model_output}}",
            &json!({"model_name": "bot", "model_output": "<b>42</b> & more"}),
        )
        .unwrap();
        assert_eq!(out, "Model bot answered: <b>42</b> & more");
    }

    #[test]
    fn test_render_missing_value_is_error() {
        let err = render_prompt("Hello {{name}}", &json!({})).unwrap_err();
        assert!(matches!(err, JuryError::Template(_)));
    }

    #[test]
    fn test_render_is_pure() {
        let ctx = json!({"x": "1"});
        assert_eq!(
            render_prompt("{{x}}", &ctx).unwrap(),
            render_prompt("{{x}}", &ctx).unwrap()
        );
    }
}

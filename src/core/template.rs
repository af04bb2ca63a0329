use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::types::Payload;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Substitute `{{ key }}` placeholders from a trigger payload.
///
/// Strings are inserted raw; numbers, booleans, null and nested values use
/// their JSON text. Keys missing from the payload are left as written so a
/// misconfigured template is visible in the output.
pub fn render_template(template: &str, payload: &Payload) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match payload.get(&caps[1]) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn substitutes_strings_and_numbers() {
        let out = render_template(
            "Hello {{name}}, you have {{count}} items",
            &payload(json!({ "name": "Raj", "count": 3 })),
        );
        assert_eq!(out, "Hello Raj, you have 3 items");
    }

    #[test]
    fn leaves_unresolved_keys_verbatim() {
        assert_eq!(render_template("{{missing}}", &Payload::new()), "{{missing}}");
        assert_eq!(
            render_template("{{ spaced }} and {{name}}", &payload(json!({ "name": "x" }))),
            "{{ spaced }} and x"
        );
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        let out = render_template("{{  door  }} opened", &payload(json!({ "door": "front" })));
        assert_eq!(out, "front opened");
    }

    #[test]
    fn nested_values_render_as_json() {
        let out = render_template(
            "got {{data}} / {{flag}}",
            &payload(json!({ "data": { "a": 1 }, "flag": true })),
        );
        assert_eq!(out, r#"got {"a":1} / true"#);
    }
}

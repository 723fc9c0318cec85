// Template variable substitution
//
// RUNTIME replacement of `{{name}}` placeholders in a step's request template
// (path, header values, body) with values bound earlier in the same rule
// execution.
//
// Example:
//   Template: /api/{{user}}/reset?token={{token}}
//   Env:      user => "admin", token => "abc"
//   Output:   /api/admin/reset?token=abc
//
// Unbound names render as the empty string. In paths an empty segment left
// behind by such a name is folded away: /{{missing}}/x => /x

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::expr::Environment;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap();
}

fn lookup(env: &Environment, name: &str) -> String {
    env.get(name).map(|v| v.as_text().into_owned()).unwrap_or_default()
}

/// Substitute placeholders in free text.
pub fn render<'t>(template: &'t str, env: &Environment) -> Cow<'t, str> {
    PLACEHOLDER.replace_all(template, |caps: &Captures| lookup(env, &caps[1]))
}

/// Substitute placeholders in a URL path, folding segments that became empty.
pub fn render_path(template: &str, env: &Environment) -> String {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&template[last..m.start()]);
        let value = lookup(env, &caps[1]);
        let rest = &template[m.end()..];
        if value.is_empty() && out.ends_with('/') && rest.starts_with('/') {
            out.pop();
        }
        out.push_str(&value);
        last = m.end();
    }
    out.push_str(&template[last..]);
    out
}

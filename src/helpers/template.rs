//! Template fill helper (spec §4.10, C12).
//!
//! `{name}` placeholders are substituted from a value map; `{{`/`}}` are
//! literal braces; a missing key leaves the placeholder intact.

use std::collections::HashMap;

/// Returns the set of `{ident}` placeholder names referenced by `template`,
/// in first-occurrence order, ignoring escaped `{{`/`}}`.
pub fn extract_template_field_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if chars.get(i + 1) == Some(&'{') {
                i += 2;
                continue;
            }
            if let Some(end) = find_close(&chars, i + 1) {
                let name: String = chars[i + 1..end].iter().collect();
                if !names.contains(&name) {
                    names.push(name);
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    names
}

fn find_close(chars: &[char], start: usize) -> Option<usize> {
    (start..chars.len()).find(|&j| chars[j] == '}')
}

/// Fill `template` using `values`. Unresolved placeholders (missing keys)
/// are left as-is, e.g. `{missing}`.
pub fn fill_template(template: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                out.push('}');
                i += 2;
            }
            '{' => {
                if let Some(end) = find_close(&chars, i + 1) {
                    let name: String = chars[i + 1..end].iter().collect();
                    match values.get(&name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(&name);
                            out.push('}');
                        }
                    }
                    i = end + 1;
                } else {
                    out.push('{');
                    i += 1;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

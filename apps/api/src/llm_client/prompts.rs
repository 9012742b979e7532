// Prompt-building utilities shared by every pipeline.
// Each pipeline defines its own templates alongside it.

/// Substitutes `{name}` placeholders in a single pass.
///
/// Substituted values are never rescanned, so a résumé that happens to
/// contain `{jd_text}` cannot pull other inputs into its own slot. Braces
/// that do not name a known variable (such as the JSON schema examples in the
/// templates) are left untouched.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let extra: usize = vars.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

//! Day prompt rendering.
//!
//! The configured template uses `{name}` placeholders resolved against a
//! `GenerationContext`; `{{` and `}}` produce literal braces. Template problems
//! are logged and rendered around, never returned as errors.

use crate::context::GenerationContext;

/// Substitute every placeholder in `template`.
///
/// Unknown placeholders render empty. An unmatched `{` is kept as-is.
pub fn render_template(template: &str, ctx: &GenerationContext) -> String {
    let mut out = String::with_capacity(template.len() + 1_024);
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        match tail[1..].find(['}', '{']) {
            Some(end) if tail.as_bytes()[end + 1] == b'}' => {
                let name = tail[1..end + 1].trim();
                match ctx.field(name) {
                    Some(value) => out.push_str(value),
                    None => log::warn!("Prompt template references unknown field '{}'", name),
                }
                rest = &tail[end + 2..];
            }
            _ => {
                log::warn!("Prompt template has an unmatched '{{'");
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Full day prompt: rendered template, style constraint, then any amendment.
pub fn build_day_prompt(template: &str, ctx: &GenerationContext, amendment: Option<&str>) -> String {
    let mut prompt = render_template(template, ctx);

    if !ctx.outfit_style.is_empty() {
        prompt.push_str("\n\n## Style Requirement\n");
        prompt.push_str(&format!(
            "Today's outfit style is \"{style}\".\n\
             - Include an \"outfit_style\" field whose value is exactly \"{style}\".\n\
             - The first line of \"outfit\" must start with \"style: {style}\".\n\
             - Output JSON only, with no code fences and no extra prose.\n",
            style = ctx.outfit_style
        ));
    }

    if let Some(extra) = amendment.filter(|a| !a.trim().is_empty()) {
        prompt.push_str("\n\n## Additional User Requirement\n");
        prompt.push_str(extra);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> GenerationContext {
        GenerationContext {
            date_str: "October 16, 2026".to_string(),
            weekday: "Friday".to_string(),
            outfit_style: "cozy".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_placeholders_and_escapes() {
        let out = render_template("{date_str} ({weekday}) {{\"a\": 1}}", &ctx());
        assert_eq!(out, "October 16, 2026 (Friday) {\"a\": 1}");
    }

    #[test]
    fn test_unknown_placeholder_renders_empty() {
        assert_eq!(render_template("[{nope}] {weekday}", &ctx()), "[] Friday");
    }

    #[test]
    fn test_unmatched_brace_kept() {
        assert_eq!(render_template("open { {weekday}", &ctx()), "open { Friday");
        assert_eq!(render_template("tail {", &ctx()), "tail {");
        assert_eq!(render_template("stray } here", &ctx()), "stray } here");
    }

    #[test]
    fn test_default_template_renders_without_leftover_placeholders() {
        let out = render_template(crate::types::DEFAULT_PROMPT_TEMPLATE, &ctx());
        assert!(out.contains("Today is October 16, 2026 (Friday)."));
        assert!(out.contains("{\"outfit_style\": \"...\""));
        assert!(!out.contains("{weekday}"));
    }

    #[test]
    fn test_style_block_then_amendment() {
        let prompt = build_day_prompt("{weekday}", &ctx(), Some("wear something red"));
        let style_at = prompt.find("style: cozy").unwrap();
        let extra_at = prompt.find("wear something red").unwrap();
        assert!(style_at < extra_at);
        assert!(prompt.ends_with("wear something red"));
        assert!(prompt.contains("exactly \"cozy\""));
    }

    #[test]
    fn test_no_style_no_amendment() {
        let mut c = ctx();
        c.outfit_style.clear();
        let prompt = build_day_prompt("{weekday}", &c, Some("   "));
        assert_eq!(prompt, "Friday");
    }
}

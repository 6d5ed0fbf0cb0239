pub const DESCRIPTION_SYSTEM: &str = include_str!("../data/prompts/description_system.txt");
pub const DESCRIPTION_USER: &str = include_str!("../data/prompts/description_user.txt");
pub const COVER_IMAGE: &str = include_str!("../data/prompts/cover_image.txt");

/// Replace `{{key}}` placeholders in a template string.
///
/// Substitution is a single left-to-right pass, so placeholder text inside a
/// value is left as is. Unknown placeholders are kept verbatim.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            result.push_str(&rest[start..]);
            return result;
        };

        let key = &after_open[..end];
        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => result.push_str(value),
            None => result.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    result.push_str(rest);
    result
}

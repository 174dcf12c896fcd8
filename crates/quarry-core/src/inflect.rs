//! Name inflection helpers.
//!
//! Model names are CamelCase; backend tables are pluralized snake_case.
//! The rules here cover regular English plurals, which is all the default
//! naming needs — schemas can override `resource_name` for anything else.

/// Converts a CamelCase model name to its snake_case table form and
/// pluralizes the final word: `GroupUser` becomes `group_users`.
pub fn tableize(name: &str) -> String {
    pluralize(&snake_case(name))
}

/// Converts a CamelCase name to snake_case.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Pluralizes the last word of a snake_case name.
pub fn pluralize(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    if let Some(stem) = name.strip_suffix('y') {
        let prior = stem.chars().last();
        if prior.is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')) {
            return format!("{stem}ies");
        }
    }
    if name.ends_with('s')
        || name.ends_with('x')
        || name.ends_with('z')
        || name.ends_with("ch")
        || name.ends_with("sh")
    {
        return format!("{name}es");
    }
    format!("{name}s")
}

/// Converts a snake_case field name into a display label: `first_name`
/// becomes `First Name`.
pub fn titleize(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tableize() {
        assert_eq!(tableize("User"), "users");
        assert_eq!(tableize("GroupUser"), "group_users");
        assert_eq!(tableize("Page"), "pages");
        assert_eq!(tableize("Category"), "categories");
        assert_eq!(tableize("Address"), "addresses");
        assert_eq!(tableize("Day"), "days");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("GroupUser"), "group_user");
        assert_eq!(snake_case("user"), "user");
    }

    #[test]
    fn test_titleize() {
        assert_eq!(titleize("first_name"), "First Name");
        assert_eq!(titleize("id"), "Id");
    }
}

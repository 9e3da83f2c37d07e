use refuge_types::models::Category;

/// Pairs of distinct labels that still satisfy each other.
/// Housing assistance satisfies shelter needs and vice versa.
const SYNONYMS: &[(&str, &str)] = &[("shelter", "housing")];

/// Whether a need and an offer with these category labels can be paired.
///
/// Labels are compared trimmed and lowercased. An absent or blank label
/// never matches, not even another blank one. The relation is symmetric.
pub fn categories_match(a: Option<&str>, b: Option<&str>) -> bool {
    let (Some(a), Some(b)) = (normalize(a), normalize(b)) else {
        return false;
    };

    if a == b {
        return true;
    }

    SYNONYMS
        .iter()
        .any(|&(x, y)| (a == x && b == y) || (a == y && b == x))
}

fn normalize(label: Option<&str>) -> Option<String> {
    let trimmed = label?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Typed entry point for callers holding parsed categories.
pub trait CategoryExt {
    fn is_compatible_with(&self, other: &Category) -> bool;
}

impl CategoryExt for Category {
    fn is_compatible_with(&self, other: &Category) -> bool {
        categories_match(Some(self.as_str()), Some(other.as_str()))
    }
}

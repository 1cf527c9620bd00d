use crate::elements::Tag;

/// Shell-style match where `*` stands for any run of characters.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return value.is_empty();
    };
    let Some(mut rest) = value.strip_prefix(first) else {
        return false;
    };

    let middle: Vec<&str> = parts.collect();
    let Some((last, middle)) = middle.split_last() else {
        // no star at all
        return rest.is_empty();
    };

    for part in middle.iter().filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

/// Whether `tags` carries `key`, optionally with an exact `value` or a
/// value matching one of the glob `values`.
pub fn matches_tag(key: &str, value: Option<&str>, values: &[String], tags: &[Tag]) -> bool {
    let Some(tag) = tags.iter().find(|t| t.key == key) else {
        return false;
    };

    if let Some(value) = value {
        return tag.val == value;
    }

    values.is_empty() || values.iter().any(|pattern| glob_match(pattern, &tag.val))
}

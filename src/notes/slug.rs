/// Base used when a title contains no alphanumeric characters at all.
const EMPTY_TITLE_FALLBACK: &str = "note";

/// Normalize a title into a lowercase URL-safe token: ASCII alphanumerics
/// are kept, every other run of characters becomes a single `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        return EMPTY_TITLE_FALLBACK.into();
    }

    slug
}

/// Derive a slug from `title` that `exists` does not know yet, probing
/// `base`, `base-1`, `base-2`, ... in order. The predicate decides the
/// scope of uniqueness (and what to exclude, e.g. the note being renamed).
pub fn generate_unique_slug<F, E>(title: &str, mut exists: F) -> Result<String, E>
where
    F: FnMut(&str) -> Result<bool, E>,
{
    let base = slugify(title);

    if !exists(&base)? {
        return Ok(base);
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}-{counter}");
        if !exists(&candidate)? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

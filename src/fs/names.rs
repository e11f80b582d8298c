use std::collections::HashSet;

/// Pick a name based on `base` that is not in `existing`.
///
/// `base` is returned unchanged when free. Otherwise an increasing counter
/// starting at 1 is appended to the stem, before any extension:
/// `NewFolder` → `NewFolder1`, `NewFile.tex` → `NewFile1.tex`.
pub fn allocate<S: AsRef<str>>(base: &str, existing: &[S]) -> String {
    let taken: HashSet<&str> = existing.iter().map(|s| s.as_ref()).collect();
    if !taken.contains(base) {
        return base.to_string();
    }

    let (stem, ext) = split_extension(base);
    // `existing` is finite, so at most `taken.len() + 1` candidates are tried.
    (1..)
        .map(|i| match ext {
            Some(e) => format!("{}{}.{}", stem, i, e),
            None => format!("{}{}", stem, i),
        })
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}

/// Join a stem and an optional extension into a file name.
pub fn with_extension(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{}", stem, ext),
        _ => stem.to_string(),
    }
}

/// Split `name` at its last dot. A leading dot is part of the stem.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

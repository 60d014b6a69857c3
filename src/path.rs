//! Mapping article titles onto Crowi page paths.
use crate::error::MigrationError;

/// Characters with a meaning in Crowi page paths, and their full-width
/// stand-ins. `^ $ *` collide with Crowi's path regexps, `% ?` with URL
/// queries, and `/` would create an unintended page hierarchy.
const RESERVED: [(char, char); 6] = [
    ('^', '＾'),
    ('$', '＄'),
    ('*', '＊'),
    ('%', '％'),
    ('?', '？'),
    ('/', '／'),
];

/// Replace every reserved character in `title` with its full-width form.
pub fn escape_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            RESERVED
                .iter()
                .find(|(raw, _)| *raw == c)
                .map_or(c, |(_, wide)| *wide)
        })
        .collect()
}

/// Lexically normalize a slash-separated path: collapse repeated
/// separators, drop `.` elements, resolve `..` against the previous element
/// and strip trailing separators. `..` never climbs above the root of an
/// absolute path. An empty result becomes `/` or `.`.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for element in path.split('/') {
        match element {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Build the destination page path for an article titled `title` under
/// `base`.
///
/// Fails with [`MigrationError::InvalidPath`] when the escaped title is
/// blank or a dot element, or when the normalized path is not absolute.
pub fn title_path(base: &str, title: &str) -> Result<String, MigrationError> {
    let segment = escape_title(title);
    let joined = format!("{}/{}", base, segment);

    if matches!(segment.trim(), "" | "." | "..") {
        return Err(MigrationError::InvalidPath { path: joined });
    }

    let path = clean(&joined);
    if !path.starts_with('/') {
        return Err(MigrationError::InvalidPath { path });
    }
    Ok(path)
}

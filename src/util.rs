/// splits a POSIX-style path into its component parts. Paths must lead with
/// `/`; anything else yields no components. Empty components (`//`) are
/// skipped.
pub fn split_path(path: &str) -> Vec<String> {
    if !path.starts_with('/') {
        return Vec::new();
    }
    path.split('/')
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

/// returns the part of the path after the last `/`, or the whole string if
/// there is no `/`
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(position) => &path[position + 1..],
        None => path,
    }
}

/// returns everything before the last `/`. The parent of a top-level entry
/// (`/name`) is the empty string
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(position) => &path[..position],
        None => "",
    }
}

/// serializes a list of values into a single delimited string. The output
/// carries a trailing separator (`"3;7;"`), which is the wire format the
/// client and daemon exchange. Empty values are dropped.
pub fn serialize_ids<S: AsRef<str>>(ids: &[S], separator: char) -> String {
    let mut serialized = String::new();
    for id in ids {
        if !id.as_ref().is_empty() {
            serialized.push_str(id.as_ref());
            serialized.push(separator);
        }
    }
    serialized
}

/// splits a delimited string back into its values. Accepts input with or
/// without a trailing separator.
pub fn deserialize_ids(serialized: &str, separator: char) -> Vec<String> {
    serialized
        .split(separator)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

//! Path normalization for route keys.
//!
//! Every key in the route table and every lookup goes through [`normalize`]:
//! lexically cleaned, rooted at `/`, and ending in a single `/`.

/// Canonical form of a request or route path.
///
/// `.` segments are dropped, `..` removes the previous segment (never above
/// the root), repeated separators collapse, and the result always starts and
/// ends with `/`. Relative input is treated as rooted.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(path.len() + 2);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out.push('/');
    out
}

/// Enclosing prefix of a normalized path: `/a/b/` → `/a/`, `/a/` → `/`,
/// and `/` is its own parent.
pub fn parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

/// Iterate `path` and each of its ancestors, ending with `/`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(path);
    std::iter::from_fn(move || {
        let current = next?;
        next = if current == "/" || current.is_empty() {
            None
        } else {
            Some(parent(current))
        };
        Some(current)
    })
}

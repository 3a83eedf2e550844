//! Data-path expression grammar used in step `inputMapping` values.
//!
//! Grammar: `$` root, `.field` object member, `[n]` sequence index, chained
//! arbitrarily: `$.input.signals[0]`, `$.results.step_1.quality_score`.

use serde_json::Value;

enum Segment {
    Field(String),
    Index(usize),
}

fn parse(path: &str) -> Option<Vec<Segment>> {
    let rest = path.strip_prefix('$')?;
    let mut segments = Vec::new();
    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                if i == start {
                    return None;
                }
                segments.push(Segment::Field(chars[start..i].iter().collect()));
            }
            '[' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                if i >= chars.len() {
                    return None;
                }
                let digits: String = chars[start..i].iter().collect();
                let idx: usize = digits.parse().ok()?;
                segments.push(Segment::Index(idx));
                i += 1; // skip ']'
            }
            _ => return None,
        }
    }
    Some(segments)
}

/// Resolve a data path against `root` (the execution context, serialized as a
/// JSON value). Returns `None` if any segment is missing — the caller treats
/// a missing optional mapping as "omit this field".
pub fn resolve<'a>(path: &str, root: &'a Value) -> Option<&'a Value> {
    if path == "$" {
        return Some(root);
    }
    let segments = parse(path)?;
    let mut current = root;
    for segment in segments {
        current = match segment {
            Segment::Field(name) => current.get(&name)?,
            Segment::Index(idx) => current.get(idx)?,
        };
    }
    Some(current)
}

//! Environment-variable expansion and argument splitting for configured
//! process paths and argument strings.

/// Expand environment-variable references in a configured value.
///
/// Both `%VAR%` (the form the host's configuration files historically used)
/// and `$VAR` / `${VAR}` are recognized. References to unset variables are
/// left in place verbatim rather than expanded to an empty string, so a typo
/// surfaces in the resolution error instead of silently vanishing.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '%' => {
                if let Some(end) = input[i + 1..].find('%') {
                    let name = &input[i + 1..i + 1 + end];
                    match lookup(name) {
                        Some(value) => {
                            out.push_str(&value);
                            // Skip past the name and the closing '%'.
                            for _ in 0..name.chars().count() + 1 {
                                chars.next();
                            }
                        }
                        None => out.push('%'),
                    }
                } else {
                    out.push('%');
                }
            }
            '$' => match chars.peek() {
                Some((_, '{')) => {
                    if let Some(end) = input[i + 2..].find('}') {
                        let name = &input[i + 2..i + 2 + end];
                        match lookup(name) {
                            Some(value) => {
                                out.push_str(&value);
                                for _ in 0..name.chars().count() + 2 {
                                    chars.next();
                                }
                            }
                            None => out.push('$'),
                        }
                    } else {
                        out.push('$');
                    }
                }
                Some((start, c2)) if c2.is_ascii_alphabetic() || *c2 == '_' => {
                    let start = *start;
                    let end = input[start..]
                        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                        .map(|off| start + off)
                        .unwrap_or(input.len());
                    let name = &input[start..end];
                    match lookup(name) {
                        Some(value) => {
                            out.push_str(&value);
                            for _ in 0..name.chars().count() {
                                chars.next();
                            }
                        }
                        None => out.push('$'),
                    }
                }
                _ => out.push('$'),
            },
            other => out.push(other),
        }
    }

    out
}

fn lookup(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    std::env::var(name).ok()
}

/// Split a raw argument string into an argument vector.
///
/// Whitespace separates arguments; double quotes group words containing
/// whitespace, matching how the host parses its `arguments` attribute. No
/// escape sequences inside quotes.
pub fn split_arguments(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in raw.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }

    args
}

use semver::{Version, VersionReq};

/// True when `input` is something npm would accept as a version range.
/// Used to recognise registry references that carry no protocol prefix.
pub fn is_semver_range(input: &str) -> bool {
    let s = input.trim();
    if s.is_empty() {
        return false;
    }
    if s.contains("||") {
        return s.split("||").map(str::trim).all(|part| !part.is_empty() && is_semver_range(part));
    }
    let canon = canonicalize_npm_range(s);
    canon == "*" || VersionReq::parse(&canon).is_ok()
}

/// The exact version a lockfile pinned, or `None` when the reference is still a range.
pub fn exact_version(input: &str) -> Option<Version> {
    Version::parse(input.trim()).ok()
}

pub fn canonicalize_npm_range(input: &str) -> String {
    let s = input.trim();
    if s.is_empty() || s == "*" || s == "latest" {
        return "*".into();
    }

    // OR sets are checked part by part by the caller.
    if s.contains("||") {
        return s.to_string();
    }

    if Version::parse(s).is_ok() {
        return format!("={s}");
    }

    // "1.2.3 - 2.3.4" => ">=1.2.3, <=2.3.4"; spaces required so prereleases survive
    if let Some(idx) = s.find(" - ") {
        let (a, b) = s.split_at(idx);
        let left = a.trim();
        let right = b[3..].trim();
        if is_version_like(left) && is_version_like(right) {
            return format!(">={left}, <={right}");
        }
    }

    let tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.len() > 1 {
        let mut comps: Vec<String> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let t = tokens[i];
            if is_op(t) {
                match tokens.get(i + 1) {
                    Some(ver) => {
                        comps.push(format!("{t}{ver}"));
                        i += 2;
                        continue;
                    }
                    None => return s.to_string(),
                }
            }
            comps.push(t.to_string());
            i += 1;
        }
        return comps.join(", ");
    }

    if is_numeric(s) {
        return format!("^{s}.0.0");
    }
    if s.ends_with(".x") || s.ends_with(".*") || s.ends_with(".X") {
        return expand_wildcard(s);
    }
    s.to_string()
}

fn is_op(t: &str) -> bool {
    matches!(t, ">" | "<" | ">=" | "<=" | "=" | "^" | "~")
}

fn is_numeric(t: &str) -> bool {
    !t.is_empty() && t.chars().all(|c| c.is_ascii_digit())
}

fn is_version_like(t: &str) -> bool {
    let mut has_digit = false;
    for c in t.chars() {
        if c.is_ascii_digit() {
            has_digit = true;
            continue;
        }
        if !matches!(c, '.' | '-' | '+' | 'a'..='z' | 'A'..='Z' | '*') {
            return false;
        }
    }
    has_digit
}

fn expand_wildcard(pattern: &str) -> String {
    let parts: Vec<&str> = pattern.split('.').collect();
    let wild = |p: &str| p.eq_ignore_ascii_case("x") || p == "*";
    match parts.as_slice() {
        [maj, w] if wild(w) => match maj.parse::<u64>() {
            Ok(maj) => format!(">={maj}.0.0, <{}.0.0", maj + 1),
            Err(_) => pattern.to_string(),
        },
        [maj, min, w] if wild(w) => match (maj.parse::<u64>(), min.parse::<u64>()) {
            (Ok(maj), Ok(min)) => format!(">={maj}.{min}.0, <{maj}.{}.0", min + 1),
            _ => pattern.to_string(),
        },
        _ => pattern.to_string(),
    }
}

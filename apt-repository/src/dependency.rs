//! Dependency expressions as they appear in `Depends`, `Conflicts`,
//! `Provides` and `Replaces` fields.
//!
//! Parsing is permissive: anything that is not `name` or `name (op version)`
//! is kept verbatim as [`Dependency::Passthrough`] rather than rejected.

use std::fmt;

/// One comma-separated entry of a relationship field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// A plain `name` or `name (op version)` relation.
    Recognized {
        name: String,
        op: Option<String>,
        version: Option<String>,
    },
    /// Anything else (alternatives, architecture qualifiers, ...), unchanged.
    Passthrough { raw: String },
}

impl Dependency {
    /// Parse a single relation.
    pub fn parse(s: &str) -> Dependency {
        let s = s.trim();
        if let Some((_, name, op, version)) = lazy_regex::regex_captures!(
            r"^([A-Za-z0-9][A-Za-z0-9+.\-_]*)(?:\s*\(\s*(<<|<=|=|>=|>>|<|>)\s*([^\s()]+)\s*\))?$",
            s
        ) {
            Dependency::Recognized {
                name: name.to_string(),
                op: (!op.is_empty()).then(|| op.to_string()),
                version: (!version.is_empty()).then(|| version.to_string()),
            }
        } else {
            Dependency::Passthrough { raw: s.to_string() }
        }
    }

    /// The package name, if the relation was recognized.
    pub fn name(&self) -> Option<&str> {
        match self {
            Dependency::Recognized { name, .. } => Some(name),
            Dependency::Passthrough { .. } => None,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Recognized {
                name,
                op: Some(op),
                version: Some(version),
            } => write!(f, "{} ({} {})", name, op, version),
            Dependency::Recognized { name, .. } => f.write_str(name),
            Dependency::Passthrough { raw } => f.write_str(raw),
        }
    }
}

/// Split a relationship field on commas and parse each entry.
pub fn parse_depends(field: &str) -> Vec<Dependency> {
    field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Dependency::parse)
        .collect()
}

/// Render a list of relations back into field syntax.
pub fn format_depends(deps: &[Dependency]) -> String {
    deps.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The result of normalizing one loosely written dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedDependency {
    /// Relations to keep in the list the dependency came from.
    pub depends: Vec<String>,
    /// Relations that belong in `Conflicts` instead.
    pub conflicts: Vec<String>,
}

/// Rewrite a loosely written dependency into Debian syntax.
///
/// `name op version` becomes `name (op version)`, `~>` expands into a
/// `>=`/`<<` pair, and `!=` moves into the conflicts list. With
/// `ignore_iteration`, `= V` also expands into a `>=`/`<<` pair so that any
/// iteration of `V` satisfies it.
pub fn normalize_dependency(dep: &str, ignore_iteration: bool) -> NormalizedDependency {
    let mut dep = dep.trim().to_string();

    if !dep.contains(&['(', ',', '|'][..]) {
        let parts: Vec<&str> = dep.split_whitespace().collect();
        if parts.len() == 3 {
            dep = format!("{} ({} {})", parts[0], debianize_op(parts[1]), parts[2]);
        }
    }

    let split = dep.find(&[' ', '('][..]).unwrap_or(dep.len());
    let (name, rest) = dep.split_at(split);
    let mut name = name.to_string();
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        name = name.to_lowercase();
    }
    let dep = format!("{}{}", name.replace('_', "-"), rest);

    if let Some((_, name, version)) =
        lazy_regex::regex_captures!(r"^(\S+)\s*\(\s*~>\s*([^\s)]+)\s*\)$", &dep)
    {
        return NormalizedDependency {
            depends: vec![
                format!("{} (>= {})", name, version),
                format!("{} (<< {})", name, pessimistic_upper_bound(version)),
            ],
            conflicts: Vec::new(),
        };
    }

    if let Some((_, name, version)) =
        lazy_regex::regex_captures!(r"^(\S+)\s*\(\s*!=\s*([^\s)]+)\s*\)$", &dep)
    {
        return NormalizedDependency {
            depends: Vec::new(),
            conflicts: vec![format!("{} (= {})", name, version)],
        };
    }

    if ignore_iteration {
        if let Some((_, name, version)) =
            lazy_regex::regex_captures!(r"^(\S+)\s*\(\s*=\s*([^\s)]+)\s*\)$", &dep)
        {
            let mut parts = numeric_parts(version);
            if let Some(last) = parts.last_mut() {
                *last += 1;
            }
            return NormalizedDependency {
                depends: vec![
                    format!("{} (>= {})", name, version),
                    format!("{} (<< {})", name, join_parts(&parts)),
                ],
                conflicts: Vec::new(),
            };
        }
    }

    NormalizedDependency {
        depends: vec![dep.trim_end().to_string()],
        conflicts: Vec::new(),
    }
}

fn debianize_op(op: &str) -> &str {
    match op {
        "<" => "<<",
        ">" => ">>",
        other => other,
    }
}

/// `1.2.3` -> `1.3.0`; a single component is simply incremented.
fn pessimistic_upper_bound(version: &str) -> String {
    let mut parts = numeric_parts(version);
    match parts.len() {
        0 => {}
        1 => parts[0] += 1,
        n => {
            parts[n - 2] += 1;
            parts[n - 1] = 0;
        }
    }
    join_parts(&parts)
}

/// Leading-digit value of every dot-separated component; non-numeric
/// components count as 0.
fn numeric_parts(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

fn join_parts(parts: &[u64]) -> String {
    parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

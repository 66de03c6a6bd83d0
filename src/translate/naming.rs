//! Naming service
//!
//! Maps source names to VIL identifiers. The translator treats a [`Naming`] as
//! an opaque total function; the only names it makes up itself are the
//! `$`-prefixed internal ones (region maps, helpers, sentinels), which
//! [`DefaultNaming`] never produces for source names.

/// Source-to-VIL identifier mapping
pub trait Naming {
    /// Name of a function-local value or parameter
    fn local(&self, function: &str, value: &str) -> String;

    /// Name of a global variable, function or procedure
    fn global(&self, name: &str) -> String;

    /// Label of a basic block
    fn block(&self, function: &str, label: &str) -> String;
}

/// Keeps identifier characters, replaces the rest with `_`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNaming;

fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '\'' | '~' | '#' | '^' | '?') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        out.insert(0, '_');
    }
    out
}

impl Naming for DefaultNaming {
    fn local(&self, _function: &str, value: &str) -> String {
        format!("$l.{}", sanitize(value))
    }

    fn global(&self, name: &str) -> String {
        sanitize(name)
    }

    fn block(&self, _function: &str, label: &str) -> String {
        format!("$bb.{}", sanitize(label))
    }
}

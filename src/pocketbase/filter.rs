use std::fmt::Display;

/// Builder for PocketBase filter expressions.
///
/// Clauses are joined with `&&`; empty groups are skipped so an unconstrained
/// builder yields no filter at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `field = 'value'`
    pub fn eq(mut self, field: &str, value: impl Display) -> Self {
        self.clauses
            .push(format!("{} = {}", field, quote(&value.to_string())));
        self
    }

    /// `(field = 'a' || field = 'b')`; no-op for an empty set
    pub fn any_of<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let parts: Vec<String> = values
            .into_iter()
            .map(|v| format!("{} = {}", field, quote(&v.to_string())))
            .collect();

        match parts.len() {
            0 => {}
            1 => self.clauses.extend(parts),
            _ => self.clauses.push(format!("({})", parts.join(" || "))),
        }
        self
    }

    /// Case-insensitive substring match on any of `fields`; no-op for a blank needle
    pub fn contains_any(mut self, fields: &[&str], needle: &str) -> Self {
        let needle = needle.trim();
        if needle.is_empty() || fields.is_empty() {
            return self;
        }

        let quoted = quote(needle);
        let parts: Vec<String> = fields
            .iter()
            .map(|field| format!("{} ~ {}", field, quoted))
            .collect();

        if parts.len() == 1 {
            self.clauses.extend(parts);
        } else {
            self.clauses.push(format!("({})", parts.join(" || ")));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render the expression, or `None` when there is nothing to filter on
    pub fn build(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" && "))
        }
    }
}

/// Quote a string literal for a PocketBase filter
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! SQL dialect metadata.

/// The SQL dialect statements are compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
}

impl Dialect {
    /// Dialect name (e.g. `"sqlite"`).
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Bind variable syntax.
    pub fn placeholder(&self) -> &'static str {
        "?"
    }

    /// Quote an identifier, handling `table.column` references.
    pub fn quote(&self, ident: &str) -> String {
        ident
            .split('.')
            .map(|part| {
                if part == "*" {
                    part.to_owned()
                } else {
                    format!("\"{}\"", part.replace('"', "\"\""))
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quote `column` if it is a plain (optionally table-qualified) identifier,
    /// otherwise pass the SQL fragment through untouched.
    pub fn quote_if_ident(&self, column: &str) -> String {
        if is_identifier(column) {
            self.quote(column)
        } else {
            column.to_owned()
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut parts = 0;
    for part in s.split('.') {
        parts += 1;
        let mut chars = part.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !valid {
            return false;
        }
    }
    parts <= 2
}

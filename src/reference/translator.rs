//! Logical formula → structured-reference rewriting.
//!
//! ```text
//! =Quantity*UnitPrice      ──►  =@[Quantity]*@[UnitPrice]
//! =@[Quantity]*UnitPrice   ──►  =@[Quantity]*@[UnitPrice]
//! =IF(Status="Paid",1,0)   ──►  =IF(@[Status]="Paid",1,0)
//! ```
//!
//! The rewrite is a single left-to-right scan. At each word boundary the
//! longest known field name is tried first. Text inside string literals,
//! quoted sheet names and `[...]` groups is copied through untouched, which
//! makes translating already-translated output a no-op.
//!
//! Field names containing `[` or `]` are never rewritten: `@[A]B]` would not
//! close where the name ends.

use tracing::{debug, trace};

/// Field-name aware formula rewriter for one table.
#[derive(Debug, Clone)]
pub struct ReferenceTranslator {
    /// Longest first; ties broken alphabetically.
    names: Vec<String>,
}

impl ReferenceTranslator {
    pub fn new<I, S>(field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = field_names
            .into_iter()
            .map(Into::into)
            .filter(|n: &String| {
                let bracketed = n.contains(['[', ']']);
                if bracketed {
                    debug!(field = %n, "field name has brackets, left untranslated");
                }
                !n.is_empty() && !bracketed
            })
            .collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();
        Self { names }
    }

    /// Rewrite every known field name into `@[Name]`.
    ///
    /// Unknown tokens are left as they are.
    pub fn translate(&self, formula: &str) -> String {
        let mut out = String::with_capacity(formula.len() + 4 * self.names.len());
        let mut pos = 0;
        let mut prev: Option<char> = None;

        while let Some(ch) = formula[pos..].chars().next() {
            match ch {
                '"' | '\'' => {
                    let end = closing(formula, pos, ch);
                    out.push_str(&formula[pos..end]);
                    prev = formula[..end].chars().next_back();
                    pos = end;
                    continue;
                }
                '[' => {
                    let end = closing_bracket(formula, pos);
                    out.push_str(&formula[pos..end]);
                    prev = Some(']');
                    pos = end;
                    continue;
                }
                _ => {}
            }

            if at_boundary(prev) {
                if let Some(name) = self.match_at(formula, pos) {
                    trace!(field = %name, pos, "structured reference");
                    out.push_str("@[");
                    out.push_str(name);
                    out.push(']');
                    pos += name.len();
                    prev = Some(']');
                    continue;
                }
            }

            out.push(ch);
            pos += ch.len_utf8();
            prev = Some(ch);
        }

        out
    }

    fn match_at(&self, formula: &str, pos: usize) -> Option<&str> {
        let rest = &formula[pos..];
        self.names.iter().map(String::as_str).find(|name| {
            if !rest.starts_with(name) {
                return false;
            }
            let after = &rest[name.len()..];
            match after.chars().next() {
                Some(c) if is_word(c) || c == '!' => false,
                // A name directly followed by `(` is a function call.
                _ => !after.trim_start().starts_with('('),
            }
        })
    }
}

/// Convenience wrapper over [`ReferenceTranslator`].
pub fn translate<S: AsRef<str>>(formula: &str, field_names: &[S]) -> String {
    ReferenceTranslator::new(field_names.iter().map(|s| s.as_ref().to_string())).translate(formula)
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn at_boundary(prev: Option<char>) -> bool {
    match prev {
        None => true,
        // `Sheet!Field` and `@Field` belong to someone else.
        Some(c) => !is_word(c) && c != '!' && c != '@' && c != '.',
    }
}

/// Byte offset just past the quote closing the one at `start`.
fn closing(formula: &str, start: usize, quote: char) -> usize {
    let body = start + quote.len_utf8();
    match formula[body..].find(quote) {
        Some(offset) => body + offset + quote.len_utf8(),
        None => formula.len(),
    }
}

/// Byte offset just past the `]` balancing the `[` at `start`.
fn closing_bracket(formula: &str, start: usize) -> usize {
    let mut depth = 0usize;
    for (offset, c) in formula[start..].char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return start + offset + 1;
                }
            }
            _ => {}
        }
    }
    formula.len()
}

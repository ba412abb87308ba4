//! Line-level model of a template file.
//!
//! A template is parsed once into lines. Every `key={#name#}` occurrence in a
//! line becomes a binding; everything else is kept verbatim so that
//! rendering without substitutions reproduces the original bytes.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Builds the placeholder token for a node name.
pub fn placeholder_token(name: &str) -> String {
    format!("{{#{}#}}", name)
}

// Names may contain `#` but never `}`; the token ends at the first `#}`.
static RE_BINDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<key>\w+)=(?P<token>\{#[^}]*?#\})").unwrap());

/// A `key={#name#}` occurrence inside a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub key: String,
    pub token: String,
    /// Byte offset right after the `=`.
    value_start: usize,
}

/// Position of a binding: line index and its order within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingPos {
    pub line: usize,
    pub slot: usize,
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    ending: String,
    bindings: Vec<Binding>,
}

#[derive(Debug, Clone)]
pub struct TemplateDocument {
    original: String,
    lines: Vec<Line>,
}

impl TemplateDocument {
    pub fn parse(content: &str) -> Self {
        let lines = content
            .split_inclusive('\n')
            .map(|raw| {
                let (text, ending) = split_ending(raw);
                Line {
                    text: text.to_string(),
                    ending: ending.to_string(),
                    bindings: parse_bindings(text),
                }
            })
            .collect();

        Self {
            original: content.to_string(),
            lines,
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.original.contains(token)
    }

    /// First binding of `token`, in reading order.
    pub fn locate(&self, token: &str) -> Option<BindingPos> {
        self.lines.iter().enumerate().find_map(|(line, l)| {
            l.bindings
                .iter()
                .position(|b| b.token == token)
                .map(|slot| BindingPos { line, slot })
        })
    }

    /// Index of the first line bound to `token`.
    pub fn binding_line(&self, token: &str) -> Option<usize> {
        self.locate(token).map(|pos| pos.line)
    }

    pub fn binding(&self, pos: BindingPos) -> Option<&Binding> {
        self.lines.get(pos.line).and_then(|l| l.bindings.get(pos.slot))
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.lines.iter().flat_map(|l| l.bindings.iter())
    }

    /// Renders the document with the given binding values.
    ///
    /// A value replaces everything from after its `key=` to the end of the
    /// line. When several bindings of one line have values, the leftmost wins.
    pub fn render(&self, values: &HashMap<BindingPos, String>) -> String {
        let mut out = String::with_capacity(self.original.len());
        for (idx, line) in self.lines.iter().enumerate() {
            let applied = line.bindings.iter().enumerate().find_map(|(slot, b)| {
                values
                    .get(&BindingPos { line: idx, slot })
                    .map(|value| (b, value))
            });
            match applied {
                Some((binding, value)) => {
                    out.push_str(&line.text[..binding.value_start]);
                    out.push_str(value);
                }
                None => out.push_str(&line.text),
            }
            out.push_str(&line.ending);
        }
        out
    }
}

fn split_ending(raw: &str) -> (&str, &str) {
    if let Some(text) = raw.strip_suffix("\r\n") {
        (text, "\r\n")
    } else if let Some(text) = raw.strip_suffix('\n') {
        (text, "\n")
    } else {
        (raw, "")
    }
}

fn parse_bindings(text: &str) -> Vec<Binding> {
    RE_BINDING
        .captures_iter(text)
        .filter_map(|caps| {
            let key = caps.name("key")?;
            let token = caps.name("token")?;
            Some(Binding {
                key: key.as_str().to_string(),
                token: token.as_str().to_string(),
                value_start: token.start(),
            })
        })
        .collect()
}

//! Text formats for network descriptions, parameters, patterns and
//! feedback lists.
//!
//! All formats share one lexical rule: tokens are whitespace separated and
//! `#` starts a comment that runs to the end of the line.
//!
//! ## Submodules
//!
//! - [`topology`]: `.net` network descriptions
//! - [`patterns`]: `.pat` pattern sets, `.fb` feedback lists, `.par` parameters

pub mod patterns;
pub mod topology;

pub use patterns::{load_feedback, load_parameters, load_patterns, PatternSet};
pub use topology::{load_topology, LinkSpec, ModuleSpec, Topology};

use std::str::FromStr;

use crate::core::{CalmError, CalmResult};

/// Comment-aware token stream with line tracking.
pub struct Tokens<'a> {
    tokens: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(n, line)| {
                let code = line.split('#').next().unwrap_or("");
                code.split_whitespace().map(move |t| (n + 1, t))
            })
            .collect();
        Self { tokens, pos: 0 }
    }

    /// Line of the next token, or of the last one at end of input.
    pub fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |&(n, _)| n)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Next token; `what` names the expected item in the error.
    pub fn next_token(&mut self, what: &str) -> CalmResult<&'a str> {
        match self.tokens.get(self.pos) {
            Some(&(_, t)) => {
                self.pos += 1;
                Ok(t)
            }
            None => Err(CalmError::Parse {
                line: self.line(),
                msg: format!("unexpected end of input, expected {what}"),
            }),
        }
    }

    /// Next token parsed as `T`.
    pub fn parse<T: FromStr>(&mut self, what: &str) -> CalmResult<T> {
        let line = self.line();
        let tok = self.next_token(what)?;
        tok.parse().map_err(|_| CalmError::Parse {
            line,
            msg: format!("expected {what}, found '{tok}'"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_skip_comments() {
        let text = "# header\n3 4 # trailing\n\n  five#glued\n";
        let mut t = Tokens::new(text);
        assert_eq!(t.parse::<usize>("count").unwrap(), 3);
        assert_eq!(t.line(), 2);
        assert_eq!(t.parse::<f32>("value").unwrap(), 4.0);
        assert_eq!(t.next_token("name").unwrap(), "five");
        assert!(t.is_empty());
    }

    #[test]
    fn test_tokens_report_line() {
        let mut t = Tokens::new("1\n\nx\n");
        t.parse::<usize>("count").unwrap();
        match t.parse::<usize>("size") {
            Err(CalmError::Parse { line, msg }) => {
                assert_eq!(line, 3);
                assert!(msg.contains("'x'"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            t.next_token("name"),
            Err(CalmError::Parse { line: 3, .. })
        ));
    }
}

use regex::Regex;

/// Counts prose words in LaTeX source.
///
/// Commands with a single brace argument (`\label{x}`, `\section{Intro}`) are removed
/// together with their argument, then bare commands (`\noindent`) are removed, and what
/// remains is split on whitespace. Unmatched braces and stray backslashes are left in
/// place and count as ordinary text.
pub struct WordCounter {
    command_with_arg: Regex,
    bare_command: Regex,
}

impl WordCounter {
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            command_with_arg: Regex::new(r"\\[a-zA-Z]+\{[^}]*\}")?,
            bare_command: Regex::new(r"\\[a-zA-Z]+")?,
        })
    }

    pub fn count(&self, text: &str) -> usize {
        let stripped = self.command_with_arg.replace_all(text, "");
        let stripped = self.bare_command.replace_all(&stripped, "");
        stripped.split_whitespace().count()
    }
}

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

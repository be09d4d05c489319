//! Indentation-aware SQL text builder.

const INDENT: &str = "    ";

/// Builds SQL text line by line, indenting nested blocks.
#[derive(Debug, Default)]
pub struct SqlWriter {
    buffer: String,
    indent: usize,
    at_line_start: bool,
}

impl SqlWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            indent: 0,
            at_line_start: true,
        }
    }

    /// Appends text to the current line.
    pub fn append(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        if self.at_line_start {
            for _ in 0..self.indent {
                self.buffer.push_str(INDENT);
            }
            self.at_line_start = false;
        }
        self.buffer.push_str(text);
        self
    }

    /// Appends text and ends the line.
    pub fn append_line(&mut self, text: &str) -> &mut Self {
        self.append(text);
        self.buffer.push('\n');
        self.at_line_start = true;
        self
    }

    /// Ends the current line.
    pub fn new_line(&mut self) -> &mut Self {
        self.append_line("")
    }

    /// Runs `f` with one more level of indentation.
    pub fn indented<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.indent += 1;
        let result = f(self);
        self.indent -= 1;
        result
    }

    /// Writes `WHERE a` / `AND b` lines. Nothing is written for no clauses.
    pub fn where_clause(&mut self, clauses: &[String]) -> &mut Self {
        self.delimited("WHERE ", clauses)
    }

    /// Writes `ON a` / `AND b` lines. Nothing is written for no clauses.
    pub fn on_clause(&mut self, clauses: &[String]) -> &mut Self {
        self.delimited("ON ", clauses)
    }

    fn delimited(&mut self, keyword: &str, clauses: &[String]) -> &mut Self {
        for (i, clause) in clauses.iter().enumerate() {
            self.append(if i == 0 { keyword } else { "AND " });
            self.append_line(clause);
        }
        self
    }

    /// Returns the text written so far.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Consumes the writer, returning the text.
    pub fn finish(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indented_block() {
        let mut w = SqlWriter::new();
        w.append("WITH cte0").append_line(" AS").append_line("(");
        w.indented(|w| {
            w.append_line("SELECT 1");
        });
        w.append(")");

        assert_eq!(w.finish(), "WITH cte0 AS\n(\n    SELECT 1\n)");
    }

    #[test]
    fn test_where_clause_delimiting() {
        let mut w = SqlWriter::new();
        w.where_clause(&["a = 1".to_string(), "b = 2".to_string()]);
        w.where_clause(&[]);
        assert_eq!(w.as_str(), "WHERE a = 1\nAND b = 2\n");
    }
}

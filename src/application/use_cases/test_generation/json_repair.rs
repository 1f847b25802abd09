//! Token-level repair of model-produced JSON.
//!
//! The repairer walks the text once, tracking string/escape state and a stack
//! of open containers. Input that is already valid JSON is emitted unchanged
//! (trailing text after the top-level value aside), so a repair never alters
//! a document that would have parsed directly.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object,
    Array,
}

impl Frame {
    fn closer(self) -> char {
        match self {
            Frame::Object => '}',
            Frame::Array => ']',
        }
    }
}

/// Last significant token written to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Open,
    Comma,
    Colon,
    Key,
    Value,
}

struct Repairer {
    out: String,
    stack: Vec<Frame>,
    prev: Prev,
    in_string: bool,
    string_is_key: bool,
    escaped: bool,
    in_scalar: bool,
    /// Byte offset just past the last completed key or value.
    last_token_end: usize,
    /// Byte offset of the last comma written.
    last_comma: Option<usize>,
    changed: bool,
}

/// Result of a repair pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub text: String,
    /// False when no token had to be inserted, removed or closed.
    pub changed: bool,
}

pub fn repair_json(input: &str) -> Repaired {
    let mut repairer = Repairer {
        out: String::with_capacity(input.len() + 16),
        stack: Vec::new(),
        prev: Prev::Start,
        in_string: false,
        string_is_key: false,
        escaped: false,
        in_scalar: false,
        last_token_end: 0,
        last_comma: None,
        changed: false,
    };
    let body = skip_leading_prose(input);
    if body.len() != input.len() {
        repairer.changed = true;
    }
    repairer.run(body);
    Repaired {
        text: repairer.out,
        changed: repairer.changed,
    }
}

/// Drops a prose preamble ("Here are the cases: [...]") before the first container.
fn skip_leading_prose(text: &str) -> &str {
    let trimmed = text.trim_start();
    let starts_with_word = trimmed
        .chars()
        .next()
        .map(|c| c.is_alphabetic())
        .unwrap_or(false);
    let is_literal = ["true", "false", "null"]
        .iter()
        .any(|literal| trimmed.starts_with(literal));
    if !starts_with_word || is_literal {
        return text;
    }
    match trimmed.find(['{', '[']) {
        Some(index) => &trimmed[index..],
        None => text,
    }
}

fn is_scalar_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '+' | '.')
}

impl Repairer {
    fn run(&mut self, text: &str) {
        for (index, c) in text.char_indices() {
            if self.in_string {
                self.push_string_char(c);
                continue;
            }
            if !is_scalar_char(c) {
                self.in_scalar = false;
            }

            match c {
                '"' => self.open_string(),
                '{' | '[' => self.open_container(c),
                '}' | ']' => {
                    self.close_container(c);
                    if self.stack.is_empty() && self.prev == Prev::Value {
                        // trailing text after the top-level value is dropped
                        if !text[index + c.len_utf8()..].trim().is_empty() {
                            self.changed = true;
                        }
                        break;
                    }
                }
                ',' => self.comma(),
                ':' => {
                    self.out.push(':');
                    self.prev = Prev::Colon;
                }
                c if c.is_whitespace() => self.out.push(c),
                c if is_scalar_char(c) => self.scalar_char(c),
                c => self.out.push(c),
            }
        }
        self.finish();
    }

    fn push_string_char(&mut self, c: char) {
        self.out.push(c);
        if self.escaped {
            self.escaped = false;
        } else if c == '\\' {
            self.escaped = true;
        } else if c == '"' {
            self.in_string = false;
            self.prev = if self.string_is_key {
                Prev::Key
            } else {
                Prev::Value
            };
            self.last_token_end = self.out.len();
        }
    }

    /// Inserts whatever separator must precede a new key or value.
    fn separate_before_value(&mut self) {
        match self.prev {
            Prev::Value if !self.stack.is_empty() => self.insert_at_token_end(','),
            Prev::Key => self.insert_at_token_end(':'),
            _ => {}
        }
    }

    fn insert_at_token_end(&mut self, separator: char) {
        self.out.insert(self.last_token_end, separator);
        self.changed = true;
        match separator {
            ',' => {
                self.last_comma = Some(self.last_token_end);
                self.prev = Prev::Comma;
            }
            _ => self.prev = Prev::Colon,
        }
    }

    fn open_string(&mut self) {
        self.separate_before_value();
        self.string_is_key = self.stack.last() == Some(&Frame::Object)
            && matches!(self.prev, Prev::Open | Prev::Comma);
        self.in_string = true;
        self.escaped = false;
        self.out.push('"');
    }

    fn open_container(&mut self, c: char) {
        self.separate_before_value();
        self.out.push(c);
        self.stack.push(if c == '{' { Frame::Object } else { Frame::Array });
        self.prev = Prev::Open;
    }

    fn scalar_char(&mut self, c: char) {
        if !self.in_scalar {
            self.separate_before_value();
            self.in_scalar = true;
        }
        self.out.push(c);
        self.prev = Prev::Value;
        self.last_token_end = self.out.len();
    }

    fn fill_missing_value(&mut self) {
        match self.prev {
            Prev::Key => {
                self.out.push_str(":null");
                self.changed = true;
            }
            Prev::Colon => {
                self.out.push_str("null");
                self.changed = true;
            }
            _ => return,
        }
        self.prev = Prev::Value;
        self.last_token_end = self.out.len();
    }

    fn drop_trailing_comma(&mut self) {
        if self.prev != Prev::Comma {
            return;
        }
        if let Some(index) = self.last_comma.take() {
            self.out.remove(index);
            self.changed = true;
        }
        self.prev = Prev::Open;
    }

    fn comma(&mut self) {
        self.fill_missing_value();
        match self.prev {
            Prev::Start | Prev::Open | Prev::Comma => {
                self.changed = true;
            }
            _ if self.stack.is_empty() => {
                self.changed = true;
            }
            _ => {
                self.last_comma = Some(self.out.len());
                self.out.push(',');
                self.prev = Prev::Comma;
            }
        }
    }

    fn close_container(&mut self, c: char) {
        let wanted = if c == '}' { Frame::Object } else { Frame::Array };
        let Some(depth) = self.stack.iter().rposition(|frame| *frame == wanted) else {
            // stray closer
            self.changed = true;
            return;
        };

        self.fill_missing_value();
        self.drop_trailing_comma();
        while self.stack.len() > depth + 1 {
            if let Some(frame) = self.stack.pop() {
                self.out.push(frame.closer());
                self.changed = true;
            }
        }
        self.stack.pop();
        self.out.push(c);
        self.prev = Prev::Value;
        self.last_token_end = self.out.len();
    }

    fn finish(&mut self) {
        if self.in_string {
            self.out.push('"');
            self.in_string = false;
            self.changed = true;
            self.prev = if self.string_is_key {
                Prev::Key
            } else {
                Prev::Value
            };
            self.last_token_end = self.out.len();
        }
        if self.stack.is_empty() {
            return;
        }
        self.fill_missing_value();
        self.drop_trailing_comma();
        while let Some(frame) = self.stack.pop() {
            self.out.push(frame.closer());
            self.changed = true;
        }
    }
}

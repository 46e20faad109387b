use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    Word(String),
    Redirect(RedirectOp),
    Pipe,
    And,
    Or,
    Sequence,
    Background,
    /// `(` or `)`; recognized so the parser can reject it.
    Other(char),
    End,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectKind {
    In,     // <
    Out,    // >
    ErrOut, // 2>
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RedirectOp {
    pub kind: RedirectKind,
    /// Leading descriptor digits, e.g. the `2` in `2>`.
    pub fd: Option<u32>,
    /// Two-character operator: `>>` (or `<>`, which the parser rejects).
    pub append: bool,
    /// `&N` suffix, e.g. the `1` in `2>&1`.
    pub dup_target: Option<u32>,
}

impl fmt::Display for RedirectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(fd) = self.fd {
            write!(f, "{}", fd)?;
        }
        let symbol = match self.kind {
            RedirectKind::In => '<',
            RedirectKind::Out | RedirectKind::ErrOut => '>',
        };
        write!(f, "{}", symbol)?;
        if self.append {
            write!(f, ">")?;
        }
        if let Some(target) = self.dup_target {
            write!(f, "&{}", target)?;
        }
        Ok(())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(word) => write!(f, "{}", word),
            Token::Redirect(op) => write!(f, "{}", op),
            Token::Pipe => write!(f, "|"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Sequence => write!(f, ";"),
            Token::Background => write!(f, "&"),
            Token::Other(c) => write!(f, "{}", c),
            Token::End => write!(f, "end of line"),
        }
    }
}

/// Characters that end an unquoted word.
fn is_special(c: char) -> bool {
    matches!(c, '<' | '>' | '&' | '|' | ';' | '(' | ')' | '#')
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Byte offset of the next unread character.
    #[cfg(test)]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.peek_char() {
            None | Some('#') => Token::End,
            Some(_) => {
                if let Some(op) = self.read_redirect() {
                    return Token::Redirect(op);
                }
                self.read_operator().unwrap_or_else(|| self.read_word())
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn read_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.read_char();
        }
    }

    fn read_digits(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.read_char();
        }
        if start == self.pos {
            None
        } else {
            // Out-of-range prefixes are kept as an fd no stream can match.
            Some(self.input[start..self.pos].parse().unwrap_or(u32::MAX))
        }
    }

    /// Reads `[digits](<|>)[>|&digits]`. Rewinds and returns `None` when the
    /// digits are not followed by a redirection, so they are re-read as a word.
    fn read_redirect(&mut self) -> Option<RedirectOp> {
        let start = self.pos;
        let fd = self.read_digits();

        let kind = match self.peek_char() {
            Some('<') => RedirectKind::In,
            Some('>') if fd == Some(2) => RedirectKind::ErrOut,
            Some('>') => RedirectKind::Out,
            _ => {
                self.pos = start;
                return None;
            }
        };
        self.read_char();

        let mut op = RedirectOp {
            kind,
            fd,
            append: false,
            dup_target: None,
        };
        match (self.peek_char(), self.peek_second()) {
            (Some('>'), _) => {
                self.read_char();
                op.append = true;
            }
            (Some('&'), Some(c)) if c.is_ascii_digit() => {
                self.read_char();
                op.dup_target = self.read_digits();
            }
            _ => {}
        }
        Some(op)
    }

    fn read_operator(&mut self) -> Option<Token> {
        let c = self.peek_char()?;
        let token = match (c, self.peek_second()) {
            ('&', Some('&')) => Token::And,
            ('|', Some('|')) => Token::Or,
            (';', _) => Token::Sequence,
            ('&', _) => Token::Background,
            ('|', _) => Token::Pipe,
            ('(' | ')', _) => Token::Other(c),
            _ => return None,
        };
        self.read_char();
        if matches!(token, Token::And | Token::Or) {
            self.read_char();
        }
        Some(token)
    }

    fn read_word(&mut self) -> Token {
        let mut word = String::new();
        let mut quote: Option<char> = None;

        while let Some(c) = self.peek_char() {
            match quote {
                None if c.is_whitespace() || is_special(c) => break,
                None if c == '"' || c == '\'' => {
                    quote = Some(c);
                    self.read_char();
                }
                Some(q) if c == q => {
                    quote = None;
                    self.read_char();
                }
                Some('\'') => {
                    word.push(c);
                    self.read_char();
                }
                _ if c == '\\' => {
                    self.read_char();
                    match self.read_char() {
                        Some(escaped) => word.push(escaped),
                        None => word.push('\\'),
                    }
                }
                _ => {
                    word.push(c);
                    self.read_char();
                }
            }
        }

        Token::Word(word)
    }
}

/// Tokenizes a whole line, including the final `End`.
#[cfg(test)]
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token == Token::End;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

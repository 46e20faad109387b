use std::mem;

use super::ast::{
    Combinator, Command, Conditional, Pipeline, Program, RedirectTarget, Redirection, Separator,
    Stream,
};
use super::lexer::{Lexer, RedirectKind, RedirectOp, Token};
use crate::shell::error::ParseError;

/// Single-pass builder over one input line.
///
/// Holds the command, pipeline and conditional currently being filled in;
/// operators close the innermost ones and push them onto their parents.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    program: Program,
    conditional: Conditional,
    pipeline: Pipeline,
    command: Command,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(input),
            program: Program::default(),
            conditional: Conditional::default(),
            pipeline: Pipeline::default(),
            command: Command::default(),
        }
    }

    pub fn parse(mut self) -> Result<Program, ParseError> {
        loop {
            match self.lexer.next_token() {
                Token::Word(word) => self.command.argv.push(word),
                Token::Redirect(op) => {
                    let redirection = self.parse_redirection(op)?;
                    self.command.redirect(redirection);
                }
                Token::Pipe => {
                    self.check_command(&Token::Pipe)?;
                    if self.pipeline.commands.is_empty() {
                        self.command.pipe_head = true;
                    }
                    self.command.pipes_to_next = true;
                    self.close_command();
                }
                token @ (Token::And | Token::Or) => {
                    self.check_command(&token)?;
                    self.close_command();
                    self.pipeline.combinator = Some(if token == Token::And {
                        Combinator::And
                    } else {
                        Combinator::Or
                    });
                    self.close_pipeline();
                }
                token @ (Token::Sequence | Token::Background) => {
                    self.check_command(&token)?;
                    self.close_command();
                    self.close_pipeline();
                    if token == Token::Background {
                        self.conditional.separator = Some(Separator::Background);
                        self.conditional.background = true;
                    } else {
                        self.conditional.separator = Some(Separator::Sequence);
                    }
                    self.close_conditional();
                }
                Token::Other(c) => return Err(ParseError::UnexpectedToken(c.to_string())),
                Token::End => return self.finish(),
            }
        }
    }

    fn parse_redirection(&mut self, op: RedirectOp) -> Result<Redirection, ParseError> {
        let (stream, canonical_fd) = match op.kind {
            RedirectKind::In => (Stream::Stdin, 0),
            RedirectKind::Out => (Stream::Stdout, 1),
            RedirectKind::ErrOut => (Stream::Stderr, 2),
        };
        let unsupported = || ParseError::UnsupportedRedirect(op.to_string());

        if op.fd.is_some_and(|fd| fd != canonical_fd) {
            return Err(unsupported());
        }
        // `<>` parses as an append-style input operator; it has no meaning here.
        if op.append && stream == Stream::Stdin {
            return Err(unsupported());
        }

        if let Some(target) = op.dup_target {
            if target > 2 {
                return Err(unsupported());
            }
            return Ok(Redirection {
                stream,
                target: RedirectTarget::Descriptor(target as i32),
            });
        }

        match self.lexer.next_token() {
            Token::Word(path) => Ok(Redirection {
                stream,
                target: RedirectTarget::File {
                    path,
                    append: op.append,
                },
            }),
            _ => Err(ParseError::MissingRedirectTarget(op.to_string())),
        }
    }

    /// An operator needs a runnable command on its left.
    fn check_command(&self, token: &Token) -> Result<(), ParseError> {
        if !self.command.argv.is_empty() {
            Ok(())
        } else if !self.command.redirections.is_empty() {
            Err(ParseError::MissingCommand)
        } else {
            Err(ParseError::UnexpectedToken(token.to_string()))
        }
    }

    fn close_command(&mut self) {
        let command = mem::take(&mut self.command);
        self.pipeline.commands.push(command);
    }

    fn close_pipeline(&mut self) {
        let pipeline = mem::take(&mut self.pipeline);
        self.conditional.pipelines.push(pipeline);
    }

    fn close_conditional(&mut self) {
        let conditional = mem::take(&mut self.conditional);
        self.program.conditionals.push(conditional);
    }

    fn finish(mut self) -> Result<Program, ParseError> {
        if self.command.argv.is_empty() {
            if !self.command.redirections.is_empty() {
                return Err(ParseError::MissingCommand);
            }
            if !self.pipeline.commands.is_empty() {
                return Err(ParseError::TrailingOperator("|".to_string()));
            }
            if let Some(last) = self.conditional.pipelines.last() {
                let op = match last.combinator {
                    Some(Combinator::Or) => "||",
                    _ => "&&",
                };
                return Err(ParseError::TrailingOperator(op.to_string()));
            }
            // Nothing pending: empty line, or the line ended with `;` or `&`.
            if let Some(last) = self.program.conditionals.last_mut() {
                if last.separator == Some(Separator::Sequence) {
                    last.separator = None;
                }
            }
            return Ok(self.program);
        }

        self.close_command();
        self.close_pipeline();
        self.close_conditional();
        Ok(self.program)
    }
}

/// Parses one input line.
pub fn parse_line(line: &str) -> Result<Program, ParseError> {
    Parser::new(line).parse()
}

//! Recursive-descent parser from tokens to command lists.
//!
//! Keywords are only recognized unquoted and in command position, and the
//! parser reports [`ParseError::Incomplete`] whenever the input ends inside
//! an open construct so the REPL can prompt for a continuation line.

use thiserror::Error;

use crate::ast::{
    AndOrList, AndOrOp, Assignment, CaseItem, CaseTerminator, CompoundCommand, List, ListItem,
    Pipeline, PipelineSegment, Redirect, RedirectKind, Statement, Word, WordPart,
};
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    Incomplete,
    #[error("empty pipeline segment at position {pos}")]
    EmptyPipelineSegment { pos: usize },
    #[error("redirection at position {pos} is missing its target")]
    MissingRedirectTarget { pos: usize },
    #[error("unexpected token '{found}' at position {pos}")]
    UnexpectedToken { found: String, pos: usize },
}

impl ParseError {
    pub fn needs_more_input(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

const RESERVED: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "while", "until", "do", "done", "case", "esac",
    "in", "{", "}",
];

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser { tokens, pos: 0 }
    }

    /// Parse a whole token stream into a command list.
    pub fn parse(tokens: &'a [Token]) -> Result<List, ParseError> {
        let mut parser = Parser::new(tokens);
        let list = parser.parse_list(&[])?;
        match parser.peek().kind {
            TokenKind::Eof => Ok(list),
            _ => Err(parser.unexpected()),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or(&self.tokens[self.tokens.len() - 1])
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, kw: &str) -> bool {
        if self.peek().is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.consume_keyword(kw) {
            Ok(())
        } else if self.peek().kind == TokenKind::Eof {
            Err(ParseError::Incomplete)
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        ParseError::UnexpectedToken {
            found: if token.kind == TokenKind::Eof {
                "end of input".to_string()
            } else {
                token.text.clone()
            },
            pos: token.span.0,
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// True when the current token ends a list: end of input, a closing
    /// construct token, or one of the caller's stop keywords.
    fn at_list_end(&self, stops: &[&str]) -> bool {
        match self.peek().kind {
            TokenKind::Eof
            | TokenKind::RParen
            | TokenKind::DoubleSemi
            | TokenKind::SemiAmp
            | TokenKind::DoubleSemiAmp => true,
            TokenKind::Word => stops.iter().any(|kw| self.peek().is_keyword(kw)),
            _ => false,
        }
    }

    fn parse_list(&mut self, stops: &[&str]) -> Result<List, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.at_list_end(stops) {
                break;
            }
            let statement = self.parse_statement()?;
            let background = self.consume(TokenKind::Amp);
            items.push(ListItem {
                statement,
                background,
            });
            // After a statement: a separator, or the end of this list.
            if background || matches!(self.peek().kind, TokenKind::Newline | TokenKind::Semicolon)
            {
                continue;
            }
            if self.at_list_end(stops) {
                break;
            }
            return Err(self.unexpected());
        }
        Ok(List { items })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let token = self.peek();
        if token.kind == TokenKind::LParen {
            return self.parse_subshell().map(Statement::Compound);
        }
        if token.kind == TokenKind::Word {
            if token.is_keyword("if") {
                return self.parse_if().map(Statement::Compound);
            }
            if token.is_keyword("for") {
                return self.parse_for().map(Statement::Compound);
            }
            if token.is_keyword("while") {
                return self.parse_loop(false).map(Statement::Compound);
            }
            if token.is_keyword("until") {
                return self.parse_loop(true).map(Statement::Compound);
            }
            if token.is_keyword("case") {
                return self.parse_case().map(Statement::Compound);
            }
            if token.is_keyword("{") {
                return self.parse_brace_group().map(Statement::Compound);
            }
            if let Some(def) = self.try_function_def()? {
                return Ok(Statement::Compound(def));
            }
        }
        self.parse_and_or().map(Statement::AndOr)
    }

    fn parse_and_or(&mut self) -> Result<AndOrList, ParseError> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek().kind {
                TokenKind::And => AndOrOp::And,
                TokenKind::Or => AndOrOp::Or,
                _ => break,
            };
            self.advance();
            self.skip_newlines();
            rest.push((op, self.parse_pipeline()?));
        }
        Ok(AndOrList { first, rest })
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut segments = vec![self.parse_segment()?];
        while self.consume(TokenKind::Pipe) {
            // A pipeline may continue on the next physical line.
            self.skip_newlines();
            segments.push(self.parse_segment()?);
        }
        Ok(Pipeline { segments })
    }

    fn parse_segment(&mut self) -> Result<PipelineSegment, ParseError> {
        let start = self.peek().span.0;
        let mut segment = PipelineSegment {
            assignments: Vec::new(),
            words: Vec::new(),
            redirects: Vec::new(),
        };
        loop {
            match self.peek().kind {
                TokenKind::Word => {
                    if segment.words.is_empty() && segment.assignments.is_empty() {
                        let text = &self.peek().text;
                        if self.peek().quote == crate::lexer::QuoteContext::Unquoted
                            && RESERVED.contains(&text.as_str())
                        {
                            return Err(self.unexpected());
                        }
                    }
                    let word = self.parse_word().expect("word token present");
                    if segment.words.is_empty() {
                        if let Some(assignment) = as_assignment(&word) {
                            segment.assignments.push(assignment);
                            continue;
                        }
                    }
                    segment.words.push(word);
                }
                TokenKind::RedirectIn | TokenKind::RedirectOut | TokenKind::RedirectAppend => {
                    let kind = match self.peek().kind {
                        TokenKind::RedirectIn => RedirectKind::In,
                        TokenKind::RedirectOut => RedirectKind::Out,
                        _ => RedirectKind::Append,
                    };
                    let pos = self.peek().span.0;
                    self.advance();
                    let target = self
                        .parse_word()
                        .ok_or(ParseError::MissingRedirectTarget { pos })?;
                    segment.redirects.push(Redirect { kind, target });
                }
                _ => break,
            }
        }
        if segment.words.is_empty() && segment.assignments.is_empty() && segment.redirects.is_empty()
        {
            if self.peek().kind == TokenKind::Eof {
                // `cmd |` with nothing after: the line continues.
                return Err(ParseError::Incomplete);
            }
            return Err(ParseError::EmptyPipelineSegment { pos: start });
        }
        Ok(segment)
    }

    /// Collect one shell word: a word token plus any directly glued
    /// followers (`a"b"c` is three tokens, one word).
    fn parse_word(&mut self) -> Option<Word> {
        if self.peek().kind != TokenKind::Word {
            return None;
        }
        let mut parts = Vec::new();
        loop {
            let token = self.peek();
            if token.kind != TokenKind::Word || (!parts.is_empty() && !token.glued) {
                break;
            }
            parts.push(WordPart {
                text: token.text.clone(),
                quote: token.quote,
            });
            self.advance();
        }
        Some(Word::new(parts))
    }

    fn parse_if(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // if
        let mut arms = Vec::new();
        let cond = self.parse_list(&["then"])?;
        self.expect_keyword("then")?;
        let body = self.parse_list(&["elif", "else", "fi"])?;
        arms.push((cond, body));
        let mut else_body = None;
        loop {
            if self.consume_keyword("elif") {
                let cond = self.parse_list(&["then"])?;
                self.expect_keyword("then")?;
                let body = self.parse_list(&["elif", "else", "fi"])?;
                arms.push((cond, body));
            } else if self.consume_keyword("else") {
                else_body = Some(self.parse_list(&["fi"])?);
                self.expect_keyword("fi")?;
                break;
            } else {
                self.expect_keyword("fi")?;
                break;
            }
        }
        Ok(CompoundCommand::If { arms, else_body })
    }

    fn parse_for(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // for
        let var = match self.parse_word() {
            Some(w) if w.is_bare() && is_valid_name(&w.literal()) => w.literal(),
            Some(_) => return Err(self.unexpected()),
            None => {
                return if self.peek().kind == TokenKind::Eof {
                    Err(ParseError::Incomplete)
                } else {
                    Err(self.unexpected())
                };
            }
        };
        let mut words = Vec::new();
        if self.consume_keyword("in") {
            while let Some(word) = self.parse_word() {
                words.push(word);
            }
        } else {
            // Without `in`, iterate the positional parameters.
            words.push(Word::new(vec![WordPart::unquoted("$@")]));
        }
        self.skip_separators();
        self.expect_keyword("do")?;
        let body = self.parse_list(&["done"])?;
        self.expect_keyword("done")?;
        Ok(CompoundCommand::For { var, words, body })
    }

    fn parse_loop(&mut self, until: bool) -> Result<CompoundCommand, ParseError> {
        self.advance(); // while / until
        let cond = self.parse_list(&["do"])?;
        self.expect_keyword("do")?;
        let body = self.parse_list(&["done"])?;
        self.expect_keyword("done")?;
        Ok(if until {
            CompoundCommand::Until { cond, body }
        } else {
            CompoundCommand::While { cond, body }
        })
    }

    fn parse_case(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // case
        let word = match self.parse_word() {
            Some(w) => w,
            None => {
                return if self.peek().kind == TokenKind::Eof {
                    Err(ParseError::Incomplete)
                } else {
                    Err(self.unexpected())
                };
            }
        };
        self.skip_newlines();
        self.expect_keyword("in")?;
        self.skip_newlines();

        let mut items = Vec::new();
        loop {
            if self.consume_keyword("esac") {
                break;
            }
            if self.peek().kind == TokenKind::Eof {
                return Err(ParseError::Incomplete);
            }
            // Optional opening paren before the pattern list.
            self.consume(TokenKind::LParen);
            let mut patterns = Vec::new();
            loop {
                match self.parse_word() {
                    Some(w) => patterns.push(w),
                    None => {
                        return if self.peek().kind == TokenKind::Eof {
                            Err(ParseError::Incomplete)
                        } else {
                            Err(self.unexpected())
                        };
                    }
                }
                if !self.consume(TokenKind::Pipe) {
                    break;
                }
            }
            if !self.consume(TokenKind::RParen) {
                return if self.peek().kind == TokenKind::Eof {
                    Err(ParseError::Incomplete)
                } else {
                    Err(self.unexpected())
                };
            }
            let body = self.parse_list(&["esac"])?;
            let terminator = match self.peek().kind {
                TokenKind::DoubleSemi => {
                    self.advance();
                    CaseTerminator::Break
                }
                TokenKind::SemiAmp => {
                    self.advance();
                    CaseTerminator::FallThrough
                }
                TokenKind::DoubleSemiAmp => {
                    self.advance();
                    CaseTerminator::Continue
                }
                // The last item may omit its terminator.
                TokenKind::Word if self.peek().is_keyword("esac") => CaseTerminator::Break,
                TokenKind::Eof => return Err(ParseError::Incomplete),
                _ => return Err(self.unexpected()),
            };
            self.skip_newlines();
            items.push(CaseItem {
                patterns,
                body,
                terminator,
            });
        }
        Ok(CompoundCommand::Case { word, items })
    }

    fn parse_brace_group(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // {
        let body = self.parse_list(&["}"])?;
        self.expect_keyword("}")?;
        Ok(CompoundCommand::BraceGroup(body))
    }

    fn parse_subshell(&mut self) -> Result<CompoundCommand, ParseError> {
        self.advance(); // (
        let body = self.parse_list(&[])?;
        if !self.consume(TokenKind::RParen) {
            return if self.peek().kind == TokenKind::Eof {
                Err(ParseError::Incomplete)
            } else {
                Err(self.unexpected())
            };
        }
        Ok(CompoundCommand::Subshell(body))
    }

    /// `name() { body }`, detected by two tokens of lookahead.
    fn try_function_def(&mut self) -> Result<Option<CompoundCommand>, ParseError> {
        let name = {
            let token = self.peek();
            if token.kind != TokenKind::Word
                || token.quote != crate::lexer::QuoteContext::Unquoted
                || !is_valid_name(&token.text)
            {
                return Ok(None);
            }
            token.text.clone()
        };
        match (self.peek_at(1).map(|t| &t.kind), self.peek_at(2).map(|t| &t.kind)) {
            (Some(TokenKind::LParen), Some(TokenKind::RParen)) => {}
            _ => return Ok(None),
        }
        self.advance(); // name
        self.advance(); // (
        self.advance(); // )
        self.skip_newlines();
        if !self.peek().is_keyword("{") {
            return if self.peek().kind == TokenKind::Eof {
                Err(ParseError::Incomplete)
            } else {
                Err(self.unexpected())
            };
        }
        match self.parse_brace_group()? {
            CompoundCommand::BraceGroup(body) => {
                Ok(Some(CompoundCommand::FunctionDef { name, body }))
            }
            _ => unreachable!(),
        }
    }
}

/// `NAME=value` with a valid name in a single unquoted leading part.
fn as_assignment(word: &Word) -> Option<Assignment> {
    let first = word.parts.first()?;
    if first.quote != crate::lexer::QuoteContext::Unquoted {
        return None;
    }
    let eq = first.text.find('=')?;
    let name = &first.text[..eq];
    if !is_valid_name(name) {
        return None;
    }
    let mut value_parts = Vec::new();
    let rest = &first.text[eq + 1..];
    if !rest.is_empty() || word.parts.len() == 1 {
        value_parts.push(WordPart::unquoted(rest));
    }
    value_parts.extend(word.parts[1..].iter().cloned());
    Some(Assignment {
        name: name.to_string(),
        value: Word::new(value_parts),
    })
}

pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> List {
        Parser::parse(&Lexer::tokenize(input).unwrap()).unwrap()
    }

    fn parse_err(input: &str) -> ParseError {
        Parser::parse(&Lexer::tokenize(input).unwrap()).unwrap_err()
    }

    fn first_pipeline(list: &List) -> &Pipeline {
        match &list.items[0].statement {
            Statement::AndOr(and_or) => &and_or.first,
            other => panic!("expected pipeline, got {other:?}"),
        }
    }

    fn argv_literals(segment: &PipelineSegment) -> Vec<String> {
        segment.words.iter().map(|w| w.literal()).collect()
    }

    #[test]
    fn simple_command() {
        let list = parse("echo hello world");
        let pipeline = first_pipeline(&list);
        assert_eq!(pipeline.segments.len(), 1);
        assert_eq!(
            argv_literals(&pipeline.segments[0]),
            vec!["echo", "hello", "world"]
        );
    }

    #[test]
    fn pipeline_segments() {
        let list = parse("ls -l | grep foo | wc");
        let pipeline = first_pipeline(&list);
        assert_eq!(pipeline.segments.len(), 3);
        assert_eq!(argv_literals(&pipeline.segments[1]), vec!["grep", "foo"]);
    }

    #[test]
    fn redirects_removed_from_argv() {
        let list = parse("cat < in.txt > out.txt");
        let segment = &first_pipeline(&list).segments[0];
        assert_eq!(argv_literals(segment), vec!["cat"]);
        assert_eq!(segment.redirects.len(), 2);
        assert_eq!(segment.redirects[0].kind, RedirectKind::In);
        assert_eq!(segment.redirects[0].target.literal(), "in.txt");
        assert_eq!(segment.redirects[1].kind, RedirectKind::Out);
    }

    #[test]
    fn append_redirect() {
        let list = parse("echo x >> log");
        let segment = &first_pipeline(&list).segments[0];
        assert_eq!(segment.redirects[0].kind, RedirectKind::Append);
    }

    #[test]
    fn assignments_split_from_argv() {
        let list = parse("FOO=bar BAZ=qux env");
        let segment = &first_pipeline(&list).segments[0];
        assert_eq!(segment.assignments.len(), 2);
        assert_eq!(segment.assignments[0].name, "FOO");
        assert_eq!(segment.assignments[0].value.literal(), "bar");
        assert_eq!(argv_literals(segment), vec!["env"]);
    }

    #[test]
    fn assignment_only_after_command_is_argv() {
        let list = parse("env FOO=bar");
        let segment = &first_pipeline(&list).segments[0];
        assert!(segment.assignments.is_empty());
        assert_eq!(argv_literals(segment), vec!["env", "FOO=bar"]);
    }

    #[test]
    fn and_or_chain() {
        let list = parse("a && b || c");
        match &list.items[0].statement {
            Statement::AndOr(and_or) => {
                assert_eq!(and_or.rest.len(), 2);
                assert_eq!(and_or.rest[0].0, AndOrOp::And);
                assert_eq!(and_or.rest[1].0, AndOrOp::Or);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn background_flag() {
        let list = parse("sleep 5 & echo done");
        assert!(list.items[0].background);
        assert!(!list.items[1].background);
    }

    #[test]
    fn empty_pipeline_segment() {
        assert!(matches!(
            parse_err("| cat"),
            ParseError::EmptyPipelineSegment { .. }
        ));
        assert!(matches!(
            parse_err("a | | b"),
            ParseError::EmptyPipelineSegment { .. }
        ));
    }

    #[test]
    fn trailing_pipe_needs_more_input() {
        assert_eq!(parse_err("ls |"), ParseError::Incomplete);
        assert_eq!(parse_err("a &&"), ParseError::Incomplete);
    }

    #[test]
    fn open_construct_needs_more_input() {
        assert_eq!(parse_err("if true; then echo a"), ParseError::Incomplete);
        assert_eq!(parse_err("while true; do"), ParseError::Incomplete);
        assert_eq!(parse_err("case x in"), ParseError::Incomplete);
        assert_eq!(parse_err("( echo a"), ParseError::Incomplete);
    }

    #[test]
    fn if_with_elif_and_else() {
        let list = parse("if a; then b; elif c; then d; else e; fi");
        match &list.items[0].statement {
            Statement::Compound(CompoundCommand::If { arms, else_body }) => {
                assert_eq!(arms.len(), 2);
                assert!(else_body.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn for_loop_words() {
        let list = parse("for i in 1 2 3; do echo $i; done");
        match &list.items[0].statement {
            Statement::Compound(CompoundCommand::For { var, words, body }) => {
                assert_eq!(var, "i");
                assert_eq!(words.len(), 3);
                assert_eq!(body.items.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_loops_close_innermost_first() {
        let list = parse("for i in a; do for j in b; do echo $i$j; done; done");
        match &list.items[0].statement {
            Statement::Compound(CompoundCommand::For { body, .. }) => {
                assert!(matches!(
                    body.items[0].statement,
                    Statement::Compound(CompoundCommand::For { .. })
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn case_items_and_terminators() {
        let list = parse("case $x in a|b) echo ab;; c) echo c;& d) echo d;;& *) echo rest; esac");
        match &list.items[0].statement {
            Statement::Compound(CompoundCommand::Case { items, .. }) => {
                assert_eq!(items.len(), 4);
                assert_eq!(items[0].patterns.len(), 2);
                assert_eq!(items[0].terminator, CaseTerminator::Break);
                assert_eq!(items[1].terminator, CaseTerminator::FallThrough);
                assert_eq!(items[2].terminator, CaseTerminator::Continue);
                assert_eq!(items[3].terminator, CaseTerminator::Break);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn function_definition() {
        let list = parse("greet() { echo hi; }");
        match &list.items[0].statement {
            Statement::Compound(CompoundCommand::FunctionDef { name, body }) => {
                assert_eq!(name, "greet");
                assert_eq!(body.items.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn quoted_keyword_is_not_a_keyword() {
        let list = parse("echo 'if'");
        let segment = &first_pipeline(&list).segments[0];
        assert_eq!(argv_literals(segment), vec!["echo", "if"]);
    }

    #[test]
    fn keyword_in_pipeline_is_rejected() {
        assert!(matches!(
            parse_err("a | if"),
            ParseError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn glued_word_parts() {
        let list = parse(r#"echo a"b c"d"#);
        let segment = &first_pipeline(&list).segments[0];
        assert_eq!(segment.words[1].parts.len(), 3);
        assert_eq!(segment.words[1].literal(), "ab cd");
    }

    #[test]
    fn newline_separates_statements() {
        let list = parse("echo a\necho b");
        assert_eq!(list.items.len(), 2);
    }

    #[test]
    fn subshell() {
        let list = parse("(cd /tmp; pwd)");
        assert!(matches!(
            list.items[0].statement,
            Statement::Compound(CompoundCommand::Subshell(_))
        ));
    }
}

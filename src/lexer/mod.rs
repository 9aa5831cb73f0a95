mod token;

pub use token::{QuoteContext, Token, TokenKind};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated quote '{quote}' starting at position {pos}")]
    UnterminatedQuote { quote: char, pos: usize },
    #[error("unclosed command substitution starting at position {pos}")]
    UnclosedSubstitution { pos: usize },
}

impl LexError {
    /// During interactive use an unterminated construct means the line is
    /// not finished yet, not that it is wrong.
    pub fn needs_more_input(&self) -> bool {
        true
    }
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize an entire input line (possibly spanning several physical
    /// lines). The final token is always `Eof`.
    pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        // Skip blanks (but not newlines: those separate lists) and
        // backslash-newline continuations between words.
        loop {
            match self.peek() {
                Some(' ') | Some('\t') => self.pos += 1,
                Some('\\') if self.peek_at(1) == Some('\n') => self.pos += 2,
                _ => break,
            }
        }

        // A comment runs to end of line, but only when `#` starts a word
        // (`a#b` is an ordinary word).
        let at_word_start = self.pos == 0
            || matches!(
                self.chars[self.pos - 1],
                ' ' | '\t' | '\n' | '|' | '&' | ';' | '<' | '>' | '(' | ')'
            );
        if self.peek() == Some('#') && at_word_start {
            while !matches!(self.peek(), None | Some('\n')) {
                self.pos += 1;
            }
        }

        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token::operator(TokenKind::Eof, "", start));
        };

        match ch {
            '\n' => {
                self.pos += 1;
                Ok(Token::operator(TokenKind::Newline, "\n", start))
            }
            '|' => {
                self.pos += 1;
                if self.peek() == Some('|') {
                    self.pos += 1;
                    Ok(Token::operator(TokenKind::Or, "||", start))
                } else {
                    Ok(Token::operator(TokenKind::Pipe, "|", start))
                }
            }
            '&' => {
                self.pos += 1;
                if self.peek() == Some('&') {
                    self.pos += 1;
                    Ok(Token::operator(TokenKind::And, "&&", start))
                } else {
                    Ok(Token::operator(TokenKind::Amp, "&", start))
                }
            }
            ';' => {
                self.pos += 1;
                if self.peek() == Some(';') {
                    self.pos += 1;
                    if self.peek() == Some('&') {
                        self.pos += 1;
                        Ok(Token::operator(TokenKind::DoubleSemiAmp, ";;&", start))
                    } else {
                        Ok(Token::operator(TokenKind::DoubleSemi, ";;", start))
                    }
                } else if self.peek() == Some('&') {
                    self.pos += 1;
                    Ok(Token::operator(TokenKind::SemiAmp, ";&", start))
                } else {
                    Ok(Token::operator(TokenKind::Semicolon, ";", start))
                }
            }
            '<' => {
                self.pos += 1;
                Ok(Token::operator(TokenKind::RedirectIn, "<", start))
            }
            '>' => {
                self.pos += 1;
                if self.peek() == Some('>') {
                    self.pos += 1;
                    Ok(Token::operator(TokenKind::RedirectAppend, ">>", start))
                } else {
                    Ok(Token::operator(TokenKind::RedirectOut, ">", start))
                }
            }
            '(' => {
                self.pos += 1;
                Ok(Token::operator(TokenKind::LParen, "(", start))
            }
            ')' => {
                self.pos += 1;
                Ok(Token::operator(TokenKind::RParen, ")", start))
            }
            '\'' => self.read_single_quoted(start),
            '"' => self.read_double_quoted(start),
            _ => self.read_unquoted(start),
        }
    }

    fn word(&self, text: String, quote: QuoteContext, start: usize) -> Token {
        // Glued to the previous token when the preceding character is part
        // of a word rather than a delimiter.
        let glued = start > 0
            && !matches!(
                self.chars[start - 1],
                ' ' | '\t' | '\n' | '|' | '&' | ';' | '<' | '>' | '(' | ')'
            );
        Token {
            kind: TokenKind::Word,
            text,
            quote,
            span: (start, self.pos),
            glued,
        }
    }

    fn read_single_quoted(&mut self, start: usize) -> Result<Token, LexError> {
        self.pos += 1; // opening quote
        let mut buf = String::new();
        while let Some(ch) = self.bump() {
            if ch == '\'' {
                return Ok(self.word(buf, QuoteContext::SingleQuoted, start));
            }
            buf.push(ch);
        }
        Err(LexError::UnterminatedQuote { quote: '\'', pos: start })
    }

    fn read_double_quoted(&mut self, start: usize) -> Result<Token, LexError> {
        self.pos += 1; // opening quote
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            match ch {
                '"' => {
                    self.pos += 1;
                    return Ok(self.word(buf, QuoteContext::DoubleQuoted, start));
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    // Continuation inside double quotes: both characters drop.
                    self.pos += 2;
                }
                '\\' => {
                    // Escape survives into the token text; expansion decides
                    // whether it protects the next character.
                    buf.push('\\');
                    self.pos += 1;
                    if let Some(next) = self.bump() {
                        buf.push(next);
                    }
                }
                '$' if self.peek_at(1) == Some('(') => {
                    buf.push('$');
                    buf.push('(');
                    self.pos += 2;
                    self.consume_substitution_body(start, &mut buf)?;
                }
                '`' => {
                    buf.push('`');
                    self.pos += 1;
                    self.consume_backtick_body(start, &mut buf)?;
                }
                _ => {
                    buf.push(ch);
                    self.pos += 1;
                }
            }
        }
        Err(LexError::UnterminatedQuote { quote: '"', pos: start })
    }

    fn read_unquoted(&mut self, start: usize) -> Result<Token, LexError> {
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\n' | '|' | '&' | ';' | '<' | '>' | '(' | ')' => break,
                // A quote starts a new (glued) token.
                '\'' | '"' => break,
                '\\' if self.peek_at(1) == Some('\n') => self.pos += 2,
                '\\' => {
                    buf.push('\\');
                    self.pos += 1;
                    if let Some(next) = self.bump() {
                        buf.push(next);
                    }
                }
                '$' if self.peek_at(1) == Some('(') => {
                    buf.push('$');
                    buf.push('(');
                    self.pos += 2;
                    self.consume_substitution_body(start, &mut buf)?;
                }
                '`' => {
                    buf.push('`');
                    self.pos += 1;
                    self.consume_backtick_body(start, &mut buf)?;
                }
                _ => {
                    buf.push(ch);
                    self.pos += 1;
                }
            }
        }
        Ok(self.word(buf, QuoteContext::Unquoted, start))
    }

    /// Consume the body of a `$(...)` already entered, leaving `pos` just
    /// past the matching `)`. Tracks nesting and quotes so the whole
    /// substitution stays inside one word token.
    fn consume_substitution_body(
        &mut self,
        word_start: usize,
        buf: &mut String,
    ) -> Result<(), LexError> {
        let mut depth = 1usize;
        while let Some(ch) = self.bump() {
            buf.push(ch);
            match ch {
                '\\' => {
                    if let Some(next) = self.bump() {
                        buf.push(next);
                    }
                }
                '\'' => {
                    while let Some(c) = self.bump() {
                        buf.push(c);
                        if c == '\'' {
                            break;
                        }
                    }
                }
                '"' => {
                    while let Some(c) = self.bump() {
                        buf.push(c);
                        if c == '\\' {
                            if let Some(next) = self.bump() {
                                buf.push(next);
                            }
                        } else if c == '"' {
                            break;
                        }
                    }
                }
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(LexError::UnclosedSubstitution { pos: word_start })
    }

    /// Consume to the closing backtick. Backtick substitution does not nest.
    fn consume_backtick_body(&mut self, word_start: usize, buf: &mut String) -> Result<(), LexError> {
        while let Some(ch) = self.bump() {
            buf.push(ch);
            match ch {
                '\\' => {
                    if let Some(next) = self.bump() {
                        buf.push(next);
                    }
                }
                '`' => return Ok(()),
                _ => {}
            }
        }
        Err(LexError::UnclosedSubstitution { pos: word_start })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn words(input: &str) -> Vec<String> {
        Lexer::tokenize(input)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn simple_words() {
        let tokens = Lexer::tokenize("echo hello").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "echo");
        assert_eq!(tokens[0].span, (0, 4));
        assert_eq!(tokens[1].text, "hello");
        assert_eq!(tokens[1].span, (5, 10));
        assert_eq!(tokens[2].kind, TokenKind::Eof);
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("a | b && c || d ; e & f"),
            vec![
                TokenKind::Word,
                TokenKind::Pipe,
                TokenKind::Word,
                TokenKind::And,
                TokenKind::Word,
                TokenKind::Or,
                TokenKind::Word,
                TokenKind::Semicolon,
                TokenKind::Word,
                TokenKind::Amp,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn redirects_and_append() {
        assert_eq!(
            kinds("cat < in > out >> log"),
            vec![
                TokenKind::Word,
                TokenKind::RedirectIn,
                TokenKind::Word,
                TokenKind::RedirectOut,
                TokenKind::Word,
                TokenKind::RedirectAppend,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn case_terminators() {
        assert_eq!(
            kinds(";; ;& ;;&"),
            vec![
                TokenKind::DoubleSemi,
                TokenKind::SemiAmp,
                TokenKind::DoubleSemiAmp,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn single_quotes_are_verbatim() {
        let tokens = Lexer::tokenize("echo '$HOME *'").unwrap();
        assert_eq!(tokens[1].text, "$HOME *");
        assert_eq!(tokens[1].quote, QuoteContext::SingleQuoted);
    }

    #[test]
    fn double_quotes_keep_content() {
        let tokens = Lexer::tokenize(r#"echo "a b $X""#).unwrap();
        assert_eq!(tokens[1].text, "a b $X");
        assert_eq!(tokens[1].quote, QuoteContext::DoubleQuoted);
    }

    #[test]
    fn glued_segments() {
        let tokens = Lexer::tokenize(r#"a"b"c"#).unwrap();
        assert_eq!(tokens.len(), 4);
        assert!(!tokens[0].glued);
        assert!(tokens[1].glued);
        assert!(tokens[2].glued);
    }

    #[test]
    fn escaped_space_stays_in_word() {
        assert_eq!(words(r"echo foo\ bar"), vec!["echo", r"foo\ bar"]);
    }

    #[test]
    fn substitution_stays_in_one_word() {
        assert_eq!(words("echo $(ls -l | wc)"), vec!["echo", "$(ls -l | wc)"]);
    }

    #[test]
    fn nested_substitution() {
        assert_eq!(
            words("echo $(echo $(whoami))"),
            vec!["echo", "$(echo $(whoami))"]
        );
    }

    #[test]
    fn unterminated_single_quote() {
        assert_eq!(
            Lexer::tokenize("echo 'foo"),
            Err(LexError::UnterminatedQuote { quote: '\'', pos: 5 })
        );
    }

    #[test]
    fn unterminated_double_quote() {
        assert_eq!(
            Lexer::tokenize("echo \"foo"),
            Err(LexError::UnterminatedQuote { quote: '"', pos: 5 })
        );
    }

    #[test]
    fn unclosed_substitution() {
        assert!(matches!(
            Lexer::tokenize("echo $(ls"),
            Err(LexError::UnclosedSubstitution { .. })
        ));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(words("echo a # b c"), vec!["echo", "a"]);
        assert_eq!(
            kinds("echo # x\nls"),
            vec![TokenKind::Word, TokenKind::Newline, TokenKind::Word, TokenKind::Eof]
        );
    }

    #[test]
    fn newline_is_a_separator() {
        assert_eq!(
            kinds("a\nb"),
            vec![TokenKind::Word, TokenKind::Newline, TokenKind::Word, TokenKind::Eof]
        );
    }

    #[test]
    fn line_continuation_joins_words() {
        assert_eq!(words("echo a\\\nb"), vec!["echo", "ab"]);
    }

    #[test]
    fn empty_input() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }
}

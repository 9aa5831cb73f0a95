/// Quote context a word token was read in. Decides which expansions apply
/// to it later: single quotes suppress everything, double quotes keep `$`
/// live but suppress splitting and globbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteContext {
    Unquoted,
    SingleQuoted,
    DoubleQuoted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Pipe,          // |
    And,           // &&
    Or,            // ||
    Amp,           // &
    Semicolon,     // ;
    DoubleSemi,    // ;;
    SemiAmp,       // ;&
    DoubleSemiAmp, // ;;&
    Newline,       // \n (list separator)
    RedirectIn,    // <
    RedirectOut,   // >
    RedirectAppend,// >>
    LParen,        // (
    RParen,        // )
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Word text with backslash escapes still in place; expansion performs
    /// quote removal after globbing so escaped metacharacters stay inert.
    pub text: String,
    pub quote: QuoteContext,
    /// Byte span [start, end) in the original line.
    pub span: (usize, usize),
    /// True when this word token directly abuts the previous word token
    /// (`a"b"c` lexes as three glued tokens forming one shell word).
    pub glued: bool,
}

impl Token {
    pub fn operator(kind: TokenKind, text: &str, start: usize) -> Self {
        Token {
            kind,
            text: text.to_string(),
            quote: QuoteContext::Unquoted,
            span: (start, start + text.len()),
            glued: false,
        }
    }

    /// Unquoted word whose text equals the given keyword. Quoted tokens are
    /// never keywords (`'if'` is an ordinary argument).
    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Word && self.quote == QuoteContext::Unquoted && self.text == kw
    }
}

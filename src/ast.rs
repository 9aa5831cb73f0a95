use crate::lexer::QuoteContext;

/// One quoting segment of a shell word. `a"b c"d` is a single [`Word`]
/// made of three parts with different quote contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPart {
    pub text: String,
    pub quote: QuoteContext,
}

impl WordPart {
    pub fn unquoted(text: &str) -> Self {
        WordPart {
            text: text.to_string(),
            quote: QuoteContext::Unquoted,
        }
    }
}

/// An unexpanded shell word. Expansion happens at execution time so loop
/// bodies and function bodies re-expand on every entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    pub fn new(parts: Vec<WordPart>) -> Self {
        Word { parts }
    }

    /// The literal spelling, used for keyword checks and error messages.
    pub fn literal(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }

    /// True when the word is a single unquoted part (candidate for
    /// keywords and assignment names).
    pub fn is_bare(&self) -> bool {
        self.parts.len() == 1 && self.parts[0].quote == QuoteContext::Unquoted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    In,     // <
    Out,    // >
    Append, // >>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: Word,
}

/// A variable assignment prefix (`NAME=value cmd ...`) or a standalone
/// assignment when the segment has no command words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
}

/// One command of a pipeline: assignments, argv words, redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSegment {
    pub assignments: Vec<Assignment>,
    pub words: Vec<Word>,
    pub redirects: Vec<Redirect>,
}

/// Commands connected by `|`. Always at least one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub segments: Vec<PipelineSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndOrOp {
    And, // &&
    Or,  // ||
}

/// Pipelines joined by `&&`/`||`, evaluated left to right with
/// short-circuiting on exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndOrList {
    pub first: Pipeline,
    pub rest: Vec<(AndOrOp, Pipeline)>,
}

/// What a `case` item does after its body ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTerminator {
    Break,       // ;;
    FallThrough, // ;&
    Continue,    // ;;&
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseItem {
    pub patterns: Vec<Word>,
    pub body: List,
    pub terminator: CaseTerminator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompoundCommand {
    /// `if c; then b; elif c2; then b2; else e; fi`: one `(cond, body)`
    /// arm per if/elif.
    If {
        arms: Vec<(List, List)>,
        else_body: Option<List>,
    },
    For {
        var: String,
        words: Vec<Word>,
        body: List,
    },
    While {
        cond: List,
        body: List,
    },
    Until {
        cond: List,
        body: List,
    },
    Case {
        word: Word,
        items: Vec<CaseItem>,
    },
    /// `name() { body }`
    FunctionDef {
        name: String,
        body: List,
    },
    /// `( list )`: runs against a snapshot of the shell state.
    Subshell(List),
    /// `{ list }`: runs in place.
    BraceGroup(List),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    AndOr(AndOrList),
    Compound(CompoundCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub statement: Statement,
    /// Terminated by `&`: run without waiting.
    pub background: bool,
}

/// A complete command list: statements separated by `;`, `&`, or newline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct List {
    pub items: Vec<ListItem>,
}

impl List {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

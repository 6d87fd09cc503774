//! Token table and lexer driver tables.
//!
//! The parser and its Pratt expression loop live upstream; this module
//! owns what they consume: the closed token enumeration with its
//! precedence and associativity tables, and the DFA driver tables — a
//! 256-entry byte→equivalence-class table and a dense state×class
//! transition table with per-state accepting tokens. The tables are
//! built once on first use.

use std::sync::OnceLock;

macro_rules! define_tokens {
    ($($variant:ident = ($name:expr, $prec:expr, $rassoc:expr);)+) => {
        /// The closed token enumeration.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
        #[repr(u16)]
        pub enum Token {
            $($variant),+
        }

        impl Token {
            pub const fn name(self) -> &'static str {
                match self {
                    $(Token::$variant => $name),+
                }
            }

            /// Pratt binding power; higher binds looser. Zero for
            /// tokens that never appear as operators.
            pub const fn precedence(self) -> u8 {
                match self {
                    $(Token::$variant => $prec),+
                }
            }

            pub const fn right_assoc(self) -> bool {
                match self {
                    $(Token::$variant => $rassoc),+
                }
            }
        }
    };
}

define_tokens! {
    Error = ("error", 0, false);
    Eof = ("eof", 0, false);
    Comment = ("comment", 0, false);
    MlCommentBegin = ("multi-line comment", 0, false);
    Eol = ("end of line", 0, false);
    Whitespace = ("whitespace", 0, false);
    // Keywords.
    If = ("if", 1, false);
    Else = ("else", 1, false);
    For = ("for", 1, false);
    While = ("while", 1, false);
    Do = ("do", 1, false);
    Break = ("break", 1, false);
    Continue = ("continue", 1, false);
    Return = ("return", 1, false);
    Fn = ("fn", 1, false);
    Ct = ("ct", 1, false);
    Mode = ("mode", 1, false);
    Nmi = ("nmi", 1, false);
    Irq = ("irq", 1, false);
    Goto = ("goto", 1, false);
    LabelKw = ("label", 1, false);
    File = ("file", 1, false);
    Struct = ("struct", 1, false);
    Vars = ("vars", 1, false);
    Data = ("data", 1, false);
    Omni = ("omni", 1, false);
    Asm = ("asm", 1, false);
    Ready = ("ready", 1, false);
    Fence = ("fence", 1, false);
    Switch = ("switch", 1, false);
    Case = ("case", 1, false);
    Default = ("default", 1, false);
    Charmap = ("charmap", 1, false);
    Chrrom = ("chrrom", 1, false);
    Employs = ("employs", 1, false);
    Preserves = ("preserves", 1, false);
    Stows = ("stows", 1, false);
    Audio = ("audio", 1, false);
    System = ("system", 1, false);
    State = ("state", 1, false);
    True = ("true", 1, false);
    False = ("false", 1, false);
    // Hardware register names.
    PpuCtrl = ("PPUCTRL", 1, false);
    PpuMask = ("PPUMASK", 1, false);
    PpuStatus = ("PPUSTATUS", 1, false);
    PpuScroll = ("PPUSCROLL", 1, false);
    PpuAddr = ("PPUADDR", 1, false);
    PpuData = ("PPUDATA", 1, false);
    OamAddr = ("OAMADDR", 1, false);
    OamData = ("OAMDATA", 1, false);
    OamDma = ("OAMDMA", 1, false);
    SystemNtsc = ("SYSTEM_NTSC", 1, false);
    SystemPal = ("SYSTEM_PAL", 1, false);
    SystemDendy = ("SYSTEM_DENDY", 1, false);
    SystemUnknown = ("SYSTEM_UNKNOWN", 1, false);
    // Punctuation.
    Colon = (":", 0, false);
    Hash = ("#", 0, false);
    Backtick = ("`", 0, false);
    Dquote = ("\"", 0, false);
    Quote = ("'", 0, false);
    Semicolon = (";", 0, false);
    Comma = ("comma", 0, false);
    Lbrace = ("{", 0, false);
    Rbrace = ("}", 0, false);
    Lbracket = ("[", 6, false);
    Rbracket = ("]", 0, false);
    Lparen = ("(", 7, false);
    Rparen = (")", 0, false);
    // Operators; precedence mirrors the Pratt loop's expectations.
    Sizeof = ("sizeof", 1, false);
    Len = ("len", 1, false);
    UnaryPlus = ("unary +", 8, false);
    UnaryMinus = ("unary -", 8, false);
    UnaryXor = ("unary ~", 8, false);
    UnaryNegate = ("unary !", 8, false);
    UnaryRef = ("unary &", 8, false);
    At = ("@", 4, false);
    Period = (".", 5, false);
    Apply = ("apply", 7, false);
    Cast = ("cast", 6, false);
    Index8 = ("index []", 6, false);
    Index16 = ("index [[]]", 6, false);
    Increment = ("++", 8, false);
    Decrement = ("--", 8, false);
    Asterisk = ("*", 10, false);
    Fslash = ("/", 10, false);
    Plus = ("+", 11, false);
    Minus = ("-", 11, false);
    Rol = ("<-<", 12, false);
    Ror = (">->", 13, false);
    Lshift = ("<<", 14, false);
    Rshift = (">>", 14, false);
    BitwiseAnd = ("&", 15, false);
    BitwiseXor = ("^", 16, false);
    BitwiseOr = ("|", 17, false);
    Lt = ("<", 18, false);
    Lte = ("<=", 18, false);
    Gt = (">", 18, false);
    Gte = (">=", 18, false);
    Eq = ("==", 19, false);
    NotEq = ("!=", 19, false);
    LogicalAnd = ("&&", 20, false);
    LogicalOr = ("||", 21, false);
    Assign = ("=", 29, true);
    PlusAssign = ("+=", 30, true);
    MinusAssign = ("-=", 30, true);
    TimesAssign = ("*=", 30, true);
    DivAssign = ("/=", 30, true);
    AndAssign = ("&=", 30, true);
    XorAssign = ("^=", 30, true);
    OrAssign = ("|=", 30, true);
    LshiftAssign = ("<<=", 30, true);
    RshiftAssign = (">>=", 30, true);
    RolAssign = ("<-<=", 30, true);
    RorAssign = (">->=", 30, true);
    // Type names.
    Void = ("Void", 1, false);
    TypeF = ("F", 1, false);
    TypeFF = ("FF", 1, false);
    TypeFFF = ("FFF", 1, false);
    TypeU = ("U", 1, false);
    TypeUU = ("UU", 1, false);
    TypeUUU = ("UUU", 1, false);
    TypeUF = ("UF", 1, false);
    TypeUUF = ("UUF", 1, false);
    TypeUUUF = ("UUUF", 1, false);
    TypeUFF = ("UFF", 1, false);
    TypeUUFF = ("UUFF", 1, false);
    TypeUUUFF = ("UUUFF", 1, false);
    TypeUFFF = ("UFFF", 1, false);
    TypeUUFFF = ("UUFFF", 1, false);
    TypeUUUFFF = ("UUUFFF", 1, false);
    TypeS = ("S", 1, false);
    TypeSS = ("SS", 1, false);
    TypeSSS = ("SSS", 1, false);
    TypeSF = ("SF", 1, false);
    TypeSSF = ("SSF", 1, false);
    TypeSSSF = ("SSSF", 1, false);
    TypeSFF = ("SFF", 1, false);
    TypeSSFF = ("SSFF", 1, false);
    TypeSSSFF = ("SSSFF", 1, false);
    TypeSFFF = ("SFFF", 1, false);
    TypeSSFFF = ("SSFFF", 1, false);
    TypeSSSFFF = ("SSSFFF", 1, false);
    TypeAA = ("AA", 1, false);
    TypeAAA = ("AAA", 1, false);
    TypePP = ("PP", 1, false);
    TypePPP = ("PPP", 1, false);
    TypeCC = ("CC", 1, false);
    TypeCCC = ("CCC", 1, false);
    TypeMM = ("MM", 1, false);
    TypeMMM = ("MMM", 1, false);
    TypeInt = ("Int", 1, false);
    TypeReal = ("Real", 1, false);
    TypeBool = ("Bool", 1, false);
    // Value-carrying tokens.
    Ident = ("identifier", 1, false);
    TypeIdent = ("type identifier", 1, false);
    Decimal = ("number", 1, false);
    Hex = ("hex number", 1, false);
    Binary = ("binary number", 1, false);
    Character = ("character literal", 1, false);
    StringLiteral = ("string literal", 1, false);
}

const KEYWORDS: &[(&str, Token)] = &[
    ("if", Token::If),
    ("else", Token::Else),
    ("for", Token::For),
    ("while", Token::While),
    ("do", Token::Do),
    ("break", Token::Break),
    ("continue", Token::Continue),
    ("return", Token::Return),
    ("fn", Token::Fn),
    ("ct", Token::Ct),
    ("mode", Token::Mode),
    ("nmi", Token::Nmi),
    ("irq", Token::Irq),
    ("goto", Token::Goto),
    ("label", Token::LabelKw),
    ("file", Token::File),
    ("struct", Token::Struct),
    ("vars", Token::Vars),
    ("data", Token::Data),
    ("omni", Token::Omni),
    ("asm", Token::Asm),
    ("ready", Token::Ready),
    ("fence", Token::Fence),
    ("switch", Token::Switch),
    ("case", Token::Case),
    ("default", Token::Default),
    ("charmap", Token::Charmap),
    ("chrrom", Token::Chrrom),
    ("employs", Token::Employs),
    ("preserves", Token::Preserves),
    ("stows", Token::Stows),
    ("audio", Token::Audio),
    ("system", Token::System),
    ("state", Token::State),
    ("sizeof", Token::Sizeof),
    ("len", Token::Len),
    ("true", Token::True),
    ("false", Token::False),
    ("PPUCTRL", Token::PpuCtrl),
    ("PPUMASK", Token::PpuMask),
    ("PPUSTATUS", Token::PpuStatus),
    ("PPUSCROLL", Token::PpuScroll),
    ("PPUADDR", Token::PpuAddr),
    ("PPUDATA", Token::PpuData),
    ("OAMADDR", Token::OamAddr),
    ("OAMDATA", Token::OamData),
    ("OAMDMA", Token::OamDma),
    ("SYSTEM_NTSC", Token::SystemNtsc),
    ("SYSTEM_PAL", Token::SystemPal),
    ("SYSTEM_DENDY", Token::SystemDendy),
    ("SYSTEM_UNKNOWN", Token::SystemUnknown),
    ("Void", Token::Void),
    ("F", Token::TypeF),
    ("FF", Token::TypeFF),
    ("FFF", Token::TypeFFF),
    ("U", Token::TypeU),
    ("UU", Token::TypeUU),
    ("UUU", Token::TypeUUU),
    ("UF", Token::TypeUF),
    ("UUF", Token::TypeUUF),
    ("UUUF", Token::TypeUUUF),
    ("UFF", Token::TypeUFF),
    ("UUFF", Token::TypeUUFF),
    ("UUUFF", Token::TypeUUUFF),
    ("UFFF", Token::TypeUFFF),
    ("UUFFF", Token::TypeUUFFF),
    ("UUUFFF", Token::TypeUUUFFF),
    ("S", Token::TypeS),
    ("SS", Token::TypeSS),
    ("SSS", Token::TypeSSS),
    ("SF", Token::TypeSF),
    ("SSF", Token::TypeSSF),
    ("SSSF", Token::TypeSSSF),
    ("SFF", Token::TypeSFF),
    ("SSFF", Token::TypeSSFF),
    ("SSSFF", Token::TypeSSSFF),
    ("SFFF", Token::TypeSFFF),
    ("SSFFF", Token::TypeSSFFF),
    ("SSSFFF", Token::TypeSSSFFF),
    ("AA", Token::TypeAA),
    ("AAA", Token::TypeAAA),
    ("PP", Token::TypePP),
    ("PPP", Token::TypePPP),
    ("CC", Token::TypeCC),
    ("CCC", Token::TypeCCC),
    ("MM", Token::TypeMM),
    ("MMM", Token::TypeMMM),
    ("Int", Token::TypeInt),
    ("Real", Token::TypeReal),
    ("Bool", Token::TypeBool),
];

const OPERATORS: &[(&str, Token)] = &[
    (":", Token::Colon),
    ("#", Token::Hash),
    ("`", Token::Backtick),
    (";", Token::Semicolon),
    (",", Token::Comma),
    ("{", Token::Lbrace),
    ("}", Token::Rbrace),
    ("[", Token::Lbracket),
    ("]", Token::Rbracket),
    ("(", Token::Lparen),
    (")", Token::Rparen),
    ("@", Token::At),
    (".", Token::Period),
    ("++", Token::Increment),
    ("--", Token::Decrement),
    ("*", Token::Asterisk),
    ("/", Token::Fslash),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("~", Token::UnaryXor),
    ("!", Token::UnaryNegate),
    ("<-<", Token::Rol),
    (">->", Token::Ror),
    ("<<", Token::Lshift),
    (">>", Token::Rshift),
    ("&", Token::BitwiseAnd),
    ("^", Token::BitwiseXor),
    ("|", Token::BitwiseOr),
    ("<", Token::Lt),
    ("<=", Token::Lte),
    (">", Token::Gt),
    (">=", Token::Gte),
    ("==", Token::Eq),
    ("!=", Token::NotEq),
    ("&&", Token::LogicalAnd),
    ("||", Token::LogicalOr),
    ("=", Token::Assign),
    ("+=", Token::PlusAssign),
    ("-=", Token::MinusAssign),
    ("*=", Token::TimesAssign),
    ("/=", Token::DivAssign),
    ("&=", Token::AndAssign),
    ("^=", Token::XorAssign),
    ("|=", Token::OrAssign),
    ("<<=", Token::LshiftAssign),
    (">>=", Token::RshiftAssign),
    ("<-<=", Token::RolAssign),
    (">->=", Token::RorAssign),
];

/// A DFA state index.
pub type LexState = u16;

/// The dead state; no token ends here and no input leaves it.
pub const LEX_DEAD: LexState = 0;

/// Driver tables for the table-driven lexer loop: maximal munch is a
/// walk through `transition` remembering the last accepting state.
pub struct LexTables {
    /// 256-entry byte → equivalence class table.
    ec: [u16; 256],
    class_count: usize,
    /// Dense state×class transition table.
    transitions: Vec<LexState>,
    /// Token accepted in each state; `Token::Error` where none.
    accepting: Vec<Token>,
    start: LexState,
}

impl LexTables {
    pub fn get() -> &'static LexTables {
        static TABLES: OnceLock<LexTables> = OnceLock::new();
        TABLES.get_or_init(LexTables::build)
    }

    pub fn start_state(&self) -> LexState {
        self.start
    }

    pub fn state_count(&self) -> usize {
        self.accepting.len()
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn equivalence_class(&self, byte: u8) -> u16 {
        self.ec[byte as usize]
    }

    pub fn transition(&self, state: LexState, byte: u8) -> LexState {
        self.transitions[state as usize * self.class_count + self.ec[byte as usize] as usize]
    }

    pub fn token(&self, state: LexState) -> Token {
        self.accepting[state as usize]
    }

    /// Maximal-munch one token off the front of `input`. Returns the
    /// token and the byte length consumed; `(Token::Error, 1)` when no
    /// prefix matches, `(Token::Eof, 0)` on empty input.
    pub fn lex_one(&self, input: &[u8]) -> (Token, usize) {
        if input.is_empty() {
            return (Token::Eof, 0);
        }

        let mut state = self.start;
        let mut best: Option<(Token, usize)> = None;
        for (i, &byte) in input.iter().enumerate() {
            state = self.transition(state, byte);
            if state == LEX_DEAD {
                break;
            }
            let token = self.token(state);
            if token != Token::Error {
                best = Some((token, i + 1));
            }
        }

        best.unwrap_or((Token::Error, 1))
    }

    fn build() -> LexTables {
        Builder::new().build()
    }
}

/// Character categories that drive equivalence-class assignment.
fn interesting_bytes() -> Vec<u8> {
    let mut bytes: Vec<u8> = Vec::new();
    bytes.extend(b'a'..=b'z');
    bytes.extend(b'A'..=b'Z');
    bytes.extend(b'0'..=b'9');
    bytes.push(b'_');
    for (text, _) in OPERATORS {
        bytes.extend(text.bytes());
    }
    bytes.extend([b'"', b'\'']);
    bytes.sort_unstable();
    bytes.dedup();
    bytes
}

struct Builder {
    ec: [u16; 256],
    class_count: usize,
    ws_class: u16,
    eol_class: u16,
    /// transitions[state][class]
    states: Vec<Vec<LexState>>,
    accepting: Vec<Token>,
}

impl Builder {
    fn new() -> Builder {
        // Assign equivalence classes: every byte the token grammar
        // distinguishes gets its own class; whitespace, newlines, and
        // everything else fold into three shared classes.
        let interesting = interesting_bytes();
        let mut is_interesting = [false; 256];
        for &b in &interesting {
            is_interesting[b as usize] = true;
        }

        let mut ec = [0u16; 256];
        let mut next = 0u16;
        for &byte in &interesting {
            ec[byte as usize] = next;
            next += 1;
        }
        let ws_class = next;
        let eol_class = next + 1;
        let other_class = next + 2;
        for b in 0..256 {
            match b as u8 {
                b' ' | b'\t' => ec[b] = ws_class,
                b'\n' | b'\r' => ec[b] = eol_class,
                _ if !is_interesting[b] => ec[b] = other_class,
                _ => {}
            }
        }

        let class_count = (other_class + 1) as usize;
        let mut builder = Builder {
            ec,
            class_count,
            ws_class,
            eol_class,
            states: Vec::new(),
            accepting: Vec::new(),
        };
        // State 0 is dead, state 1 the start.
        builder.new_state(Token::Error);
        builder.new_state(Token::Error);
        builder
    }

    fn new_state(&mut self, token: Token) -> LexState {
        self.states.push(vec![LEX_DEAD; self.class_count]);
        self.accepting.push(token);
        (self.states.len() - 1) as LexState
    }

    fn class_of(&self, byte: u8) -> u16 {
        self.ec[byte as usize]
    }

    fn build(mut self) -> LexTables {
        let start: LexState = 1;

        // Identifiers: letters and underscores flow into a self-looping
        // accepting state; keyword trie states fall back into it.
        let ident = self.new_state(Token::Ident);
        for byte in (b'a'..=b'z').chain(b'A'..=b'Z').chain(b'0'..=b'9').chain([b'_']) {
            let class = self.class_of(byte) as usize;
            self.states[ident as usize][class] = ident;
            if self.states[start as usize][class] == LEX_DEAD {
                self.states[start as usize][class] = ident;
            }
        }

        // Keyword trie layered over the identifier fallback.
        let mut trie_states: Vec<LexState> = Vec::new();
        for &(text, token) in KEYWORDS {
            let mut state = start;
            for (i, byte) in text.bytes().enumerate() {
                let last = i + 1 == text.len();
                let accept = if last { token } else { Token::Ident };
                let class = self.class_of(byte) as usize;
                let existing = self.states[state as usize][class];
                state = if existing != LEX_DEAD && existing != ident {
                    if last && self.accepting[existing as usize] == Token::Ident {
                        self.accepting[existing as usize] = token;
                    }
                    existing
                } else {
                    let new = self.new_state(accept);
                    self.states[state as usize][class] = new;
                    trie_states.push(new);
                    new
                };
            }
        }
        // Any identifier character leaving a trie state keeps lexing an
        // identifier.
        for &state in &trie_states {
            for byte in (b'a'..=b'z').chain(b'A'..=b'Z').chain(b'0'..=b'9').chain([b'_']) {
                let class = self.class_of(byte) as usize;
                if self.states[state as usize][class] == LEX_DEAD {
                    self.states[state as usize][class] = ident;
                }
            }
        }

        // Numbers. `0x` and `0b` prefixes branch off a leading zero.
        let decimal = self.new_state(Token::Decimal);
        let zero = self.new_state(Token::Decimal);
        for byte in b'0'..=b'9' {
            let class = self.class_of(byte) as usize;
            self.states[decimal as usize][class] = decimal;
            self.states[zero as usize][class] = decimal;
            // Digits win over the ident fallback from the start state.
            self.states[start as usize][class] = decimal;
        }
        let class_zero = self.class_of(b'0') as usize;
        self.states[start as usize][class_zero] = zero;

        let hex_prefix = self.new_state(Token::Error);
        let class_x = self.class_of(b'x') as usize;
        self.states[zero as usize][class_x] = hex_prefix;
        let hex = self.new_state(Token::Hex);
        for byte in (b'0'..=b'9').chain(b'a'..=b'f').chain(b'A'..=b'F') {
            let class = self.class_of(byte) as usize;
            self.states[hex_prefix as usize][class] = hex;
            self.states[hex as usize][class] = hex;
        }
        let bin_prefix = self.new_state(Token::Error);
        let class_b = self.class_of(b'b') as usize;
        self.states[zero as usize][class_b] = bin_prefix;
        let bin = self.new_state(Token::Binary);
        for byte in [b'0', b'1'] {
            let class = self.class_of(byte) as usize;
            self.states[bin_prefix as usize][class] = bin;
            self.states[bin as usize][class] = bin;
        }

        // Operators, longest match via the trie structure itself.
        for &(text, token) in OPERATORS {
            let bytes = text.as_bytes();
            let mut state = start;
            for (i, &byte) in bytes.iter().enumerate() {
                let last = i + 1 == bytes.len();
                let accept = if last { token } else { Token::Error };
                let class = self.class_of(byte) as usize;
                let existing = self.states[state as usize][class];
                state = if existing != LEX_DEAD {
                    if last && self.accepting[existing as usize] == Token::Error {
                        self.accepting[existing as usize] = token;
                    }
                    existing
                } else {
                    let new = self.new_state(accept);
                    self.states[state as usize][class] = new;
                    new
                };
            }
        }

        // Comments hang off the `/` operator state.
        let fslash = {
            let class = self.class_of(b'/') as usize;
            self.states[start as usize][class]
        };
        let line_comment = self.new_state(Token::Comment);
        {
            let class = self.class_of(b'/') as usize;
            self.states[fslash as usize][class] = line_comment;
        }
        for class in 0..self.class_count as u16 {
            if class != self.eol_class {
                self.states[line_comment as usize][class as usize] = line_comment;
            }
        }
        let star_class = self.class_of(b'*') as usize;
        let ml_begin = self.new_state(Token::MlCommentBegin);
        self.states[fslash as usize][star_class] = ml_begin;

        // Whitespace and line ends.
        let ws = self.new_state(Token::Whitespace);
        self.states[start as usize][self.ws_class as usize] = ws;
        self.states[ws as usize][self.ws_class as usize] = ws;
        let eol = self.new_state(Token::Eol);
        self.states[start as usize][self.eol_class as usize] = eol;

        // Character and string literals; escapes are the driver's
        // problem, the table just finds the closing quote.
        let quote_class = self.class_of(b'\'') as usize;
        let char_open = self.new_state(Token::Error);
        self.states[start as usize][quote_class] = char_open;
        let char_mid = self.new_state(Token::Error);
        for class in 0..self.class_count {
            if class != quote_class && class as u16 != self.eol_class {
                self.states[char_open as usize][class] = char_mid;
            }
        }
        let char_close = self.new_state(Token::Character);
        self.states[char_mid as usize][quote_class] = char_close;

        let dquote_class = self.class_of(b'"') as usize;
        let str_body = self.new_state(Token::Error);
        self.states[start as usize][dquote_class] = str_body;
        for class in 0..self.class_count {
            if class != dquote_class && class as u16 != self.eol_class {
                self.states[str_body as usize][class] = str_body;
            }
        }
        let str_close = self.new_state(Token::StringLiteral);
        self.states[str_body as usize][dquote_class] = str_close;

        let class_count = self.class_count;
        let mut transitions = Vec::with_capacity(self.states.len() * class_count);
        for state in &self.states {
            transitions.extend_from_slice(state);
        }

        LexTables {
            ec: self.ec,
            class_count,
            transitions,
            accepting: self.accepting,
            start,
        }
    }
}

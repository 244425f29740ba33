//! Span-only tokenizer for JavaScript and TypeScript.
//!
//! Tokens carry byte offsets into the source rather than values, so passes
//! built on top of them can rewrite the original text in place. Comments and
//! whitespace are skipped but recorded as `newline_before` on the next token.
//! Template literals with substitutions are split into head/middle/tail parts
//! so the expressions inside them are tokenized like any other code.

/// Token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifiers and keywords.
    Ident,
    /// `#name` class members.
    PrivateName,
    Punct,
    String,
    Number,
    Regex,
    /// Template literal without substitutions.
    Template,
    /// `` `text${ ``
    TemplateHead,
    /// `}text${`
    TemplateMiddle,
    /// `` }text` ``
    TemplateTail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// A line terminator appears between the previous token and this one.
    pub newline_before: bool,
}

/// Tokenization failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub offset: usize,
}

impl LexError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@",
];

/// Keywords after which a `/` starts a regular expression.
const REGEX_AFTER_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    /// Open `{` (false) and `${` (true) in nesting order.
    braces: Vec<bool>,
    newline: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            braces: Vec::new(),
            newline: false,
        }
    }

    fn current(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_char(&self) -> u8 {
        self.bytes.get(self.pos + 1).copied().unwrap_or(0)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            start,
            end: self.pos,
            newline_before: self.newline,
        });
        self.newline = false;
    }

    fn allow_regex(&self) -> bool {
        let Some(prev) = self.tokens.last() else {
            return true;
        };
        let text = &self.src[prev.start..prev.end];
        match prev.kind {
            TokenKind::Punct => !matches!(text, ")" | "]" | "}"),
            TokenKind::Ident => REGEX_AFTER_KEYWORDS.contains(&text),
            TokenKind::TemplateHead | TokenKind::TemplateMiddle => true,
            _ => false,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        if self.src.starts_with("#!") {
            self.skip_line();
        }
        loop {
            self.skip_trivia()?;
            if self.is_eof() {
                return Ok(self.tokens);
            }
            let start = self.pos;
            let ch = self.current();
            match ch {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => {
                    self.scan_identifier();
                    self.push(TokenKind::Ident, start);
                }
                b'\\' if self.peek_char() == b'u' => {
                    self.scan_identifier();
                    self.push(TokenKind::Ident, start);
                }
                b'#' => {
                    self.pos += 1;
                    self.scan_identifier();
                    self.push(TokenKind::PrivateName, start);
                }
                b'0'..=b'9' => {
                    self.scan_number();
                    self.push(TokenKind::Number, start);
                }
                b'.' if self.peek_char().is_ascii_digit() => {
                    self.scan_number();
                    self.push(TokenKind::Number, start);
                }
                b'"' | b'\'' => {
                    self.scan_string(ch)?;
                    self.push(TokenKind::String, start);
                }
                b'`' => {
                    self.pos += 1;
                    let kind = self.scan_template(start, TokenKind::Template, TokenKind::TemplateHead)?;
                    self.push(kind, start);
                }
                b'/' if self.allow_regex() => {
                    self.scan_regex()?;
                    self.push(TokenKind::Regex, start);
                }
                b'{' => {
                    self.braces.push(false);
                    self.pos += 1;
                    self.push(TokenKind::Punct, start);
                }
                b'}' => {
                    if self.braces.pop() == Some(true) {
                        self.pos += 1;
                        let kind = self.scan_template(
                            start,
                            TokenKind::TemplateTail,
                            TokenKind::TemplateMiddle,
                        )?;
                        self.push(kind, start);
                    } else {
                        self.pos += 1;
                        self.push(TokenKind::Punct, start);
                    }
                }
                _ if ch >= 0x80 => {
                    self.scan_identifier();
                    self.push(TokenKind::Ident, start);
                }
                _ => {
                    let rest = &self.src[self.pos..];
                    let Some(p) = PUNCTUATORS.iter().find(|p| rest.starts_with(**p)) else {
                        return Err(LexError::new(
                            format!("unexpected character `{}`", rest.chars().next().unwrap_or('?')),
                            start,
                        ));
                    };
                    // `a?.5:b` is a conditional, not optional chaining.
                    let len = if *p == "?." && self.bytes.get(self.pos + 2).is_some_and(u8::is_ascii_digit) {
                        1
                    } else {
                        p.len()
                    };
                    self.pos += len;
                    self.push(TokenKind::Punct, start);
                }
            }
        }
    }

    fn skip_line(&mut self) {
        while !self.is_eof() && self.current() != b'\n' {
            self.pos += 1;
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.current() {
                b'\n' => {
                    self.newline = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek_char() == b'/' => self.skip_line(),
                b'/' if self.peek_char() == b'*' => {
                    let start = self.pos;
                    let Some(len) = self.src[self.pos + 2..].find("*/") else {
                        return Err(LexError::new("unterminated comment", start));
                    };
                    let end = self.pos + 2 + len + 2;
                    if self.src[self.pos..end].contains('\n') {
                        self.newline = true;
                    }
                    self.pos = end;
                }
                c if c >= 0x80 => {
                    let Some(ch) = self.src[self.pos..].chars().next() else {
                        return Ok(());
                    };
                    if !ch.is_whitespace() && ch != '\u{feff}' {
                        return Ok(());
                    }
                    if matches!(ch, '\u{2028}' | '\u{2029}') {
                        self.newline = true;
                    }
                    self.pos += ch.len_utf8();
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_identifier(&mut self) {
        while !self.is_eof() {
            let c = self.current();
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' {
                self.pos += 1;
            } else if c == b'\\' && self.peek_char() == b'u' {
                self.pos += 2;
            } else if c >= 0x80 {
                let Some(ch) = self.src[self.pos..].chars().next() else {
                    return;
                };
                if ch.is_whitespace() || ch == '\u{feff}' {
                    return;
                }
                self.pos += ch.len_utf8();
            } else {
                return;
            }
        }
    }

    fn scan_number(&mut self) {
        let hex = self.current() == b'0' && matches!(self.peek_char(), b'x' | b'X');
        while !self.is_eof() {
            let c = self.current();
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' {
                self.pos += 1;
            } else if matches!(c, b'+' | b'-')
                && !hex
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
            {
                self.pos += 1;
            } else {
                return;
            }
        }
    }

    fn scan_string(&mut self, quote: u8) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        while !self.is_eof() {
            match self.current() {
                b'\\' => self.pos += 2,
                b'\n' => break,
                c if c == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(LexError::new("unterminated string literal", start))
    }

    /// Scan template text after `` ` `` or `}`, returning `end_kind` at a closing
    /// backtick or `open_kind` at `${`.
    fn scan_template(
        &mut self,
        start: usize,
        end_kind: TokenKind,
        open_kind: TokenKind,
    ) -> Result<TokenKind, LexError> {
        while !self.is_eof() {
            match self.current() {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    return Ok(end_kind);
                }
                b'$' if self.peek_char() == b'{' => {
                    self.pos += 2;
                    self.braces.push(true);
                    return Ok(open_kind);
                }
                _ => self.pos += 1,
            }
        }
        Err(LexError::new("unterminated template literal", start))
    }

    fn scan_regex(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.current() {
                0 if self.is_eof() => {
                    return Err(LexError::new("unterminated regular expression", start))
                }
                b'\n' => return Err(LexError::new("unterminated regular expression", start)),
                b'\\' => self.pos += 2,
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    break;
                }
                _ => self.pos += 1,
            }
        }
        while self.current().is_ascii_alphabetic() {
            self.pos += 1;
        }
        Ok(())
    }
}

/// Tokenize `source`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

/// Tokens plus bracket matching, with text accessors.
pub struct SourceTokens<'a> {
    pub src: &'a str,
    pub tokens: Vec<Token>,
    matching: Vec<Option<usize>>,
}

impl<'a> SourceTokens<'a> {
    /// Tokenize and match brackets. Unbalanced brackets are an error.
    pub fn new(src: &'a str) -> Result<Self, LexError> {
        let tokens = tokenize(src)?;
        let mut matching = vec![None; tokens.len()];
        let mut stack: Vec<(usize, &str)> = Vec::new();

        for (i, tok) in tokens.iter().enumerate() {
            let text = &src[tok.start..tok.end];
            let (closes, opens): (Option<&str>, Option<&str>) = match (tok.kind, text) {
                (TokenKind::Punct, "(") => (None, Some(")")),
                (TokenKind::Punct, "[") => (None, Some("]")),
                (TokenKind::Punct, "{") => (None, Some("}")),
                (TokenKind::Punct, ")" | "]" | "}") => (Some(text), None),
                (TokenKind::TemplateHead, _) => (None, Some("`")),
                (TokenKind::TemplateMiddle, _) => (Some("`"), Some("`")),
                (TokenKind::TemplateTail, _) => (Some("`"), None),
                _ => (None, None),
            };
            if let Some(close) = closes {
                match stack.pop() {
                    Some((open_idx, expected)) if expected == close => {
                        matching[open_idx] = Some(i);
                        matching[i] = Some(open_idx);
                    }
                    _ => {
                        return Err(LexError::new(format!("unexpected `{text}`"), tok.start));
                    }
                }
            }
            if let Some(open) = opens {
                stack.push((i, open));
            }
        }
        if let Some((idx, expected)) = stack.pop() {
            return Err(LexError::new(
                format!("expected `{expected}` to close this"),
                tokens[idx].start,
            ));
        }
        Ok(Self {
            src,
            tokens,
            matching,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Text of token `i`, or `""` past the end.
    #[must_use]
    pub fn text(&self, i: usize) -> &'a str {
        self.tokens
            .get(i)
            .map_or("", |t| &self.src[t.start..t.end])
    }

    #[must_use]
    pub fn kind(&self, i: usize) -> Option<TokenKind> {
        self.tokens.get(i).map(|t| t.kind)
    }

    /// Whether token `i` is the punctuator or word `s`.
    #[must_use]
    pub fn is(&self, i: usize, s: &str) -> bool {
        matches!(self.kind(i), Some(TokenKind::Punct | TokenKind::Ident)) && self.text(i) == s
    }

    #[must_use]
    pub fn is_ident(&self, i: usize) -> bool {
        self.kind(i) == Some(TokenKind::Ident)
    }

    #[must_use]
    pub fn is_string(&self, i: usize) -> bool {
        self.kind(i) == Some(TokenKind::String)
    }

    #[must_use]
    pub fn newline_before(&self, i: usize) -> bool {
        self.tokens.get(i).is_some_and(|t| t.newline_before)
    }

    /// Index of the bracket matching the one at `i`.
    #[must_use]
    pub fn matching(&self, i: usize) -> Option<usize> {
        self.matching.get(i).copied().flatten()
    }

    #[must_use]
    pub fn start(&self, i: usize) -> usize {
        self.tokens.get(i).map_or(self.src.len(), |t| t.start)
    }

    #[must_use]
    pub fn end(&self, i: usize) -> usize {
        self.tokens.get(i).map_or(self.src.len(), |t| t.end)
    }

    /// Decoded value of a string-literal token.
    #[must_use]
    pub fn string_value(&self, i: usize) -> Option<String> {
        if !self.is_string(i) {
            return None;
        }
        let raw = self.text(i);
        Some(unescape(&raw[1..raw.len() - 1]))
    }
}

/// Decode the common escape sequences of a string literal body.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some('u') => {
                let rest = chars.as_str();
                let (hex, consumed): (String, usize) = if let Some(braced) = rest.strip_prefix('{') {
                    let inner: String = braced.chars().take_while(|c| *c != '}').collect();
                    let n = inner.chars().count() + 2;
                    (inner, n)
                } else {
                    let inner: String = rest.chars().take(4).collect();
                    let n = inner.chars().count();
                    (inner, n)
                };
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
                for _ in 0..consumed {
                    chars.next();
                }
            }
            Some('\n') | None => {}
            Some(other) => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<&str> {
        tokenize(src)
            .unwrap()
            .iter()
            .map(|t| &src[t.start..t.end])
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            texts("let x: number = 1;"),
            vec!["let", "x", ":", "number", "=", "1", ";"]
        );
    }

    #[test]
    fn test_comments_are_skipped_and_newlines_recorded() {
        let src = "a // one\n/* two\n */ b";
        let toks = tokenize(src).unwrap();
        assert_eq!(toks.len(), 2);
        assert!(toks[1].newline_before);
        assert!(!toks[0].newline_before);
    }

    #[test]
    fn test_regex_vs_division() {
        let toks = tokenize("a / b / c").unwrap();
        assert!(toks.iter().all(|t| t.kind != TokenKind::Regex));

        let toks = tokenize("x = /a:b/g.test(y)").unwrap();
        assert_eq!(toks[2].kind, TokenKind::Regex);

        let toks = tokenize("return /[/]/").unwrap();
        assert_eq!(toks[1].kind, TokenKind::Regex);
    }

    #[test]
    fn test_strings_hide_type_like_text() {
        let toks = tokenize(r#"f("a: number", 'b\'c')"#).unwrap();
        assert_eq!(toks[2].kind, TokenKind::String);
        assert_eq!(toks[4].kind, TokenKind::String);
        assert_eq!(toks.len(), 6);
    }

    #[test]
    fn test_template_substitutions_are_tokenized() {
        let src = "`a${ {b: 1}.b }c${d}e`";
        let toks = tokenize(src).unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(kinds[0], TokenKind::TemplateHead);
        assert!(kinds.contains(&TokenKind::TemplateMiddle));
        assert_eq!(*kinds.last().unwrap(), TokenKind::TemplateTail);
        assert_eq!(texts(src)[0], "`a${");
    }

    #[test]
    fn test_longest_punctuator_wins() {
        assert_eq!(texts("a >>>= b ?? c?.d"), vec!["a", ">>>=", "b", "??", "c", "?.", "d"]);
        assert_eq!(texts("a?.5:b"), vec!["a", "?", ".5", ":", "b"]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(texts("1e-5 + 0xff + 1_000n"), vec!["1e-5", "+", "0xff", "+", "1_000n"]);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = tokenize("let a = 'oops\nb").unwrap_err();
        assert_eq!(err.offset, 8);
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn test_matching_brackets() {
        let toks = SourceTokens::new("f(a, [b], {c})").unwrap();
        assert_eq!(toks.matching(1), Some(11));
        assert_eq!(toks.matching(4), Some(6));
        assert!(SourceTokens::new("f(a]").is_err());
        assert!(SourceTokens::new("{").is_err());
    }

    #[test]
    fn test_string_value_unescapes() {
        let toks = SourceTokens::new(r#"import "./a\x2ets" "A\n""#).unwrap();
        assert_eq!(toks.string_value(1).as_deref(), Some("./a.ts"));
        assert_eq!(toks.string_value(2).as_deref(), Some("A\n"));
        assert_eq!(toks.string_value(0), None);
    }

    #[test]
    fn test_unicode_identifiers() {
        assert_eq!(texts("const café = 1"), vec!["const", "café", "=", "1"]);
    }
}

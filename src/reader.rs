use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, digit1, multispace1},
    combinator::{all_consuming, opt, recognize, value},
    error::{ErrorKind, ParseError},
    multi::many0_count,
    sequence::{pair, preceded},
};

use crate::Error;
use crate::MAX_PARSE_DEPTH;
use crate::ast::{Expr, NumberType, is_symbol_char};

/// Reader failure, positioned by the input remaining where it was detected
#[derive(Debug)]
struct ReadError<'a> {
    input: &'a str,
    kind: ReadErrorKind,
}

#[derive(Debug)]
enum ReadErrorKind {
    /// A combinator rejected the next character
    Syntax,
    UnexpectedEnd,
    InvalidEscape(char),
    InvalidNumber(String),
    TooDeeplyNested,
}

impl<'a> ParseError<&'a str> for ReadError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        ReadError {
            input,
            kind: ReadErrorKind::Syntax,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl ReadError<'_> {
    /// Convert to a crate error; `source` is the full text the read started from
    fn into_error(self, source: &str) -> Error {
        match self.kind {
            ReadErrorKind::Syntax => match self.input.chars().next() {
                Some(found) => {
                    let offset = source.len().saturating_sub(self.input.len());
                    let index = source.get(..offset).map_or(0, |read| read.chars().count());
                    Error::UnexpectedCharacter { found, index }
                }
                None => Error::UnexpectedEnd,
            },
            ReadErrorKind::UnexpectedEnd => Error::UnexpectedEnd,
            ReadErrorKind::InvalidEscape(c) => Error::InvalidEscape(c),
            ReadErrorKind::InvalidNumber(token) => Error::InvalidNumber(token),
            ReadErrorKind::TooDeeplyNested => Error::TooDeeplyNested,
        }
    }
}

type ReadResult<'a, T> = IResult<&'a str, T, ReadError<'a>>;

fn fail(input: &str, kind: ReadErrorKind) -> nom::Err<ReadError<'_>> {
    nom::Err::Error(ReadError { input, kind })
}

/// Skip whitespace and `;` line comments
fn skip_blank(input: &str) -> ReadResult<'_, ()> {
    value(
        (),
        many0_count(alt((
            multispace1,
            preceded(char(';'), take_till(|c: char| c == '\n')),
        ))),
    )
    .parse(input)
}

/// Whether a symbol-alphabet token spells an integer: optional `-`, then digits
fn is_integer_token(token: &str) -> bool {
    let result: IResult<&str, &str> =
        all_consuming(recognize(pair(opt(char('-')), digit1))).parse(token);
    result.is_ok()
}

/// Parse a symbol or integer token
fn read_atom(input: &str) -> ReadResult<'_, Expr> {
    let (rest, token) = take_while1(is_symbol_char).parse(input)?;

    if !is_integer_token(token) {
        return Ok((rest, Expr::Symbol(token.to_owned())));
    }

    match token.parse::<NumberType>() {
        Ok(n) => Ok((rest, Expr::Number(n))),
        Err(_) => Err(fail(
            input,
            ReadErrorKind::InvalidNumber(token.to_owned()),
        )),
    }
}

/// Parse a string literal
fn read_string(input: &str) -> ReadResult<'_, Expr> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), Expr::Str(text))),
            Some('\\') => {
                let unescaped = match chars.next() {
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some(c @ ('\\' | '\'' | '"')) => c,
                    Some(other) => {
                        return Err(fail(remaining, ReadErrorKind::InvalidEscape(other)));
                    }
                    None => return Err(fail(chars.as_str(), ReadErrorKind::UnexpectedEnd)),
                };
                text.push(unescaped);
            }
            Some(c) => text.push(c),
            None => return Err(fail(remaining, ReadErrorKind::UnexpectedEnd)),
        }
        remaining = chars.as_str();
    }
}

/// Read forms until `close` (or end of input when `close` is `None`)
fn read_cells(input: &str, close: Option<char>, depth: usize) -> ReadResult<'_, Vec<Expr>> {
    let mut cells = Vec::new();
    let mut input = input;

    loop {
        let (rest, ()) = skip_blank(input)?;
        match (rest.chars().next(), close) {
            (None, None) => return Ok((rest, cells)),
            (None, Some(_)) => return Err(fail(rest, ReadErrorKind::UnexpectedEnd)),
            (Some(c), Some(close)) if c == close => {
                let (rest, _) = char(close).parse(rest)?;
                return Ok((rest, cells));
            }
            _ => {
                let (rest, cell) = read_form(rest, depth)?;
                cells.push(cell);
                input = rest;
            }
        }
    }
}

/// Read one form, dispatching on its first character
fn read_form(input: &str, depth: usize) -> ReadResult<'_, Expr> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(fail(input, ReadErrorKind::TooDeeplyNested));
    }

    match input.chars().next() {
        Some('(') => preceded(char('('), |i| read_cells(i, Some(')'), depth + 1))
            .map(Expr::SExpr)
            .parse(input),
        Some('{') => preceded(char('{'), |i| read_cells(i, Some('}'), depth + 1))
            .map(Expr::QExpr)
            .parse(input),
        Some('"') => read_string(input),
        Some(c) if is_symbol_char(c) => read_atom(input),
        Some(_) => Err(fail(input, ReadErrorKind::Syntax)),
        None => Err(fail(input, ReadErrorKind::UnexpectedEnd)),
    }
}

/// Read every top-level form of `text`.
pub fn read_program(text: &str) -> Result<Vec<Expr>, Error> {
    match read_cells(text, None, 0) {
        Ok((_, forms)) => Ok(forms),
        Err(nom::Err::Error(err) | nom::Err::Failure(err)) => Err(err.into_error(text)),
        Err(nom::Err::Incomplete(_)) => Err(Error::UnexpectedEnd),
    }
}

/// Parse `text` into an S-expression holding its top-level forms.
///
/// Malformed input yields an [`Expr::Error`] carrying the reader's message, so
/// the result can be handed to [`crate::eval`] either way. Blank input (or
/// input holding only comments) reads as the empty S-expression `()`.
pub fn parse(text: &str) -> Expr {
    match read_program(text) {
        Ok(forms) => Expr::SExpr(forms),
        Err(error) => {
            tracing::debug!(%error, "read failed");
            error.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{nil, sexpr, sym, val};
    use pretty_assertions::assert_eq;

    /// Test result variants for data-driven parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Vec<Expr>),          // Parsing should succeed with these top-level forms
        SpecificError(&'static str), // Parsing should fail with exactly this message
    }
    use ParseTestResult::*;

    /// Helper for inputs holding a single top-level form
    fn single<T: Into<Expr>>(value: T) -> ParseTestResult {
        Success(vec![value.into()])
    }

    /// Run parse tests; every successful form must also survive display -> parse
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{}", i + 1);
            let result = parse(input);

            match (&result, expected) {
                (Expr::SExpr(forms), Success(expected_forms)) => {
                    assert_eq!(forms, expected_forms, "{test_id}: value mismatch for {input:?}");

                    for form in forms {
                        let displayed = form.to_string();
                        assert_eq!(
                            parse(&displayed),
                            Expr::SExpr(vec![form.clone()]),
                            "{test_id}: round-trip mismatch for {displayed:?}"
                        );
                    }
                }
                (Expr::Error(msg), SpecificError(expected_msg)) => {
                    assert_eq!(msg, expected_msg, "{test_id}: wrong error for {input:?}");
                }
                _ => panic!("{test_id}: expected {expected:?} for {input:?}, got {result:?}"),
            }
        }
    }

    #[test]
    fn test_reader_data_driven() {
        let test_cases = vec![
            // === BLANK INPUT ===
            ("", Success(vec![])),
            ("   \t\r\n", Success(vec![])),
            ("; only a comment", Success(vec![])),
            // === NUMBERS ===
            ("42", single(42)),
            ("-17", single(-17)),
            ("0", single(0)),
            ("007", single(7)),
            ("9223372036854775807", single(NumberType::MAX)),
            ("-9223372036854775808", single(NumberType::MIN)),
            ("9223372036854775808", SpecificError("Invalid number 9223372036854775808")),
            ("-99999999999999999999", SpecificError("Invalid number -99999999999999999999")),
            // === SYMBOLS ===
            ("-", single(sym("-"))),
            ("x", single(sym("x"))),
            ("-x", single(sym("-x"))),
            ("--1", single(sym("--1"))),
            ("1-", single(sym("1-"))),
            ("1a", single(sym("1a"))),
            ("\\", single(sym("\\"))),
            ("&", single(sym("&"))),
            ("set-local!", single(sym("set-local!"))),
            ("<=", single(sym("<="))),
            ("a_b*c/d", single(sym("a_b*c/d"))),
            // === STRINGS ===
            ("\"hello\"", single("hello")),
            ("\"\"", single("")),
            ("\"a b  c\"", single("a b  c")),
            ("\"a;b\"", single("a;b")),
            (r#""line\nfeed""#, single("line\nfeed")),
            (r#""\r\t\\\'\"""#, single("\r\t\\'\"")),
            (r#""a\qb""#, SpecificError("Invalid escape sequence \\q")),
            ("\"abc", SpecificError("Unexpected end of input")),
            ("\"abc\\", SpecificError("Unexpected end of input")),
            // === COMPOUND FORMS ===
            ("+ 1 2", Success(vec![sym("+"), val(1), val(2)])),
            ("(+ 1 2)", single(sexpr(vec![sym("+"), val(1), val(2)]))),
            ("(  +   1 2 )", single(sexpr(vec![sym("+"), val(1), val(2)]))),
            ("()", single(sexpr::<Expr>(vec![]))),
            ("{}", single(nil())),
            ("{1 {2 3}}", single(val(vec![val(1), val([2, 3])]))),
            (
                r"(\ {x y} {+ x y})",
                single(sexpr(vec![
                    sym("\\"),
                    val([sym("x"), sym("y")]),
                    val([sym("+"), sym("x"), sym("y")]),
                ])),
            ),
            (
                "(head {1 \"two\" (3)})",
                single(sexpr(vec![
                    sym("head"),
                    val(vec![val(1), val("two"), sexpr(vec![3])]),
                ])),
            ),
            ("(list)(list)", Success(vec![sexpr(vec![sym("list")]), sexpr(vec![sym("list")])])),
            ("{a}\"b\"c", Success(vec![val([sym("a")]), val("b"), sym("c")])),
            // === WHITESPACE AND COMMENTS ===
            ("1\t2\r\n3", Success(vec![val(1), val(2), val(3)])),
            ("1 ; one\n 2 ; two", Success(vec![val(1), val(2)])),
            ("(1 ; inside\n 2)", single(sexpr(vec![1, 2]))),
            ("{;\n}", single(nil())),
            // === MALFORMED INPUT ===
            ("(1 2", SpecificError("Unexpected end of input")),
            ("{1 2", SpecificError("Unexpected end of input")),
            ("(1 {2)", SpecificError("Unexpected character ) at index 5")),
            ("(1 2}", SpecificError("Unexpected character } at index 4")),
            (")", SpecificError("Unexpected character ) at index 0")),
            ("1 # 2", SpecificError("Unexpected character # at index 2")),
            ("ab é", SpecificError("Unexpected character é at index 3")),
            ("(1 \"x\\z\" #)", SpecificError("Invalid escape sequence \\z")),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_parser_depth_limits() {
        let nested = |depth: usize| format!("{}{}", "(".repeat(depth), ")".repeat(depth));

        assert!(matches!(parse(&nested(MAX_PARSE_DEPTH)), Expr::SExpr(_)));
        assert!(matches!(parse(&"{".repeat(100)), Expr::Error(_)));

        let too_deep = parse(&nested(MAX_PARSE_DEPTH + 1));
        assert_eq!(too_deep, Expr::from(Error::TooDeeplyNested));

        let too_deep_q = format!("{}{}", "{".repeat(1000), "}".repeat(1000));
        assert_eq!(parse(&too_deep_q), Expr::from(Error::TooDeeplyNested));
    }

    #[test]
    fn test_read_program_reports_errors() {
        assert!(matches!(read_program("1 (2"), Err(Error::UnexpectedEnd)));
        assert!(matches!(
            read_program("1 ]"),
            Err(Error::UnexpectedCharacter { found: ']', index: 2 })
        ));
        assert_eq!(read_program("1 {}").ok(), Some(vec![val(1), nil()]));
    }
}

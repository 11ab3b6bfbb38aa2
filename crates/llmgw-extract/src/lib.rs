//! Salvaging structured data out of model output: a character-fed JSON
//! stream parser that tolerates the usual damage (prose around the payload,
//! missing closers, single quotes), and a JSON-Schema-to-regex compiler for
//! extracting instances of a known shape.

pub mod parser;
pub mod schema;

pub use parser::{Pos, StreamParser, Token, TokenKind, tokens_to_string};
pub use schema::{
    Schema, SchemaError, build_regex, build_regex_from_str, extract, extract_hydrate,
    extract_with_parser,
};

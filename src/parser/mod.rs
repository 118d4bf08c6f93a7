//! SQL text handling for stored schema definitions

pub mod tokenizer;

pub use tokenizer::{tokenize, unquote, Token, TokenKind, Tokenizer};

//! Dialect-aware SQL processing: scanning, classification, row limiting
//! and parameter binding.

pub mod classifier;
pub mod limiter;
pub mod params;
pub mod tokenizer;

pub use classifier::{allowed_keywords, is_read_only, is_read_only_multi};
pub use limiter::apply_max_rows;
pub use params::{
    bind_arguments, extract_placeholders, input_schema, validate_declarations, validate_spec,
    ParamType, PlaceholderStyle, Placeholders, ToolParamSpec,
};
pub use tokenizer::{
    first_keyword, split_statements, strip_comments_and_strings, tokenize, Token, TokenKind,
};

/// Shared winnow parsing helpers
pub mod parser_utils;

use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, STORED};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "whitespace_lower";
pub const ROW_FIELD: &str = "row";
pub const TEXT_FIELD: &str = "text";

/// `row` is the chunk's position in the chunk store; `text` is indexed only.
pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_u64_field(ROW_FIELD, STORED | FAST);
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqs);
    let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
    schema_builder.add_text_field(TEXT_FIELD, text_options);
    schema_builder.build()
}

/// Splits on whitespace and lower-cases; no stemming, no stop words.
pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}

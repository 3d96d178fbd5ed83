/// Constants used by batch ingestion defaults.
pub mod ingest {
    /// Minimum unique-read support for a junction row to be imported.
    pub const DEFAULT_MIN_JUNCTION_READS: u32 = 10;
    /// Number of whole-batch retries after a writer conflict before giving up.
    pub const DEFAULT_MAX_BATCH_RETRIES: usize = 2;
}

/// Constants used by genotype parsing and rendering.
pub mod genotype {
    /// Rendered token for a reference allele.
    pub const TOKEN_REF: &str = "REF";
    /// Rendered token for an alternate allele.
    pub const TOKEN_ALT: &str = "ALT";
    /// Rendered token for an uncalled allele.
    pub const TOKEN_UNKNOWN: &str = "UNK";
    /// Rendered token for the missing partner of a hemizygous call.
    pub const TOKEN_DEL: &str = "DEL";
    /// Unphased allele separator.
    pub const SEP_UNPHASED: char = '/';
    /// Phased allele separator.
    pub const SEP_PHASED: char = '|';
}

/// Constants used when reconciling per-file annotation descriptions.
pub mod annotation {
    /// Default separator between consequence sub-fields.
    pub const DEFAULT_INFO_SEP: &str = "|";
}

/// Constants used by feature-store persistence and wire encoding.
pub mod store {
    /// First identifier minted in a freshly initialized scope.
    pub const FIRST_FEATURE_ID: u64 = 1;
    /// Key used for store-wide metadata.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key prefix for per-scope counters.
    pub const SCOPE_PREFIX: &[u8] = b"scope:";
    /// Key prefix for composite key -> feature id index entries.
    pub const KEY_INDEX_PREFIX: &[u8] = b"key:";
    /// Key prefix for canonical records addressed by id.
    pub const RECORD_PREFIX: &[u8] = b"rec:";
    /// Key prefix for the number of links attached to one feature.
    pub const LINK_COUNT_PREFIX: &[u8] = b"linkn:";
    /// Key prefix for one sample link, addressed by feature id and sequence.
    pub const LINK_PREFIX: &[u8] = b"link:";
    /// Key prefix for `(feature, sample)` link markers.
    pub const PAIR_PREFIX: &[u8] = b"pair:";
    /// Key prefix for linked samples addressed by sequence.
    pub const SAMPLE_PREFIX: &[u8] = b"sample:";
    /// Key prefix for linked-sample markers addressed by sample id.
    pub const SAMPLE_MARKER_PREFIX: &[u8] = b"smark:";
    /// Key prefix for the number of annotations attached to one feature.
    pub const IMPACT_COUNT_PREFIX: &[u8] = b"impactn:";
    /// Key prefix for one consequence annotation, addressed by feature id and sequence.
    pub const IMPACT_PREFIX: &[u8] = b"impact:";
    /// Payload of marker entries.
    pub const MARKER: &[u8] = &[1];
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Version tag for store metadata compatibility checks.
    pub const STORE_VERSION: u8 = 2;
    /// Version tag for persisted scope counters.
    pub const SCOPE_RECORD_VERSION: u8 = 2;
    /// Version tag for persisted canonical records.
    pub const CANONICAL_RECORD_VERSION: u8 = 1;
    /// Version tag for persisted sample links.
    pub const LINK_RECORD_VERSION: u8 = 1;
    /// Version tag for persisted linked-sample entries.
    pub const SAMPLE_RECORD_VERSION: u8 = 1;
    /// Version tag for persisted consequence annotations.
    pub const IMPACT_RECORD_VERSION: u8 = 1;
    /// Number of keys fetched per `batch_read` call when scanning a scope.
    pub const READ_BATCH: usize = 256;

    /// Default filename for persisted feature-store files.
    pub const DEFAULT_STORE_FILENAME: &str = "features.bin";
}

#![no_main]

use adrest::codec::CodecTable;
use adrest::schema::SchemaRegistry;
use adrest::transcode::decode_request;
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

fn codecs() -> &'static CodecTable {
    static CODECS: OnceLock<CodecTable> = OnceLock::new();
    CODECS.get_or_init(|| CodecTable::new(SchemaRegistry::builtin().unwrap()))
}

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = decode_request(codecs(), &body);
    }
});

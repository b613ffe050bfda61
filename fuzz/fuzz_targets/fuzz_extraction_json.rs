#![no_main]

use beleg::core::ProcessingConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let config = ProcessingConfig::en16931_basic();
        // Arbitrary extraction output must never panic the pipeline.
        for raw in [
            beleg::json::extraction_from_str(s),
            beleg::json::extraction_from_azure(s),
        ]
        .into_iter()
        .flatten()
        {
            let _ = beleg::pipeline::process(&config, &raw);
        }
    }
});

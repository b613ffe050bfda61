#![no_main]

use beleg::core::{BtRegistry, ProcessingConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let registry = BtRegistry::en16931_basic();
        // Read → correct → write → read must not panic at any step.
        if let Ok(mut doc) = beleg::ubl::from_ubl_xml(s, &registry) {
            let config = ProcessingConfig::en16931_basic();
            let run = beleg::core::Engine::new(&config).run(&mut doc);
            if let Ok(xml) = beleg::ubl::to_ubl_xml(&doc, &run.violations, &registry) {
                let _ = beleg::ubl::from_ubl_xml(&xml, &registry);
            }
        }
    }
});

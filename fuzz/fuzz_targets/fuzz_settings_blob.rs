//! Fuzz target: `SystemSettings::from_bytes`
//!
//! Arbitrary bytes stand in for a corrupted NVS blob. Decoding must never
//! panic, and anything it accepts must carry the current schema version
//! and re-encode to a blob that decodes to the same value.
//!
//! cargo fuzz run fuzz_settings_blob

#![no_main]

use libfuzzer_sys::fuzz_target;
use sysmgr::settings::{CURRENT_VERSION, SystemSettings};

fuzz_target!(|data: &[u8]| {
    if let Some(settings) = SystemSettings::from_bytes(data) {
        assert_eq!(settings.settings_version, CURRENT_VERSION);
        let bytes = settings.to_bytes().expect("decoded settings re-encode");
        assert_eq!(SystemSettings::from_bytes(&bytes), Some(settings));
    }
});

//! Fuzz target: `rpc::submit`
//!
//! Feeds arbitrary text through request normalisation and asserts that it
//! never panics, never enqueues more than one record, and that every
//! rejection renders as a JSON-RPC error.
//!
//! cargo fuzz run fuzz_submit

#![no_main]

use libfuzzer_sys::fuzz_target;
use sysmgr::ipc::Channels;
use sysmgr::ipc::channels::{METHOD_MAX, PARAMS_MAX};
use sysmgr::rpc;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let channels = Channels::new();
    match rpc::submit(&channels, 1, text, None) {
        Ok(()) => {
            assert_eq!(channels.commands.len(), 1);
            let record = channels.commands.try_recv().unwrap();
            assert!(record.method.len() <= METHOD_MAX);
            assert!(record.params.len() <= PARAMS_MAX);
        }
        Err(e) => {
            assert!(channels.commands.is_empty());
            assert!(e.to_response().body.is_err());
        }
    }
});

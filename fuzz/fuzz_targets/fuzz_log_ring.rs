//! Fuzz target: `ByteRing`
//!
//! Interprets the input as a script of pushes and pops against a small
//! ring and checks every popped entry against a FIFO model.
//!
//! cargo fuzz run fuzz_log_ring

#![no_main]

use std::collections::VecDeque;

use libfuzzer_sys::fuzz_target;
use sysmgr::logger::ByteRing;

fuzz_target!(|data: &[u8]| {
    let Some((&cap, script)) = data.split_first() else {
        return;
    };
    let mut ring = ByteRing::new(16 + usize::from(cap));
    let mut model: VecDeque<Vec<u8>> = VecDeque::new();
    let mut out = Vec::new();

    let mut rest = script;
    while let Some((&op, tail)) = rest.split_first() {
        if op & 1 == 0 {
            let len = usize::from(op >> 1).min(tail.len());
            let (payload, after) = tail.split_at(len);
            if ring.push(payload) {
                model.push_back(payload.to_vec());
            }
            rest = after;
        } else {
            let popped = ring.pop_into(&mut out);
            assert_eq!(popped, !model.is_empty());
            if let Some(expected) = model.pop_front() {
                assert_eq!(out, expected);
            }
            rest = tail;
        }
        assert_eq!(ring.len(), model.len());
        assert!(ring.pending_bytes() <= ring.capacity());
    }
});

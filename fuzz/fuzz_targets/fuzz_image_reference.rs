//! Fuzz target for image reference and pre-seed parsing.
//!
//! Arbitrary lines must never panic, and every grouped image keeps at least
//! one tag.

#![no_main]

use libfuzzer_sys::fuzz_target;
use portage_migrate::preseed::{ImageReference, Preseed};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Some(reference) = ImageReference::parse(s) {
            assert!(!reference.repository.is_empty());
            let _ = reference.registry_host();
        }
    }

    if let Ok(preseed) = Preseed::parse(Cursor::new(data), "registry.example.com", "dev") {
        for image in preseed.images() {
            assert!(!image.tags.is_empty());
        }
    }
});

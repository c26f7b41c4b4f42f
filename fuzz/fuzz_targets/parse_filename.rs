// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;
use tagsort::grammar::parse_filename;

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(parsed) = parse_filename(name) {
        assert!(!parsed.main_folder.is_empty());
        assert!(!parsed.final_file_name.is_empty());

        // Destinations never escape the target folder
        let target = Path::new("/target");
        let destination = parsed.destination_path(target);
        assert!(destination.starts_with(target));
        for segment in &parsed.subfolder_path {
            assert!(segment != "." && segment != "..");
        }
    }
});

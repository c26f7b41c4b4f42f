// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filename grammar parser
//!
//! Users direct the organizer by naming files `MAIN_FOLDER, NAME (tag) [tag] -tag-.ext`.
//! The text before the first comma selects the top-level folder, the text up to the
//! first tag becomes the new file name, and every tag becomes one nested subfolder:
//!
//! ```text
//! Movies, Inception (2010) [Action] -director-.mkv
//!   -> Movies/2010/Action/director/Inception.mkv
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Marker appended to files moved back by an undo. Such files are never picked up again.
pub const UNDO_MARKER: &str = "(Undo)";

const MAX_EXTENSION_LEN: usize = 10;

/// Why a filename does not describe a destination
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("file was moved back by an undo")]
    UndoMarker,

    #[error("no comma delimiter")]
    MissingComma,

    #[error("nothing before the first comma")]
    EmptyMainFolder,

    #[error("nothing after the first comma")]
    EmptyName,

    #[error("folder name {0:?} is not allowed")]
    UnsafeSegment(String),
}

/// Where a file should end up, relative to its pair's target folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedDestination {
    /// Top-level folder under the target
    pub main_folder: String,
    /// New file name without the re-appended extension
    pub base_name: String,
    /// Nested folders: parentheses, then brackets, then dash tags
    pub subfolder_path: Vec<String>,
    /// File name used at the destination
    pub final_file_name: String,
}

impl ParsedDestination {
    /// Directory the file is moved into
    pub fn destination_dir(&self, target: &Path) -> PathBuf {
        let mut dir = target.join(&self.main_folder);
        for segment in &self.subfolder_path {
            dir.push(segment);
        }
        dir
    }

    /// Full destination path of the file
    pub fn destination_path(&self, target: &Path) -> PathBuf {
        self.destination_dir(target).join(&self.final_file_name)
    }
}

/// Cheap pre-check shared by watchers and the worker
pub fn has_delimiter(filename: &str) -> bool {
    filename.contains(',')
}

/// Parse a raw filename into a destination descriptor
pub fn parse_filename(filename: &str) -> Result<ParsedDestination, Rejection> {
    if filename.contains(UNDO_MARKER) {
        return Err(Rejection::UndoMarker);
    }

    let (head, tail) = filename.split_once(',').ok_or(Rejection::MissingComma)?;
    let main_folder = head.trim();
    let remainder = tail.trim();

    if main_folder.is_empty() {
        return Err(Rejection::EmptyMainFolder);
    }
    if remainder.is_empty() {
        return Err(Rejection::EmptyName);
    }
    if is_unsafe_segment(main_folder) {
        return Err(Rejection::UnsafeSegment(main_folder.to_string()));
    }

    let extension = file_extension(remainder);
    let stem = match extension {
        Some(ext) => &remainder[..remainder.len() - ext.len() - 1],
        None => remainder,
    };

    let cut = base_name_end(stem);
    let mut base_name = trim_name(&stem[..cut]).to_string();
    if base_name.is_empty() {
        base_name = trim_name(stem).to_string();
    }
    if base_name.is_empty() {
        return Err(Rejection::EmptyName);
    }
    if is_unsafe_segment(&base_name) {
        return Err(Rejection::UnsafeSegment(base_name));
    }

    let final_file_name = match extension {
        Some(ext) if !ends_with_extension(&base_name, ext) => format!("{}.{}", base_name, ext),
        _ => base_name.clone(),
    };

    let tagged = &stem[cut..];
    let mut subfolder_path = balanced_groups(tagged, '(', ')');
    subfolder_path.extend(balanced_groups(tagged, '[', ']'));
    subfolder_path.extend(dash_segments(&strip_groups(tagged)));
    subfolder_path.retain(|segment| {
        if is_unsafe_segment(segment) {
            warn!("Ignoring tag {:?} in {:?}", segment, filename);
            return false;
        }
        true
    });

    Ok(ParsedDestination {
        main_folder: main_folder.to_string(),
        base_name,
        subfolder_path,
        final_file_name,
    })
}

/// Final `.ext` of a name, if it looks like a real extension
fn file_extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    let valid = !stem.trim().is_empty()
        && !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

fn ends_with_extension(name: &str, ext: &str) -> bool {
    name.to_lowercase().ends_with(&format!(".{}", ext.to_lowercase()))
}

fn trim_name(name: &str) -> &str {
    name.trim_end_matches(|c: char| c == '-' || c.is_whitespace()).trim_start()
}

/// Segments that would escape or restructure the target folder
fn is_unsafe_segment(segment: &str) -> bool {
    segment == "." || segment == ".." || segment.contains(['/', '\\'])
}

/// Byte offset where the base name stops: the first `(`, `[`, or a dash
/// preceded by whitespace. Hyphenated words do not end the name.
fn base_name_end(stem: &str) -> usize {
    let mut whitespace_start = None;
    for (i, c) in stem.char_indices() {
        match c {
            '(' | '[' => return i,
            '-' => {
                if let Some(start) = whitespace_start {
                    return start;
                }
            }
            _ => {}
        }
        if c.is_whitespace() {
            whitespace_start.get_or_insert(i);
        } else {
            whitespace_start = None;
        }
    }
    stem.len()
}

/// Contents of every top-level `open ... close` group, left to right
fn balanced_groups(text: &str, open: char, close: char) -> Vec<String> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if c == open {
            if depth == 0 {
                start = i + c.len_utf8();
            }
            depth += 1;
        } else if c == close {
            if depth == 0 {
                warn!("Unmatched '{}' in {:?}", close, text);
                continue;
            }
            depth -= 1;
            if depth == 0 {
                let inner = text[start..i].trim();
                if !inner.is_empty() {
                    groups.push(inner.to_string());
                }
            }
        }
    }

    if depth > 0 {
        warn!("Unclosed '{}' in {:?}", open, text);
    }

    groups
}

/// Blank out bracketed groups so their contents never produce dash tags
fn strip_groups(text: &str) -> String {
    let mut parens = 0usize;
    let mut brackets = 0usize;

    text.chars()
        .map(|c| {
            match c {
                '(' => parens += 1,
                ')' => parens = parens.saturating_sub(1),
                '[' => brackets += 1,
                ']' => brackets = brackets.saturating_sub(1),
                _ if parens == 0 && brackets == 0 => return c,
                _ => {}
            }
            ' '
        })
        .collect()
}

fn dash_segments(text: &str) -> Vec<String> {
    let spaced = inner_pieces(text, " - ");
    if !spaced.is_empty() {
        return spaced;
    }

    inner_pieces(text, "-")
        .into_iter()
        .filter(|piece| !looks_like_extension(piece))
        .collect()
}

/// Pieces enclosed on both sides by `delimiter`, trimmed and non-empty
fn inner_pieces(text: &str, delimiter: &str) -> Vec<String> {
    let pieces: Vec<&str> = text.split(delimiter).collect();
    if pieces.len() < 3 {
        return Vec::new();
    }

    pieces[1..pieces.len() - 1]
        .iter()
        .map(|piece| piece.trim())
        .filter(|piece| !piece.is_empty())
        .map(String::from)
        .collect()
}

fn looks_like_extension(piece: &str) -> bool {
    piece
        .strip_prefix('.')
        .map(|ext| !ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(false)
}

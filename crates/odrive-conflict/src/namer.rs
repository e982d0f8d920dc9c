//! Conflict naming for keep-both resolution
//!
//! Generates unique file names for conflict copies, following the pattern
//! fixed by §4.5: `<stem>-Conflict-<UTC yyyyMMdd-HHmmss>.<ext>`, with a
//! `-1`, `-2`, ... suffix appended if that name is already taken.

use chrono::Utc;

/// Generates unique conflict file names
pub struct ConflictNamer;

impl ConflictNamer {
    /// Generates a conflict copy filename
    ///
    /// Given "report.docx", produces something like:
    /// "report-Conflict-20260207-153045.docx"
    pub fn generate(original_name: &str) -> String {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");

        if let Some(dot_pos) = original_name.rfind('.') {
            let stem = &original_name[..dot_pos];
            let ext = &original_name[dot_pos..];
            format!("{stem}-Conflict-{timestamp}{ext}")
        } else {
            format!("{original_name}-Conflict-{timestamp}")
        }
    }

    /// Verifies the generated name doesn't collide with existing names
    ///
    /// If the name already exists, appends an incrementing `-1`, `-2`, ...
    /// suffix before the extension until a free name is found.
    pub fn generate_unique<F>(original_name: &str, mut exists: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        let candidate = Self::generate(original_name);
        if !exists(&candidate) {
            return candidate;
        }

        for i in 1..=999 {
            let numbered = if let Some(dot_pos) = candidate.rfind('.') {
                let stem = &candidate[..dot_pos];
                let ext = &candidate[dot_pos..];
                format!("{stem}-{i}{ext}")
            } else {
                format!("{candidate}-{i}")
            };

            if !exists(&numbered) {
                return numbered;
            }
        }

        // Exhausted the practical suffix range; caller retries on next sync.
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_with_extension() {
        let name = ConflictNamer::generate("report.docx");
        assert!(name.starts_with("report-Conflict-"));
        assert!(name.ends_with(".docx"));
    }

    #[test]
    fn test_generate_without_extension() {
        let name = ConflictNamer::generate("Makefile");
        assert!(name.starts_with("Makefile-Conflict-"));
    }

    #[test]
    fn test_generate_with_multiple_dots() {
        let name = ConflictNamer::generate("archive.tar.gz");
        assert!(name.ends_with(".gz"));
        assert!(name.starts_with("archive.tar-Conflict-"));
    }

    #[test]
    fn test_generate_unique_no_collision() {
        let name = ConflictNamer::generate_unique("test.txt", |_| false);
        assert!(name.contains("-Conflict-"));
    }

    #[test]
    fn test_generate_unique_with_collision_appends_numbered_suffix() {
        let mut call_count = 0;
        let name = ConflictNamer::generate_unique("test.txt", |_| {
            call_count += 1;
            call_count <= 1 // first candidate collides, -1 suffix is free
        });
        assert!(name.contains("-1."));
    }

    #[test]
    fn test_generate_unique_exhausts_suffixes_in_order() {
        let mut seen = Vec::new();
        let name = ConflictNamer::generate_unique("test.txt", |candidate| {
            seen.push(candidate.to_string());
            seen.len() <= 2 // base candidate and -1 both collide, -2 is free
        });
        assert!(name.ends_with("-2.txt"));
    }
}

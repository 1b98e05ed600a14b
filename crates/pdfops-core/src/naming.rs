//! Suggested output file names.

/// File name without directories or a trailing `.pdf` extension.
pub fn file_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = match base.len().checked_sub(4) {
        Some(cut) if base.is_char_boundary(cut) && base[cut..].eq_ignore_ascii_case(".pdf") => {
            &base[..cut]
        }
        _ => base,
    };
    if stem.trim().is_empty() {
        "document"
    } else {
        stem
    }
}

fn with_suffix(name: &str, suffix: &str) -> String {
    format!("{}_{}.pdf", file_stem(name), suffix)
}

pub fn merged_name(name: &str) -> String {
    with_suffix(name, "merged")
}

/// `<stem>_pages_<index>.pdf`, `index` is 1-based.
pub fn pages_name(name: &str, index: usize) -> String {
    with_suffix(name, &format!("pages_{}", index))
}

pub fn split_name(name: &str) -> String {
    with_suffix(name, "split")
}

pub fn rotated_name(name: &str) -> String {
    with_suffix(name, "rotated")
}

pub fn compressed_name(name: &str) -> String {
    with_suffix(name, "compressed")
}

pub fn encrypted_name(name: &str) -> String {
    with_suffix(name, "encrypted")
}

pub fn unlocked_name(name: &str) -> String {
    with_suffix(name, "unlocked")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("report.pdf"), "report");
        assert_eq!(file_stem("Report.PDF"), "Report");
        assert_eq!(file_stem("dir/sub/report.pdf"), "report");
        assert_eq!(file_stem("C:\\docs\\scan.pdf"), "scan");
        assert_eq!(file_stem("notes"), "notes");
        assert_eq!(file_stem(".pdf"), "document");
        assert_eq!(file_stem(""), "document");
    }

    #[test]
    fn test_templates() {
        assert_eq!(merged_name("a.pdf"), "a_merged.pdf");
        assert_eq!(pages_name("a.pdf", 2), "a_pages_2.pdf");
        assert_eq!(split_name("a.pdf"), "a_split.pdf");
        assert_eq!(rotated_name("a.pdf"), "a_rotated.pdf");
        assert_eq!(compressed_name("a.pdf"), "a_compressed.pdf");
        assert_eq!(encrypted_name("a.pdf"), "a_encrypted.pdf");
        assert_eq!(unlocked_name("a.pdf"), "a_unlocked.pdf");
    }
}

/// Maximum length (in bytes) of a sanitized filename, before the timestamp prefix
pub const MAX_FILENAME_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Reduces an untrusted client filename to a safe basename.
///
/// Only the last path component survives (both `/` and `\` count as
/// separators), control characters are dropped, filesystem-reserved
/// characters become `_`, whitespace runs collapse to a single `_` and
/// leading dots are stripped so the result can never name a parent
/// directory or a hidden file.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    let last_component = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if last_component.len() != filename.len() || filename.contains("..") {
        tracing::warn!("Path traversal attempt detected in upload name: {:?}", filename);
    }

    let mut sanitized = String::with_capacity(last_component.len());
    let mut in_whitespace = false;
    for c in last_component.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                sanitized.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        if c.is_control() {
            continue;
        }
        match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';' => sanitized.push('_'),
            _ => sanitized.push(c),
        }
    }

    let sanitized = sanitized.trim_start_matches('.');

    // Limit length safely for UTF-8
    let mut end = sanitized.len().min(MAX_FILENAME_LEN);
    while !sanitized.is_char_boundary(end) {
        end -= 1;
    }
    let sanitized = &sanitized[..end];

    if sanitized.is_empty() {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: format!("Filename {:?} has no usable characters", filename),
        });
    }

    Ok(sanitized.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_runs_become_underscores() {
        assert_eq!(
            sanitize_filename("Quarterly  Report\tFinal.docx").unwrap(),
            "Quarterly_Report_Final.docx"
        );
    }

    #[test]
    fn test_path_components_are_stripped() {
        assert_eq!(sanitize_filename("../../../etc/passwd").unwrap(), "passwd");
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\slides.pptx").unwrap(),
            "slides.pptx"
        );
        assert_eq!(sanitize_filename("dir/..hidden.doc").unwrap(), "hidden.doc");
    }

    #[test]
    fn test_control_and_reserved_characters() {
        assert_eq!(sanitize_filename("a\0b.docx").unwrap(), "ab.docx");
        assert_eq!(
            sanitize_filename("what?<now>|\"x\".doc").unwrap(),
            "what__now___x_.doc"
        );
    }

    #[test]
    fn test_unusable_names_are_rejected() {
        for name in ["", "..", "/", "dir/", "...", "\0\0"] {
            let err = sanitize_filename(name).unwrap_err();
            assert_eq!(err.code, "INVALID_FILENAME", "name {:?}", name);
        }
    }

    #[test]
    fn test_length_is_capped_on_char_boundary() {
        let name = format!("{}.docx", "é".repeat(150));
        let sanitized = sanitize_filename(&name).unwrap();
        assert!(sanitized.len() <= MAX_FILENAME_LEN);
        assert!(sanitized.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_unicode_is_preserved() {
        assert_eq!(sanitize_filename("Отчёт 2024.docx").unwrap(), "Отчёт_2024.docx");
    }
}

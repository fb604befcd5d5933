//! Output formatters: RFC 2822 EML, iCalendar, vCard 3.0 and PST synthesis.

pub mod eml;
pub mod ics;
pub mod pst;
pub mod vcf;

/// End-of-job accounting reported by the export commands.
#[derive(Clone, Copy, Default, Debug)]
pub struct ExportSummary {
    pub processed: usize,
    pub exported: usize,
    pub failed: usize,
}

/// Sanitize a string for use in output filenames.
pub fn sanitize_filename_part(text: &str, max_len: usize) -> String {
    let sanitized: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename_part("hello world", 20), "hello_world");
        assert_eq!(sanitize_filename_part("a/b\\c:d*e", 20), "a_b_c_d_e");
        assert_eq!(sanitize_filename_part("", 20), "unknown");
    }
}

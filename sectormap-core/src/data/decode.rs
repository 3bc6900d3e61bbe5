//! Text decoding and field normalization shared by the source loaders.

use super::provider::DataError;
use encoding_rs::GBK;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode a source file permissively.
///
/// Valid UTF-8 (with or without BOM) is taken as-is; everything else is
/// decoded as GBK with malformed sequences replaced by U+FFFD.
pub fn decode_permissive(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    let (text, _had_errors) = GBK.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Read a file's raw bytes. A missing file is `Ok(None)`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, DataError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DataError::io(path, e)),
    }
}

/// Zero-pad a stock code to six characters. Spreadsheet float artefacts
/// (`1.0`) are removed first. Returns `None` for empty input.
pub fn pad_stock_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("{trimmed:0>6}"))
}

/// Drop an exchange suffix (`600000.SH` → `600000`) and zero-pad.
pub fn strip_exchange_suffix(raw: &str) -> Option<String> {
    let head = raw.trim().split('.').next().unwrap_or_default();
    pad_stock_code(head)
}

/// Remove half-width and full-width spaces from a display name.
pub fn strip_name_spaces(name: &str) -> String {
    name.chars().filter(|c| *c != ' ' && *c != '\u{3000}').collect()
}

/// Trimmed field, `None` when blank.
pub fn non_empty(field: &str) -> Option<String> {
    let trimmed = field.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_gbk_and_utf8() {
        let (gbk, _, _) = GBK.encode("银行|880471");
        assert_eq!(decode_permissive(&gbk), "银行|880471");
        assert_eq!(decode_permissive("证券".as_bytes()), "证券");

        let mut bom = UTF8_BOM.to_vec();
        bom.extend_from_slice("保险".as_bytes());
        assert_eq!(decode_permissive(&bom), "保险");
    }

    #[test]
    fn malformed_bytes_are_replaced() {
        let (gbk, _, _) = GBK.encode("银行");
        let mut bytes = gbk.into_owned();
        bytes.push(0xFF);
        let text = decode_permissive(&bytes);
        assert!(text.starts_with("银行"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn stock_codes_are_padded() {
        assert_eq!(pad_stock_code("1").as_deref(), Some("000001"));
        assert_eq!(pad_stock_code(" 600000 ").as_deref(), Some("600000"));
        assert_eq!(pad_stock_code("2.0").as_deref(), Some("000002"));
        assert_eq!(pad_stock_code("  "), None);
        assert_eq!(strip_exchange_suffix("1.SZ").as_deref(), Some("000001"));
        assert_eq!(strip_exchange_suffix("600000.SH").as_deref(), Some("600000"));
    }

    #[test]
    fn names_lose_all_spaces() {
        assert_eq!(strip_name_spaces("平安 银行\u{3000}"), "平安银行");
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("absent.cfg")).unwrap().is_none());
    }
}

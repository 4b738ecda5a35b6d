use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;

use crate::error::Result;

/// Whole-file line reader with encoding detection.
///
/// Files are loaded fully into memory for every call; very large logs cost
/// their full size in RAM.
#[derive(Clone, Default)]
pub struct FileReader;

impl FileReader {
    pub fn new() -> Self {
        Self
    }

    /// Read and decode all lines. Line terminators (`\n`, `\r\n`) are
    /// stripped; a final line without terminator still counts.
    pub async fn read_lines(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = tokio::fs::read(path).await?;
        Ok(split_lines(&decode(&bytes)))
    }
}

pub fn decode(bytes: &[u8]) -> String {
    let (encoding, bom_len) = detect_from_prefix(bytes);
    let (cow, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
    cow.into_owned()
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

fn detect_from_prefix(prefix: &[u8]) -> (&'static Encoding, usize) {
    if prefix.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return (encoding_rs::UTF_8, 3);
    }
    if prefix.starts_with(&[0xFF, 0xFE]) {
        return (encoding_rs::UTF_16LE, 2);
    }
    if prefix.starts_with(&[0xFE, 0xFF]) {
        return (encoding_rs::UTF_16BE, 2);
    }
    if std::str::from_utf8(prefix).is_ok() {
        return (encoding_rs::UTF_8, 0);
    }

    let sample = &prefix[..prefix.len().min(8192)];
    let mut detector = EncodingDetector::new();
    detector.feed(sample, true);
    (detector.guess(None, true), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn read_utf8_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.log");
        std::fs::write(&path, "first\r\nsecond\nthird").unwrap();

        let lines = FileReader::new().read_lines(&path).await.unwrap();
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn empty_file_has_no_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.log");
        std::fs::write(&path, "").unwrap();

        let lines = FileReader::new().read_lines(&path).await.unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn detect_utf16_with_bom() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("utf16.log");
        let content = "你好UTF16\n第二行\n";
        let mut bytes = vec![0xFF, 0xFE];
        for u in content.encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();

        let lines = FileReader::new().read_lines(&path).await.unwrap();
        assert_eq!(lines, vec!["你好UTF16", "第二行"]);
    }

    #[test]
    fn gbk_bytes_decode_without_replacement() {
        let gbk = Encoding::for_label(b"gbk").unwrap();
        let text = "错误: 支付服务连接失败，正在重试，请稍后再检查日志输出\n".repeat(4);
        let (bytes, _, _) = gbk.encode(&text);
        let decoded = decode(&bytes);
        assert!(!decoded.contains('\u{FFFD}'));
        assert!(decoded.starts_with("错误"));
    }
}

use crate::{error::McbError, GZIP_MAGIC, MAX_INPUT_SIZE};
use flate2::read::GzDecoder;
use std::io::Read;

/// 判断数据是否带有gzip魔数
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC[..]
}

/// 解压gzip包裹的数据
///
/// 解压结果受 [`MAX_INPUT_SIZE`] 限制，声明超大输出的恶意文件会被拒绝
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, McbError> {
    let decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();

    decoder
        .take(MAX_INPUT_SIZE as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| McbError::parse(0, "", format!("gzip解压失败: {}", e)))?;

    if decompressed.len() > MAX_INPUT_SIZE {
        return Err(McbError::InputTooLarge);
    }

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn detects_gzip_magic() {
        assert!(is_gzip(&gzip(b"hello")));
        assert!(!is_gzip(&[0x0A, 0x00]));
        assert!(!is_gzip(&[0x1F]));
    }

    #[test]
    fn roundtrip() {
        let original = b"NBT payload bytes".to_vec();
        let decompressed = decompress_gzip(&gzip(&original)).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn rejects_corrupt_stream() {
        let mut data = gzip(b"hello");
        let len = data.len();
        data.truncate(len / 2);
        assert!(decompress_gzip(&data).is_err());
    }
}

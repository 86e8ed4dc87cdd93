use sha2::{Digest, Sha256};

/// 计算SHA-256哈希
pub fn calculate_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 字节转小写十六进制字符串
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 蓝图指纹：源文件内容哈希的前16个十六进制字符
pub fn content_fingerprint(data: &[u8]) -> String {
    to_hex(&calculate_sha256(data)[..8])
}

/// 派生建筑实例ID，无需随机数源
///
/// 以蓝图ID、创建时间与进程内序号做哈希，取前12个十六进制字符
pub fn derive_structure_id(blueprint_id: &str, created_at_micros: i64, seq: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(blueprint_id.as_bytes());
    hasher.update(created_at_micros.to_be_bytes());
    hasher.update(seq.to_be_bytes());
    let digest = hasher.finalize();
    format!("bs-{}", to_hex(&digest[..6]))
}

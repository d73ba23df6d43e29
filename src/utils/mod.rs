//! 短码生成
//!
//! 生成只负责"提议"，是否可用由调用方对照存储后端确认。

/// 短码长度
pub const SHORT_CODE_LENGTH: usize = 5;

/// 短码字母表（52 个字母，5 位约 3.8 亿种组合）
pub const SHORT_CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn generate_random_code(length: usize) -> String {
    use std::iter;

    iter::repeat_with(|| {
        SHORT_CODE_ALPHABET[rand::random_range(0..SHORT_CODE_ALPHABET.len())] as char
    })
    .take(length)
    .collect()
}

/// 短码生成器
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// 默认实现：定长随机字母串（非加密随机源）
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        generate_random_code(SHORT_CODE_LENGTH)
    }
}

//! 编码器、查询合并和排序共用的稠密向量运算

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// 缩放到单位长度，零向量保持为零
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = l2_norm(&v);
    if norm >= f32::MIN_POSITIVE {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// 余弦相似度；任一侧长度为零时返回 0.0
///
/// 逐个判断范数，小而非零的向量照常比较
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::MIN_POSITIVE || norm_b < f32::MIN_POSITIVE {
        return 0.0;
    }
    (dot(a, b) / norm_a / norm_b).clamp(-1.0, 1.0)
}

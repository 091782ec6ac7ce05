//! 基于整张向量表拟合的 PCA 投影
//!
//! 在协方差矩阵上用幂迭代加收缩逐个求主轴。每个轴从固定的稠密向量出发，
//! 并与已求出的轴重新正交化；符号固定为最大分量为正，拟合结果只取决于表内容。
//! 求完后按方差降序排列，截断前 `reduced_dims` 个分量即为方差最大的子空间。

use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::error::{AppError, AppResult};

/// 方差占比低于该值的轴直接丢弃
const MIN_RELATIVE_VARIANCE: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct ReducedProjection {
    mean: Array1<f32>,
    /// M × D，每行一个主轴，按方差降序
    components: Array2<f32>,
    explained_variance: Vec<f32>,
    total_variance: f32,
}

impl ReducedProjection {
    /// 在 `data`（N × D）上拟合最多 `max_components` 个主轴
    ///
    /// 实际轴数 M 不超过 D、N 以及中心化后数据的秩
    pub fn fit(data: &Array2<f32>, max_components: usize, iterations: usize, tolerance: f32) -> Self {
        let (n_samples, dim) = data.dim();
        if n_samples == 0 {
            return Self::empty(dim);
        }

        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(dim));
        let centered = data - &mean.view().insert_axis(Axis(0));
        let divisor = n_samples.saturating_sub(1).max(1) as f32;
        let cov = centered.t().dot(&centered) / divisor;

        let total_variance = cov.diag().sum();
        let threshold = (total_variance * MIN_RELATIVE_VARIANCE).max(f32::EPSILON);
        let target = max_components.min(dim).min(n_samples);

        let mut residual = cov;
        let mut axes: Vec<Array1<f32>> = Vec::with_capacity(target);
        let mut explained_variance = Vec::with_capacity(target);

        while axes.len() < target {
            let seed = seed_vector(dim, axes.len());
            let Some(axis) = power_iteration(&residual, seed, &axes, iterations, tolerance) else {
                break;
            };
            let lambda = axis.dot(&residual.dot(&axis));
            if lambda <= threshold {
                break;
            }

            let col = axis.view().insert_axis(Axis(1));
            let row = axis.view().insert_axis(Axis(0));
            residual = &residual - &(col.dot(&row) * lambda);

            explained_variance.push(lambda);
            axes.push(axis);
        }

        // 收缩顺序不保证方差单调
        let mut order: Vec<usize> = (0..axes.len()).collect();
        order.sort_by(|a, b| explained_variance[*b].total_cmp(&explained_variance[*a]));

        let mut components = Array2::zeros((axes.len(), dim));
        for (idx, &axis_idx) in order.iter().enumerate() {
            components.row_mut(idx).assign(&axes[axis_idx]);
        }
        let explained_variance = order.iter().map(|&idx| explained_variance[idx]).collect();

        Self {
            mean,
            components,
            explained_variance,
            total_variance,
        }
    }

    fn empty(dim: usize) -> Self {
        Self {
            mean: Array1::zeros(dim),
            components: Array2::zeros((0, dim)),
            explained_variance: Vec::new(),
            total_variance: 0.0,
        }
    }

    /// 拟合出的输出维度 M
    pub fn components(&self) -> usize {
        self.components.nrows()
    }

    /// 输入维度 D
    pub fn input_dimension(&self) -> usize {
        self.components.ncols()
    }

    /// 已拟合主轴解释的方差占总方差的比例
    pub fn explained_variance_ratio(&self) -> f32 {
        if self.total_variance <= f32::EPSILON {
            return 0.0;
        }
        self.explained_variance.iter().sum::<f32>() / self.total_variance
    }

    /// 把单个向量投影到降维空间（全部 M 个分量）
    pub fn project(&self, vector: &[f32]) -> AppResult<Vec<f32>> {
        if vector.len() != self.input_dimension() {
            return Err(AppError::DimensionMismatch {
                expected: self.input_dimension(),
                actual: vector.len(),
            });
        }
        let centered = &ArrayView1::from(vector) - &self.mean;
        Ok(self.components.dot(&centered).to_vec())
    }

    /// 把 `data`（N × D）的每一行投影，得到 N × M 矩阵
    pub fn project_rows(&self, data: &Array2<f32>) -> AppResult<Array2<f32>> {
        if data.ncols() != self.input_dimension() {
            return Err(AppError::DimensionMismatch {
                expected: self.input_dimension(),
                actual: data.ncols(),
            });
        }
        let centered = data - &self.mean.view().insert_axis(Axis(0));
        Ok(centered.dot(&self.components.t()))
    }
}

/// 与 `found` 正交的主特征向量；剩余谱耗尽时返回 `None`
fn power_iteration(
    matrix: &Array2<f32>,
    seed: Array1<f32>,
    found: &[Array1<f32>],
    iterations: usize,
    tolerance: f32,
) -> Option<Array1<f32>> {
    let mut v = unit(orthogonalize(seed, found))?;

    for _ in 0..iterations.max(1) {
        let next = unit(orthogonalize(matrix.dot(&v), found))?;
        let delta = (&next - &v).mapv(|x| x * x).sum().sqrt();
        v = next;
        if delta < tolerance {
            break;
        }
    }

    let (pivot, _) = v
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))?;
    if v[pivot] < 0.0 {
        v.mapv_inplace(|x| -x);
    }
    Some(v)
}

/// 全 1 向量加确定性扰动，分量落在 [0.5, 1.5)
///
/// 纯全 1 起点与 (1, -1, ...) 这类轴正交，扰动后对任意轴都有非零投影
fn seed_vector(dim: usize, axis_index: usize) -> Array1<f32> {
    let mut state = 0x9E37_79B9u32 ^ (axis_index as u32).wrapping_mul(0x85EB_CA6B);
    Array1::from_shape_fn(dim, |_| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        0.5 + (state >> 8) as f32 / (1u32 << 24) as f32
    })
}

fn orthogonalize(mut v: Array1<f32>, found: &[Array1<f32>]) -> Array1<f32> {
    for axis in found {
        let overlap = v.dot(axis);
        v.scaled_add(-overlap, axis);
    }
    v
}

fn unit(v: Array1<f32>) -> Option<Array1<f32>> {
    let norm = v.dot(&v).sqrt();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    Some(v / norm)
}

use std::cmp::Ordering;
use std::sync::Arc;

use rayon::prelude::*;

use super::embedding::vector::{cosine_similarity, normalize};
use super::embedding::{EmbeddingTable, Encoder, ImageRecord};
use super::types::{QueryRequest, RankOptions, SearchHit, TableStats};
use crate::error::{AppError, AppResult};

/// 在共享向量表上执行 编码 → 合并 → 排序
pub struct SearchService {
    encoder: Arc<dyn Encoder>,
    table: Arc<EmbeddingTable>,
}

impl SearchService {
    pub fn new(encoder: Arc<dyn Encoder>, table: Arc<EmbeddingTable>) -> AppResult<Self> {
        if !table.is_empty() && table.dimension() != encoder.dimension() {
            return Err(AppError::DimensionMismatch {
                expected: encoder.dimension(),
                actual: table.dimension(),
            });
        }
        Ok(Self { encoder, table })
    }

    pub fn stats(&self) -> TableStats {
        let projection = self.table.projection();
        TableStats {
            rows: self.table.len(),
            dimension: self.table.dimension(),
            projection_components: projection.components(),
            explained_variance_ratio: projection.explained_variance_ratio(),
        }
    }

    /// 按请求模式选取输入、编码并合并
    pub fn encode_query(&self, request: &QueryRequest) -> AppResult<Vec<f32>> {
        let text = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| request.mode.uses_text() && !text.is_empty());
        let image = request
            .image
            .as_deref()
            .filter(|bytes| request.mode.uses_image() && !bytes.is_empty());

        let text_vec = text.map(|t| self.encoder.encode_text(t)).transpose()?;
        let image_vec = image.map(|b| self.encoder.encode_image(b)).transpose()?;

        combine_query(text_vec.as_deref(), image_vec.as_deref(), request.text_weight)
    }

    pub fn search(&self, request: &QueryRequest) -> AppResult<Vec<SearchHit>> {
        // 先于编码器检查
        if request.k == 0 {
            return Err(AppError::InvalidK);
        }

        let query = self.encode_query(request)?;
        let hits = rank(&self.table, &query, RankOptions::from(request))?;

        tracing::debug!(
            mode = request.mode.label(),
            k = request.k,
            use_reduced_space = request.use_reduced_space,
            reduced_dims = request.reduced_dims,
            hits = hits.len(),
            "Search completed"
        );
        Ok(hits)
    }
}

/// 把可选的文本向量和图片向量合并为一个查询向量
///
/// 只有一个向量时原样返回。两个都有时为 `normalize(w * text + (1 - w) * image)`；
/// `w` 不截断，超出 [0, 1] 时沿同一直线外推
pub fn combine_query(
    text_vec: Option<&[f32]>,
    image_vec: Option<&[f32]>,
    text_weight: f32,
) -> AppResult<Vec<f32>> {
    match (text_vec, image_vec) {
        (None, None) => Err(AppError::EmptyQuery),
        (Some(vector), None) | (None, Some(vector)) => Ok(vector.to_vec()),
        (Some(text), Some(image)) => {
            if text.len() != image.len() {
                return Err(AppError::DimensionMismatch {
                    expected: text.len(),
                    actual: image.len(),
                });
            }
            let image_weight = 1.0 - text_weight;
            let mixed = text
                .iter()
                .zip(image)
                .map(|(t, i)| text_weight * t + image_weight * i)
                .collect();
            Ok(normalize(mixed))
        }
    }
}

/// 对表中每一行计算余弦相似度，精确取 top-k
///
/// 同分保持表内顺序。降维检索时查询向量经过表自身的投影，两侧都截断到
/// `reduced_dims` 个分量
pub fn rank(
    table: &EmbeddingTable,
    query: &[f32],
    options: RankOptions,
) -> AppResult<Vec<SearchHit>> {
    if options.k == 0 {
        return Err(AppError::InvalidK);
    }

    let records = table.records();
    let scores: Vec<f32> = if options.use_reduced_space {
        let available = table.projection().components();
        let dims = options.reduced_dims;
        if dims == 0 || dims > available {
            return Err(AppError::InvalidProjectionDimension {
                requested: dims,
                available,
            });
        }
        let projected = table.projection().project(query)?;
        let query = &projected[..dims];
        records
            .par_iter()
            .map(|record| sortable(cosine_similarity(query, &record.reduced[..dims])))
            .collect()
    } else {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != table.dimension() {
            return Err(AppError::DimensionMismatch {
                expected: table.dimension(),
                actual: query.len(),
            });
        }
        records
            .par_iter()
            .map(|record| sortable(cosine_similarity(query, &record.embedding)))
            .collect()
    };

    Ok(select_top_k(records, &scores, options.k))
}

// total_cmp 下 -0.0 与 0.0 需要相等；NaN 排到最后
fn sortable(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score + 0.0
    }
}

fn select_top_k(records: &[ImageRecord], scores: &[f32], k: usize) -> Vec<SearchHit> {
    let by_rank = |a: &usize, b: &usize| -> Ordering {
        scores[*b].total_cmp(&scores[*a]).then_with(|| a.cmp(b))
    };

    let mut order: Vec<usize> = (0..scores.len()).collect();
    let k = k.min(order.len());
    if k == 0 {
        return Vec::new();
    }
    if k < order.len() {
        order.select_nth_unstable_by(k - 1, by_rank);
        order.truncate(k);
    }
    order.sort_unstable_by(by_rank);

    order
        .into_iter()
        .map(|idx| SearchHit {
            image_path: records[idx].image_path.clone(),
            similarity: scores[idx],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering as AtomicOrdering;

    use super::super::embedding::vector::l2_norm;
    use super::super::embedding::ProjectionParams;
    use super::super::test_support::{table_from, StubEncoder};
    use super::super::types::QueryMode;
    use super::*;

    fn options(k: usize) -> RankOptions {
        RankOptions {
            k,
            use_reduced_space: false,
            reduced_dims: 10,
        }
    }

    fn reduced(k: usize, reduced_dims: usize) -> RankOptions {
        RankOptions {
            k,
            use_reduced_space: true,
            reduced_dims,
        }
    }

    fn abc_table() -> EmbeddingTable {
        table_from(&[("A", [1.0, 0.0]), ("B", [0.0, 1.0]), ("C", [0.707, 0.707])])
    }

    fn names(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.image_path.as_str()).collect()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-5, "{a:?} != {b:?}");
        }
    }

    // ========== rank ==========

    #[test]
    fn ranks_two_nearest_rows() {
        let hits = rank(&abc_table(), &[1.0, 0.0], options(2)).unwrap();
        assert_eq!(names(&hits), vec!["A", "C"]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert!((hits[1].similarity - 0.707).abs() < 1e-3);
    }

    #[test]
    fn zero_k_is_rejected() {
        assert!(matches!(
            rank(&abc_table(), &[1.0, 0.0], options(0)),
            Err(AppError::InvalidK)
        ));
    }

    #[test]
    fn k_larger_than_table_returns_every_row() {
        let hits = rank(&abc_table(), &[0.0, 1.0], options(10)).unwrap();
        assert_eq!(names(&hits), vec!["B", "C", "A"]);
    }

    #[test]
    fn scores_never_increase_and_repeat_exactly() {
        let table = table_from(&[
            ("r0", [0.3, 0.9, 0.1]),
            ("r1", [-0.5, 0.2, 0.8]),
            ("r2", [0.9, 0.1, -0.4]),
            ("r3", [0.3, 0.9, 0.1]),
            ("r4", [0.0, -1.0, 0.0]),
            ("r5", [0.6, 0.6, 0.5]),
        ]);
        let query = normalize(vec![0.4, 0.8, 0.2]);

        for k in 1..=6 {
            let first = rank(&table, &query, options(k)).unwrap();
            let second = rank(&table, &query, options(k)).unwrap();
            assert_eq!(first.len(), k);
            assert_eq!(first, second);
            assert!(first.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        }
    }

    #[test]
    fn ties_keep_table_order() {
        let table = table_from(&[
            ("low", [0.0, 1.0]),
            ("first", [1.0, 0.0]),
            ("second", [2.0, 0.0]),
            ("third", [1.0, 0.0]),
        ]);
        let hits = rank(&table, &[1.0, 0.0], options(2)).unwrap();
        assert_eq!(names(&hits), vec!["first", "second"]);

        let hits = rank(&table, &[1.0, 0.0], options(4)).unwrap();
        assert_eq!(names(&hits), vec!["first", "second", "third", "low"]);
    }

    #[test]
    fn small_rows_still_rank_by_direction() {
        let table = table_from(&[("side", [0.6, 0.8]), ("tiny", [1e-4, 0.0])]);
        let hits = rank(&table, &[1.0, 0.0], options(2)).unwrap();
        assert_eq!(names(&hits), vec!["tiny", "side"]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_query_scores_every_row_zero() {
        let hits = rank(&abc_table(), &[0.0, 0.0], options(3)).unwrap();
        assert_eq!(names(&hits), vec!["A", "B", "C"]);
        assert!(hits.iter().all(|h| h.similarity == 0.0));
    }

    #[test]
    fn empty_table_yields_empty_result() {
        let table = EmbeddingTable::from_rows(
            Vec::new(),
            ProjectionParams {
                components: 4,
                iterations: 10,
                tolerance: 1e-6,
            },
        )
        .unwrap();
        assert!(rank(&table, &[1.0, 0.0], options(5)).unwrap().is_empty());
    }

    #[test]
    fn query_dimension_must_match_table() {
        assert!(matches!(
            rank(&abc_table(), &[1.0, 0.0, 0.0], options(1)),
            Err(AppError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn reduced_space_finds_the_matching_row() {
        let rows = [
            ("r0", [0.9, 0.1, 0.0, 0.1]),
            ("r1", [0.1, 0.9, 0.2, 0.0]),
            ("r2", [0.0, 0.2, 0.9, 0.3]),
            ("r3", [0.3, 0.0, 0.1, 0.9]),
            ("r4", [0.5, 0.5, 0.5, 0.5]),
            ("r5", [-0.4, 0.6, -0.2, 0.3]),
        ];
        let table = table_from(&rows);
        let m = table.projection().components();
        assert!(m >= 1);

        for (name, vector) in &rows {
            let full = rank(&table, vector, options(1)).unwrap();
            let approx = rank(&table, vector, reduced(1, m)).unwrap();
            assert_eq!(full[0].image_path, *name);
            assert_eq!(approx[0].image_path, *name);
            assert!((approx[0].similarity - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn reduced_dims_outside_fitted_range_fail() {
        let table = abc_table();
        let m = table.projection().components();

        match rank(&table, &[1.0, 0.0], reduced(1, m + 1)) {
            Err(AppError::InvalidProjectionDimension {
                requested,
                available,
            }) => {
                assert_eq!(requested, m + 1);
                assert_eq!(available, m);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            rank(&table, &[1.0, 0.0], reduced(1, 0)),
            Err(AppError::InvalidProjectionDimension { requested: 0, .. })
        ));
    }

    #[test]
    fn reduced_space_truncation_is_deterministic() {
        let table = table_from(&[
            ("r0", [0.9, 0.1, 0.0]),
            ("r1", [0.1, 0.9, 0.2]),
            ("r2", [0.0, 0.2, 0.9]),
            ("r3", [0.5, 0.5, 0.5]),
        ]);
        let first = rank(&table, &[0.7, 0.7, 0.1], reduced(4, 1)).unwrap();
        let second = rank(&table, &[0.7, 0.7, 0.1], reduced(4, 1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    // ========== combine_query ==========

    #[test]
    fn single_source_is_returned_unchanged() {
        let text = normalize(vec![0.2, 0.4, 0.4]);
        let combined = combine_query(Some(&text), None, 0.3).unwrap();
        assert_eq!(combined, text);
        assert!((l2_norm(&combined) - 1.0).abs() < 1e-6);

        let image = normalize(vec![1.0, -1.0, 0.5]);
        assert_eq!(combine_query(None, Some(&image), 0.9).unwrap(), image);
    }

    #[test]
    fn weight_endpoints_select_one_side() {
        let text = normalize(vec![1.0, 2.0, 2.0]);
        let image = normalize(vec![0.0, 3.0, -4.0]);
        assert_close(&combine_query(Some(&text), Some(&image), 1.0).unwrap(), &text);
        assert_close(&combine_query(Some(&text), Some(&image), 0.0).unwrap(), &image);
    }

    #[test]
    fn hybrid_is_normalized_blend() {
        let combined = combine_query(Some(&[1.0, 0.0]), Some(&[0.0, 1.0]), 0.5).unwrap();
        let h = std::f32::consts::FRAC_1_SQRT_2;
        assert_close(&combined, &[h, h]);
    }

    #[test]
    fn weights_outside_unit_interval_extrapolate() {
        let combined = combine_query(Some(&[1.0, 0.0]), Some(&[0.0, 1.0]), 1.5).unwrap();
        let expected = normalize(vec![1.5, -0.5]);
        assert_close(&combined, &expected);

        let combined = combine_query(Some(&[1.0, 0.0]), Some(&[0.0, 1.0]), -0.5).unwrap();
        let expected = normalize(vec![-0.5, 1.5]);
        assert_close(&combined, &expected);
    }

    #[test]
    fn missing_inputs_are_an_empty_query() {
        assert!(matches!(
            combine_query(None, None, 0.8),
            Err(AppError::EmptyQuery)
        ));
    }

    #[test]
    fn mismatched_sources_are_rejected() {
        assert!(matches!(
            combine_query(Some(&[1.0, 0.0]), Some(&[1.0, 0.0, 0.0]), 0.5),
            Err(AppError::DimensionMismatch { .. })
        ));
    }

    // ========== SearchService ==========

    fn service(encoder: StubEncoder) -> (SearchService, Arc<StubEncoder>) {
        let encoder = Arc::new(encoder);
        let service = SearchService::new(encoder.clone(), Arc::new(abc_table())).unwrap();
        (service, encoder)
    }

    fn stub() -> StubEncoder {
        StubEncoder::new(2)
            .with_text("a red thing", &[1.0, 0.0])
            .with_image(b"blue-image", &[0.0, 1.0])
    }

    #[test]
    fn text_mode_ignores_the_image() {
        let (service, encoder) = service(stub());
        let mut request = QueryRequest::text("a red thing");
        request.image = Some(b"blue-image".to_vec());
        request.k = 1;

        let hits = service.search(&request).unwrap();
        assert_eq!(names(&hits), vec!["A"]);
        assert_eq!(encoder.image_calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn hybrid_mode_blends_both_sources() {
        let (service, _) = service(stub());
        let mut request = QueryRequest::hybrid("a red thing", b"blue-image".to_vec(), 0.5);
        request.k = 1;
        let hits = service.search(&request).unwrap();
        assert_eq!(names(&hits), vec!["C"]);
    }

    #[test]
    fn image_mode_without_image_is_empty() {
        let (service, encoder) = service(stub());
        let request = QueryRequest {
            text: Some("a red thing".into()),
            mode: QueryMode::Image,
            ..QueryRequest::default()
        };
        assert!(matches!(service.search(&request), Err(AppError::EmptyQuery)));
        assert_eq!(encoder.text_calls.load(AtomicOrdering::SeqCst), 0);

        let blank = QueryRequest::text("   ");
        assert!(matches!(service.search(&blank), Err(AppError::EmptyQuery)));
    }

    #[test]
    fn zero_k_fails_before_encoding() {
        let (service, encoder) = service(stub());
        let mut request = QueryRequest::text("a red thing");
        request.k = 0;
        assert!(matches!(service.search(&request), Err(AppError::InvalidK)));
        assert_eq!(encoder.text_calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn encoder_errors_propagate() {
        let (service, _) = service(stub());
        let request = QueryRequest::image(b"not registered".to_vec());
        assert!(matches!(service.search(&request), Err(AppError::Encoding(_))));
    }

    #[test]
    fn encoder_and_table_dimensions_must_agree() {
        let result = SearchService::new(Arc::new(StubEncoder::new(3)), Arc::new(abc_table()));
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn stats_describe_the_table() {
        let (service, _) = service(stub());
        let stats = service.stats();
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.dimension, 2);
        assert_eq!(
            stats.projection_components,
            service.table.projection().components()
        );
    }
}

//! 分数提取服务 - 业务能力层
//!
//! 从生成的批改报告（HTML）中尽力提取总分、等级和 18 个指标分数。
//! 解析采用字符串标记定位 + 正则，刻意保持宽容：
//! 提取失败不会让整次批改失败，只返回空结果并由调用方记警告日志。

use phf::phf_map;
use regex::Regex;
use tracing::{debug, warn};

use crate::models::IndicatorScore;

/// 指标分数的合法范围，越界的值直接丢弃而不是存入非法数据
const SCORE_MIN: f64 = 0.0;
const SCORE_MAX: f64 = 10.0;

/// 사고유형（思考类型）类别名
const CATEGORY_THINKING: &str = "사고유형";
/// 통합지표（综合指标）类别名
const CATEGORY_INTEGRATED: &str = "통합지표";

/// 雷达图短标签 → 完整指标名
static INDICATOR_MAP: phf::Map<&'static str, &'static str> = phf_map! {
    // 사고유형
    "요약" => "요약",
    "비교" => "비교",
    "적용" => "적용",
    "평가" => "평가",
    "비판" => "비판",
    "문제해결" => "문제해결",
    "자료해석" => "자료해석",
    "견해제시" => "견해제시",
    "종합" => "종합",
    // 통합지표
    "결론" => "결론",
    "구조논리" => "구조/논리성",
    "표현명료" => "표현/명료성",
    "문제인식" => "문제인식",
    "개념정보" => "개념/정보",
    "목적적절" => "목적/적절성",
    "관점다각" => "관점/다각성",
    "심층성" => "심층성",
    "완전성" => "완전성",
};

/// 提取结果
#[derive(Debug, Clone, Default)]
pub struct ExtractedScores {
    pub total_score: Option<f64>,
    pub final_grade: Option<String>,
    pub indicators: Vec<IndicatorScore>,
}

impl ExtractedScores {
    /// 是否什么都没提取到（报告里没有可识别的分数表）
    pub fn is_empty(&self) -> bool {
        self.total_score.is_none() && self.final_grade.is_none() && self.indicators.is_empty()
    }
}

/// 分数提取服务
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreExtractor;

impl ScoreExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 从批改报告中提取分数信息（永不失败）
    pub fn extract(&self, html: &str) -> ExtractedScores {
        let total_score = self.extract_total_score(html);
        let final_grade = self.extract_final_grade(html);

        let mut indicators = Vec::new();
        indicators.extend(self.extract_chart(html, "사고유형", CATEGORY_THINKING));
        indicators.extend(self.extract_chart(html, "통합지표", CATEGORY_INTEGRATED));

        let extracted = ExtractedScores {
            total_score,
            final_grade,
            indicators,
        };

        if extracted.is_empty() {
            warn!("报告中没有可识别的分数表，按空结果处理");
        } else {
            debug!(
                "分数提取完成: 총점={:?}, 등급={:?}, 指标 {} 个",
                extracted.total_score,
                extracted.final_grade,
                extracted.indicators.len()
            );
        }

        extracted
    }

    /// 提取总分
    ///
    /// 先找 "최종점수" / "최종 점수" 标签旁边的值，
    /// 找不到时退回 score-section 里的第一个 score-number。
    fn extract_total_score(&self, html: &str) -> Option<f64> {
        if let Some(value) = find_info_value(html, |label| {
            label.contains("최종점수") || label.contains("최종 점수")
        }) {
            if let Some(score) = first_number(&value) {
                return Some(score);
            }
        }

        score_section_numbers(html)
            .first()
            .and_then(|text| first_number(text))
    }

    /// 提取最终等级
    ///
    /// 先找 "등급" 标签旁边的值，找不到时退回 score-section 里的
    /// 第二个 score-number。
    fn extract_final_grade(&self, html: &str) -> Option<String> {
        if let Some(value) = find_info_value(html, |label| label == "등급") {
            if !value.is_empty() {
                return Some(value);
            }
        }

        score_section_numbers(html)
            .get(1)
            .map(|text| text.to_string())
            .filter(|s| !s.is_empty())
    }

    /// 提取一张雷达图的指标分数
    ///
    /// 定位标题包含关键字的 chart-card，在其 SVG 里按文档顺序
    /// 把 radar-label 与 radar-score 一一配对。
    fn extract_chart(&self, html: &str, title_keyword: &str, category: &str) -> Vec<IndicatorScore> {
        let title_re = match Regex::new(r#"class="chart-title"[^>]*>\s*([^<]*?)\s*<"#) {
            Ok(re) => re,
            Err(_) => return Vec::new(),
        };

        let mut svg_slice = None;
        for cap in title_re.captures_iter(html) {
            let title = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            if title.contains(title_keyword) {
                let rest = &html[cap.get(0).map(|m| m.end()).unwrap_or(0)..];
                let end = rest.find("</svg>").unwrap_or(rest.len());
                svg_slice = Some(&rest[..end]);
                break;
            }
        }

        let svg = match svg_slice {
            Some(svg) => svg,
            None => return Vec::new(),
        };

        let labels = class_texts(svg, "radar-label");
        let scores = class_texts(svg, "radar-score");

        let mut indicators = Vec::new();
        for (label, score_text) in labels.iter().zip(scores.iter()) {
            let score = match score_text.parse::<f64>() {
                Ok(score) => score,
                Err(_) => continue,
            };
            if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
                warn!("指标 {} 的分数 {} 越界，丢弃", label, score);
                continue;
            }
            let full_name = INDICATOR_MAP
                .get(label.as_str())
                .copied()
                .unwrap_or(label.as_str());
            indicators.push(IndicatorScore {
                category: category.to_string(),
                indicator_name: full_name.to_string(),
                score,
            });
        }

        indicators
    }
}

/// 在 info-label 元素中找到满足条件的标签，返回相邻 info-value 的文本
fn find_info_value(html: &str, pred: impl Fn(&str) -> bool) -> Option<String> {
    let label_re = Regex::new(r#"class="info-label"[^>]*>\s*([^<]*?)\s*<"#).ok()?;

    for cap in label_re.captures_iter(html) {
        let label = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        if !pred(label) {
            continue;
        }

        let rest = &html[cap.get(0).map(|m| m.end()).unwrap_or(0)..];
        let value_start = rest.find("class=\"info-value\"")?;
        let after_tag = &rest[value_start..];
        let gt = after_tag.find('>')?;
        let text = &after_tag[gt + 1..];
        let lt = text.find('<').unwrap_or(text.len());
        return Some(text[..lt].trim().to_string());
    }

    None
}

/// score-section 内按顺序取出所有 score-number 的文本
fn score_section_numbers(html: &str) -> Vec<String> {
    let section_start = match html.find("class=\"score-section\"") {
        Some(idx) => idx,
        None => return Vec::new(),
    };
    class_texts(&html[section_start..], "score-number")
}

/// 按文档顺序收集指定 class 元素的文本内容
fn class_texts(html: &str, class_name: &str) -> Vec<String> {
    let re = match Regex::new(&format!(
        r#"class="{}"[^>]*>\s*([^<]*?)\s*<"#,
        regex::escape(class_name)
    )) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    re.captures_iter(html)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// 从文本中取出第一个数字（"87.5점" → 87.5）
fn first_number(text: &str) -> Option<f64> {
    let re = Regex::new(r"(\d+\.?\d*)").ok()?;
    re.captures(text)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 按报告模板构造的最小样例
    fn sample_report() -> String {
        r#"<!DOCTYPE html>
<html>
<body>
  <div class="info-label">최종점수</div>
  <div class="info-value">87.5점</div>
  <div class="info-label">등급</div>
  <div class="info-value">B+</div>
  <div class="chart-card">
    <div class="chart-title">사고유형 분석</div>
    <svg class="radar-svg">
      <text class="radar-label">요약</text>
      <text class="radar-label">비교</text>
      <text class="radar-score">8.5</text>
      <text class="radar-score">7.0</text>
    </svg>
  </div>
  <div class="chart-card">
    <div class="chart-title">통합지표 분석</div>
    <svg class="radar-svg">
      <text class="radar-label">구조논리</text>
      <text class="radar-score">6.5</text>
    </svg>
  </div>
</body>
</html>"#
            .to_string()
    }

    #[test]
    fn test_extract_well_formed_report() {
        let extracted = ScoreExtractor::new().extract(&sample_report());

        assert_eq!(extracted.total_score, Some(87.5));
        assert_eq!(extracted.final_grade.as_deref(), Some("B+"));
        assert_eq!(extracted.indicators.len(), 3);

        let thinking: Vec<_> = extracted
            .indicators
            .iter()
            .filter(|i| i.category == "사고유형")
            .collect();
        assert_eq!(thinking.len(), 2);
        assert_eq!(thinking[0].indicator_name, "요약");
        assert_eq!(thinking[0].score, 8.5);
    }

    #[test]
    fn test_short_label_mapped_to_full_name() {
        let extracted = ScoreExtractor::new().extract(&sample_report());
        let integrated: Vec<_> = extracted
            .indicators
            .iter()
            .filter(|i| i.category == "통합지표")
            .collect();
        assert_eq!(integrated.len(), 1);
        assert_eq!(integrated[0].indicator_name, "구조/논리성");
    }

    #[test]
    fn test_missing_score_table_returns_empty() {
        let html = "<!DOCTYPE html><html><body><p>점수 표 없음</p></body></html>";
        let extracted = ScoreExtractor::new().extract(html);

        assert!(extracted.total_score.is_none());
        assert!(extracted.final_grade.is_none());
        assert!(extracted.indicators.is_empty());
        assert!(extracted.is_empty());
    }

    #[test]
    fn test_out_of_range_indicator_dropped() {
        let html = r#"
  <div class="chart-card">
    <div class="chart-title">사고유형 분석</div>
    <svg class="radar-svg">
      <text class="radar-label">요약</text>
      <text class="radar-label">비교</text>
      <text class="radar-score">12.5</text>
      <text class="radar-score">9.0</text>
    </svg>
  </div>"#;
        let extracted = ScoreExtractor::new().extract(html);

        // 12.5 越界被丢弃，合法的一项保留
        assert_eq!(extracted.indicators.len(), 1);
        assert_eq!(extracted.indicators[0].indicator_name, "비교");
        assert_eq!(extracted.indicators[0].score, 9.0);
    }

    #[test]
    fn test_score_section_fallback() {
        let html = r#"
  <div class="score-section">
    <span class="score-number">72.0</span>
    <span class="score-number">C+</span>
  </div>"#;
        let extracted = ScoreExtractor::new().extract(html);

        assert_eq!(extracted.total_score, Some(72.0));
        assert_eq!(extracted.final_grade.as_deref(), Some("C+"));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = ScoreExtractor::new();
        let first = extractor.extract(&sample_report());
        let second = extractor.extract(&sample_report());

        assert_eq!(first.total_score, second.total_score);
        assert_eq!(first.indicators, second.indicators);
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number("87.5점"), Some(87.5));
        assert_eq!(first_number("점수: 90"), Some(90.0));
        assert_eq!(first_number("없음"), None);
    }
}

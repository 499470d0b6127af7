//! 字段拼接器 - 流程层
//!
//! 把模型响应中的字段按映射表拷贝进原始记录的副本。
//! 原先散落在各个任务处理器里的点分路径取值逻辑统一收敛到这里，
//! 只保留一种遍历算法和一种失败方式。

use serde_json::Value;

use crate::error::{AppError, AppResult};

/// 字段映射
///
/// - `source` 为 `None`：整个响应直接替换记录
/// - `source` 为点分路径：在响应中逐级下钻取值，赋给副本顶层的 `dest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    /// 目标键（记录副本顶层）
    pub dest: String,
    /// 源路径（响应内，点分嵌套），None 表示整体替换
    pub source: Option<String>,
}

impl FieldMapping {
    /// 解析任务文件中的紧凑写法
    ///
    /// - `"prompt"` → 同名拷贝
    /// - `"Rubrics:reward_model.rubrics"` → 从嵌套路径拷贝到顶层键
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((dest, source)) => Self {
                dest: dest.to_string(),
                source: Some(source.to_string()),
            },
            None => Self {
                dest: spec.to_string(),
                source: Some(spec.to_string()),
            },
        }
    }

    /// 整体替换映射
    pub fn replace_all() -> Self {
        Self {
            dest: String::new(),
            source: None,
        }
    }
}

/// 按点分路径在 JSON 值中下钻
///
/// 路径 `"."` 表示整个值本身
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> AppResult<&'a Value> {
    if path == "." {
        return Ok(value);
    }
    let mut current = value;
    for key in path.split('.') {
        current = current
            .get(key)
            .ok_or_else(|| AppError::missing_field(path))?;
    }
    Ok(current)
}

/// 把响应字段拼接进记录副本
///
/// 写时复制：`original` 和 `response` 均不被修改，失败时调用方可以
/// 用原样的输入重试。缺少声明字段会返回解析错误，交给对话运行器的
/// 变体轮换逻辑处理，而不是静默跳过。
pub fn splice(original: &Value, response: &Value, mappings: &[FieldMapping]) -> AppResult<Value> {
    let mut result = original.clone();

    for mapping in mappings {
        match &mapping.source {
            None => {
                // 整体替换：响应即结果
                result = response.clone();
            }
            Some(path) => {
                let value = resolve_path(response, path)?.clone();
                match result.as_object_mut() {
                    Some(obj) => {
                        obj.insert(mapping.dest.clone(), value);
                    }
                    None => {
                        return Err(AppError::missing_field(&mapping.dest));
                    }
                }
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;

    #[test]
    fn test_splice_replaces_mapped_field() {
        let original = json!({"a": 1, "b": {"x": "old"}});
        let response = json!({"b": {"x": "new", "y": "extra"}});
        let mappings = vec![FieldMapping::parse("b")];

        let result = splice(&original, &response, &mappings).unwrap();

        assert_eq!(result, json!({"a": 1, "b": {"x": "new", "y": "extra"}}));
        // 输入保持原样
        assert_eq!(original, json!({"a": 1, "b": {"x": "old"}}));
        assert_eq!(response, json!({"b": {"x": "new", "y": "extra"}}));
    }

    #[test]
    fn test_splice_dotted_source_path() {
        let original = json!({"prompt": "p", "Rubrics": []});
        let response = json!({"reward_model": {"rubrics": [{"criterion": "译文"}]}});
        let mappings = vec![FieldMapping::parse("Rubrics:reward_model.rubrics")];

        let result = splice(&original, &response, &mappings).unwrap();

        assert_eq!(result["Rubrics"], json!([{"criterion": "译文"}]));
        assert_eq!(result["prompt"], "p");
    }

    #[test]
    fn test_splice_missing_path_is_parse_failure() {
        let original = json!({"a": 1});
        let response = json!({"b": 2});
        let mappings = vec![FieldMapping {
            dest: "a".to_string(),
            source: Some("c.d".to_string()),
        }];

        let err = splice(&original, &response, &mappings).unwrap_err();
        // 必须归类为结构性失败，供重试逻辑识别
        assert_eq!(err.failure_kind(), Some(FailureKind::Parse));
    }

    #[test]
    fn test_splice_none_source_replaces_whole_record() {
        let original = json!({"a": 1});
        let response = json!({"translated": true});
        let mappings = vec![FieldMapping::replace_all()];

        let result = splice(&original, &response, &mappings).unwrap();
        assert_eq!(result, response);
    }

    #[test]
    fn test_mapping_parse_forms() {
        assert_eq!(
            FieldMapping::parse("prompt"),
            FieldMapping {
                dest: "prompt".to_string(),
                source: Some("prompt".to_string()),
            }
        );
        assert_eq!(
            FieldMapping::parse("Rubrics:reward_model.rubrics"),
            FieldMapping {
                dest: "Rubrics".to_string(),
                source: Some("reward_model.rubrics".to_string()),
            }
        );
    }

    #[test]
    fn test_resolve_path_whole_value() {
        let value = json!({"k": "v"});
        assert_eq!(resolve_path(&value, ".").unwrap(), &value);
    }
}

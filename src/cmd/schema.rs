//! Log format introspection for automation and log producers.

use serde::Serialize;

use crate::{LogKind, Metric, MetricGroup, RunLayout};

#[derive(Debug, Clone, Serialize)]
pub struct SchemaDoc {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    #[serde(rename = "logKinds")]
    pub log_kinds: Vec<LogKindDoc>,
    pub layouts: Vec<LayoutDoc>,
    pub metrics: Vec<MetricDoc>,
    #[serde(rename = "defaultGroups")]
    pub default_groups: Vec<MetricGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogKindDoc {
    pub kind: LogKind,
    #[serde(rename = "filePattern")]
    pub file_pattern: String,
    #[serde(rename = "requiredFields")]
    pub required_fields: Vec<&'static str>,
    #[serde(rename = "optionalFields")]
    pub optional_fields: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutDoc {
    pub layout: RunLayout,
    #[serde(rename = "logKinds")]
    pub log_kinds: Vec<LogKind>,
    #[serde(rename = "waitForm")]
    pub wait_form: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDoc {
    pub code: i64,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn schema_doc() -> SchemaDoc {
    SchemaDoc {
        schema_version: "tracegrid.schema_doc.v1".to_string(),
        log_kinds: LogKind::ALL
            .iter()
            .map(|kind| LogKindDoc {
                kind: *kind,
                file_pattern: format!("{}<version>", kind.file_prefix()),
                required_fields: kind.required_fields().to_vec(),
                optional_fields: kind.optional_fields().to_vec(),
            })
            .collect(),
        layouts: vec![
            LayoutDoc {
                layout: RunLayout::Split,
                log_kinds: RunLayout::Split.log_kinds().to_vec(),
                wait_form: "interval: wait_start, wait_end -> per-tick occupancy",
            },
            LayoutDoc {
                layout: RunLayout::Unified,
                log_kinds: RunLayout::Unified.log_kinds().to_vec(),
                wait_form: "point: wait_start, wait_length -> cumulative entry/exit steps",
            },
        ],
        metrics: Metric::ALL
            .iter()
            .map(|m| MetricDoc {
                code: m.code(),
                name: m.name(),
                description: m.description(),
            })
            .collect(),
        default_groups: MetricGroup::defaults(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_every_kind_and_metric_code() {
        let doc = schema_doc();
        assert_eq!(doc.log_kinds.len(), LogKind::ALL.len());
        let codes: Vec<i64> = doc.metrics.iter().map(|m| m.code).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5, 6]);

        let value = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(value["logKinds"][0]["filePattern"], "completion_log_<version>");
        assert_eq!(value["metrics"][4]["name"], "cnc");
    }
}

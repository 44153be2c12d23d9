//! YAML parsing for run descriptors, indicator declarations and configs.

use serde::Deserialize;

use crate::run::{ConfigMap, IndicatorMap, RunDescriptor};

/// Descriptor as written by the training process; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    name: Option<String>,
    comment: Option<String>,
    tags: Option<Vec<String>>,
    commit: Option<String>,
    commit_message: Option<String>,
    is_dirty: Option<bool>,
    python_file: Option<String>,
    trial_date: Option<String>,
    trial_time: Option<String>,
    start_step: Option<u64>,
}

impl From<RawDescriptor> for RunDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        let name = raw.name.unwrap_or_default();
        let tags = raw.tags.unwrap_or_else(|| tags_from_name(&name));

        RunDescriptor {
            name,
            comment: raw.comment.unwrap_or_default(),
            tags,
            commit: raw.commit.unwrap_or_default(),
            commit_message: raw.commit_message.unwrap_or_default(),
            is_dirty: raw.is_dirty.unwrap_or(false),
            python_file: raw.python_file.unwrap_or_default(),
            trial_date: raw.trial_date.unwrap_or_default(),
            trial_time: raw.trial_time.unwrap_or_default(),
            start_step: raw.start_step.unwrap_or(0),
        }
    }
}

/// Default tags: the non-empty underscore-separated segments of the name.
fn tags_from_name(name: &str) -> Vec<String> {
    name.split('_')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a run descriptor, applying defaults for missing keys.
///
/// An empty document yields an all-default descriptor.
pub fn parse_descriptor(yaml: &str) -> Result<RunDescriptor, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(RawDescriptor::default().into());
    }
    let raw: RawDescriptor = serde_yaml::from_str(yaml)?;
    Ok(raw.into())
}

/// Parse indicator declarations. An empty document is an empty map.
pub fn parse_indicators(yaml: &str) -> Result<IndicatorMap, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(IndicatorMap::new());
    }
    serde_yaml::from_str(yaml)
}

/// Parse configs, keeping explicitly specified values and hyperparameters.
pub fn parse_configs(yaml: &str) -> Result<ConfigMap, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(ConfigMap::new());
    }
    let all: ConfigMap = serde_yaml::from_str(yaml)?;
    Ok(all
        .into_iter()
        .filter(|(_, c)| c.is_explicitly_specified || c.is_hyperparam)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_descriptor() {
        let yaml = r#"
name: resnet_baseline
comment: lr sweep
tags: [vision, sweep]
commit: abc123
commit_message: tune lr
is_dirty: true
python_file: /src/train.py
trial_date: "2024-03-01"
trial_time: "12:30:05"
start_step: 500
"#;
        let d = parse_descriptor(yaml).unwrap();
        assert_eq!(d.name, "resnet_baseline");
        assert_eq!(d.tags, vec!["vision", "sweep"]);
        assert!(d.is_dirty);
        assert_eq!(d.start_step, 500);
        assert_eq!(d.trial_time, "12:30:05");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let d = parse_descriptor("name: resnet_lr_sweep\n").unwrap();
        assert_eq!(d.comment, "");
        assert_eq!(d.commit, "");
        assert!(!d.is_dirty);
        assert_eq!(d.start_step, 0);
        assert_eq!(d.tags, vec!["resnet", "lr", "sweep"]);
    }

    #[test]
    fn test_empty_document() {
        let d = parse_descriptor("").unwrap();
        assert_eq!(d, RunDescriptor::default());
        assert!(d.tags.is_empty());
    }

    #[test]
    fn test_explicit_empty_tags_kept() {
        let d = parse_descriptor("name: a_b\ntags: []\n").unwrap();
        assert!(d.tags.is_empty());
    }

    #[test]
    fn test_malformed_descriptor() {
        assert!(parse_descriptor("name: [unterminated").is_err());
    }

    #[test]
    fn test_indicators() {
        let yaml = r#"
loss:
  class_name: Scalar
  is_print: true
grad_norm:
  class_name: Histogram
"#;
        let indicators = parse_indicators(yaml).unwrap();
        assert!(indicators["loss"].is_print);
        assert!(!indicators["grad_norm"].is_print);
        assert_eq!(indicators["grad_norm"].class_name, "Histogram");
    }

    #[test]
    fn test_configs_filtered() {
        let yaml = r#"
learning_rate:
  name: learning_rate
  value: 0.001
  is_explicitly_specified: true
batch_size:
  name: batch_size
  computed: 64
  is_hyperparam: true
device:
  name: device
  computed: cuda
"#;
        let configs = parse_configs(yaml).unwrap();
        assert_eq!(configs.len(), 2);
        assert!(configs.contains_key("learning_rate"));
        assert!(configs.contains_key("batch_size"));
        assert!(!configs.contains_key("device"));
        assert_eq!(configs["batch_size"].computed, serde_json::json!(64));
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Target value used when a record has no value for a label key.
pub const MISSING_LABEL: &str = "None";

/// Bidirectional mapping between a label's string values and dense class
/// indices, assigned in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCodec {
    classes: Vec<String>,
}

impl LabelCodec {
    pub fn fit<S: AsRef<str>>(values: &[S]) -> Result<Self, PipelineError> {
        if values.is_empty() {
            return Err(PipelineError::NoDataError(
                "cannot fit a label codec without values".into(),
            ));
        }
        let classes: BTreeSet<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
        Ok(Self {
            classes: classes.into_iter().collect(),
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, value: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    pub fn encode_all<S: AsRef<str>>(&self, values: &[S]) -> Result<Vec<usize>, PipelineError> {
        values
            .iter()
            .map(|v| {
                self.encode(v.as_ref()).ok_or_else(|| {
                    PipelineError::ValidationError(format!("unknown label value '{}'", v.as_ref()))
                })
            })
            .collect()
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_round_trip() -> Result<(), PipelineError> {
        let values = ["jacket", "t-shirt", MISSING_LABEL, "jacket"];
        let codec = LabelCodec::fit(&values)?;
        assert_eq!(codec.classes(), ["None", "jacket", "t-shirt"]);
        assert_eq!(codec.encode_all(&values)?, vec![1, 2, 0, 1]);
        assert_eq!(codec.decode(2), Some("t-shirt"));
        assert_eq!(codec.decode(3), None);
        Ok(())
    }

    #[test]
    fn test_unknown_value() -> Result<(), PipelineError> {
        let codec = LabelCodec::fit(&["jacket"])?;
        assert_eq!(codec.encode("parka"), None);
        assert!(codec.encode_all(&["parka"]).is_err());
        Ok(())
    }

    #[test]
    fn test_empty_fit() {
        let empty: [&str; 0] = [];
        assert!(matches!(LabelCodec::fit(&empty), Err(PipelineError::NoDataError(_))));
    }
}

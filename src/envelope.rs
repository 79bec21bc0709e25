use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire-carried JSON object sent through the broker: `{"data": ..., "args": ...}`.
///
/// `args` uses a `BTreeMap` rather than a `HashMap` purely so serialized output
/// is deterministic in tests; the spec treats key order as irrelevant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub data: Option<Value>,
    pub args: Option<BTreeMap<String, String>>,
}

impl Envelope {
    pub fn new(data: Option<Value>, args: Option<BTreeMap<String, String>>) -> Self {
        Self { data, args }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut args = BTreeMap::new();
        args.insert("offset".to_string(), "0".to_string());
        let envelope = Envelope::new(Some(serde_json::json!({"a": 2})), Some(args));

        let encoded = serde_json::to_string(&envelope).unwrap();
        let decoded: Envelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn null_data_and_args_serialize_as_null() {
        let envelope = Envelope::new(None, None);
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert_eq!(encoded, serde_json::json!({"data": null, "args": null}));
    }
}

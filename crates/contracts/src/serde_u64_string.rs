//! Serialize u64 identifiers and seeds as strings so JSON consumers with
//! 53-bit number precision round-trip them losslessly. Accepts either
//! representation on input.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(raw) => raw.parse::<u64>().map_err(D::Error::custom),
        Raw::Integer(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Wrapper {
        #[serde(with = "super")]
        id: u64,
    }

    #[test]
    fn large_ids_round_trip_as_strings() {
        let wrapper = Wrapper {
            id: 132_620_654_087_241_729,
        };
        let raw = serde_json::to_string(&wrapper).expect("serialize");
        assert_eq!(raw, r#"{"id":"132620654087241729"}"#);
        let decoded: Wrapper = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(decoded, wrapper);
    }

    #[test]
    fn numeric_input_still_accepted() {
        let decoded: Wrapper = serde_json::from_str(r#"{"id":42}"#).expect("numeric id");
        assert_eq!(decoded.id, 42);
    }
}

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub trait FromJsonString: Sized {
    fn from_json_string(json_str: &str) -> Result<Self, serde_json::Error>;
}

impl<T> FromJsonString for T
where
    T: DeserializeOwned,
{
    fn from_json_string(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }
}

/// Pretty-print `value` as JSON into `path`, replacing any existing file.
pub fn write_json_pretty<T: Serialize>(
    value: &T,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        let mut tools = BTreeMap::new();
        tools.insert("t-coffee".to_string(), "t_coffee".to_string());

        write_json_pretty(&tools, &path).unwrap();
        let read: BTreeMap<String, String> =
            BTreeMap::from_json_string(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read.get("t-coffee").map(String::as_str), Some("t_coffee"));
    }
}

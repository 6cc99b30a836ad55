use serde::{Deserialize, Deserializer, de::Error};

// a provider name that is missing, null or "" all mean "no provider"
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let input_string: Option<String> = Option::deserialize(deserializer)?;

    let Some(name) = input_string else {
        return Ok(None);
    };

    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.chars().any(char::is_whitespace) {
        return Err(Error::custom("provider name must not contain whitespace"));
    }

    Ok(Some(trimmed.to_string()))
}

use anyhow::{bail, Result};

/// Validate a task id: must be non-empty, without surrounding whitespace or
/// control characters.
pub fn validate_task_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("task id must not be empty");
    }
    if id.trim() != id {
        bail!("task id '{id}' has leading or trailing whitespace");
    }
    if id.chars().any(char::is_control) {
        bail!("task id '{}' contains control characters", id.escape_default());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        assert!(validate_task_id("task-1").is_ok());
        assert!(validate_task_id("3f2a9c1e-7b8d-4e0f-9a6b-1c2d3e4f5a6b").is_ok());
        assert!(validate_task_id("ws/3 retry").is_ok());
    }

    #[test]
    fn invalid_ids() {
        assert!(validate_task_id("").is_err());
        assert!(validate_task_id(" padded").is_err());
        assert!(validate_task_id("line\nbreak").is_err());
        assert!(validate_task_id("tab\tbed").is_err());
    }
}
